//! Service resolution.
//!
//! Every service instance in the instance tree is bound to whatever realizes
//! it: a builtin instance of the same service in the nearest enclosing
//! instance (searching the instance itself first, then its ancestors up to the
//! root), or, for host services, a host endpoint.

use crate::errors::BuildError;
use std::collections::BTreeMap;
use weft_common::Interner;
use weft_ir::{
    AppIdPath, HwGraph, InstanceId, ServiceInstanceId, ServiceProvider, ServiceRole,
};

/// A service instance served by a builtin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRef {
    /// Instance declaring the service instance.
    pub instance: InstanceId,
    /// The service instance within that instance's module.
    pub service_instance: ServiceInstanceId,
    /// Full AppID path of the service instance.
    pub path: AppIdPath,
    /// The operation name.
    pub operation: String,
}

/// A builtin instance together with every service instance it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinImpl {
    /// Instance containing the builtin.
    pub instance: InstanceId,
    /// Position in the module's builtin list.
    pub builtin: u32,
    /// Full AppID path of the builtin.
    pub path: AppIdPath,
    /// Position of the service in the graph.
    pub service: u32,
    /// The service name.
    pub service_name: String,
    /// The implementation tag.
    pub tag: String,
    /// Clients in instance-tree order. Their position is their arbitration
    /// priority under fixed-priority arbitration.
    pub clients: Vec<ClientRef>,
}

/// A service instance realized by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    /// Instance declaring the service instance.
    pub instance: InstanceId,
    /// The service instance within that instance's module.
    pub service_instance: ServiceInstanceId,
    /// Full AppID path; the address host software uses.
    pub path: AppIdPath,
    /// The service name.
    pub service: String,
    /// The operation name.
    pub operation: String,
    /// `Client` when the host originates the bundle, `Server` when it serves
    /// a call.
    pub role: ServiceRole,
}

/// What a service instance resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Index into [`ServiceMap::builtins`].
    Builtin(usize),
    /// Index into [`ServiceMap::hosts`].
    Host(usize),
}

/// The resolved service graph of a system.
#[derive(Debug, Clone, Default)]
pub struct ServiceMap {
    /// Builtin instances in instance-tree order.
    pub builtins: Vec<BuiltinImpl>,
    /// Host endpoints in instance-tree order.
    pub hosts: Vec<HostEndpoint>,
    resolutions: BTreeMap<(InstanceId, ServiceInstanceId), Resolution>,
}

impl ServiceMap {
    /// Resolves every service instance in `graph`.
    pub fn resolve(graph: &HwGraph, interner: &Interner) -> Result<Self, BuildError> {
        let mut map = ServiceMap::default();

        for (inst_id, inst) in graph.instances.iter() {
            let def = &graph.modules[inst.module];
            for (index, builtin) in def.builtins.iter().enumerate() {
                map.builtins.push(BuiltinImpl {
                    instance: inst_id,
                    builtin: index as u32,
                    path: inst.path.child(builtin.appid.clone()),
                    service: builtin.service,
                    service_name: graph.service(builtin.service).name().to_string(),
                    tag: interner.resolve(builtin.tag).to_string(),
                    clients: Vec::new(),
                });
            }
        }

        for (inst_id, inst) in graph.instances.iter() {
            let def = &graph.modules[inst.module];
            for (sid, svc) in def.services.iter() {
                let decl = graph.service(svc.service);
                let operation = decl.operations()[svc.operation as usize].name.clone();
                let path = inst.path.child(svc.appid.clone());
                let resolution = match decl.provider() {
                    ServiceProvider::Host => {
                        map.hosts.push(HostEndpoint {
                            instance: inst_id,
                            service_instance: sid,
                            path,
                            service: decl.name().to_string(),
                            operation,
                            role: svc.role,
                        });
                        Resolution::Host(map.hosts.len() - 1)
                    }
                    ServiceProvider::Builtin => {
                        let index = map
                            .nearest_builtin(graph, inst_id, svc.service)
                            .ok_or_else(|| BuildError::UnresolvedService {
                                path: path.to_string(),
                                service: decl.name().to_string(),
                            })?;
                        tracing::debug!(client = %path, builtin = %map.builtins[index].path, "resolved service instance");
                        map.builtins[index].clients.push(ClientRef {
                            instance: inst_id,
                            service_instance: sid,
                            path,
                            operation,
                        });
                        Resolution::Builtin(index)
                    }
                };
                map.resolutions.insert((inst_id, sid), resolution);
            }
        }
        Ok(map)
    }

    fn nearest_builtin(&self, graph: &HwGraph, from: InstanceId, service: u32) -> Option<usize> {
        graph.ancestors(from).into_iter().find_map(|ancestor| {
            self.builtins
                .iter()
                .position(|b| b.instance == ancestor && b.service == service)
        })
    }

    /// Returns what the service instance `sid` of `instance` resolved to.
    pub fn resolution(&self, instance: InstanceId, sid: ServiceInstanceId) -> Option<Resolution> {
        self.resolutions.get(&(instance, sid)).copied()
    }

    /// Finds a host endpoint by its displayed AppID path.
    pub fn host_endpoint(&self, path: &str) -> Option<(usize, &HostEndpoint)> {
        self.hosts
            .iter()
            .enumerate()
            .find(|(_, h)| h.path.to_string() == path)
    }

    /// Returns the number of resolved service instances.
    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    /// Returns `true` if the design has no service instances.
    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }
}
