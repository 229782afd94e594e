//! The system manifest: metadata collected from the whole graph.
//!
//! Every module is listed, with or without attached metadata, together with
//! the instance tree, the declared services, the builtin implementations and
//! their clients, and the host endpoints. External tooling uses the AppID
//! paths recorded here to address instances at runtime.

use crate::errors::BuildError;
use crate::resolve::ServiceMap;
use serde::{Deserialize, Serialize};
use weft_common::{Interner, InternalError};
use weft_config::{Arbitration, BackendPreset};
use weft_ir::{HwGraph, Metadata, ServiceProvider, ServiceRole};

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// The manifest written as `esi_system_manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version.
    pub api_version: u32,
    /// System identity.
    pub system: SystemInfo,
    /// The backend preset built for.
    pub backend: BackendPreset,
    /// Arbitration policy used for shared builtins.
    pub arbitration: Arbitration,
    /// Hex fingerprint of the generated graph.
    pub fingerprint: String,
    /// The instance tree, root first.
    pub instances: Vec<InstanceEntry>,
    /// Every generated module.
    pub modules: Vec<ModuleEntry>,
    /// Declared services.
    pub services: Vec<ServiceEntry>,
    /// Builtin implementations and the instances they serve.
    pub builtins: Vec<BuiltinEntry>,
    /// Host endpoints.
    #[serde(default)]
    pub host_endpoints: Vec<HostEntry>,
}

/// System name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// The system name.
    pub name: String,
    /// The system version.
    pub version: String,
}

/// One node of the instance tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEntry {
    /// Dotted AppID path.
    pub path: String,
    /// Module name.
    pub module: String,
}

/// One module definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Module name.
    pub name: String,
    /// Input ports.
    pub ports: Vec<PortEntry>,
    /// Attached metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// One module port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    /// Port name.
    pub name: String,
    /// Port type.
    #[serde(rename = "type")]
    pub ty: String,
}

/// One service declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service name.
    pub name: String,
    /// Who provides it.
    pub provider: ServiceProvider,
    /// Operations and their bundle types.
    pub operations: Vec<OperationEntry>,
}

/// One service operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEntry {
    /// Operation name.
    pub name: String,
    /// Bundle type, displayed.
    pub bundle: String,
}

/// One builtin implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinEntry {
    /// AppID path of the builtin.
    pub path: String,
    /// Service it realizes.
    pub service: String,
    /// Implementation tag.
    pub tag: String,
    /// Service instances it serves, in arbitration order.
    pub clients: Vec<ClientEntry>,
}

/// One client of a builtin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    /// AppID path of the service instance.
    pub path: String,
    /// Operation used.
    pub operation: String,
}

/// One host endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// AppID path of the service instance.
    pub path: String,
    /// Host service name.
    pub service: String,
    /// Operation name.
    pub operation: String,
    /// Whether the host is the client or the server of the bundle.
    pub role: ServiceRole,
}

/// Inputs to manifest collection that are not part of the graph.
pub struct ManifestInfo<'a> {
    /// The system name.
    pub name: &'a str,
    /// The system version.
    pub version: &'a str,
    /// The backend preset.
    pub backend: BackendPreset,
    /// The effective arbitration policy.
    pub arbitration: Arbitration,
}

impl Manifest {
    /// Collects the manifest for a validated, resolved graph.
    pub fn collect(
        info: &ManifestInfo<'_>,
        graph: &HwGraph,
        services: &ServiceMap,
        interner: &Interner,
    ) -> Result<Self, BuildError> {
        let instances = graph
            .instances
            .values()
            .map(|inst| InstanceEntry {
                path: inst.path.to_string(),
                module: interner.resolve(graph.modules[inst.module].name).to_string(),
            })
            .collect();

        let modules = graph
            .modules
            .values()
            .map(|def| ModuleEntry {
                name: interner.resolve(def.name).to_string(),
                ports: def
                    .ports
                    .iter()
                    .map(|p| PortEntry {
                        name: interner.resolve(p.name).to_string(),
                        ty: graph.types.get(p.ty).to_string(),
                    })
                    .collect(),
                metadata: def.metadata.clone(),
            })
            .collect();

        let service_entries = graph
            .services
            .iter()
            .map(|decl| ServiceEntry {
                name: decl.name().to_string(),
                provider: decl.provider(),
                operations: decl
                    .operations()
                    .iter()
                    .map(|op| OperationEntry {
                        name: op.name.clone(),
                        bundle: op.bundle.to_string(),
                    })
                    .collect(),
            })
            .collect();

        let builtins = services
            .builtins
            .iter()
            .map(|b| BuiltinEntry {
                path: b.path.to_string(),
                service: b.service_name.clone(),
                tag: b.tag.clone(),
                clients: b
                    .clients
                    .iter()
                    .map(|c| ClientEntry {
                        path: c.path.to_string(),
                        operation: c.operation.clone(),
                    })
                    .collect(),
            })
            .collect();

        let host_endpoints = services
            .hosts
            .iter()
            .map(|h| HostEntry {
                path: h.path.to_string(),
                service: h.service.clone(),
                operation: h.operation.clone(),
                role: h.role,
            })
            .collect();

        Ok(Manifest {
            api_version: MANIFEST_VERSION,
            system: SystemInfo {
                name: info.name.to_string(),
                version: info.version.to_string(),
            },
            backend: info.backend,
            arbitration: info.arbitration,
            fingerprint: graph.fingerprint()?.to_hex(),
            instances,
            modules,
            services: service_entries,
            builtins,
            host_endpoints,
        })
    }

    /// Renders the manifest as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, BuildError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| InternalError::new(format!("cannot serialize manifest: {e}")).into())
    }

    /// Returns the module entry called `name`.
    pub fn module(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.name == name)
    }
}
