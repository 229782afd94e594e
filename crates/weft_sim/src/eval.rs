//! Combinational evaluation of one cycle.
//!
//! The [`Netlist`] is the flattened, immutable view of a compiled design:
//! where each instance is connected in its parent, and which model stands
//! behind each service instance. An [`Evaluator`] computes the settled value
//! of every signal for the current cycle on demand, memoizing as it goes. A
//! signal that is re-entered while being computed is a combinational loop.

use crate::error::SimError;
use crate::models::{HostModel, MemPort, MemoryModel};
use crate::value::SimValue;
use std::collections::HashMap;
use weft_common::InternalError;
use weft_ir::{
    BundleEnd, BundleId, ChannelDirection, ChannelId, Consumer, Expr, ExprId, HwGraph, InstanceId,
    ModuleDef, Producer, ServiceInstanceId, Type,
};

/// The model standing behind a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    /// Client `client` of a memory port.
    Memory {
        mem: usize,
        port: MemPort,
        client: usize,
    },
    /// A host endpoint.
    Host(usize),
}

/// The flattened design.
#[derive(Debug)]
pub(crate) struct Netlist {
    pub graph: HwGraph,
    /// Parent instance and position among its children, for every non-root
    /// instance.
    pub parents: HashMap<InstanceId, (InstanceId, usize)>,
    pub endpoints: HashMap<(InstanceId, ServiceInstanceId), Endpoint>,
    /// Bundles with at least one end realized by a service.
    pub service_bundles: Vec<(InstanceId, BundleId)>,
}

impl Netlist {
    pub fn module(&self, instance: InstanceId) -> &ModuleDef {
        self.graph.module_of(instance)
    }

    pub fn path(&self, instance: InstanceId) -> String {
        self.graph.instances[instance].path.to_string()
    }

    pub fn endpoint(
        &self,
        instance: InstanceId,
        sid: ServiceInstanceId,
    ) -> Result<Endpoint, SimError> {
        self.endpoints.get(&(instance, sid)).copied().ok_or_else(|| {
            InternalError::new(format!(
                "service instance #{} of {} has no endpoint",
                sid.as_raw(),
                self.path(instance)
            ))
            .into()
        })
    }

    /// Returns the source and sink ends of a bundle role.
    pub fn role_ends(&self, instance: InstanceId, bundle: BundleId, role: u32) -> (End, End) {
        let b = &self.module(instance).bundles[bundle];
        let slot = &b.roles[role as usize];
        let client = End::new(b.client, slot.client);
        let server = End::new(b.server, slot.server);
        match slot.direction {
            ChannelDirection::ToService => (client, server),
            ChannelDirection::FromService => (server, client),
        }
    }

    fn role_payload(&self, instance: InstanceId, bundle: BundleId, role: u32) -> &Type {
        let slot = &self.module(instance).bundles[bundle].roles[role as usize];
        self.graph.types.get(slot.payload)
    }
}

/// One end of a bundle role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum End {
    /// A channel of the module holding the bundle.
    Channel(ChannelId),
    /// A service instance.
    Service(ServiceInstanceId),
    /// Nothing attached.
    Open,
}

impl End {
    fn new(end: BundleEnd, channel: Option<ChannelId>) -> Self {
        match end {
            BundleEnd::Service(sid) => End::Service(sid),
            BundleEnd::Local => channel.map_or(End::Open, End::Channel),
            BundleEnd::Unbound => End::Open,
        }
    }
}

/// Mutable simulation state read during evaluation.
#[derive(Debug)]
pub(crate) struct SimState {
    pub inputs: Vec<SimValue>,
    pub mems: Vec<MemoryModel>,
    pub hosts: Vec<HostModel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Signal {
    Expr(ExprId),
    Valid(ChannelId),
    Data(ChannelId),
    Ready(ChannelId),
}

impl Signal {
    fn describe(self) -> String {
        match self {
            Signal::Expr(id) => format!("expression #{}", id.as_raw()),
            Signal::Valid(ch) => format!("valid of channel #{}", ch.as_raw()),
            Signal::Data(ch) => format!("data of channel #{}", ch.as_raw()),
            Signal::Ready(ch) => format!("ready of channel #{}", ch.as_raw()),
        }
    }
}

/// Settles the signals of one cycle.
pub(crate) struct Evaluator<'s> {
    net: &'s Netlist,
    state: &'s SimState,
    /// `None` marks a signal being computed.
    memo: HashMap<(InstanceId, Signal), Option<SimValue>>,
    grants: HashMap<(usize, MemPort), Option<Option<usize>>>,
}

impl<'s> Evaluator<'s> {
    pub fn new(net: &'s Netlist, state: &'s SimState) -> Self {
        Self {
            net,
            state,
            memo: HashMap::new(),
            grants: HashMap::new(),
        }
    }

    fn memoized(
        &mut self,
        instance: InstanceId,
        signal: Signal,
        compute: impl FnOnce(&mut Self) -> Result<SimValue, SimError>,
    ) -> Result<SimValue, SimError> {
        match self.memo.get(&(instance, signal)) {
            Some(Some(value)) => return Ok(value.clone()),
            Some(None) => {
                return Err(SimError::CombinationalLoop {
                    path: self.net.path(instance),
                    signal: signal.describe(),
                })
            }
            None => {}
        }
        self.memo.insert((instance, signal), None);
        let value = compute(self)?;
        self.memo.insert((instance, signal), Some(value.clone()));
        Ok(value)
    }

    /// Evaluates an expression of `instance`'s module.
    pub fn expr(&mut self, instance: InstanceId, id: ExprId) -> Result<SimValue, SimError> {
        self.memoized(instance, Signal::Expr(id), |ev| ev.compute_expr(instance, id))
    }

    fn compute_expr(&mut self, instance: InstanceId, id: ExprId) -> Result<SimValue, SimError> {
        let net = self.net;
        match &net.module(instance).exprs[id] {
            Expr::Const(v) => Ok(SimValue::Bits(*v)),
            Expr::Port(index) => self.port(instance, *index as usize),
            Expr::ChannelData(ch) => self.data(instance, *ch),
            Expr::ChannelValid(ch) => self.valid(instance, *ch).map(SimValue::from),
            Expr::ChannelReady(ch) => self.ready(instance, *ch).map(SimValue::from),
            Expr::Struct(fields) => fields
                .iter()
                .map(|f| self.expr(instance, *f))
                .collect::<Result<Vec<_>, _>>()
                .map(SimValue::Struct),
            Expr::Field { base, index } => {
                let value = self.expr(instance, *base)?;
                value.field(*index as usize).cloned().ok_or_else(|| {
                    InternalError::new(format!(
                        "field {index} of non-struct value {value} in {}",
                        net.path(instance)
                    ))
                    .into()
                })
            }
            Expr::And(a, b) => {
                if !self.expr(instance, *a)?.is_true() {
                    return Ok(false.into());
                }
                Ok(self.expr(instance, *b)?.is_true().into())
            }
            Expr::Or(a, b) => {
                if self.expr(instance, *a)?.is_true() {
                    return Ok(true.into());
                }
                Ok(self.expr(instance, *b)?.is_true().into())
            }
            Expr::Not(a) => Ok((!self.expr(instance, *a)?.is_true()).into()),
            Expr::BuiltinResult { builtin, index } => Err(SimError::Unsupported {
                reason: format!(
                    "result {index} of builtin #{builtin} in {}",
                    net.path(instance)
                ),
            }),
        }
    }

    /// Reads input port `index`: the parent's connection, or a top-level
    /// input at the root.
    fn port(&mut self, instance: InstanceId, index: usize) -> Result<SimValue, SimError> {
        let net = self.net;
        let Some(&(parent, position)) = net.parents.get(&instance) else {
            return self.state.inputs.get(index).cloned().ok_or_else(|| {
                InternalError::new(format!("top-level input #{index} does not exist")).into()
            });
        };
        let child = &net.module(parent).children[position];
        let connection = child.connections.get(index).copied().ok_or_else(|| {
            InternalError::new(format!("port #{index} of {} is not connected", net.path(instance)))
        })?;
        self.expr(parent, connection)
    }

    /// Returns whether a channel's producer offers data this cycle.
    pub fn valid(&mut self, instance: InstanceId, ch: ChannelId) -> Result<bool, SimError> {
        let value = self.memoized(instance, Signal::Valid(ch), |ev| {
            let producer = ev.net.module(instance).channels[ch].producer;
            let bit = match producer {
                Producer::Wrapped { valid, .. } => ev.expr(instance, valid)?.is_true(),
                Producer::Bundle { bundle, role } => ev.role_valid(instance, bundle, role)?,
            };
            Ok(bit.into())
        })?;
        Ok(value.is_true())
    }

    /// Returns a channel's payload. Only meaningful while it is valid.
    pub fn data(&mut self, instance: InstanceId, ch: ChannelId) -> Result<SimValue, SimError> {
        self.memoized(instance, Signal::Data(ch), |ev| {
            let producer = ev.net.module(instance).channels[ch].producer;
            match producer {
                Producer::Wrapped { data, .. } => ev.expr(instance, data),
                Producer::Bundle { bundle, role } => ev.role_data(instance, bundle, role),
            }
        })
    }

    /// Returns whether a channel's consumer accepts data this cycle.
    pub fn ready(&mut self, instance: InstanceId, ch: ChannelId) -> Result<bool, SimError> {
        let value = self.memoized(instance, Signal::Ready(ch), |ev| {
            let consumer = ev.net.module(instance).channels[ch].consumer;
            let bit = match consumer {
                Consumer::Unbound => true,
                Consumer::Unwrapped { ready } => ev.expr(instance, ready)?.is_true(),
                Consumer::Bundle { bundle, role } => ev.role_ready(instance, bundle, role)?,
            };
            Ok(bit.into())
        })?;
        Ok(value.is_true())
    }

    pub fn role_valid(
        &mut self,
        instance: InstanceId,
        bundle: BundleId,
        role: u32,
    ) -> Result<bool, SimError> {
        match self.net.role_ends(instance, bundle, role).0 {
            End::Channel(ch) => self.valid(instance, ch),
            End::Service(sid) => self.service_valid(instance, sid, role),
            End::Open => Ok(false),
        }
    }

    pub fn role_data(
        &mut self,
        instance: InstanceId,
        bundle: BundleId,
        role: u32,
    ) -> Result<SimValue, SimError> {
        let net = self.net;
        let payload = net.role_payload(instance, bundle, role);
        match net.role_ends(instance, bundle, role).0 {
            End::Channel(ch) => self.data(instance, ch),
            End::Service(sid) => self.service_data(instance, sid, role, payload),
            End::Open => Ok(SimValue::zero(payload)),
        }
    }

    pub fn role_ready(
        &mut self,
        instance: InstanceId,
        bundle: BundleId,
        role: u32,
    ) -> Result<bool, SimError> {
        match self.net.role_ends(instance, bundle, role).1 {
            End::Channel(ch) => self.ready(instance, ch),
            End::Service(sid) => self.service_ready(instance, sid),
            End::Open => Ok(true),
        }
    }

    fn service_valid(
        &mut self,
        instance: InstanceId,
        sid: ServiceInstanceId,
        role: u32,
    ) -> Result<bool, SimError> {
        match self.net.endpoint(instance, sid)? {
            Endpoint::Memory { mem, port, client } => {
                if self.in_reset(mem)? {
                    return Ok(false);
                }
                Ok(self.state.mems[mem].port(port).pending[client].is_some())
            }
            Endpoint::Host(host) => Ok(!self.state.hosts[host].roles[role as usize]
                .outbound
                .is_empty()),
        }
    }

    fn service_data(
        &mut self,
        instance: InstanceId,
        sid: ServiceInstanceId,
        role: u32,
        payload: &Type,
    ) -> Result<SimValue, SimError> {
        let state = self.state;
        let value = match self.net.endpoint(instance, sid)? {
            Endpoint::Memory { mem, port, client } => {
                state.mems[mem].port(port).pending[client].clone()
            }
            Endpoint::Host(host) => state.hosts[host].roles[role as usize].outbound.front().cloned(),
        };
        Ok(value.unwrap_or_else(|| SimValue::zero(payload)))
    }

    fn service_ready(
        &mut self,
        instance: InstanceId,
        sid: ServiceInstanceId,
    ) -> Result<bool, SimError> {
        match self.net.endpoint(instance, sid)? {
            Endpoint::Memory { mem, port, client } => Ok(self.grant(mem, port)? == Some(client)),
            Endpoint::Host(_) => Ok(true),
        }
    }

    /// Returns whether a memory's reset input is asserted.
    pub fn in_reset(&mut self, mem: usize) -> Result<bool, SimError> {
        let state = self.state;
        let model = &state.mems[mem];
        match model.reset {
            Some(reset) => Ok(self.expr(model.instance, reset)?.is_true()),
            None => Ok(false),
        }
    }

    /// Returns the client granted a memory port this cycle.
    ///
    /// A client requests the port when its request role is valid and its
    /// previous response has been taken.
    pub fn grant(&mut self, mem: usize, port: MemPort) -> Result<Option<usize>, SimError> {
        let state = self.state;
        let model = &state.mems[mem];
        match self.grants.get(&(mem, port)) {
            Some(Some(granted)) => return Ok(*granted),
            Some(None) => {
                return Err(SimError::CombinationalLoop {
                    path: model.path.clone(),
                    signal: format!("{} port arbitration", port.name()),
                })
            }
            None => {}
        }
        self.grants.insert((mem, port), None);

        let granted = if self.in_reset(mem)? {
            None
        } else {
            let ports = model.port(port);
            let mut requests = Vec::with_capacity(ports.clients.len());
            for (&(instance, sid), pending) in ports.clients.iter().zip(&ports.pending) {
                requests.push(pending.is_none() && self.request_valid(instance, sid)?);
            }
            ports.policy.select(&requests)
        };
        self.grants.insert((mem, port), Some(granted));
        Ok(granted)
    }

    fn request_valid(
        &mut self,
        instance: InstanceId,
        sid: ServiceInstanceId,
    ) -> Result<bool, SimError> {
        let net = self.net;
        let def = net.module(instance);
        let bundle = def.services[sid].bundle;
        let role = request_role(def, bundle).ok_or_else(|| {
            InternalError::new(format!(
                "memory client in {} has no request role",
                net.path(instance)
            ))
        })?;
        self.role_valid(instance, bundle, role)
    }
}

/// Returns the position of the first role flowing to the service.
pub(crate) fn request_role(def: &ModuleDef, bundle: BundleId) -> Option<u32> {
    def.bundles[bundle]
        .roles
        .iter()
        .position(|r| r.direction == ChannelDirection::ToService)
        .map(|i| i as u32)
}
