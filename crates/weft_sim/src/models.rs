//! Behavioral models for what the hardware graph leaves abstract: builtin
//! memories and host endpoints.

use crate::error::SimError;
use crate::value::SimValue;
use std::collections::VecDeque;
use weft_build::ArbitrationPolicy;
use weft_ir::{ExprId, InstanceId, ServiceInstanceId, ServiceRole, Type};

/// The two ports of an `sv_mem` memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemPort {
    /// Serves `read` operations.
    Read,
    /// Serves `write` operations.
    Write,
}

impl MemPort {
    /// Returns the port serving `operation`, if any.
    pub fn for_operation(operation: &str) -> Option<Self> {
        match operation {
            "read" => Some(MemPort::Read),
            "write" => Some(MemPort::Write),
            _ => None,
        }
    }

    /// Returns the operation name.
    pub fn name(self) -> &'static str {
        match self {
            MemPort::Read => "read",
            MemPort::Write => "write",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            MemPort::Read => 0,
            MemPort::Write => 1,
        }
    }
}

/// One arbitrated memory port.
#[derive(Debug)]
pub(crate) struct PortState {
    /// Service instances using this port, in arbitration order.
    pub clients: Vec<(InstanceId, ServiceInstanceId)>,
    /// Registered response per client: read data or a write acknowledgement.
    pub pending: Vec<Option<SimValue>>,
    pub policy: Box<dyn ArbitrationPolicy>,
}

impl PortState {
    pub fn new(policy: Box<dyn ArbitrationPolicy>) -> Self {
        Self {
            clients: Vec::new(),
            pending: Vec::new(),
            policy,
        }
    }

    pub fn add_client(&mut self, client: (InstanceId, ServiceInstanceId)) -> usize {
        self.clients.push(client);
        self.pending.push(None);
        self.clients.len() - 1
    }
}

/// An `sv_mem` random-access memory.
///
/// Each port accepts at most one request per cycle, granted by the
/// arbitration policy among clients whose previous response has been
/// consumed. Responses are registered: read data and write acknowledgements
/// become valid the cycle after the request was accepted and stay valid
/// until taken.
#[derive(Debug)]
pub(crate) struct MemoryModel {
    pub path: String,
    pub data: Type,
    pub words: Vec<SimValue>,
    pub ports: [PortState; 2],
    /// Instance holding the builtin and its reset input, if connected.
    pub instance: InstanceId,
    pub reset: Option<ExprId>,
}

impl MemoryModel {
    pub fn port(&self, port: MemPort) -> &PortState {
        &self.ports[port.index()]
    }

    pub fn port_mut(&mut self, port: MemPort) -> &mut PortState {
        &mut self.ports[port.index()]
    }

    pub fn depth(&self) -> u32 {
        self.words.len() as u32
    }

    fn slot(&self, address: u64) -> Result<usize, SimError> {
        if address < self.words.len() as u64 {
            Ok(address as usize)
        } else {
            Err(SimError::AddressOutOfRange {
                path: self.path.clone(),
                address,
                depth: self.depth(),
            })
        }
    }

    fn malformed(&self, port: MemPort) -> SimError {
        weft_common::InternalError::new(format!("malformed {port:?} request to {}", self.path))
            .into()
    }

    /// Checks a request before it is accepted.
    pub fn check(&self, port: MemPort, request: &SimValue) -> Result<(), SimError> {
        match (port, request) {
            (MemPort::Read, SimValue::Bits(address)) => self.slot(*address).map(|_| ()),
            (MemPort::Write, SimValue::Struct(fields)) => match fields.as_slice() {
                [SimValue::Bits(address), _] => self.slot(*address).map(|_| ()),
                _ => Err(self.malformed(port)),
            },
            _ => Err(self.malformed(port)),
        }
    }

    /// Performs an accepted request and registers its response.
    pub fn accept(&mut self, port: MemPort, client: usize, request: SimValue) -> Result<(), SimError> {
        let response = match (port, &request) {
            (MemPort::Read, SimValue::Bits(address)) => self.read(*address)?.clone(),
            (MemPort::Write, SimValue::Struct(fields)) => match fields.as_slice() {
                [SimValue::Bits(address), data] => {
                    let slot = self.slot(*address)?;
                    self.words[slot] = data.clone();
                    SimValue::Bits(0)
                }
                _ => return Err(self.malformed(port)),
            },
            _ => return Err(self.malformed(port)),
        };
        let state = self.port_mut(port);
        state.pending[client] = Some(response);
        state.policy.commit(client);
        Ok(())
    }

    /// Drops every pending response.
    pub fn reset(&mut self) {
        for port in &mut self.ports {
            port.pending.iter_mut().for_each(|p| *p = None);
        }
    }

    /// Reads a word.
    pub fn read(&self, address: u64) -> Result<&SimValue, SimError> {
        Ok(&self.words[self.slot(address)?])
    }

    /// Writes a word directly, bypassing the ports.
    pub fn poke(&mut self, address: u64, value: SimValue) -> Result<(), SimError> {
        if !value.conforms(&self.data) {
            return Err(SimError::InvalidValue {
                value: value.to_string(),
                ty: self.data.to_string(),
                reason: "does not match the memory word type".to_string(),
            });
        }
        let slot = self.slot(address)?;
        self.words[slot] = value;
        Ok(())
    }
}

/// One role of a host endpoint's bundle.
#[derive(Debug)]
pub(crate) struct HostRole {
    pub name: String,
    pub payload: Type,
    /// `true` if the host drives this role into the hardware.
    pub host_sends: bool,
    /// Values waiting to be sent, oldest first.
    pub outbound: VecDeque<SimValue>,
    /// Values received from the hardware, oldest first.
    pub inbound: VecDeque<SimValue>,
}

/// A host endpoint: queues standing in for host software.
///
/// The host is always ready to receive, and offers the oldest queued value
/// on each role it drives until the hardware takes it.
#[derive(Debug)]
pub(crate) struct HostModel {
    pub path: String,
    pub roles: Vec<HostRole>,
}

impl HostModel {
    pub fn role_index(&self, role: &str) -> Result<usize, SimError> {
        self.roles
            .iter()
            .position(|r| r.name == role)
            .ok_or_else(|| SimError::UnknownRole {
                path: self.path.clone(),
                role: role.to_string(),
            })
    }
}

/// Returns whether the host drives a role, given which end of the bundle it
/// occupies and whether the role flows toward the service.
pub(crate) fn host_sends(role: ServiceRole, to_service: bool) -> bool {
    match role {
        ServiceRole::Client => to_service,
        ServiceRole::Server => !to_service,
    }
}
