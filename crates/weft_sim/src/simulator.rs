//! The cycle loop.
//!
//! Each call to [`Simulator::step`] settles every signal of the current cycle,
//! lets the handshake monitor observe every channel, completes the transfers
//! whose `valid` and `ready` are both high, and then clocks the builtin and
//! host models with those transfers.

use crate::error::SimError;
use crate::eval::{Endpoint, End, Evaluator, Netlist, SimState};
use crate::models::{host_sends, HostModel, HostRole, MemPort, MemoryModel, PortState};
use crate::monitor::{HandshakeMonitor, Violation};
use crate::value::SimValue;
use std::collections::{HashMap, VecDeque};
use weft_build::{policy_for, ArbitrationPolicy, CompiledDesign};
use weft_common::{Interner, InternalError};
use weft_config::Arbitration;
use weft_ir::{BundleEnd, ChannelDirection};

/// Implementation tag of the builtin memory.
pub const SV_MEM: &str = "sv_mem";

/// Summary of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimResult {
    /// Cycles simulated so far.
    pub cycles: u64,
    /// Transfers completed during the run.
    pub transfers: u64,
    /// Handshake violations recorded so far.
    pub violations: usize,
}

/// A state change caused by a completed transfer, applied after the cycle
/// has settled.
#[derive(Debug)]
enum Effect {
    /// A memory response was taken.
    Retire { mem: usize, port: MemPort, client: usize },
    /// A memory request was taken.
    Accept {
        mem: usize,
        port: MemPort,
        client: usize,
        request: SimValue,
    },
    /// The hardware took the host's oldest outbound value.
    Pop { host: usize, role: usize },
    /// The hardware delivered a value to the host.
    Push {
        host: usize,
        role: usize,
        value: SimValue,
    },
}

/// A cycle-based simulator for a compiled design.
#[derive(Debug)]
pub struct Simulator {
    name: String,
    net: Netlist,
    state: SimState,
    input_names: Vec<String>,
    monitor: HandshakeMonitor,
    arbitration: Arbitration,
    cycle: u64,
}

impl Simulator {
    /// Flattens `design` into a simulator at cycle 0, with every top-level
    /// input and memory word zero.
    pub fn new(design: &CompiledDesign, interner: &Interner) -> Result<Self, SimError> {
        Self::with_arbitration(design, interner, || policy_for(design.arbitration))
    }

    /// Like [`Simulator::new`], with every memory port arbitrated by a
    /// policy from `policy`, called once per port. Pass
    /// [`System::arbitration_policy`](weft_build::System::arbitration_policy)
    /// to use the backend's own policies.
    pub fn with_arbitration(
        design: &CompiledDesign,
        interner: &Interner,
        mut policy: impl FnMut() -> Box<dyn ArbitrationPolicy>,
    ) -> Result<Self, SimError> {
        let graph = design.graph.clone();

        let mut parents = HashMap::new();
        for (id, inst) in graph.instances.iter() {
            for (position, child) in inst.children.iter().enumerate() {
                parents.insert(*child, (id, position));
            }
        }

        let mut endpoints = HashMap::new();
        let mut mems = Vec::new();
        for builtin in &design.services.builtins {
            let path = builtin.path.to_string();
            if builtin.tag != SV_MEM {
                return Err(SimError::UnsupportedBuiltin {
                    path,
                    tag: builtin.tag.clone(),
                });
            }
            let shape = graph.service(builtin.service).memory().ok_or_else(|| {
                InternalError::new(format!("service '{}' is not a memory", builtin.service_name))
            })?;
            let reset = graph.module_of(builtin.instance).builtins[builtin.builtin as usize]
                .inputs
                .get(1)
                .copied();
            let mut model = MemoryModel {
                path,
                data: shape.data.clone(),
                words: vec![SimValue::zero(&shape.data); shape.depth as usize],
                ports: [
                    PortState::new(policy()),
                    PortState::new(policy()),
                ],
                instance: builtin.instance,
                reset,
            };
            for client in &builtin.clients {
                let port = MemPort::for_operation(&client.operation).ok_or_else(|| {
                    SimError::Unsupported {
                        reason: format!("operation '{}' of {}", client.operation, model.path),
                    }
                })?;
                let slot = model
                    .port_mut(port)
                    .add_client((client.instance, client.service_instance));
                endpoints.insert(
                    (client.instance, client.service_instance),
                    Endpoint::Memory {
                        mem: mems.len(),
                        port,
                        client: slot,
                    },
                );
            }
            mems.push(model);
        }

        let mut hosts = Vec::new();
        for (index, host) in design.services.hosts.iter().enumerate() {
            let def = graph.module_of(host.instance);
            let bundle = &def.bundles[def.services[host.service_instance].bundle];
            let roles = bundle
                .roles
                .iter()
                .map(|slot| HostRole {
                    name: interner.resolve(slot.name).to_string(),
                    payload: graph.types.get(slot.payload).clone(),
                    host_sends: host_sends(host.role, slot.direction == ChannelDirection::ToService),
                    outbound: VecDeque::new(),
                    inbound: VecDeque::new(),
                })
                .collect();
            endpoints.insert((host.instance, host.service_instance), Endpoint::Host(index));
            hosts.push(HostModel {
                path: host.path.to_string(),
                roles,
            });
        }

        let mut service_bundles = Vec::new();
        for (id, inst) in graph.instances.iter() {
            for (bundle_id, bundle) in graph.modules[inst.module].bundles.iter() {
                let serviced = |end: BundleEnd| matches!(end, BundleEnd::Service(_));
                if serviced(bundle.client) || serviced(bundle.server) {
                    service_bundles.push((id, bundle_id));
                }
            }
        }

        let root = graph.module_of(graph.root);
        let inputs = root
            .ports
            .iter()
            .map(|p| SimValue::zero(graph.types.get(p.ty)))
            .collect();
        let input_names = root
            .ports
            .iter()
            .map(|p| interner.resolve(p.name).to_string())
            .collect();

        tracing::info!(
            design = %design.name,
            memories = mems.len(),
            hosts = hosts.len(),
            arbitration = %design.arbitration,
            "simulator ready"
        );
        Ok(Self {
            name: design.name.clone(),
            net: Netlist {
                graph,
                parents,
                endpoints,
                service_bundles,
            },
            state: SimState {
                inputs,
                mems,
                hosts,
            },
            input_names,
            monitor: HandshakeMonitor::new(),
            arbitration: design.arbitration,
            cycle: 0,
        })
    }

    /// Simulates one clock cycle. Returns the number of transfers on
    /// bundles served by a builtin or host model.
    pub fn step(&mut self) -> Result<usize, SimError> {
        let mut eval = Evaluator::new(&self.net, &self.state);

        for (id, inst) in self.net.graph.instances.iter() {
            let path = inst.path.to_string();
            for ch in self.net.graph.modules[inst.module].channels.ids() {
                let valid = eval.valid(id, ch)?;
                let ready = eval.ready(id, ch)?;
                let data = if valid { Some(eval.data(id, ch)?) } else { None };
                self.monitor
                    .observe(self.cycle, (id, ch), &path, valid, ready, data.as_ref());
            }
        }

        let mut effects = Vec::new();
        let mut transfers = 0;
        for &(id, bundle) in &self.net.service_bundles {
            let roles = self.net.module(id).bundles[bundle].roles.len() as u32;
            for role in 0..roles {
                if !eval.role_valid(id, bundle, role)? || !eval.role_ready(id, bundle, role)? {
                    continue;
                }
                transfers += 1;
                let value = eval.role_data(id, bundle, role)?;
                let (source, sink) = self.net.role_ends(id, bundle, role);
                tracing::debug!(
                    cycle = self.cycle,
                    instance = %self.net.path(id),
                    role,
                    value = %value,
                    "transfer"
                );
                if let End::Service(sid) = source {
                    effects.push(match self.net.endpoint(id, sid)? {
                        Endpoint::Memory { mem, port, client } => Effect::Retire { mem, port, client },
                        Endpoint::Host(host) => Effect::Pop {
                            host,
                            role: role as usize,
                        },
                    });
                }
                if let End::Service(sid) = sink {
                    effects.push(match self.net.endpoint(id, sid)? {
                        Endpoint::Memory { mem, port, client } => {
                            self.state.mems[mem].check(port, &value)?;
                            Effect::Accept {
                                mem,
                                port,
                                client,
                                request: value,
                            }
                        }
                        Endpoint::Host(host) => Effect::Push {
                            host,
                            role: role as usize,
                            value,
                        },
                    });
                }
            }
        }

        let mut resets = Vec::new();
        for mem in 0..self.state.mems.len() {
            if eval.in_reset(mem)? {
                resets.push(mem);
            }
        }
        drop(eval);

        for effect in effects {
            self.apply(effect)?;
        }
        for mem in resets {
            self.state.mems[mem].reset();
        }
        self.cycle += 1;
        Ok(transfers)
    }

    fn apply(&mut self, effect: Effect) -> Result<(), SimError> {
        match effect {
            Effect::Retire { mem, port, client } => {
                self.state.mems[mem].port_mut(port).pending[client] = None;
            }
            Effect::Accept {
                mem,
                port,
                client,
                request,
            } => self.state.mems[mem].accept(port, client, request)?,
            Effect::Pop { host, role } => {
                self.state.hosts[host].roles[role].outbound.pop_front();
            }
            Effect::Push { host, role, value } => {
                self.state.hosts[host].roles[role].inbound.push_back(value);
            }
        }
        Ok(())
    }

    /// Simulates `cycles` clock cycles.
    pub fn run(&mut self, cycles: u64) -> Result<SimResult, SimError> {
        let mut transfers = 0;
        for _ in 0..cycles {
            transfers += self.step()? as u64;
        }
        Ok(self.result(transfers))
    }

    /// Steps until `done` holds or `max_cycles` have elapsed. Returns whether
    /// `done` was reached.
    pub fn run_until(
        &mut self,
        max_cycles: u64,
        mut done: impl FnMut(&Simulator) -> bool,
    ) -> Result<bool, SimError> {
        for _ in 0..max_cycles {
            if done(&*self) {
                return Ok(true);
            }
            self.step()?;
        }
        Ok(done(&*self))
    }

    fn result(&self, transfers: u64) -> SimResult {
        SimResult {
            cycles: self.cycle,
            transfers,
            violations: self.monitor.violations().len(),
        }
    }

    /// Drives a top-level input from the next cycle on.
    pub fn set_input(&mut self, name: &str, value: SimValue) -> Result<(), SimError> {
        let index = self
            .input_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| SimError::UnknownInput {
                name: name.to_string(),
            })?;
        let root = self.net.module(self.net.graph.root);
        let ty = self.net.graph.types.get(root.ports[index].ty);
        if !value.conforms(ty) {
            return Err(SimError::InvalidValue {
                value: value.to_string(),
                ty: ty.to_string(),
                reason: format!("input '{name}'"),
            });
        }
        self.state.inputs[index] = value;
        Ok(())
    }

    /// Queues a value for the host to send on `role` of the endpoint at
    /// `path`.
    pub fn host_send(&mut self, path: &str, role: &str, value: SimValue) -> Result<(), SimError> {
        let host = self.host_mut(path)?;
        let index = host.role_index(role)?;
        let slot = &mut host.roles[index];
        if !slot.host_sends {
            return Err(SimError::WrongDirection {
                path: path.to_string(),
                role: role.to_string(),
                expected: "sent",
            });
        }
        if !value.conforms(&slot.payload) {
            return Err(SimError::InvalidValue {
                value: value.to_string(),
                ty: slot.payload.to_string(),
                reason: format!("role '{role}' of '{path}'"),
            });
        }
        slot.outbound.push_back(value);
        Ok(())
    }

    /// Takes the oldest value the host received on `role`.
    pub fn host_recv(&mut self, path: &str, role: &str) -> Result<Option<SimValue>, SimError> {
        let host = self.host_mut(path)?;
        let index = host.role_index(role)?;
        let slot = &mut host.roles[index];
        if slot.host_sends {
            return Err(SimError::WrongDirection {
                path: path.to_string(),
                role: role.to_string(),
                expected: "received",
            });
        }
        Ok(slot.inbound.pop_front())
    }

    /// Returns the number of values waiting in the host's receive queue for
    /// `role`.
    pub fn host_pending(&self, path: &str, role: &str) -> Result<usize, SimError> {
        let host = self.host(path)?;
        let index = host.role_index(role)?;
        Ok(host.roles[index].inbound.len())
    }

    fn host(&self, path: &str) -> Result<&HostModel, SimError> {
        self.state
            .hosts
            .iter()
            .find(|h| h.path == path)
            .ok_or_else(|| SimError::UnknownEndpoint {
                path: path.to_string(),
            })
    }

    fn host_mut(&mut self, path: &str) -> Result<&mut HostModel, SimError> {
        self.state
            .hosts
            .iter_mut()
            .find(|h| h.path == path)
            .ok_or_else(|| SimError::UnknownEndpoint {
                path: path.to_string(),
            })
    }

    /// Returns the words of the memory at `path`.
    pub fn memory(&self, path: &str) -> Result<&[SimValue], SimError> {
        Ok(&self.mem(path)?.words)
    }

    /// Overwrites one word of the memory at `path`.
    pub fn poke_memory(
        &mut self,
        path: &str,
        address: u64,
        value: SimValue,
    ) -> Result<(), SimError> {
        let index = self.mem_index(path)?;
        self.state.mems[index].poke(address, value)
    }

    fn mem(&self, path: &str) -> Result<&MemoryModel, SimError> {
        Ok(&self.state.mems[self.mem_index(path)?])
    }

    fn mem_index(&self, path: &str) -> Result<usize, SimError> {
        self.state
            .mems
            .iter()
            .position(|m| m.path == path)
            .ok_or_else(|| SimError::UnknownMemory {
                path: path.to_string(),
            })
    }

    /// Returns the paths of all memories.
    pub fn memory_paths(&self) -> impl Iterator<Item = &str> {
        self.state.mems.iter().map(|m| m.path.as_str())
    }

    /// Returns the paths of all host endpoints.
    pub fn host_paths(&self) -> impl Iterator<Item = &str> {
        self.state.hosts.iter().map(|h| h.path.as_str())
    }

    /// Returns the names of the top-level inputs.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Returns every handshake violation recorded so far.
    pub fn violations(&self) -> &[Violation] {
        self.monitor.violations()
    }

    /// Returns the number of cycles simulated.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Returns the arbitration policy used by the memory ports.
    pub fn arbitration(&self) -> Arbitration {
        self.arbitration
    }

    /// Returns the simulated system's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs a compiled design for the configured number of cycles.
pub fn simulate(
    design: &CompiledDesign,
    interner: &Interner,
    config: &weft_config::SimConfig,
) -> Result<(Simulator, SimResult), SimError> {
    let mut sim = Simulator::new(design, interner)?;
    let result = sim.run(config.max_cycles)?;
    Ok((sim, result))
}
