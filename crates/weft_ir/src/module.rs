//! Generated module definitions.
//!
//! A [`ModuleDef`] is the result of running one module's construction
//! function: its ports, the expressions it built, the channels it wrapped or
//! unwrapped, the bundles it packed, and the sub-modules, service instances
//! and builtins it declared. A definition is generated once and shared by
//! every instance of the module.

use crate::appid::AppId;
use crate::arena::Arena;
use crate::expr::Expr;
use crate::ids::{BundleId, ChannelId, ExprId, ModuleDefId, ServiceInstanceId, TypeId};
use crate::metadata::Metadata;
use crate::types::ChannelDirection;
use serde::{Deserialize, Serialize};
use weft_common::Ident;

/// A module input port.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PortDef {
    /// The port name.
    pub name: Ident,
    /// The port type (`Clock` or `Bits`).
    pub ty: TypeId,
}

/// What drives a channel's `data` and `valid`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Producer {
    /// Created by `wrap`: data and valid are expressions of this module.
    Wrapped {
        /// The payload expression.
        data: ExprId,
        /// The valid expression.
        valid: ExprId,
    },
    /// Handed out by `pack` or `unpack`: driven by the other end of the
    /// bundle role.
    Bundle {
        /// The bundle.
        bundle: BundleId,
        /// Role position in the bundle.
        role: u32,
    },
}

/// What drives a channel's `ready`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Consumer {
    /// Nobody consumes the channel; `ready` is tied high.
    Unbound,
    /// Consumed by `unwrap`: ready is an expression of this module.
    Unwrapped {
        /// The ready expression.
        ready: ExprId,
    },
    /// Given to `pack` or `unpack`: forwarded to the other end of the role.
    Bundle {
        /// The bundle.
        bundle: BundleId,
        /// Role position in the bundle.
        role: u32,
    },
}

/// A single-producer, single-consumer ready/valid link.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Channel {
    /// The payload type.
    pub payload: TypeId,
    /// The producing side.
    pub producer: Producer,
    /// The consuming side.
    pub consumer: Consumer,
}

/// How one end of a bundle is attached.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum BundleEnd {
    /// Not attached yet.
    Unbound,
    /// Attached by `pack` (client end) or `unpack` (server end) in this module.
    Local,
    /// Attached to a service instance of this module.
    Service(ServiceInstanceId),
}

impl BundleEnd {
    /// Returns `true` unless the end is [`BundleEnd::Unbound`].
    pub fn is_bound(self) -> bool {
        !matches!(self, BundleEnd::Unbound)
    }
}

/// One role of a bundle with the local channels attached to either end.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RoleSlot {
    /// The role name.
    pub name: Ident,
    /// Which end drives the role.
    pub direction: ChannelDirection,
    /// The payload type.
    pub payload: TypeId,
    /// Channel attached at the client end, when the client is local.
    pub client: Option<ChannelId>,
    /// Channel attached at the server end, when the server is local.
    pub server: Option<ChannelId>,
}

/// A packed group of channels: one side of a request/response protocol.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Bundle {
    /// The interned bundle type.
    pub ty: TypeId,
    /// Roles in the bundle type's declaration order.
    pub roles: Vec<RoleSlot>,
    /// The client (requesting) end.
    pub client: BundleEnd,
    /// The server (servicing) end.
    pub server: BundleEnd,
}

impl Bundle {
    /// Looks up a role by name.
    pub fn role(&self, name: Ident) -> Option<(u32, &RoleSlot)> {
        self.roles
            .iter()
            .enumerate()
            .find(|(_, r)| r.name == name)
            .map(|(i, r)| (i as u32, r))
    }

    /// Returns `true` if both ends are attached.
    pub fn is_serviced(&self) -> bool {
        self.client.is_bound() && self.server.is_bound()
    }
}

/// Which end of its bundle a service instance occupies.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    /// Created by `call`: the service serves a locally packed bundle.
    Server,
    /// Created by `request`: the service originates the bundle.
    Client,
}

/// A call or request site binding a bundle to a service operation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// The AppID in the enclosing module's scope.
    pub appid: AppId,
    /// Position of the service in [`HwGraph::services`](crate::HwGraph::services).
    pub service: u32,
    /// Position of the operation in the service declaration.
    pub operation: u32,
    /// The bundle this instance is attached to.
    pub bundle: BundleId,
    /// Which end of the bundle this instance occupies.
    pub role: ServiceRole,
}

/// A service's concrete hardware realization placed in this module.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BuiltinInstance {
    /// The AppID in the enclosing module's scope.
    pub appid: AppId,
    /// Position of the service in [`HwGraph::services`](crate::HwGraph::services).
    pub service: u32,
    /// The implementation tag, e.g. `sv_mem`.
    pub tag: Ident,
    /// Types of the values the builtin produces.
    pub results: Vec<TypeId>,
    /// Driving inputs (clock, reset).
    pub inputs: Vec<ExprId>,
}

/// A sub-module instantiation.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ChildInstance {
    /// The AppID in the enclosing module's scope.
    pub appid: AppId,
    /// The instantiated module definition.
    pub module: ModuleDefId,
    /// One expression per child port, in the child's port order.
    pub connections: Vec<ExprId>,
}

/// A generated module definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleDef {
    /// This definition's ID in the graph.
    pub id: ModuleDefId,
    /// The module name.
    pub name: Ident,
    /// Input ports in declaration order.
    pub ports: Vec<PortDef>,
    /// Attached metadata, if any.
    pub metadata: Option<Metadata>,
    /// Expressions built by the construction function.
    pub exprs: Arena<ExprId, Expr>,
    /// Channels created by wrap, pack, or unpack.
    pub channels: Arena<ChannelId, Channel>,
    /// Bundles created by pack or request.
    pub bundles: Arena<BundleId, Bundle>,
    /// Call and request sites.
    pub services: Arena<ServiceInstanceId, ServiceInstance>,
    /// Builtin service realizations.
    pub builtins: Vec<BuiltinInstance>,
    /// Sub-module instantiations, in declaration order.
    pub children: Vec<ChildInstance>,
}

impl ModuleDef {
    /// Creates an empty definition.
    pub fn new(
        id: ModuleDefId,
        name: Ident,
        ports: Vec<PortDef>,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            id,
            name,
            ports,
            metadata,
            exprs: Arena::new(),
            channels: Arena::new(),
            bundles: Arena::new(),
            services: Arena::new(),
            builtins: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Returns the position of the port called `name`.
    pub fn port_index(&self, name: Ident) -> Option<usize> {
        self.ports.iter().position(|p| p.name == name)
    }

    /// Attaches a consumer to a channel. Returns `false`, leaving the channel
    /// untouched, if it already has one.
    pub fn bind_consumer(&mut self, channel: ChannelId, consumer: Consumer) -> bool {
        let slot = &mut self.channels[channel].consumer;
        if *slot != Consumer::Unbound {
            return false;
        }
        *slot = consumer;
        true
    }

    /// Returns every AppID declared in this module's scope: children, then
    /// service instances, then builtins.
    pub fn appids(&self) -> Vec<&AppId> {
        self.children
            .iter()
            .map(|c| &c.appid)
            .chain(self.services.values().map(|s| &s.appid))
            .chain(self.builtins.iter().map(|b| &b.appid))
            .collect()
    }

    /// Iterates over channels nobody consumes.
    pub fn dangling_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels
            .iter()
            .filter(|(_, ch)| ch.consumer == Consumer::Unbound)
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModuleDef {
        let mut def = ModuleDef::new(
            ModuleDefId::from_raw(0),
            Ident::from_raw(0),
            vec![PortDef {
                name: Ident::from_raw(1),
                ty: TypeId::from_raw(0),
            }],
            None,
        );
        let data = def.exprs.alloc(Expr::Const(2));
        let valid = def.exprs.alloc(Expr::Const(1));
        def.channels.alloc(Channel {
            payload: TypeId::from_raw(1),
            producer: Producer::Wrapped { data, valid },
            consumer: Consumer::Unbound,
        });
        def
    }

    #[test]
    fn port_lookup() {
        let def = sample();
        assert_eq!(def.port_index(Ident::from_raw(1)), Some(0));
        assert_eq!(def.port_index(Ident::from_raw(7)), None);
    }

    #[test]
    fn consumer_binds_once() {
        let mut def = sample();
        let ch = ChannelId::from_raw(0);
        let ready = def.exprs.alloc(Expr::Const(1));
        assert!(def.bind_consumer(ch, Consumer::Unwrapped { ready }));
        assert!(!def.bind_consumer(
            ch,
            Consumer::Bundle {
                bundle: BundleId::from_raw(0),
                role: 0
            }
        ));
        assert_eq!(def.channels[ch].consumer, Consumer::Unwrapped { ready });
    }

    #[test]
    fn dangling_until_consumed() {
        let mut def = sample();
        assert_eq!(def.dangling_channels().count(), 1);
        let ready = def.exprs.alloc(Expr::Const(1));
        def.bind_consumer(ChannelId::from_raw(0), Consumer::Unwrapped { ready });
        assert_eq!(def.dangling_channels().count(), 0);
    }

    #[test]
    fn appids_cover_whole_scope() {
        let mut def = sample();
        def.children.push(ChildInstance {
            appid: AppId::new("dummy"),
            module: ModuleDefId::from_raw(1),
            connections: Vec::new(),
        });
        def.builtins.push(BuiltinInstance {
            appid: AppId::new("mem"),
            service: 0,
            tag: Ident::from_raw(3),
            results: Vec::new(),
            inputs: Vec::new(),
        });
        let names: Vec<_> = def.appids().iter().map(|a| a.to_string()).collect();
        assert_eq!(names, vec!["dummy", "mem"]);
    }

    #[test]
    fn bundle_serviced_needs_both_ends() {
        let mut bundle = Bundle {
            ty: TypeId::from_raw(2),
            roles: vec![RoleSlot {
                name: Ident::from_raw(4),
                direction: ChannelDirection::ToService,
                payload: TypeId::from_raw(1),
                client: Some(ChannelId::from_raw(0)),
                server: None,
            }],
            client: BundleEnd::Local,
            server: BundleEnd::Unbound,
        };
        assert!(!bundle.is_serviced());
        bundle.server = BundleEnd::Service(ServiceInstanceId::from_raw(0));
        assert!(bundle.is_serviced());
        assert_eq!(bundle.role(Ident::from_raw(4)).map(|(i, _)| i), Some(0));
    }
}
