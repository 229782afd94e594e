//! Opaque ID newtypes for graph entities.
//!
//! Module-local IDs ([`ExprId`], [`ChannelId`], [`BundleId`],
//! [`ServiceInstanceId`]) index into the arenas of one [`ModuleDef`](crate::ModuleDef);
//! [`ModuleDefId`], [`InstanceId`] and [`TypeId`] are graph-wide.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_id!(
    /// A generated module definition (one per declared module, however many
    /// times it is instantiated).
    ModuleDefId
);

define_id!(
    /// A node of the materialized instance tree.
    InstanceId
);

define_id!(
    /// An expression inside a module definition.
    ExprId
);

define_id!(
    /// A channel inside a module definition.
    ChannelId
);

define_id!(
    /// A bundle inside a module definition.
    BundleId
);

define_id!(
    /// A service instance (call or request site) inside a module definition.
    ServiceInstanceId
);

define_id!(
    /// An interned type in the [`TypeDb`](crate::types::TypeDb).
    TypeId
);
