//! Service declarations.
//!
//! A [`ServiceDecl`] names a capability and the bundle type of each of its
//! operations. Builtin services are realized by hardware instantiated inside
//! the design (e.g. an `sv_mem` memory); host services are realized by the
//! software side of the deployment and need host-channel support from the
//! backend.

use crate::types::{BundleType, ChannelDirection, Type};
use serde::{Deserialize, Serialize};

/// Who provides the implementation of a service.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProvider {
    /// A builtin instance somewhere above the caller in the instance tree.
    Builtin,
    /// The host, through a host channel endpoint.
    Host,
}

/// One operation of a service and the bundle type every instance shares.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct OperationDecl {
    /// The operation name, e.g. `read`.
    pub name: String,
    /// The bundle type all instances of this operation use.
    pub bundle: BundleType,
}

/// Shape of a random-access memory service.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct MemoryShape {
    /// Type of one memory word.
    pub data: Type,
    /// Number of words.
    pub depth: u32,
}

impl MemoryShape {
    /// Width of the address field: `max(1, ceil(log2(depth)))`.
    pub fn address_width(&self) -> u32 {
        address_width(self.depth)
    }
}

/// Returns the address width needed for `depth` words, at least one bit.
pub fn address_width(depth: u32) -> u32 {
    if depth <= 2 {
        1
    } else {
        32 - (depth - 1).leading_zeros()
    }
}

/// A declared service.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ServiceDecl {
    name: String,
    provider: ServiceProvider,
    operations: Vec<OperationDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory: Option<MemoryShape>,
}

impl ServiceDecl {
    /// Declares a random-access memory of `depth` words of `data`.
    ///
    /// The service has two operations:
    /// - `read`: `address` (to service, address bits) and `data` (from
    ///   service, one word);
    /// - `write`: `req` (to service, `{address, data}`) and `ack` (from
    ///   service, zero bits).
    pub fn random_access_memory(name: impl Into<String>, data: Type, depth: u32) -> Self {
        let addr = Type::Bits(address_width(depth));
        let read = BundleType::new(vec![
            ("address", ChannelDirection::ToService, addr.clone()),
            ("data", ChannelDirection::FromService, data.clone()),
        ]);
        let write = BundleType::new(vec![
            (
                "req",
                ChannelDirection::ToService,
                Type::struct_of(&[("address", addr), ("data", data.clone())]),
            ),
            ("ack", ChannelDirection::FromService, Type::Bits(0)),
        ]);
        Self {
            name: name.into(),
            provider: ServiceProvider::Builtin,
            operations: vec![
                OperationDecl {
                    name: "read".to_string(),
                    bundle: read,
                },
                OperationDecl {
                    name: "write".to_string(),
                    bundle: write,
                },
            ],
            memory: Some(MemoryShape { data, depth }),
        }
    }

    /// Declares a host-provided service with no operations yet.
    pub fn host(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: ServiceProvider::Host,
            operations: Vec::new(),
            memory: None,
        }
    }

    /// Adds an operation with an explicit bundle type.
    pub fn with_operation(mut self, name: impl Into<String>, bundle: BundleType) -> Self {
        self.operations.push(OperationDecl {
            name: name.into(),
            bundle,
        });
        self
    }

    /// Adds an operation with the same bundle type as `other`.
    pub fn with_operation_from(self, name: impl Into<String>, other: &OperationDecl) -> Self {
        self.with_operation(name, other.bundle.clone())
    }

    /// Returns the service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns who provides this service.
    pub fn provider(&self) -> ServiceProvider {
        self.provider
    }

    /// Returns the operations in declaration order.
    pub fn operations(&self) -> &[OperationDecl] {
        &self.operations
    }

    /// Looks up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&OperationDecl> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Returns the memory shape for services declared with
    /// [`random_access_memory`](Self::random_access_memory).
    pub fn memory(&self) -> Option<&MemoryShape> {
        self.memory.as_ref()
    }
}
