//! Hardware types and the interning type database.
//!
//! Payloads of channels, module ports, and builtin results are all described
//! by [`Type`]. Structurally identical types are interned to the same
//! [`TypeId`] by [`TypeDb`], so checking that a packed channel matches its
//! bundle role is an ID comparison.

use crate::ids::TypeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A hardware type.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Type {
    /// A clock signal. Only valid as a module port.
    Clock,
    /// An unsigned bit vector of the given width. `Bits(0)` carries no data
    /// and is used for pure acknowledgements.
    Bits(u32),
    /// A record with named, ordered fields.
    Struct(Vec<(String, Type)>),
    /// A ready/valid channel carrying the inner type.
    Channel(Box<Type>),
    /// A bundle of channels with fixed roles and directions.
    Bundle(BundleType),
}

impl Type {
    /// The single-bit type used for `valid`, `ready`, and boolean logic.
    pub fn bool() -> Self {
        Type::Bits(1)
    }

    /// Builds a struct type from borrowed field names.
    pub fn struct_of(fields: &[(&str, Type)]) -> Self {
        Type::Struct(
            fields
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.clone()))
                .collect(),
        )
    }

    /// Returns the number of bits needed to carry a value of this type, or
    /// `None` for types with no flat representation (channels and bundles).
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Clock => Some(1),
            Type::Bits(w) => Some(*w),
            Type::Struct(fields) => fields
                .iter()
                .try_fold(0u32, |acc, (_, ty)| Some(acc + ty.bit_width()?)),
            Type::Channel(_) | Type::Bundle(_) => None,
        }
    }

    /// Looks up a struct field by name, returning its position and type.
    pub fn field(&self, name: &str) -> Option<(usize, &Type)> {
        match self {
            Type::Struct(fields) => fields
                .iter()
                .enumerate()
                .find(|(_, (n, _))| n == name)
                .map(|(i, (_, ty))| (i, ty)),
            _ => None,
        }
    }

    /// Returns `true` for types that may travel on a channel.
    pub fn is_payload(&self) -> bool {
        matches!(self, Type::Bits(_) | Type::Struct(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Clock => write!(f, "clock"),
            Type::Bits(w) => write!(f, "bits<{w}>"),
            Type::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            Type::Channel(inner) => write!(f, "channel<{inner}>"),
            Type::Bundle(bundle) => write!(f, "{bundle}"),
        }
    }
}

/// Which way a bundle role's data flows relative to the service.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelDirection {
    /// Driven by the client, consumed by the service (requests).
    ToService,
    /// Driven by the service, consumed by the client (responses).
    FromService,
}

impl ChannelDirection {
    /// Returns the opposite direction.
    pub fn flip(self) -> Self {
        match self {
            ChannelDirection::ToService => ChannelDirection::FromService,
            ChannelDirection::FromService => ChannelDirection::ToService,
        }
    }
}

impl fmt::Display for ChannelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelDirection::ToService => write!(f, "to"),
            ChannelDirection::FromService => write!(f, "from"),
        }
    }
}

/// One named role of a bundle.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BundlePort {
    /// The role name, e.g. `address` or `req`.
    pub name: String,
    /// Which side drives this role.
    pub direction: ChannelDirection,
    /// The payload carried by this role's channel.
    pub payload: Type,
}

/// The schema of a bundle: its roles in declaration order.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BundleType {
    /// The roles, in declaration order.
    pub ports: Vec<BundlePort>,
}

impl BundleType {
    /// Creates a bundle type from `(role, direction, payload)` triples.
    pub fn new(ports: Vec<(&str, ChannelDirection, Type)>) -> Self {
        Self {
            ports: ports
                .into_iter()
                .map(|(name, direction, payload)| BundlePort {
                    name: name.to_string(),
                    direction,
                    payload,
                })
                .collect(),
        }
    }

    /// Looks up a role by name, returning its position and definition.
    pub fn port(&self, name: &str) -> Option<(usize, &BundlePort)> {
        self.ports.iter().enumerate().find(|(_, p)| p.name == name)
    }

    /// Iterates over the roles flowing in `direction`.
    pub fn ports_in(&self, direction: ChannelDirection) -> impl Iterator<Item = &BundlePort> {
        self.ports.iter().filter(move |p| p.direction == direction)
    }
}

impl fmt::Display for BundleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bundle{{")?;
        for (i, port) in self.ports.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {} {}", port.name, port.direction, port.payload)?;
        }
        write!(f, "}}")
    }
}

/// Interning database for [`Type`]s.
///
/// Interning is by structural equality; types are few, so lookup is a linear
/// scan, and IDs are assigned in first-seen order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeDb {
    types: Vec<Type>,
}

impl TypeDb {
    /// Creates an empty type database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a type, returning the existing ID if an equal type is known.
    pub fn intern(&mut self, ty: &Type) -> TypeId {
        if let Some(pos) = self.types.iter().position(|t| t == ty) {
            return TypeId::from_raw(pos as u32);
        }
        let id = TypeId::from_raw(self.types.len() as u32);
        self.types.push(ty.clone());
        id
    }

    /// Returns the ID of an already-interned type.
    pub fn lookup(&self, ty: &Type) -> Option<TypeId> {
        self.types
            .iter()
            .position(|t| t == ty)
            .map(|pos| TypeId::from_raw(pos as u32))
    }

    /// Returns the type for an ID.
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.as_raw() as usize]
    }

    /// Returns the number of interned types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no types have been interned.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
