//! WeftIR, the materialized hardware graph produced by `generate()`.
//!
//! This crate defines the types that describe a generated system: module
//! definitions with their expressions, channels, bundles, service instances
//! and builtin instances ([`ModuleDef`]), the instance tree addressed by
//! [`AppIdPath`], service declarations ([`ServiceDecl`]), and the interned
//! type database ([`TypeDb`]). Everything after generation (validation,
//! service resolution, backend lowering, simulation) reads a [`HwGraph`].

#![warn(missing_docs)]

pub mod appid;
pub mod arena;
pub mod expr;
pub mod graph;
pub mod ids;
pub mod metadata;
pub mod module;
pub mod service;
pub mod types;

pub use appid::{AppId, AppIdPath};
pub use arena::{Arena, ArenaId};
pub use expr::{Expr, Value};
pub use graph::{HwGraph, Instance};
pub use ids::{BundleId, ChannelId, ExprId, InstanceId, ModuleDefId, ServiceInstanceId, TypeId};
pub use metadata::Metadata;
pub use module::{
    BuiltinInstance, Bundle, BundleEnd, Channel, ChildInstance, Consumer, ModuleDef, PortDef,
    Producer, RoleSlot, ServiceInstance, ServiceRole,
};
pub use service::{address_width, MemoryShape, OperationDecl, ServiceDecl, ServiceProvider};
pub use types::{BundlePort, BundleType, ChannelDirection, Type, TypeDb};
