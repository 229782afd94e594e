//! Shared foundational types used across the Weft hardware-generation framework.
//!
//! This crate provides interned identifiers for module, port, and role names,
//! content hashing for graph fingerprints and packaged artifacts, and the
//! internal error type used when a framework invariant is broken.

#![warn(missing_docs)]

pub mod hash;
pub mod ident;
pub mod result;

pub use hash::ContentHash;
pub use ident::{Ident, Interner};
pub use result::{InternalError, WeftResult};
