//! Structural hardware generation for Weft systems.
//!
//! Modules are declared in a [`Library`] as data records with a construction
//! function. A [`System`] runs the pipeline over them:
//!
//! 1. [`generate`](System::generate) runs every construction function once,
//!    children before parents, through a [`ModuleBuilder`] that checks channel
//!    and bundle contracts as they are declared, and materializes the instance
//!    tree addressed by AppID paths;
//! 2. [`compile`](System::compile) validates the finished graph, resolves
//!    every service instance to a builtin or a host endpoint, collects the
//!    manifest and lowers through the selected [`Backend`];
//! 3. [`package`](System::package) writes the artifacts into the output
//!    directory.
//!
//! # Usage
//!
//! ```ignore
//! let mut system = System::new("ESIMem", library, "Top", BackendPreset::Cosim, "build/cosim");
//! system.build()?;
//! ```

#![warn(missing_docs)]

pub mod arbitration;
pub mod backend;
pub mod builder;
pub mod compile;
pub mod context;
pub mod errors;
pub mod generate;
pub mod library;
pub mod manifest;
pub mod package;
pub mod resolve;
pub mod system;
pub mod validate;

pub use arbitration::{policy_for, ArbitrationPolicy, FixedPriority, RoundRobin};
pub use backend::{backend_for, Artifact, Backend, Capabilities, CosimBackend, XrtBackend};
pub use builder::{BundleHandle, ChannelHandle, ModuleBuilder, RoleChannels};
pub use compile::CompiledDesign;
pub use errors::{BuildError, ErrorKind};
pub use library::{Library, ModuleDecl};
pub use manifest::Manifest;
pub use package::{PackageReport, PackagedFile};
pub use resolve::{BuiltinImpl, ClientRef, HostEndpoint, Resolution, ServiceMap};
pub use system::{Stage, System};
