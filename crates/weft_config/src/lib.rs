//! Parsing and validation of `weft.toml` system configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`ProjectConfig`]: the system name and design, named targets that pick a
//! backend preset (and optionally an arbitration policy), build output
//! settings, and simulator limits.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_target, ResolvedTarget};
pub use types::*;
