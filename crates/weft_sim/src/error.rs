//! Simulation error types.

use weft_common::InternalError;

/// Errors raised while building or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A signal depends on itself within one cycle.
    #[error("combinational loop through {signal} in {path}")]
    CombinationalLoop {
        /// Instance path where the loop was detected.
        path: String,
        /// The signal that was re-entered.
        signal: String,
    },

    /// The design instantiates a builtin the simulator has no model for.
    #[error("no simulation model for builtin '{tag}' at {path}")]
    UnsupportedBuiltin {
        /// Builtin path.
        path: String,
        /// Implementation tag.
        tag: String,
    },

    /// An expression the simulator cannot evaluate.
    #[error("unsupported: {reason}")]
    Unsupported {
        /// What was encountered.
        reason: String,
    },

    /// No top-level input with that name.
    #[error("unknown top-level input '{name}'")]
    UnknownInput {
        /// The name given.
        name: String,
    },

    /// No host endpoint at that path.
    #[error("no host endpoint at '{path}'")]
    UnknownEndpoint {
        /// The path given.
        path: String,
    },

    /// The endpoint's bundle has no such role.
    #[error("host endpoint '{path}' has no role '{role}'")]
    UnknownRole {
        /// Endpoint path.
        path: String,
        /// The role given.
        role: String,
    },

    /// The host tried to send on a role the hardware drives, or to receive
    /// on a role it drives itself.
    #[error("role '{role}' of '{path}' is not {expected} by the host")]
    WrongDirection {
        /// Endpoint path.
        path: String,
        /// The role given.
        role: String,
        /// `"sent"` or `"received"`.
        expected: &'static str,
    },

    /// No memory builtin at that path.
    #[error("no memory at '{path}'")]
    UnknownMemory {
        /// The path given.
        path: String,
    },

    /// A memory access outside the declared depth.
    #[error("address {address} out of range for '{path}' (depth {depth})")]
    AddressOutOfRange {
        /// Memory path.
        path: String,
        /// The address used.
        address: u64,
        /// Number of words.
        depth: u32,
    },

    /// A value that does not fit the expected type.
    #[error("value {value} does not fit {ty}: {reason}")]
    InvalidValue {
        /// The offending value, displayed.
        value: String,
        /// The expected type.
        ty: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Broken simulator invariant.
    #[error(transparent)]
    Internal(#[from] InternalError),
}
