//! Internal error type for broken framework invariants.

/// Result alias for operations that can only fail because of a bug in Weft.
///
/// User mistakes in a design (bad bundle roles, duplicate AppIDs, …) are
/// reported through `weft_build::BuildError` and diagnostics instead.
pub type WeftResult<T> = Result<T, InternalError>;

/// An internal error: a framework invariant did not hold.
#[derive(Debug, thiserror::Error)]
#[error("internal weft error: {message}")]
pub struct InternalError {
    /// Description of the broken invariant.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
