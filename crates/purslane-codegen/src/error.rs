//! Codegen error types.

use purslane_core::CoreError;

/// Errors raised while rendering a backend.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// A node's payload language does not match the backend.
    #[error("action '{name}' has no {expected} payload")]
    PayloadMismatch { name: String, expected: &'static str },

    /// A node reached a C backend without a thread placement.
    #[error("action '{name}' was not placed on a thread")]
    Unplaced { name: String },

    /// Graph integrity failure surfaced while preparing the render.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
