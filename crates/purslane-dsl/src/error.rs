//! DSL error types.
//!
//! Every variant is fatal: a generation run either succeeds completely or
//! stops before any artifact is written.

use purslane_codegen::error::CodegenError;
use purslane_core::{AgentId, CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DslError {
    /// A child action pinned to a different agent than its enclosing
    /// compound action.
    #[error("agent id of '{action}' ({found}) must follow its parent ({inherited})")]
    AgentMismatch {
        action: String,
        inherited: AgentId,
        found: AgentId,
    },

    /// A branch of a parallel scope depends on a sibling branch.
    #[error("dependence across branches of parallel '{scope}': '{from}' precedes '{to}'")]
    ParallelDependency {
        scope: String,
        from: String,
        to: String,
    },

    /// The random walk found no transition path to the required state.
    #[error("no transition path from state {from} to state {to}")]
    UnreachableState { from: String, to: String },

    /// A factory table has no constructor for the requested action kind.
    #[error("no action registered for kind '{kind}'")]
    UnknownActionKind { kind: String },

    /// `select` needs at least one alternative.
    #[error("select called with no actions")]
    EmptySelect,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    /// Writing an artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
