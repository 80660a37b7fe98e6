//! Core error types for purslane-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! integrity failures of the action graph and its manifest.

use std::path::PathBuf;

use crate::id::{AgentId, NodeId, SerialNumber};
use thiserror::Error;

/// Core errors produced by the purslane-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id was not found in the arena (removed or never added).
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// The dependency structure contains a cycle.
    #[error("dependency cycle detected in action graph")]
    CycleDetected,

    /// A node needs a serial number but the graph was not numbered yet.
    #[error("node '{name}' has no serial number; assign serial numbers first")]
    MissingSerial { name: String },

    /// A node reached a stage that needs an agent but has none.
    #[error("node '{name}' has no agent id; assign agents first")]
    MissingAgent { name: String },

    /// A node was pinned to an agent that does not exist.
    #[error("node '{name}' uses agent {agent} but only {num_agents} agent(s) exist")]
    AgentOutOfRange {
        name: String,
        agent: AgentId,
        num_agents: u32,
    },

    /// Agents must be assigned but the graph has no agents.
    #[error("cannot assign agents: agent count is zero")]
    NoAgents,

    /// A manifest refers to a serial number it does not define.
    #[error("manifest action {sn} refers to unknown predecessor {pred}")]
    UnknownPredecessor { sn: SerialNumber, pred: SerialNumber },

    /// A manifest failed structural validation.
    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    /// A manifest file could not be read.
    #[error("cannot read manifest {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Manifest (de)serialization failure.
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
