//! Action graph vertices.
//!
//! An [`ActionNode`] is either a *target* node (one per leaf action, carries a
//! [`Payload`]) or a structural boundary node (scope init/final) that only
//! exists until [`Graph::remove_non_target_nodes`](crate::graph::Graph::remove_non_target_nodes)
//! contracts it away.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::{AgentId, SerialNumber, ThreadId};

/// Code carried by a target node. Exactly one language per node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Native C source, spliced into a generated body function.
    Native(String),
    /// SystemVerilog source, spliced into a generated `ExecBody` task.
    Verification(String),
}

impl Payload {
    pub fn native(&self) -> Option<&str> {
        match self {
            Payload::Native(src) => Some(src),
            Payload::Verification(_) => None,
        }
    }

    pub fn verification(&self) -> Option<&str> {
        match self {
            Payload::Verification(src) => Some(src),
            Payload::Native(_) => None,
        }
    }
}

/// Where the thread assigner put a node: its thread on the node's agent and
/// its index within that thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub thread: ThreadId,
    pub position: u32,
}

/// A vertex of the action graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionNode {
    /// Unique, human-readable name (already deduplicated by the resolver).
    pub name: String,
    /// Dense serial number; `None` until the graph is numbered.
    pub sn: Option<SerialNumber>,
    /// Agent the payload runs on; may be fixed by the DSL or assigned later.
    pub agent: Option<AgentId>,
    /// Payload for target nodes, `None` for structural boundary nodes.
    pub payload: Option<Payload>,
    /// Memoized transitive predecessors, keyed by serial number.
    #[serde(skip)]
    pub(crate) ancestors: BTreeSet<SerialNumber>,
    /// Thread placement, stamped by the thread assigner.
    #[serde(skip)]
    pub(crate) placement: Option<Placement>,
}

impl ActionNode {
    /// Creates a target node carrying `payload`.
    pub fn target(name: impl Into<String>, payload: Payload) -> Self {
        ActionNode {
            name: name.into(),
            sn: None,
            agent: None,
            payload: Some(payload),
            ancestors: BTreeSet::new(),
            placement: None,
        }
    }

    /// Creates a structural (non-target) boundary node.
    pub fn boundary(name: impl Into<String>) -> Self {
        ActionNode {
            name: name.into(),
            sn: None,
            agent: None,
            payload: None,
            ancestors: BTreeSet::new(),
            placement: None,
        }
    }

    pub fn with_agent(mut self, agent: Option<AgentId>) -> Self {
        self.agent = agent;
        self
    }

    /// Returns `true` for leaf-action nodes that survive pruning.
    pub fn is_target(&self) -> bool {
        self.payload.is_some()
    }

    /// Serial-number-keyed transitive predecessor set, valid after
    /// [`Graph::update_ancestors`](crate::graph::Graph::update_ancestors).
    pub fn ancestors(&self) -> &BTreeSet<SerialNumber> {
        &self.ancestors
    }

    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    /// Name usable as a C or SystemVerilog identifier fragment.
    ///
    /// Names that already are identifiers are returned as-is. Anything else
    /// is escaped and suffixed with `_x<sn>`, which no resolved name (always
    /// ending in `_<digits>`) can produce, so distinct numbered nodes never
    /// share an identifier.
    pub fn ident(&self) -> String {
        let is_ident_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
        let clean = self.name.chars().all(is_ident_char)
            && self.name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_');
        if clean {
            return self.name.clone();
        }

        let mut ident = String::with_capacity(self.name.len() + 8);
        if !self.name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            ident.push_str("act_");
        }
        ident.extend(self.name.chars().map(|c| if is_ident_char(c) { c } else { '_' }));
        if let Some(sn) = self.sn {
            ident.push_str(&format!("_x{sn}"));
        }
        ident
    }
}
