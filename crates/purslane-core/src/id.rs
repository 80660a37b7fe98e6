//! Stable ID newtypes for action-graph entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, so a `NodeId` (arena
//! identity) can never be confused with a `SerialNumber` (dense position in
//! the finalized topological order) or an `AgentId`.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Arena identity of a node. Maps to a petgraph `NodeIndex<u32>` and stays
/// valid across pruning (the arena is a `StableGraph`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Dense serial number assigned once after pruning, over `[0, N)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SerialNumber(pub u32);

/// Execution agent (simulated core or verification component).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

/// Per-agent thread index, dense from 0 in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SerialNumber {
    /// The serial number as a `usize` index into serial-ordered tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// Bridge between NodeId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for NodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        NodeId(idx.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let node_id = NodeId::from(idx);
        assert_eq!(node_id.0, 42);

        let back: NodeIndex<u32> = node_id.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn display_prints_inner_value() {
        assert_eq!(format!("{}", NodeId(7)), "7");
        assert_eq!(format!("{}", SerialNumber(3)), "3");
        assert_eq!(format!("{}", AgentId(1)), "1");
        assert_eq!(format!("{}", ThreadId(0)), "0");
    }

    #[test]
    fn serial_numbers_order_by_value() {
        assert!(SerialNumber(1) < SerialNumber(2));
        assert_eq!(SerialNumber(5).index(), 5);
    }

    #[test]
    fn serde_is_transparent_enough_for_manifests() {
        let json = serde_json::to_string(&AgentId(2)).unwrap();
        assert_eq!(json, "2");
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AgentId(2));
    }
}
