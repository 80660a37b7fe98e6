//! Per-agent thread partitioning.
//!
//! [`assign_threads`] splits each agent's nodes into strictly ordered
//! threads. A node joins an existing thread only when that thread's current
//! last node is one of its transitive predecessors, so program order inside a
//! thread never adds a constraint the graph does not already have; only
//! cross-thread edges need synchronization in emitted code.

use rand::RngCore;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::graph::Graph;
use crate::id::{AgentId, NodeId, ThreadId};
use crate::node::Placement;

/// A strictly ordered sequence of one agent's nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub id: ThreadId,
    pub nodes: Vec<NodeId>,
}

/// The threads of one agent, in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Core {
    pub agent: AgentId,
    pub threads: Vec<Thread>,
}

impl Core {
    pub fn node_count(&self) -> usize {
        self.threads.iter().map(|t| t.nodes.len()).sum()
    }
}

/// Partitions a finalized graph into per-agent threads and stamps each
/// node's [`Placement`].
///
/// Nodes are visited in randomized topological order so unrelated actions
/// land in a different order within a thread from seed to seed. Threads are
/// scanned in creation order, which keeps the thread count per agent minimal
/// for the visit order chosen.
pub fn assign_threads(graph: &mut Graph, rng: &mut dyn RngCore) -> Result<Vec<Core>, CoreError> {
    if graph.nodes_by_serial().count() != graph.node_count() {
        let name = graph
            .node_ids()
            .filter_map(|id| graph.node(id))
            .find(|n| n.sn.is_none())
            .map(|n| n.name.clone())
            .unwrap_or_default();
        return Err(CoreError::MissingSerial { name });
    }
    graph.update_ancestors()?;

    let num_agents = graph.num_agents();
    let mut cores: Vec<Core> = (0..num_agents)
        .map(|agent| Core {
            agent: AgentId(agent),
            threads: Vec::new(),
        })
        .collect();

    info!(nodes = graph.node_count(), "assigning actions to threads");
    let order: Vec<NodeId> = graph.random_topo_iter(rng).collect();

    for id in order {
        let node = graph.node(id).ok_or(CoreError::NodeNotFound { id })?;
        let agent = node.agent.ok_or_else(|| CoreError::MissingAgent {
            name: node.name.clone(),
        })?;
        let core = cores
            .get_mut(agent.0 as usize)
            .ok_or_else(|| CoreError::AgentOutOfRange {
                name: node.name.clone(),
                agent,
                num_agents,
            })?;

        let existing = core.threads.iter_mut().find(|thread| {
            thread
                .nodes
                .last()
                .map_or(false, |&last| graph.is_ancestor(last, id))
        });

        let placement = match existing {
            Some(thread) => {
                thread.nodes.push(id);
                Placement {
                    thread: thread.id,
                    position: (thread.nodes.len() - 1) as u32,
                }
            }
            None => {
                let thread_id = ThreadId(core.threads.len() as u32);
                core.threads.push(Thread {
                    id: thread_id,
                    nodes: vec![id],
                });
                Placement {
                    thread: thread_id,
                    position: 0,
                }
            }
        };
        debug!(
            name = %node.name,
            agent = agent.0,
            thread = placement.thread.0,
            position = placement.position,
            "placed action"
        );

        if let Some(node) = graph.node_mut(id) {
            node.placement = Some(placement);
        }
    }

    Ok(cores)
}
