//! Scope frames and the edge wiring done when a scope closes.

use std::collections::HashSet;

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use purslane_core::{ActionNode, Graph, NodeId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DslError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// A leaf action: one target node, init and final are the same node.
    Atomic,
    /// A compound action; children are chained like a sequence.
    Compound,
    Sequence,
    /// Independent branches; a dependency between branches is an error.
    Parallel,
    /// Parallel topology without the independence check.
    Schedule,
}

impl ScopeKind {
    /// Base name used for anonymous scopes.
    pub fn base_name(self) -> &'static str {
        match self {
            ScopeKind::Atomic => "act",
            ScopeKind::Compound => "compound",
            ScopeKind::Sequence => "seq",
            ScopeKind::Parallel => "para",
            ScopeKind::Schedule => "sched",
        }
    }
}

/// Boundary nodes of an immediately nested child scope.
#[derive(Debug, Clone)]
pub(crate) struct ChildSpan {
    pub name: String,
    pub init: NodeId,
    pub fin: NodeId,
}

/// Per-scope bookkeeping while the scope is open.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    /// Immediately nested children in declaration order.
    pub children: Vec<ChildSpan>,
    /// Every node created inside the scope, nested boundaries included.
    pub members: Vec<NodeId>,
}

impl Frame {
    /// Records a closed child (with all nodes it created) in this frame.
    pub fn adopt(&mut self, child: ChildSpan, nodes: impl IntoIterator<Item = NodeId>) {
        self.members.extend(nodes);
        self.children.push(child);
    }
}

/// Wires the boundary edges of a scope being closed and returns its final
/// node. Runs once per scope.
pub(crate) fn close(
    graph: &mut Graph,
    kind: ScopeKind,
    name: &str,
    init: NodeId,
    frame: &Frame,
) -> Result<NodeId, DslError> {
    if kind == ScopeKind::Parallel {
        check_independent(graph, name, frame)?;
    }

    let fin = graph.add_node(ActionNode::boundary(format!("{name}_final")));
    match kind {
        ScopeKind::Atomic | ScopeKind::Compound | ScopeKind::Sequence => {
            let mut prev = init;
            for child in &frame.children {
                graph.add_dependency(prev, child.init)?;
                prev = child.fin;
            }
            graph.add_dependency(prev, fin)?;
        }
        ScopeKind::Parallel | ScopeKind::Schedule => {
            for child in &frame.children {
                graph.add_dependency(init, child.init)?;
                graph.add_dependency(child.fin, fin)?;
            }
            if frame.children.is_empty() {
                graph.add_dependency(init, fin)?;
            }
        }
    }
    debug!(?kind, %name, children = frame.children.len(), "closed scope");
    Ok(fin)
}

/// Rejects any dependency between branches: no branch's init node may reach
/// another branch's final node. Only edges between nodes created inside the
/// scope are considered, so nested dependencies are caught as well.
fn check_independent(graph: &Graph, name: &str, frame: &Frame) -> Result<(), DslError> {
    if frame.children.len() < 2 {
        return Ok(());
    }

    let members: HashSet<NodeId> = frame.members.iter().copied().collect();
    let mut sub: DiGraphMap<NodeId, ()> = DiGraphMap::new();
    for &node in &frame.members {
        sub.add_node(node);
        for succ in graph.successors(node) {
            if members.contains(&succ) {
                sub.add_edge(node, succ, ());
            }
        }
    }

    for from in &frame.children {
        for to in &frame.children {
            if from.init == to.init {
                continue;
            }
            if has_path_connecting(&sub, from.init, to.fin, None) {
                return Err(DslError::ParallelDependency {
                    scope: name.to_string(),
                    from: from.name.clone(),
                    to: to.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use purslane_core::Payload;

    fn leaf(graph: &mut Graph, frame: &mut Frame, name: &str) -> NodeId {
        let id = graph.add_node(ActionNode::target(name, Payload::Native(String::new())));
        frame.adopt(
            ChildSpan {
                name: name.to_string(),
                init: id,
                fin: id,
            },
            [id],
        );
        id
    }

    #[test]
    fn sequence_chains_children() {
        let mut graph = Graph::new(1);
        let init = graph.add_node(ActionNode::boundary("seq_0_init"));
        let mut frame = Frame::default();
        let a = leaf(&mut graph, &mut frame, "a");
        let b = leaf(&mut graph, &mut frame, "b");

        let fin = close(&mut graph, ScopeKind::Sequence, "seq_0", init, &frame).unwrap();

        assert_eq!(graph.predecessors(a), vec![init]);
        assert_eq!(graph.predecessors(b), vec![a]);
        assert_eq!(graph.predecessors(fin), vec![b]);
        assert_eq!(graph.node(fin).unwrap().name, "seq_0_final");
    }

    #[test]
    fn empty_scopes_link_init_to_final() {
        for kind in [ScopeKind::Sequence, ScopeKind::Parallel, ScopeKind::Schedule] {
            let mut graph = Graph::new(1);
            let init = graph.add_node(ActionNode::boundary("s_init"));
            let fin = close(&mut graph, kind, "s", init, &Frame::default()).unwrap();
            assert_eq!(graph.predecessors(fin), vec![init]);
        }
    }

    #[test]
    fn parallel_fans_out_and_in() {
        let mut graph = Graph::new(2);
        let init = graph.add_node(ActionNode::boundary("para_0_init"));
        let mut frame = Frame::default();
        let a = leaf(&mut graph, &mut frame, "a");
        let b = leaf(&mut graph, &mut frame, "b");

        let fin = close(&mut graph, ScopeKind::Parallel, "para_0", init, &frame).unwrap();

        assert_eq!(graph.successors(init), vec![a, b]);
        assert_eq!(graph.predecessors(fin), vec![a, b]);
        assert!(graph.successors(a).iter().all(|&s| s == fin));
    }

    #[test]
    fn parallel_rejects_branch_dependency() {
        let mut graph = Graph::new(2);
        let init = graph.add_node(ActionNode::boundary("para_0_init"));
        let mut frame = Frame::default();
        let a = leaf(&mut graph, &mut frame, "a");
        let b = leaf(&mut graph, &mut frame, "b");
        graph.add_dependency(a, b).unwrap();

        match close(&mut graph, ScopeKind::Parallel, "para_0", init, &frame) {
            Err(DslError::ParallelDependency { scope, from, to }) => {
                assert_eq!(scope, "para_0");
                assert_eq!(from, "a");
                assert_eq!(to, "b");
            }
            other => panic!("expected ParallelDependency, got {:?}", other),
        }
    }

    #[test]
    fn schedule_allows_branch_dependency() {
        let mut graph = Graph::new(2);
        let init = graph.add_node(ActionNode::boundary("sched_0_init"));
        let mut frame = Frame::default();
        let a = leaf(&mut graph, &mut frame, "a");
        let b = leaf(&mut graph, &mut frame, "b");
        graph.add_dependency(a, b).unwrap();

        assert!(close(&mut graph, ScopeKind::Schedule, "sched_0", init, &frame).is_ok());
    }
}
