//! Graph: the node arena plus the finalization passes.
//!
//! [`Graph`] owns every [`ActionNode`] in a petgraph `StableGraph` so that
//! [`NodeId`]s handed out during construction stay valid while structural
//! nodes are contracted away. Edges point from predecessor to successor and
//! carry no weight.
//!
//! # Finalization pipeline
//!
//! [`Graph::finalize`] runs, in order:
//! 1. [`assert_acyclic`](Graph::assert_acyclic)
//! 2. [`remove_non_target_nodes`](Graph::remove_non_target_nodes) -- contract
//!    scope boundaries, keeping every transitive constraint
//! 3. [`assign_serial_numbers`](Graph::assign_serial_numbers) -- dense, in
//!    topological order
//! 4. [`transitive_reduction`](Graph::transitive_reduction)
//! 5. [`assign_agents`](Graph::assign_agents)

use std::collections::BTreeSet;

use indexmap::IndexSet;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::{Directed, Direction};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::id::{AgentId, NodeId, SerialNumber};
use crate::node::ActionNode;
use crate::topo::TopoIter;

/// How [`Graph::assign_agents`] distributes unpinned nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignPolicy {
    /// Walk in topological order, handing out ids from a reshuffled
    /// permutation per wave so concurrently-ready nodes land on distinct
    /// agents.
    #[default]
    Spread,
    /// Independent uniform draw per node.
    Random,
}

/// The action dependency graph.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: StableGraph<ActionNode, (), Directed, u32>,
    num_agents: u32,
    headers: IndexSet<String>,
    decls: IndexSet<String>,
    /// `by_serial[sn]` is the node with serial `sn`; empty until numbered.
    by_serial: Vec<NodeIndex<u32>>,
}

impl Graph {
    pub fn new(num_agents: u32) -> Self {
        Graph {
            nodes: StableGraph::new(),
            num_agents,
            headers: IndexSet::new(),
            decls: IndexSet::new(),
            by_serial: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn num_agents(&self) -> u32 {
        self.num_agents
    }

    pub fn node_count(&self) -> usize {
        self.nodes.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.edge_count()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_node(id.into())
    }

    pub fn node(&self, id: NodeId) -> Option<&ActionNode> {
        self.nodes.node_weight(id.into())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ActionNode> {
        self.nodes.node_weight_mut(id.into())
    }

    /// All live node ids in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.node_indices().map(NodeId::from)
    }

    /// Header lines contributed by actions, deduplicated in first-seen order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(String::as_str)
    }

    /// Declaration lines contributed by actions, deduplicated in first-seen order.
    pub fn decls(&self) -> impl Iterator<Item = &str> {
        self.decls.iter().map(String::as_str)
    }

    /// Direct predecessors, ordered by serial number (creation order before
    /// numbering).
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct successors, ordered like [`predecessors`](Self::predecessors).
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: NodeId, dir: Direction) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .nodes
            .neighbors_directed(id.into(), dir)
            .map(NodeId::from)
            .collect();
        out.sort_by_key(|n| (self.serial_of(*n), *n));
        out.dedup();
        out
    }

    fn serial_of(&self, id: NodeId) -> Option<SerialNumber> {
        self.node(id).and_then(|n| n.sn)
    }

    /// Looks up the node holding serial number `sn`.
    pub fn by_serial(&self, sn: SerialNumber) -> Option<NodeId> {
        self.by_serial.get(sn.index()).copied().map(NodeId::from)
    }

    /// Nodes in serial order. Empty until serial numbers are assigned.
    pub fn nodes_by_serial(&self) -> impl Iterator<Item = (NodeId, &ActionNode)> {
        self.by_serial
            .iter()
            .map(move |&idx| (NodeId::from(idx), &self.nodes[idx]))
    }

    /// Transitive predecessors of `id` by serial number. Valid after
    /// [`update_ancestors`](Self::update_ancestors).
    pub fn ancestors(&self, id: NodeId) -> Option<&BTreeSet<SerialNumber>> {
        self.node(id).map(|n| &n.ancestors)
    }

    /// Returns `true` if `ancestor` transitively precedes `id`. Valid after
    /// [`update_ancestors`](Self::update_ancestors).
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        match (self.serial_of(ancestor), self.node(id)) {
            (Some(sn), Some(node)) => node.ancestors.contains(&sn),
            _ => false,
        }
    }

    pub(crate) fn inner(&self) -> &StableGraph<ActionNode, (), Directed, u32> {
        &self.nodes
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub fn add_node(&mut self, node: ActionNode) -> NodeId {
        NodeId::from(self.nodes.add_node(node))
    }

    /// Adds the edge `pred → succ`. Duplicate edges are ignored.
    pub fn add_dependency(&mut self, pred: NodeId, succ: NodeId) -> Result<(), CoreError> {
        if !self.contains(pred) {
            return Err(CoreError::NodeNotFound { id: pred });
        }
        if !self.contains(succ) {
            return Err(CoreError::NodeNotFound { id: succ });
        }
        if pred == succ {
            return Err(CoreError::CycleDetected);
        }
        let (p, s) = (pred.into(), succ.into());
        if !self.nodes.contains_edge(p, s) {
            self.nodes.add_edge(p, s, ());
        }
        Ok(())
    }

    pub fn add_header(&mut self, header: impl Into<String>) {
        self.headers.insert(header.into());
    }

    pub fn add_decl(&mut self, decl: impl Into<String>) {
        self.decls.insert(decl.into());
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Deterministic topological order: ready nodes are taken first-in,
    /// first-out, seeded in creation order.
    pub fn topo_iter(&self) -> TopoIter<'_> {
        TopoIter::new(self, None)
    }

    /// Topological order picking uniformly among ready nodes.
    pub fn random_topo_iter<'a>(&'a self, rng: &'a mut dyn RngCore) -> TopoIter<'a> {
        TopoIter::new(self, Some(rng))
    }

    /// Fails with [`CoreError::CycleDetected`] if any dependency cycle exists.
    pub fn assert_acyclic(&self) -> Result<(), CoreError> {
        if petgraph::algo::is_cyclic_directed(&self.nodes) {
            return Err(CoreError::CycleDetected);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Finalization passes
    // -----------------------------------------------------------------------

    /// Contracts every structural node: each predecessor is linked directly to
    /// each successor, then the node is deleted.
    pub fn remove_non_target_nodes(&mut self) {
        let structural: Vec<NodeIndex<u32>> = self
            .nodes
            .node_indices()
            .filter(|&idx| !self.nodes[idx].is_target())
            .collect();

        for idx in structural {
            let preds: Vec<_> = self
                .nodes
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            let succs: Vec<_> = self
                .nodes
                .neighbors_directed(idx, Direction::Outgoing)
                .collect();
            for &s in &succs {
                for &p in &preds {
                    if !self.nodes.contains_edge(p, s) {
                        self.nodes.add_edge(p, s, ());
                    }
                }
            }
            if let Some(node) = self.nodes.remove_node(idx) {
                debug!(name = %node.name, "removed structural node");
            }
        }
        self.by_serial.clear();
    }

    /// Stamps dense serial numbers in deterministic topological order.
    pub fn assign_serial_numbers(&mut self) -> Result<(), CoreError> {
        let order: Vec<NodeIndex<u32>> = self.topo_iter().map(NodeIndex::from).collect();
        if order.len() != self.nodes.node_count() {
            return Err(CoreError::CycleDetected);
        }
        for (sn, &idx) in order.iter().enumerate() {
            self.nodes[idx].sn = Some(SerialNumber(sn as u32));
        }
        self.by_serial = order;
        Ok(())
    }

    /// Recomputes every node's transitive predecessor set.
    pub fn update_ancestors(&mut self) -> Result<(), CoreError> {
        for pos in 0..self.by_serial.len() {
            let idx = self.by_serial[pos];
            let mut ancestors = BTreeSet::new();
            let preds: Vec<_> = self
                .nodes
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            for p in preds {
                let pred = &self.nodes[p];
                let sn = pred.sn.ok_or_else(|| CoreError::MissingSerial {
                    name: pred.name.clone(),
                })?;
                ancestors.insert(sn);
                ancestors.extend(pred.ancestors.iter().copied());
            }
            self.nodes[idx].ancestors = ancestors;
        }
        Ok(())
    }

    /// Drops every direct edge already implied by another direct
    /// predecessor's ancestry. Reachability is unchanged.
    pub fn transitive_reduction(&mut self) -> Result<(), CoreError> {
        self.require_serials()?;
        self.update_ancestors()?;

        let mut redundant = Vec::new();
        for &idx in &self.by_serial {
            let preds: Vec<_> = self
                .nodes
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            for &p in &preds {
                let Some(p_sn) = self.nodes[p].sn else { continue };
                let implied = preds
                    .iter()
                    .any(|&q| q != p && self.nodes[q].ancestors.contains(&p_sn));
                if implied {
                    redundant.push((p, idx));
                }
            }
        }

        for (p, s) in redundant {
            if let Some(edge) = self.nodes.find_edge(p, s) {
                self.nodes.remove_edge(edge);
            }
        }
        Ok(())
    }

    /// Assigns an agent to every node without one. Pinned ids are validated
    /// against the agent count and left untouched.
    pub fn assign_agents(
        &mut self,
        policy: AssignPolicy,
        rng: &mut dyn RngCore,
    ) -> Result<(), CoreError> {
        let mut needs_agent = false;
        for node in self.nodes.node_weights() {
            match node.agent {
                Some(agent) if agent.0 >= self.num_agents => {
                    return Err(CoreError::AgentOutOfRange {
                        name: node.name.clone(),
                        agent,
                        num_agents: self.num_agents,
                    });
                }
                Some(_) => {}
                None => needs_agent = true,
            }
        }
        if !needs_agent {
            return Ok(());
        }
        if self.num_agents == 0 {
            return Err(CoreError::NoAgents);
        }

        match policy {
            AssignPolicy::Spread => {
                let order: Vec<NodeId> = self.topo_iter().collect();
                let mut wave: Vec<u32> = Vec::new();
                for id in order {
                    let num_agents = self.num_agents;
                    let Some(node) = self.node_mut(id) else { continue };
                    if node.agent.is_some() {
                        continue;
                    }
                    if wave.is_empty() {
                        wave = (0..num_agents).collect();
                        wave.shuffle(&mut *rng);
                    }
                    node.agent = wave.pop().map(AgentId);
                    debug!(name = %node.name, agent = ?node.agent, "spread agent");
                }
            }
            AssignPolicy::Random => {
                let num_agents = self.num_agents;
                for node in self.nodes.node_weights_mut() {
                    if node.agent.is_none() {
                        node.agent = Some(AgentId(rng.gen_range(0..num_agents)));
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the whole pipeline: acyclicity check, prune, number, reduce,
    /// assign agents.
    pub fn finalize(
        &mut self,
        policy: AssignPolicy,
        rng: &mut dyn RngCore,
    ) -> Result<(), CoreError> {
        self.assert_acyclic()?;
        self.remove_non_target_nodes();
        self.assign_serial_numbers()?;
        self.transitive_reduction()?;
        self.assign_agents(policy, rng)
    }

    fn require_serials(&self) -> Result<(), CoreError> {
        if self.by_serial.len() == self.nodes.node_count() {
            return Ok(());
        }
        match self.nodes.node_weights().find(|n| n.sn.is_none()) {
            Some(node) => Err(CoreError::MissingSerial {
                name: node.name.clone(),
            }),
            None => Err(CoreError::MissingSerial {
                name: String::from("<stale numbering>"),
            }),
        }
    }

    /// Rebuilds the serial index from the nodes' stored serial numbers.
    /// Used when a graph is reconstructed from a manifest.
    pub(crate) fn reindex_serials(&mut self) -> Result<(), CoreError> {
        let mut by_serial = vec![None; self.nodes.node_count()];
        for idx in self.nodes.node_indices() {
            let node = &self.nodes[idx];
            let sn = node.sn.ok_or_else(|| CoreError::MissingSerial {
                name: node.name.clone(),
            })?;
            match by_serial.get_mut(sn.index()) {
                Some(slot) if slot.is_none() => *slot = Some(idx),
                _ => {
                    return Err(CoreError::InvalidManifest {
                        reason: format!("serial number {} is duplicated or out of range", sn),
                    })
                }
            }
        }
        self.by_serial = by_serial.into_iter().flatten().collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Payload;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn leaf(graph: &mut Graph, name: &str) -> NodeId {
        graph.add_node(ActionNode::target(name, Payload::Native(format!("{name}();"))))
    }

    fn names_of(graph: &Graph, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|&id| graph.node(id).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let mut graph = Graph::new(1);
        let a = leaf(&mut graph, "a");
        let b = leaf(&mut graph, "b");
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(a, b).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn dependency_on_missing_node_errors() {
        let mut graph = Graph::new(1);
        let a = leaf(&mut graph, "a");
        match graph.add_dependency(a, NodeId(99)) {
            Err(CoreError::NodeNotFound { id }) => assert_eq!(id, NodeId(99)),
            other => panic!("expected NodeNotFound, got {:?}", other),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = Graph::new(1);
        let a = leaf(&mut graph, "a");
        assert!(matches!(
            graph.add_dependency(a, a),
            Err(CoreError::CycleDetected)
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let mut graph = Graph::new(1);
        let a = leaf(&mut graph, "a");
        let b = leaf(&mut graph, "b");
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, a).unwrap();
        assert!(matches!(graph.assert_acyclic(), Err(CoreError::CycleDetected)));
        assert!(matches!(
            graph.assign_serial_numbers(),
            Err(CoreError::CycleDetected)
        ));
    }

    #[test]
    fn pruning_preserves_transitive_constraints() {
        // a -> init -> {b, c} -> final -> d
        let mut graph = Graph::new(2);
        let a = leaf(&mut graph, "a");
        let init = graph.add_node(ActionNode::boundary("para_0_init"));
        let b = leaf(&mut graph, "b");
        let c = leaf(&mut graph, "c");
        let fin = graph.add_node(ActionNode::boundary("para_0_final"));
        let d = leaf(&mut graph, "d");
        graph.add_dependency(a, init).unwrap();
        graph.add_dependency(init, b).unwrap();
        graph.add_dependency(init, c).unwrap();
        graph.add_dependency(b, fin).unwrap();
        graph.add_dependency(c, fin).unwrap();
        graph.add_dependency(fin, d).unwrap();

        graph.remove_non_target_nodes();

        assert_eq!(graph.node_count(), 4);
        assert!(!graph.contains(init));
        assert!(!graph.contains(fin));
        assert_eq!(names_of(&graph, &graph.predecessors(b)), vec!["a"]);
        assert_eq!(names_of(&graph, &graph.predecessors(c)), vec!["a"]);
        assert_eq!(names_of(&graph, &graph.predecessors(d)), vec!["b", "c"]);
    }

    #[test]
    fn pruning_a_chain_of_boundaries() {
        let mut graph = Graph::new(1);
        let a = leaf(&mut graph, "a");
        let s0 = graph.add_node(ActionNode::boundary("s0"));
        let s1 = graph.add_node(ActionNode::boundary("s1"));
        let b = leaf(&mut graph, "b");
        graph.add_dependency(a, s0).unwrap();
        graph.add_dependency(s0, s1).unwrap();
        graph.add_dependency(s1, b).unwrap();

        graph.remove_non_target_nodes();

        assert_eq!(graph.predecessors(b), vec![a]);
    }

    #[test]
    fn serial_numbers_follow_topological_order() {
        let mut graph = Graph::new(1);
        // Created in reverse dependency order on purpose.
        let c = leaf(&mut graph, "c");
        let b = leaf(&mut graph, "b");
        let a = leaf(&mut graph, "a");
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, c).unwrap();

        graph.assign_serial_numbers().unwrap();

        assert_eq!(graph.node(a).unwrap().sn, Some(SerialNumber(0)));
        assert_eq!(graph.node(b).unwrap().sn, Some(SerialNumber(1)));
        assert_eq!(graph.node(c).unwrap().sn, Some(SerialNumber(2)));
        assert_eq!(graph.by_serial(SerialNumber(1)), Some(b));
    }

    #[test]
    fn transitive_reduction_drops_implied_edges() {
        let mut graph = Graph::new(1);
        let a = leaf(&mut graph, "a");
        let b = leaf(&mut graph, "b");
        let c = leaf(&mut graph, "c");
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, c).unwrap();
        graph.add_dependency(a, c).unwrap();

        graph.assign_serial_numbers().unwrap();
        graph.transitive_reduction().unwrap();

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.predecessors(c), vec![b]);
        assert!(graph.is_ancestor(a, c));
    }

    #[test]
    fn reduction_requires_serials() {
        let mut graph = Graph::new(1);
        leaf(&mut graph, "a");
        assert!(matches!(
            graph.transitive_reduction(),
            Err(CoreError::MissingSerial { .. })
        ));
    }

    #[test]
    fn pinned_agents_are_kept_and_validated() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut graph = Graph::new(2);
        let a = graph.add_node(
            ActionNode::target("a", Payload::Native(String::new())).with_agent(Some(AgentId(1))),
        );
        let b = leaf(&mut graph, "b");
        graph.assign_serial_numbers().unwrap();
        graph.assign_agents(AssignPolicy::Spread, &mut rng).unwrap();
        assert_eq!(graph.node(a).unwrap().agent, Some(AgentId(1)));
        assert!(graph.node(b).unwrap().agent.is_some());

        let mut bad = Graph::new(2);
        bad.add_node(
            ActionNode::target("x", Payload::Native(String::new())).with_agent(Some(AgentId(5))),
        );
        match bad.assign_agents(AssignPolicy::Random, &mut rng) {
            Err(CoreError::AgentOutOfRange { agent, num_agents, .. }) => {
                assert_eq!(agent, AgentId(5));
                assert_eq!(num_agents, 2);
            }
            other => panic!("expected AgentOutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn spread_covers_every_agent_per_wave() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut graph = Graph::new(4);
        let ids: Vec<NodeId> = (0..4).map(|i| leaf(&mut graph, &format!("n{i}"))).collect();
        graph.assign_serial_numbers().unwrap();
        graph.assign_agents(AssignPolicy::Spread, &mut rng).unwrap();

        let agents: BTreeSet<u32> = ids
            .iter()
            .map(|&id| graph.node(id).unwrap().agent.unwrap().0)
            .collect();
        assert_eq!(agents, (0..4).collect());
    }

    #[test]
    fn zero_agents_cannot_be_assigned() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut graph = Graph::new(0);
        leaf(&mut graph, "a");
        assert!(matches!(
            graph.assign_agents(AssignPolicy::Spread, &mut rng),
            Err(CoreError::NoAgents)
        ));
    }

    #[test]
    fn headers_and_decls_are_deduplicated_in_order() {
        let mut graph = Graph::new(1);
        graph.add_header("#include \"b.h\"");
        graph.add_header("#include \"a.h\"");
        graph.add_header("#include \"b.h\"");
        graph.add_decl("void fill(void);");
        assert_eq!(
            graph.headers().collect::<Vec<_>>(),
            vec!["#include \"b.h\"", "#include \"a.h\""]
        );
        assert_eq!(graph.decls().count(), 1);
    }

    #[test]
    fn finalize_runs_whole_pipeline() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut graph = Graph::new(2);
        let init = graph.add_node(ActionNode::boundary("seq_0_init"));
        let a = leaf(&mut graph, "a");
        let b = leaf(&mut graph, "b");
        let fin = graph.add_node(ActionNode::boundary("seq_0_final"));
        graph.add_dependency(init, a).unwrap();
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(b, fin).unwrap();

        graph.finalize(AssignPolicy::Spread, &mut rng).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.predecessors(b), vec![a]);
        for (_, node) in graph.nodes_by_serial() {
            assert!(node.agent.is_some());
            assert!(node.is_target());
        }
    }
}
