//! Pull-based topological traversal over a materialized ready queue.
//!
//! In deterministic mode the ready queue is first-in, first-out. In random
//! mode every step picks uniformly among the currently-ready nodes, which is
//! where run-to-run stimulus variety under different seeds comes from. Both
//! modes only ever yield a node after all of its predecessors.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use rand::{Rng, RngCore};

use crate::graph::Graph;
use crate::id::NodeId;

pub struct TopoIter<'a> {
    graph: &'a Graph,
    pending: HashMap<NodeIndex<u32>, usize>,
    ready: Vec<NodeIndex<u32>>,
    rng: Option<&'a mut dyn RngCore>,
}

impl<'a> TopoIter<'a> {
    pub(crate) fn new(graph: &'a Graph, rng: Option<&'a mut dyn RngCore>) -> Self {
        let inner = graph.inner();
        let mut pending = HashMap::new();
        let mut ready = Vec::new();
        for idx in inner.node_indices() {
            let preds = inner.neighbors_directed(idx, Direction::Incoming).count();
            if preds == 0 {
                ready.push(idx);
            } else {
                pending.insert(idx, preds);
            }
        }
        TopoIter {
            graph,
            pending,
            ready,
            rng,
        }
    }
}

impl Iterator for TopoIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.ready.is_empty() {
            return None;
        }
        let pick = match self.rng.as_mut() {
            Some(rng) => rng.gen_range(0..self.ready.len()),
            None => 0,
        };
        let idx = self.ready.remove(pick);

        let graph = self.graph;
        for succ in graph.inner().neighbors_directed(idx, Direction::Outgoing) {
            if let Some(left) = self.pending.get_mut(&succ) {
                *left -= 1;
                if *left == 0 {
                    self.pending.remove(&succ);
                    self.ready.push(succ);
                }
            }
        }
        Some(NodeId::from(idx))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::graph::Graph;
    use crate::id::NodeId;
    use crate::node::{ActionNode, Payload};

    fn diamond() -> (Graph, [NodeId; 4]) {
        let mut graph = Graph::new(1);
        let mut ids = [NodeId(0); 4];
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            ids[i] = graph.add_node(ActionNode::target(*name, Payload::Native(String::new())));
        }
        let [a, b, c, d] = ids;
        graph.add_dependency(a, b).unwrap();
        graph.add_dependency(a, c).unwrap();
        graph.add_dependency(b, d).unwrap();
        graph.add_dependency(c, d).unwrap();
        (graph, ids)
    }

    fn assert_respects_edges(graph: &Graph, order: &[NodeId]) {
        let pos: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        for &id in order {
            for pred in graph.predecessors(id) {
                assert!(pos[&pred] < pos[&id]);
            }
        }
    }

    #[test]
    fn deterministic_order_is_fifo() {
        let (graph, [a, b, c, d]) = diamond();
        let order: Vec<NodeId> = graph.topo_iter().collect();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], a);
        assert_eq!(order[3], d);
        assert!(order.contains(&b) && order.contains(&c));
        assert_respects_edges(&graph, &order);
    }

    #[test]
    fn random_order_respects_dependencies() {
        let (graph, _) = diamond();
        for seed in 0..32 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let order: Vec<NodeId> = graph.random_topo_iter(&mut rng).collect();
            assert_eq!(order.len(), 4);
            assert_respects_edges(&graph, &order);
        }
    }

    #[test]
    fn random_order_varies_across_seeds() {
        let mut graph = Graph::new(1);
        for i in 0..6 {
            graph.add_node(ActionNode::target(format!("n{i}"), Payload::Native(String::new())));
        }
        let orders: std::collections::HashSet<Vec<NodeId>> = (0..16)
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                graph.random_topo_iter(&mut rng).collect()
            })
            .collect();
        assert!(orders.len() > 1);
    }
}
