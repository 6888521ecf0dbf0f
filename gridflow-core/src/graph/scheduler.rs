//! Evaluation Scheduler
//!
//! The scheduler determines the order in which nodes are evaluated. It
//! ensures that every dependency is evaluated before its dependents.
//!
//! # Algorithm
//!
//! Kahn's algorithm over the whole program:
//!
//! 1. Count incoming edges per node
//! 2. Seed a queue with every node that has none, in creation order
//! 3. Pop a node, append it to the order, and decrement the in-degree of
//!    each dependent; dependents reaching zero join the queue
//! 4. If the order is shorter than the node count, the leftover nodes sit on
//!    or behind a cycle and the schedule is rejected
//!
//! The schedule is rebuilt on every evaluation. Edits change the edge set,
//! so there is nothing worth caching between them.

use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::warn;

use super::edge::EdgeKey;
use super::model::Graph;
use super::node::NodeKey;
use crate::error::{EngineError, Result};

/// A topological order plus the reverse adjacency the evaluator needs.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Node keys, dependencies before dependents.
    order: Vec<NodeKey>,

    /// Incoming edges per node, indexed by creation-order position and kept
    /// in edge creation order.
    incoming: Vec<SmallVec<[EdgeKey; 3]>>,
}

impl Schedule {
    /// Sort every node of `graph`.
    ///
    /// Returns [`EngineError::Cycle`] listing the unordered nodes when the
    /// edges do not form a DAG.
    pub fn build(graph: &Graph) -> Result<Self> {
        let count = graph.node_count();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); count];
        let mut incoming: Vec<SmallVec<[EdgeKey; 3]>> = vec![SmallVec::new(); count];

        for edge in graph.edges() {
            // Endpoints always exist; the arena drops edges with their nodes.
            let (Some(from), Some(to)) = (graph.position(edge.from), graph.position(edge.to)) else {
                continue;
            };
            dependents[from].push(to);
            incoming[to].push(edge.key);
            in_degree[to] += 1;
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(index) = queue.pop_front() {
            if let Some(key) = graph.key_at(index) {
                order.push(key);
            }
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() < count {
            let residual: Vec<NodeKey> = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .filter_map(|i| graph.key_at(i))
                .collect();
            warn!(unordered = residual.len(), "dependency cycle detected");
            return Err(EngineError::Cycle { residual });
        }

        Ok(Self { order, incoming })
    }

    /// Node keys in evaluation order.
    pub fn order(&self) -> &[NodeKey] {
        &self.order
    }

    /// Incoming edges of the node at creation-order position `index`.
    pub fn incoming(&self, index: usize) -> &[EdgeKey] {
        self.incoming.get(index).map_or(&[], |edges| edges.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::EdgeSpec;
    use crate::graph::model::NodeSpec;
    use crate::graph::node::{BinaryOp, Immutable, NodeKind, UnaryOp};

    fn mutable(graph: &mut Graph) -> NodeKey {
        graph
            .add_node(NodeSpec::new("Identity", NodeKind::Mutable(UnaryOp::Identity)))
            .unwrap()
    }

    fn position(order: &[NodeKey], key: NodeKey) -> usize {
        order.iter().position(|&k| k == key).unwrap()
    }

    #[test]
    fn dependencies_precede_dependents() {
        let mut graph = Graph::new();
        // Created out of dependency order: c <- b <- a
        let c = mutable(&mut graph);
        let b = mutable(&mut graph);
        let a = graph
            .add_node(NodeSpec::new("1", NodeKind::Immutable(Immutable::Constant(1.0))))
            .unwrap();
        graph.add_edge(EdgeSpec::new(a, b)).unwrap();
        graph.add_edge(EdgeSpec::new(b, c)).unwrap();

        let schedule = Schedule::build(&graph).unwrap();
        let order = schedule.order();
        assert_eq!(order.len(), 3);
        for edge in graph.edges() {
            assert!(position(order, edge.from) < position(order, edge.to));
        }
    }

    #[test]
    fn diamond_is_ordered() {
        let mut graph = Graph::new();
        let top = mutable(&mut graph);
        let left = mutable(&mut graph);
        let right = mutable(&mut graph);
        let bottom = graph
            .add_node(NodeSpec::new("Addition", NodeKind::Operation(BinaryOp::Add)))
            .unwrap();
        graph.add_edge(EdgeSpec::new(top, left)).unwrap();
        graph.add_edge(EdgeSpec::new(top, right)).unwrap();
        graph.add_edge(EdgeSpec::new(left, bottom)).unwrap();
        graph.add_edge(EdgeSpec::new(right, bottom)).unwrap();

        let schedule = Schedule::build(&graph).unwrap();
        assert_eq!(schedule.order(), &[top, left, right, bottom]);
        assert_eq!(schedule.incoming(3).len(), 2);
    }

    #[test]
    fn cycle_is_reported() {
        let mut graph = Graph::new();
        let a = mutable(&mut graph);
        let b = mutable(&mut graph);
        let free = mutable(&mut graph);
        graph.add_edge(EdgeSpec::new(a, b)).unwrap();
        graph.add_edge(EdgeSpec::new(b, a)).unwrap();

        match Schedule::build(&graph) {
            Err(EngineError::Cycle { residual }) => {
                assert_eq!(residual, vec![a, b]);
                assert!(!residual.contains(&free));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = Graph::new();
        let a = mutable(&mut graph);
        graph.add_edge(EdgeSpec::new(a, a)).unwrap();
        assert!(matches!(Schedule::build(&graph), Err(EngineError::Cycle { .. })));
    }
}
