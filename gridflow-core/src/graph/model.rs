//! Graph Arena
//!
//! The [`Graph`] owns every node and edge of a program. Nodes refer to each
//! other only by key (group membership, edge endpoints), so copying a graph
//! is a plain clone and no node ever holds a handle into another.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::edge::{Edge, EdgeKey, EdgeSpec};
use super::node::{Node, NodeKey, NodeKind, Slot};
use crate::error::{EngineError, Result};
use crate::grid::Offset;

/// What a caller supplies to create a node. The graph assigns the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
    pub group: Option<NodeKey>,
    pub slot: Option<Slot>,
}

impl NodeSpec {
    /// A free-standing node.
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            group: None,
            slot: None,
        }
    }

    /// Place the node inside a group.
    pub fn in_group(mut self, group: NodeKey, slot: Option<Slot>) -> Self {
        self.group = Some(group);
        self.slot = slot;
        self
    }
}

/// The node/edge arena of a program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// All nodes, in creation order.
    nodes: IndexMap<NodeKey, Node>,

    /// All edges, in creation order.
    edges: IndexMap<EdgeKey, Edge>,

    next_node: u64,
    next_edge: u64,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a node by key.
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(&key)
    }

    /// Get an edge by key.
    pub fn edge(&self, key: EdgeKey) -> Option<&Edge> {
        self.edges.get(&key)
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges in creation order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Position of a node in creation order.
    pub(crate) fn position(&self, key: NodeKey) -> Option<usize> {
        self.nodes.get_index_of(&key)
    }

    /// Key of the node at a creation-order position.
    pub(crate) fn key_at(&self, index: usize) -> Option<NodeKey> {
        self.nodes.get_index(index).map(|(key, _)| *key)
    }

    /// Edges feeding `key`, in creation order.
    pub fn incoming(&self, key: NodeKey) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |edge| edge.to == key)
    }

    /// Members of a group, in creation order.
    pub fn members(&self, group: NodeKey) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |node| node.group() == Some(group))
    }

    /// The member of `group` occupying `slot`.
    pub fn member(&self, group: NodeKey, slot: Slot) -> Option<NodeKey> {
        self.members(group)
            .find(|node| node.slot() == Some(slot))
            .map(Node::key)
    }

    /// The sink group, if the graph has one.
    pub fn sink_key(&self) -> Option<NodeKey> {
        self.nodes
            .values()
            .find(|node| matches!(node.kind(), NodeKind::Sink { .. }))
            .map(Node::key)
    }

    /// Every source group with its fixed offset from the sink.
    pub fn source_groups(&self) -> impl Iterator<Item = (NodeKey, Offset)> + '_ {
        self.nodes.values().filter_map(|node| match node.kind() {
            NodeKind::Source { offset } => Some((node.key(), offset)),
            _ => None,
        })
    }

    /// Insert a node without validation.
    pub(crate) fn insert_node(&mut self, spec: NodeSpec) -> NodeKey {
        let key = NodeKey::from(self.next_node);
        self.next_node += 1;
        let node = Node::new(key, spec.name, spec.kind)
            .with_group(spec.group)
            .with_slot(spec.slot);
        trace!(node = %key, kind = node.kind().category(), "inserting node");
        self.nodes.insert(key, node);
        key
    }

    /// Insert an edge without validation.
    pub(crate) fn insert_edge(&mut self, spec: EdgeSpec) -> EdgeKey {
        let key = EdgeKey::from(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(
            key,
            Edge {
                key,
                from: spec.from,
                to: spec.to,
                from_port: spec.from_port,
                to_port: spec.to_port,
                visible: spec.visible,
            },
        );
        key
    }

    /// Add a user node. Groups are only created by the Mutation API, and a
    /// named parent must be an existing group.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeKey> {
        if spec.kind.is_group() {
            return Err(EngineError::GroupNode);
        }
        if let Some(group) = spec.group {
            match self.node(group) {
                None => return Err(EngineError::UnknownNode(group)),
                Some(node) if !node.is_group() => return Err(EngineError::UnknownGroup(group)),
                Some(_) => {}
            }
        }
        Ok(self.insert_node(spec))
    }

    /// Add an edge between two existing nodes.
    pub fn add_edge(&mut self, spec: EdgeSpec) -> Result<EdgeKey> {
        for endpoint in [spec.from, spec.to] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(EngineError::UnknownNode(endpoint));
            }
        }
        Ok(self.insert_edge(spec))
    }

    /// Remove an edge. Returns whether it existed.
    pub fn remove_edge(&mut self, key: EdgeKey) -> bool {
        self.edges.shift_remove(&key).is_some()
    }

    /// Remove a node together with its group members and every edge touching
    /// any removed node. Returns the removed node keys.
    pub fn remove_node_cascade(&mut self, key: NodeKey) -> Vec<NodeKey> {
        if !self.nodes.contains_key(&key) {
            return Vec::new();
        }
        let mut removed: Vec<NodeKey> = vec![key];
        removed.extend(self.members(key).map(Node::key));

        for node in &removed {
            self.nodes.shift_remove(node);
        }
        self.edges
            .retain(|_, edge| !removed.iter().any(|node| edge.touches(*node)));

        trace!(node = %key, removed = removed.len(), "removed node cascade");
        removed
    }
}
