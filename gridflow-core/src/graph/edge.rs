//! Graph Edges
//!
//! An edge says "`to` reads the value of `from`". Port tags on the receiving
//! end tell multi-input nodes which slot an edge feeds.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeKey;

/// Unique identifier for an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey(u64);

impl EdgeKey {
    /// Get the raw key value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for EdgeKey {
    fn from(key: u64) -> Self {
        Self(key)
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A connection point on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    /// Condition input of a Conditional; the only input of single-input nodes.
    Top,
    Left,
    Right,
    /// The output of every node that has one.
    Bottom,
}

/// A directed dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub key: EdgeKey,
    pub from: NodeKey,
    pub to: NodeKey,
    pub from_port: Option<Port>,
    pub to_port: Option<Port>,
    /// Hidden edges are structural. They are never drawn but still evaluate.
    pub visible: bool,
}

impl Edge {
    /// Whether this edge touches `node` at either end.
    pub fn touches(&self, node: NodeKey) -> bool {
        self.from == node || self.to == node
    }
}

/// What a caller supplies to create an edge. The graph assigns the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: NodeKey,
    pub to: NodeKey,
    pub from_port: Option<Port>,
    pub to_port: Option<Port>,
    pub visible: bool,
}

impl EdgeSpec {
    /// A visible edge with no port tags.
    pub fn new(from: NodeKey, to: NodeKey) -> Self {
        Self {
            from,
            to,
            from_port: None,
            to_port: None,
            visible: true,
        }
    }

    /// Tag the receiving port.
    pub fn to_port(mut self, port: Port) -> Self {
        self.to_port = Some(port);
        self
    }

    /// Tag the sending port.
    pub fn from_port(mut self, port: Port) -> Self {
        self.from_port = Some(port);
        self
    }

    /// Mark the edge as structural.
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}
