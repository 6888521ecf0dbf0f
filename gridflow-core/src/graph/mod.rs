//! Program Graph
//!
//! This module implements the left-hand side of the engine: the dataflow
//! program that gets evaluated against every grid cell.
//!
//! # Overview
//!
//! The program is a directed graph where:
//!
//! - Nodes are groups (the Sink and each Source), their positional members,
//!   constants, and operators
//! - Edges are dependencies: if A reads B, there is an edge from B to A
//!
//! Evaluation walks the nodes in topological order, so the edges must form
//! a DAG. A cycle is a recoverable error reported by the scheduler.
//!
//! # Design Decisions
//!
//! 1. Nodes and edges live in one arena keyed by integer keys. Group
//!    membership and edge endpoints are key lookups, never references, so
//!    a snapshot is copied with a plain clone.
//!
//! 2. The arena is an `IndexMap`, which keeps creation order. Ties in the
//!    topological order are broken by that order, so evaluation is
//!    deterministic.
//!
//! 3. Reverse adjacency is derived per evaluation by the scheduler rather
//!    than stored on nodes, because every edit may change it.

mod edge;
mod model;
mod node;
mod scheduler;

pub use edge::{Edge, EdgeKey, EdgeSpec, Port};
pub use model::{Graph, NodeSpec};
pub use node::{
    BinaryOp, Immutable, InvalidListIndex, ListIndex, Node, NodeKey, NodeKind, Slot, UnaryOp, UnknownOperator,
};
pub use scheduler::Schedule;
