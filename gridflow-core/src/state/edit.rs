//! Edit Requests
//!
//! The closed set of edits a front end can request. Each maps onto one
//! Mutation API call on [`State`].

use serde::{Deserialize, Serialize};

use super::State;
use crate::error::Result;
use crate::graph::{EdgeKey, EdgeSpec, ListIndex, NodeKey, NodeSpec};
use crate::grid::Coord;

/// One edit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Edit {
    AddNodes(Vec<NodeSpec>),
    AddEdges(Vec<EdgeSpec>),
    DeleteNode(NodeKey),
    DeleteEdge(EdgeKey),
    SetListIndex {
        node: NodeKey,
        index: ListIndex,
    },
    SetSink(Coord),
    AddSource(Coord),
    SetLock {
        x: i64,
        y: i64,
        values: Vec<f64>,
        locked: bool,
    },
    ResizeX(usize),
    ResizeY(usize),
    SetSteps {
        lhs: Option<usize>,
        rhs: Option<usize>,
    },
    SetChannelCount(usize),
}

impl Edit {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Edit::AddNodes(_) => "add-nodes",
            Edit::AddEdges(_) => "add-edges",
            Edit::DeleteNode(_) => "delete-node",
            Edit::DeleteEdge(_) => "delete-edge",
            Edit::SetListIndex { .. } => "set-list-index",
            Edit::SetSink(_) => "set-sink",
            Edit::AddSource(_) => "add-source",
            Edit::SetLock { .. } => "set-lock",
            Edit::ResizeX(_) => "resize-x",
            Edit::ResizeY(_) => "resize-y",
            Edit::SetSteps { .. } => "set-steps",
            Edit::SetChannelCount(_) => "set-channel-count",
        }
    }
}

impl State {
    /// Apply an edit request, discarding any keys it creates.
    pub fn apply(&self, edit: Edit) -> Result<State> {
        match edit {
            Edit::AddNodes(specs) => self.add_nodes(specs).map(|(state, _)| state),
            Edit::AddEdges(specs) => self.add_edges(specs).map(|(state, _)| state),
            Edit::DeleteNode(key) => self.delete_node(key),
            Edit::DeleteEdge(key) => self.delete_edge(key),
            Edit::SetListIndex { node, index } => self.set_list_index(node, index),
            Edit::SetSink(coord) => self.set_sink(coord),
            Edit::AddSource(coord) => self.add_source(coord).map(|(state, _)| state),
            Edit::SetLock { x, y, values, locked } => self.set_lock(x, y, &values, locked),
            Edit::ResizeX(width) => self.resize_x(width),
            Edit::ResizeY(height) => self.resize_y(height),
            Edit::SetSteps { lhs, rhs } => self.set_steps(lhs, rhs),
            Edit::SetChannelCount(channels) => self.set_channel_count(channels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn edits_deserialize_from_json() {
        let edit: Edit = serde_json::from_str(r#"{"SetSink": {"x": 1, "y": 0}}"#).unwrap();
        assert_eq!(edit, Edit::SetSink(Coord::new(1, 0)));
        assert_eq!(edit.name(), "set-sink");

        let edit: Edit = serde_json::from_str(r#"{"SetSteps": {"lhs": 2, "rhs": null}}"#).unwrap();
        assert_eq!(edit, Edit::SetSteps { lhs: Some(2), rhs: None });
    }

    #[test]
    fn apply_dispatches() {
        let state = State::new(EngineConfig::default().with_size(3, 3)).unwrap();
        let state = state.apply(Edit::ResizeX(5)).unwrap();
        assert_eq!(state.grid().width(), 5);
        let state = state.apply(Edit::SetSink(Coord::new(4, 2))).unwrap();
        assert_eq!(state.grid().sink(), Some(Coord::new(4, 2)));
        assert!(state.apply(Edit::ResizeY(2)).is_err());
    }
}
