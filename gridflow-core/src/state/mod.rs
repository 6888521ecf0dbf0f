//! Engine State and Mutation API
//!
//! A [`State`] is one consistent snapshot: the program graph, the grid, and
//! the configuration they were built with. States are values. Every edit
//! takes `&self` and returns a brand-new state, so a caller holding an old
//! snapshot never observes a partially applied edit.
//!
//! # Edit lifecycle
//!
//! 1. Clone the current snapshot
//! 2. Validate and apply the edit to the clone
//! 3. Re-run the full evaluation on the clone
//! 4. Return the clone, or the first error (the original is untouched)
//!
//! Edits that name something that is not there, or something structural,
//! are no-ops and return an unchanged copy.

mod edit;
mod session;

pub use edit::Edit;
pub use session::Session;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{EngineConfig, MAX_CHANNELS};
use crate::error::{EngineError, Result};
use crate::eval::{self, EvalReport};
use crate::graph::{
    EdgeKey, EdgeSpec, Graph, Immutable, ListIndex, Node, NodeKey, NodeKind, NodeSpec, Port, Slot, UnaryOp,
};
use crate::grid::{Coord, Grid};

/// One immutable snapshot of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    graph: Graph,
    grid: Grid,
    config: Arc<EngineConfig>,
}

impl State {
    /// Create the initial state: an empty grid and a sink group with `x`,
    /// `y` and one output per configured channel. No sink is placed yet.
    pub fn new(config: EngineConfig) -> Result<Self> {
        check_size(config.width, config.height)?;
        check_channels(config.channels)?;

        let mut graph = Graph::new();
        let sink = graph.insert_node(NodeSpec::new("Sink", NodeKind::Sink { table: None }));
        for slot in [Slot::X, Slot::Y] {
            graph.insert_node(
                NodeSpec::new(slot.name(), NodeKind::Immutable(Immutable::Reference)).in_group(sink, Some(slot)),
            );
        }
        for channel in 0..config.channels {
            add_sink_channel(&mut graph, sink, channel);
        }

        let mut grid = Grid::new(config.width, config.height, config.channels);
        grid.set_steps(config.lhs_step, config.rhs_step);

        let mut state = Self {
            graph,
            grid,
            config: Arc::new(config),
        };
        state.evaluate()?;
        Ok(state)
    }

    /// The program graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A node by key.
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.graph.node(key)
    }

    /// Channel value of the cell at `(x, y)`. NaN when undefined or off the
    /// grid.
    pub fn value(&self, x: i64, y: i64, channel: usize) -> f64 {
        self.grid.value(Coord::new(x, y), channel)
    }

    /// The sink group's key.
    pub fn sink_group(&self) -> Option<NodeKey> {
        self.graph.sink_key()
    }

    /// Re-run the full evaluation in place.
    fn evaluate(&mut self) -> Result<EvalReport> {
        eval::evaluate(&mut self.graph, &mut self.grid, &self.config.lookup)
    }

    /// Evaluate a modified copy and hand it back.
    fn commit(mut self) -> Result<Self> {
        self.evaluate()?;
        Ok(self)
    }

    /// Add nodes. All specs are applied or none are.
    pub fn add_nodes(&self, specs: impl IntoIterator<Item = NodeSpec>) -> Result<(Self, Vec<NodeKey>)> {
        let mut next = self.clone();
        let keys = specs
            .into_iter()
            .map(|spec| next.graph.add_node(spec))
            .collect::<Result<Vec<_>>>()?;
        debug!(added = keys.len(), "nodes added");
        Ok((next.commit()?, keys))
    }

    /// Add edges. Fails with [`EngineError::Cycle`] if the new edges close a
    /// dependency cycle.
    pub fn add_edges(&self, specs: impl IntoIterator<Item = EdgeSpec>) -> Result<(Self, Vec<EdgeKey>)> {
        let mut next = self.clone();
        let keys = specs
            .into_iter()
            .map(|spec| next.graph.add_edge(spec))
            .collect::<Result<Vec<_>>>()?;
        let next = next.commit().inspect_err(|err| {
            warn!(error = %err, "edge insertion rejected");
        })?;
        debug!(added = keys.len(), "edges added");
        Ok((next, keys))
    }

    /// Delete a node, its group members, and every edge touching them.
    ///
    /// Missing nodes, the sink group and its members, and members of any
    /// group are left alone.
    pub fn delete_node(&self, key: NodeKey) -> Result<Self> {
        let deletable = match self.graph.node(key) {
            None => false,
            Some(node) => node.group().is_none() && !matches!(node.kind(), NodeKind::Sink { .. }),
        };
        if !deletable {
            debug!(node = %key, "ignoring delete of missing or structural node");
            return Ok(self.clone());
        }
        let mut next = self.clone();
        let removed = next.graph.remove_node_cascade(key);
        debug!(node = %key, removed = removed.len(), "node deleted");
        next.commit()
    }

    /// Delete a visible edge. Missing and hidden structural edges are left
    /// alone.
    pub fn delete_edge(&self, key: EdgeKey) -> Result<Self> {
        if !self.graph.edge(key).is_some_and(|edge| edge.visible) {
            debug!(edge = %key, "ignoring delete of missing or structural edge");
            return Ok(self.clone());
        }
        let mut next = self.clone();
        next.graph.remove_edge(key);
        next.commit()
    }

    /// Choose where a List node takes its table index from: its input, a
    /// fixed position, or the evaluated cell's `x` or `y`. Missing nodes and
    /// nodes that are not lists are left alone.
    pub fn set_list_index(&self, key: NodeKey, index: ListIndex) -> Result<Self> {
        let kind = match self.graph.node(key).map(Node::kind) {
            Some(NodeKind::Mutable(op)) => op.with_list_index(index).map(NodeKind::Mutable),
            Some(NodeKind::Out(op)) => op.with_list_index(index).map(NodeKind::Out),
            _ => None,
        };
        let Some(kind) = kind else {
            debug!(node = %key, "ignoring list index for missing or non-list node");
            return Ok(self.clone());
        };
        let mut next = self.clone();
        if let Some(node) = next.graph.node_mut(key) {
            node.set_kind(kind);
        }
        debug!(node = %key, ?index, "list index selected");
        next.commit()
    }

    /// Place the sink. Sources keep their offsets and move with it, so the
    /// placement is rejected if any of them would leave the grid.
    pub fn set_sink(&self, coord: Coord) -> Result<Self> {
        self.check_placements(&self.grid, coord).inspect_err(|err| {
            warn!(error = %err, "sink placement rejected");
        })?;

        let mut next = self.clone();
        if let Some(sink) = next.graph.sink_key() {
            if let Some(node) = next.graph.node_mut(sink) {
                node.set_kind(NodeKind::Sink { table: Some(coord) });
            }
        }
        next.grid.set_sink(Some(coord));
        debug!(%coord, "sink placed");
        next.commit()
    }

    /// Add a source group referencing `coord`. Returns the new state and
    /// the group's key.
    ///
    /// The group gets `x` and `y` members that report its position, and one
    /// `valN` reference per channel wired from `x` and `y` by hidden edges.
    pub fn add_source(&self, coord: Coord) -> Result<(Self, NodeKey)> {
        let sink = self.grid.sink().ok_or(EngineError::SinkUnset)?;
        self.grid.check_bounds(coord).inspect_err(|err| {
            warn!(error = %err, "source placement rejected");
        })?;

        let mut next = self.clone();
        let offset = coord - sink;
        let group = next
            .graph
            .insert_node(NodeSpec::new("Source", NodeKind::Source { offset }));
        for slot in [Slot::X, Slot::Y] {
            next.graph.insert_node(
                NodeSpec::new(slot.name(), NodeKind::Mutable(UnaryOp::Identity)).in_group(group, Some(slot)),
            );
        }
        for channel in 0..next.grid.channel_count() {
            add_source_channel(&mut next.graph, group, channel);
        }
        debug!(%coord, group = %group, "source added");
        Ok((next.commit()?, group))
    }

    /// Write values into a cell and set its lock flag.
    pub fn set_lock(&self, x: i64, y: i64, values: &[f64], locked: bool) -> Result<Self> {
        let mut next = self.clone();
        next.grid.write_cell(Coord::new(x, y), values, locked)?;
        debug!(x, y, locked, "cell lock updated");
        next.commit()
    }

    /// Resize the grid. Rejected if the sink or a source would fall off.
    pub fn resize(&self, width: usize, height: usize) -> Result<Self> {
        check_size(width, height)?;
        let resized = self.grid.resized(width, height);
        if let Some(sink) = self.grid.sink() {
            self.check_placements(&resized, sink).inspect_err(|err| {
                warn!(error = %err, width, height, "resize rejected");
            })?;
        }

        let mut next = self.clone();
        next.grid = resized;
        debug!(width, height, "grid resized");
        next.commit()
    }

    /// Resize the number of columns.
    pub fn resize_x(&self, width: usize) -> Result<Self> {
        self.resize(width, self.grid.height())
    }

    /// Resize the number of rows.
    pub fn resize_y(&self, height: usize) -> Result<Self> {
        self.resize(self.grid.width(), height)
    }

    /// Change the staged-evaluation limits. `None` lifts a limit.
    pub fn set_steps(&self, lhs: Option<usize>, rhs: Option<usize>) -> Result<Self> {
        let mut next = self.clone();
        next.grid.set_steps(lhs, rhs);
        next.commit()
    }

    /// Change how many value channels each cell carries, adding or removing
    /// the matching `valN` members of the sink and of every source.
    pub fn set_channel_count(&self, channels: usize) -> Result<Self> {
        check_channels(channels)?;
        let mut next = self.clone();
        let groups: Vec<NodeKey> = next
            .graph
            .nodes()
            .filter(|node| node.is_group())
            .map(Node::key)
            .collect();

        for group in groups {
            let is_sink = matches!(next.graph.node(group).map(Node::kind), Some(NodeKind::Sink { .. }));
            let stale: Vec<NodeKey> = next
                .graph
                .members(group)
                .filter(|node| matches!(node.slot(), Some(Slot::Channel(n)) if n >= channels))
                .map(Node::key)
                .collect();
            for member in stale {
                next.graph.remove_node_cascade(member);
            }
            for channel in 0..channels {
                if next.graph.member(group, Slot::Channel(channel)).is_some() {
                    continue;
                }
                if is_sink {
                    add_sink_channel(&mut next.graph, group, channel);
                } else {
                    add_source_channel(&mut next.graph, group, channel);
                }
            }
        }

        next.grid.set_channel_count(channels);
        debug!(channels, "channel count changed");
        next.commit()
    }

    /// Check that a sink at `sink` and every source at its offset fit in
    /// `grid`.
    fn check_placements(&self, grid: &Grid, sink: Coord) -> Result<()> {
        grid.check_bounds(sink)?;
        for (_, offset) in self.graph.source_groups() {
            grid.check_bounds(sink + offset)?;
        }
        Ok(())
    }
}

fn check_size(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(EngineError::EmptyGrid { width, height });
    }
    Ok(())
}

fn check_channels(channels: usize) -> Result<()> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(EngineError::ChannelCount {
            requested: channels,
            max: MAX_CHANNELS,
        });
    }
    Ok(())
}

/// Add the `valN` output of the sink for `channel`.
fn add_sink_channel(graph: &mut Graph, sink: NodeKey, channel: usize) -> NodeKey {
    let slot = Slot::Channel(channel);
    graph.insert_node(NodeSpec::new(slot.name(), NodeKind::Out(UnaryOp::Identity)).in_group(sink, Some(slot)))
}

/// Add the `valN` reference of a source for `channel`, fed by the group's
/// `x` (left) and `y` (right) members through hidden edges.
fn add_source_channel(graph: &mut Graph, group: NodeKey, channel: usize) -> NodeKey {
    let slot = Slot::Channel(channel);
    let value = graph.insert_node(
        NodeSpec::new(slot.name(), NodeKind::Immutable(Immutable::Reference)).in_group(group, Some(slot)),
    );
    for (axis, port) in [(Slot::X, Port::Left), (Slot::Y, Port::Right)] {
        if let Some(member) = graph.member(group, axis) {
            graph.insert_edge(EdgeSpec::new(member, value).from_port(Port::Bottom).to_port(port).hidden());
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BinaryOp;

    fn state(width: usize, height: usize) -> State {
        State::new(EngineConfig::default().with_size(width, height)).unwrap()
    }

    fn sink_output(state: &State, channel: usize) -> NodeKey {
        let sink = state.sink_group().unwrap();
        state.graph().member(sink, Slot::Channel(channel)).unwrap()
    }

    #[test]
    fn initial_state_has_sink_group() {
        let state = state(4, 3);
        let sink = state.sink_group().unwrap();
        let names: Vec<&str> = state.graph().members(sink).map(Node::name).collect();
        assert_eq!(names, vec!["x", "y", "val1"]);
        assert_eq!(state.grid().sink(), None);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EngineConfig::default().with_size(0, 3);
        assert_eq!(State::new(config), Err(EngineError::EmptyGrid { width: 0, height: 3 }));
        let config = EngineConfig::default().with_channels(4);
        assert!(matches!(State::new(config), Err(EngineError::ChannelCount { requested: 4, .. })));
    }

    #[test]
    fn sink_coordinates_fill_the_grid() {
        let state = state(3, 2);
        let sink = state.sink_group().unwrap();
        let x = state.graph().member(sink, Slot::X).unwrap();
        let out = sink_output(&state, 0);
        let (state, _) = state.add_edges([EdgeSpec::new(x, out)]).unwrap();
        let state = state.set_sink(Coord::new(0, 0)).unwrap();

        for cell in state.grid().cells() {
            assert_eq!(cell.channels[0], cell.coord.x as f64);
        }
        assert_eq!(state.node(x).unwrap().value(), 0.0);
    }

    #[test]
    fn sink_out_of_bounds_is_rejected() {
        let state = state(3, 2);
        let err = state.set_sink(Coord::new(3, 0)).unwrap_err();
        assert_eq!(err.code(), "out-of-bounds");
    }

    #[test]
    fn source_requires_sink() {
        let state = state(3, 2);
        assert_eq!(state.add_source(Coord::new(0, 0)).unwrap_err(), EngineError::SinkUnset);
    }

    #[test]
    fn moving_sink_cannot_push_sources_off_grid() {
        let state = state(5, 1).set_sink(Coord::new(2, 0)).unwrap();
        let (state, _) = state.add_source(Coord::new(0, 0)).unwrap();
        // Source sits two columns left of the sink.
        assert!(state.set_sink(Coord::new(1, 0)).is_err());
        let moved = state.set_sink(Coord::new(4, 0)).unwrap();
        assert_eq!(moved.grid().sources(), &[Coord::new(2, 0)]);
    }

    #[test]
    fn source_group_layout() {
        let state = state(4, 1).set_sink(Coord::new(3, 0)).unwrap();
        let (state, group) = state.add_source(Coord::new(1, 0)).unwrap();
        let names: Vec<&str> = state.graph().members(group).map(Node::name).collect();
        assert_eq!(names, vec!["x", "y", "val1"]);
        let hidden = state.graph().edges().filter(|edge| !edge.visible).count();
        assert_eq!(hidden, 2);

        let x = state.graph().member(group, Slot::X).unwrap();
        assert_eq!(state.node(x).unwrap().value(), 1.0);
    }

    #[test]
    fn group_members_and_sink_are_not_deletable() {
        let state = state(3, 1);
        let sink = state.sink_group().unwrap();
        let out = sink_output(&state, 0);
        assert_eq!(state.delete_node(sink).unwrap(), state);
        assert_eq!(state.delete_node(out).unwrap(), state);
        assert_eq!(state.delete_node(NodeKey::from(1000)).unwrap(), state);
    }

    #[test]
    fn deleting_a_source_removes_its_members() {
        let state = state(3, 1).set_sink(Coord::new(2, 0)).unwrap();
        let before = state.graph().node_count();
        let (with_source, group) = state.add_source(Coord::new(0, 0)).unwrap();
        let after = with_source.delete_node(group).unwrap();
        assert_eq!(after.graph().node_count(), before);
        assert_eq!(after.graph().edge_count(), 0);
        assert!(after.grid().sources().is_empty());
    }

    #[test]
    fn hidden_edges_survive_delete_edge() {
        let state = state(3, 1).set_sink(Coord::new(2, 0)).unwrap();
        let (state, _) = state.add_source(Coord::new(0, 0)).unwrap();
        let hidden = state.graph().edges().find(|edge| !edge.visible).unwrap().key;
        assert_eq!(state.delete_edge(hidden).unwrap(), state);
    }

    #[test]
    fn channel_count_rewires_groups() {
        let state = state(3, 1).set_sink(Coord::new(2, 0)).unwrap();
        let (state, group) = state.add_source(Coord::new(0, 0)).unwrap();

        let wider = state.set_channel_count(3).unwrap();
        let sink = wider.sink_group().unwrap();
        assert!(wider.graph().member(sink, Slot::Channel(2)).is_some());
        assert!(wider.graph().member(group, Slot::Channel(2)).is_some());
        assert_eq!(wider.graph().edges().filter(|edge| !edge.visible).count(), 6);

        let narrower = wider.set_channel_count(1).unwrap();
        assert!(narrower.graph().member(sink, Slot::Channel(1)).is_none());
        assert_eq!(narrower.graph().edges().filter(|edge| !edge.visible).count(), 2);
        assert_eq!(narrower.grid().channel_count(), 1);

        assert!(state.set_channel_count(0).is_err());
    }

    #[test]
    fn operation_nodes_can_be_added_and_deleted() {
        let state = state(2, 1);
        let (state, keys) = state
            .add_nodes([NodeSpec::new("Addition", NodeKind::Operation(BinaryOp::Add))])
            .unwrap();
        let after = state.delete_node(keys[0]).unwrap();
        assert!(after.node(keys[0]).is_none());
    }

    #[test]
    fn list_index_only_applies_to_list_nodes() {
        let state = state(2, 1);
        let (state, keys) = state
            .add_nodes([
                NodeSpec::new("List B", NodeKind::Mutable(UnaryOp::ListB { index: ListIndex::Input })),
                NodeSpec::new("Not", NodeKind::Mutable(UnaryOp::Not)),
            ])
            .unwrap();

        let fixed = state.set_list_index(keys[0], ListIndex::Fixed(2)).unwrap();
        assert_eq!(
            fixed.node(keys[0]).unwrap().kind(),
            NodeKind::Mutable(UnaryOp::ListB { index: ListIndex::Fixed(2) })
        );
        // Default table B is [12, 5, 17, ...].
        assert_eq!(fixed.node(keys[0]).unwrap().value(), 17.0);

        assert_eq!(state.set_list_index(keys[1], ListIndex::X).unwrap(), state);
        assert_eq!(state.set_list_index(NodeKey::from(1000), ListIndex::X).unwrap(), state);
    }
}
