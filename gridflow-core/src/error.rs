//! Engine Errors
//!
//! Every rejection the engine can produce. A rejected edit never touches the
//! caller's snapshot, so all of these are recoverable.
//!
//! Undefined values (NaN) are deliberately *not* errors: a missing dependency
//! or an out-of-range lookup yields NaN for that node and evaluation carries
//! on for the rest of the grid.

use thiserror::Error;

use crate::graph::NodeKey;
use crate::grid::Coord;

/// Errors returned by the Mutation API and the evaluation orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The dependency graph contains at least one cycle.
    ///
    /// `residual` lists every node Kahn's algorithm could not order; these
    /// are the cycle participants and anything downstream of them.
    #[error("dependency cycle detected ({} unordered nodes)", .residual.len())]
    Cycle { residual: Vec<NodeKey> },

    /// A sink or source would be placed outside the grid.
    #[error("coordinate {coord} lies outside the {width}x{height} grid")]
    OutOfBounds {
        coord: Coord,
        width: usize,
        height: usize,
    },

    /// A source was requested before any sink was placed.
    #[error("no sink has been placed")]
    SinkUnset,

    /// An edge or node spec referenced a node that does not exist.
    #[error("node {0} does not exist")]
    UnknownNode(NodeKey),

    /// A node spec named a parent that is not a Sink or Source group.
    #[error("node {0} is not a group")]
    UnknownGroup(NodeKey),

    /// Sink and Source groups are created by `set_sink` / `add_source`,
    /// never through `add_nodes`.
    #[error("group nodes cannot be added directly")]
    GroupNode,

    /// A resize to a zero-width or zero-height grid.
    #[error("grid dimensions must be positive, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },

    /// The requested number of value channels is unsupported.
    #[error("channel count must be between 1 and {max}, got {requested}")]
    ChannelCount { requested: usize, max: usize },

    /// More values were supplied to a cell than it has channels.
    #[error("cell accepts {max} values, got {given}")]
    TooManyValues { given: usize, max: usize },
}

impl EngineError {
    /// A stable reason code for surfacing the rejection in a UI.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Cycle { .. } => "cyclic-graph",
            EngineError::OutOfBounds { .. } => "out-of-bounds",
            EngineError::SinkUnset => "sink-unset",
            EngineError::UnknownNode(_) => "unknown-node",
            EngineError::UnknownGroup(_) => "unknown-group",
            EngineError::GroupNode => "group-node",
            EngineError::EmptyGrid { .. } => "empty-grid",
            EngineError::ChannelCount { .. } => "channel-count",
            EngineError::TooManyValues { .. } => "too-many-values",
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
