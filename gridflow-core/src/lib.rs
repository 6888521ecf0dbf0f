//! Gridflow Core
//!
//! This crate provides the evaluation core for a visual dataflow language
//! whose programs run against every cell of a 2D grid using
//! spreadsheet-style relative addressing. It implements:
//!
//! - The program graph (nodes, edges, groups) and its topological scheduler
//! - Relative addressing of Source groups from a designated Sink cell
//! - Per-node evaluation with NaN as the undefined value
//! - Staged evaluation limits for both the program and the grid
//! - An immutable-snapshot Mutation API that re-evaluates after every edit
//!
//! The crate is designed to be used both as a native Rust library and, with
//! the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `graph`: node/edge arena, operators, and the scheduler
//! - `grid`: cells, coordinates, and the grid state
//! - `eval`: the addressing resolver, node evaluator, and orchestrator
//! - `state`: snapshots, edit requests, and sessions
//! - `config`: engine configuration and lookup tables
//!
//! # Example
//!
//! ```rust
//! use gridflow_core::config::EngineConfig;
//! use gridflow_core::graph::{EdgeSpec, Slot};
//! use gridflow_core::grid::Coord;
//! use gridflow_core::state::State;
//!
//! // A 6x1 grid with the value 5 locked at (2, 0)
//! let state = State::new(EngineConfig::default().with_size(6, 1))?;
//! let state = state.set_lock(2, 0, &[5.0], true)?;
//!
//! // Sink at (4, 0), reading a source two columns to its left
//! let state = state.set_sink(Coord::new(4, 0))?;
//! let (state, source) = state.add_source(Coord::new(2, 0))?;
//! let sink = state.sink_group().unwrap();
//! let from = state.graph().member(source, Slot::Channel(0)).unwrap();
//! let to = state.graph().member(sink, Slot::Channel(0)).unwrap();
//! let (state, _) = state.add_edges([EdgeSpec::new(from, to)])?;
//!
//! assert_eq!(state.value(4, 0, 0), 5.0);
//! assert!(state.value(5, 0, 0).is_nan());
//! # Ok::<(), gridflow_core::EngineError>(())
//! ```

pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod grid;
pub mod state;

#[cfg(feature = "python")]
mod python;

pub use error::{EngineError, Result};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types.
#[cfg(feature = "python")]
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyGridEngine>()?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
