//! Python Bindings
//!
//! Exposes a [`Session`] to Python as `GridEngine`, for front ends written
//! in Python. Built only with the `python` feature.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{InvalidListIndex, ListIndex, NodeKey};
use crate::grid::Coord;
use crate::state::{Edit, Session, State};

fn to_py_err(err: EngineError) -> PyErr {
    PyValueError::new_err(format!("{}: {}", err.code(), err))
}

/// Python-exposed engine session.
#[pyclass(name = "GridEngine")]
pub struct PyGridEngine {
    session: Session,
}

#[pymethods]
impl PyGridEngine {
    /// Create an engine with an empty grid and an unplaced sink.
    #[new]
    #[pyo3(signature = (width = 20, height = 12, channels = 1))]
    fn new(width: usize, height: usize, channels: usize) -> PyResult<Self> {
        let config = EngineConfig::default()
            .with_size(width, height)
            .with_channels(channels);
        let state = State::new(config).map_err(to_py_err)?;
        Ok(Self {
            session: Session::new(state),
        })
    }

    fn set_sink(&self, x: i64, y: i64) -> PyResult<()> {
        self.apply(Edit::SetSink(Coord::new(x, y)))
    }

    /// Add a source and return its group key.
    fn add_source(&self, x: i64, y: i64) -> PyResult<u64> {
        let group = self
            .session
            .edit(|state| state.add_source(Coord::new(x, y)))
            .map_err(to_py_err)?;
        Ok(group.raw())
    }

    /// Select a List node's index: a table position, "x", "y" or "input".
    fn set_list_index(&self, node: u64, index: &str) -> PyResult<()> {
        let index: ListIndex = index.parse().map_err(|e: InvalidListIndex| PyValueError::new_err(e.to_string()))?;
        self.apply(Edit::SetListIndex {
            node: NodeKey::from(node),
            index,
        })
    }

    #[pyo3(signature = (x, y, values, locked = true))]
    fn set_lock(&self, x: i64, y: i64, values: Vec<f64>, locked: bool) -> PyResult<()> {
        self.apply(Edit::SetLock { x, y, values, locked })
    }

    fn resize(&self, width: usize, height: usize) -> PyResult<()> {
        self.session
            .edit(|state| state.resize(width, height).map(|state| (state, ())))
            .map_err(to_py_err)
    }

    #[pyo3(signature = (lhs = None, rhs = None))]
    fn set_steps(&self, lhs: Option<usize>, rhs: Option<usize>) -> PyResult<()> {
        self.apply(Edit::SetSteps { lhs, rhs })
    }

    fn set_channel_count(&self, channels: usize) -> PyResult<()> {
        self.apply(Edit::SetChannelCount(channels))
    }

    /// Apply an edit encoded as JSON, e.g. `{"ResizeX": 8}`.
    fn apply_json(&self, edit: &str) -> PyResult<()> {
        let edit: Edit = serde_json::from_str(edit)
            .map_err(|e| PyValueError::new_err(format!("edit parse error: {}", e)))?;
        self.apply(edit)
    }

    /// One channel of the grid as a list of rows. Undefined cells are NaN.
    fn channel_values(&self, channel: usize) -> Vec<Vec<f64>> {
        let state = self.session.snapshot();
        let grid = state.grid();
        grid.cells()
            .chunks(grid.width())
            .map(|row| row.iter().map(|cell| grid.value(cell.coord, channel)).collect())
            .collect()
    }
}

impl PyGridEngine {
    fn apply(&self, edit: Edit) -> PyResult<()> {
        self.session.apply(edit).map(|_| ()).map_err(to_py_err)
    }
}
