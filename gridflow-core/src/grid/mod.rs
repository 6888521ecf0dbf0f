//! Grid State
//!
//! The right-hand side of the program: a rectangular array of cells, each
//! holding up to three value channels and a lock flag, plus the sink and
//! source placements and the two staged-evaluation limits.
//!
//! Cells are stored row-major, so cell `(x, y)` lives at `y * width + x`.
//! That is also the order the per-cell pass visits them in, which is what
//! `rhs_step` counts.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::MAX_CHANNELS;
use crate::error::{EngineError, Result};

/// A grid coordinate. Signed so that shifted coordinates which fall off the
/// grid are still representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub x: i64,
    pub y: i64,
}

impl Coord {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Convert a pair of evaluated values into a coordinate. Both must be
    /// finite integers.
    pub fn from_values(x: f64, y: f64) -> Option<Self> {
        let integral = |v: f64| v.is_finite() && v.fract() == 0.0;
        if integral(x) && integral(y) {
            Some(Self::new(x as i64, y as i64))
        } else {
            None
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A displacement between two coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub dx: i64,
    pub dy: i64,
}

impl Offset {
    pub const ZERO: Offset = Offset { dx: 0, dy: 0 };

    pub const fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }
}

impl Add<Offset> for Coord {
    type Output = Coord;

    fn add(self, rhs: Offset) -> Coord {
        Coord::new(self.x + rhs.dx, self.y + rhs.dy)
    }
}

impl Add for Offset {
    type Output = Offset;

    fn add(self, rhs: Offset) -> Offset {
        Offset::new(self.dx + rhs.dx, self.dy + rhs.dy)
    }
}

impl Sub for Coord {
    type Output = Offset;

    fn sub(self, rhs: Coord) -> Offset {
        Offset::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// One cell of the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub coord: Coord,
    /// Output channels. NaN means undefined. A locked cell keeps values in
    /// channels beyond the grid's channel count; [`Grid::value`] hides them.
    pub channels: [f64; MAX_CHANNELS],
    /// Locked cells keep their channels through every recomputation.
    pub locked: bool,
    /// Coordinates read by reference nodes while this cell was evaluated.
    pub sources: SmallVec<[Coord; 2]>,
}

impl Cell {
    /// An unlocked cell with every channel undefined.
    pub fn undefined(coord: Coord) -> Self {
        Self {
            coord,
            channels: [f64::NAN; MAX_CHANNELS],
            locked: false,
            sources: SmallVec::new(),
        }
    }

    /// Value of a channel, NaN for channels past the end.
    pub fn channel(&self, channel: usize) -> f64 {
        self.channels.get(channel).copied().unwrap_or(f64::NAN)
    }

    /// Forget computed values. Locked cells only drop their hover sources.
    fn reset(&mut self) {
        if !self.locked {
            self.channels = [f64::NAN; MAX_CHANNELS];
        }
        self.sources.clear();
    }
}

/// Undefined compares equal to undefined, so two evaluations of the same
/// snapshot compare equal.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.coord == other.coord
            && self.locked == other.locked
            && self.sources == other.sources
            && self
                .channels
                .iter()
                .zip(other.channels.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// The grid of cells plus placement and staging metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    sink: Option<Coord>,
    sources: Vec<Coord>,
    lhs_step: Option<usize>,
    rhs_step: Option<usize>,
    channel_count: usize,
}

impl Grid {
    /// Create a grid of undefined, unlocked cells.
    pub fn new(width: usize, height: usize, channel_count: usize) -> Self {
        let cells = (0..height)
            .flat_map(|y| (0..width).map(move |x| Cell::undefined(Coord::new(x as i64, y as i64))))
            .collect();
        Self {
            width,
            height,
            cells,
            sink: None,
            sources: Vec::new(),
            lhs_step: None,
            rhs_step: None,
            channel_count,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of active value channels.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// The sink placement, if any.
    pub fn sink(&self) -> Option<Coord> {
        self.sink
    }

    /// Source placements resolved by the last preview pass.
    pub fn sources(&self) -> &[Coord] {
        &self.sources
    }

    pub fn lhs_step(&self) -> Option<usize> {
        self.lhs_step
    }

    pub fn rhs_step(&self) -> Option<usize> {
        self.rhs_step
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Whether `coord` lies inside the grid.
    pub fn contains(&self, coord: Coord) -> bool {
        self.index_of(coord).is_some()
    }

    /// Row-major index of `coord`, if it lies inside the grid.
    pub fn index_of(&self, coord: Coord) -> Option<usize> {
        let x = usize::try_from(coord.x).ok()?;
        let y = usize::try_from(coord.y).ok()?;
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    pub fn cell(&self, coord: Coord) -> Option<&Cell> {
        self.index_of(coord).map(|index| &self.cells[index])
    }

    /// Channel value at `coord`, NaN when off the grid or when the channel
    /// is not active.
    pub fn value(&self, coord: Coord, channel: usize) -> f64 {
        if channel >= self.channel_count {
            return f64::NAN;
        }
        self.cell(coord).map_or(f64::NAN, |cell| cell.channel(channel))
    }

    /// Reject coordinates outside the grid.
    pub fn check_bounds(&self, coord: Coord) -> Result<()> {
        if self.contains(coord) {
            Ok(())
        } else {
            Err(EngineError::OutOfBounds {
                coord,
                width: self.width,
                height: self.height,
            })
        }
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub(crate) fn set_sink(&mut self, sink: Option<Coord>) {
        self.sink = sink;
    }

    pub(crate) fn set_sources(&mut self, sources: Vec<Coord>) {
        self.sources = sources;
    }

    pub(crate) fn set_steps(&mut self, lhs: Option<usize>, rhs: Option<usize>) {
        self.lhs_step = lhs;
        self.rhs_step = rhs;
    }

    /// Change the active channel count. Stored values are left alone, so a
    /// locked cell gets its hidden channels back when they are reactivated.
    pub(crate) fn set_channel_count(&mut self, channel_count: usize) {
        self.channel_count = channel_count;
    }

    /// Write `values` into the leading channels of a cell and set its lock
    /// flag. Remaining active channels keep their current values.
    pub(crate) fn write_cell(&mut self, coord: Coord, values: &[f64], locked: bool) -> Result<()> {
        if values.len() > self.channel_count {
            return Err(EngineError::TooManyValues {
                given: values.len(),
                max: self.channel_count,
            });
        }
        let index = self.index_of(coord).ok_or(EngineError::OutOfBounds {
            coord,
            width: self.width,
            height: self.height,
        })?;
        let cell = &mut self.cells[index];
        cell.channels[..values.len()].copy_from_slice(values);
        cell.locked = locked;
        Ok(())
    }

    /// Reset every cell ahead of a per-cell pass.
    pub(crate) fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.reset();
        }
    }

    /// A copy of this grid at a new size. Cells whose coordinates remain in
    /// range keep their contents; new cells are undefined and unlocked.
    pub fn resized(&self, width: usize, height: usize) -> Self {
        let cells = (0..height)
            .flat_map(|y| (0..width).map(move |x| Coord::new(x as i64, y as i64)))
            .map(|coord| self.cell(coord).cloned().unwrap_or_else(|| Cell::undefined(coord)))
            .collect();
        Self {
            width,
            height,
            cells,
            sink: self.sink,
            sources: self.sources.clone(),
            lhs_step: self.lhs_step,
            rhs_step: self.rhs_step,
            channel_count: self.channel_count,
        }
    }
}
