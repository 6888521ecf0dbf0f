//! Relative Addressing
//!
//! Every grid cell evaluates the same program. What changes between cells
//! is the *shift*: the displacement from the sink to the cell being
//! computed. Each group sits at a fixed offset from the sink, so for a cell
//! at column `j`, row `i` and a sink at `S`:
//!
//! ```text
//! shift            = (j - S.x, i - S.y)
//! group position   = S + group offset + shift
//! ```
//!
//! The Sink group has a zero offset and therefore always resolves to the
//! cell itself. A Source group resolves wherever its offset lands, which may
//! be off the grid; in that case its positional members are undefined for
//! that cell and the pass carries on.
//!
//! Reference nodes with two incoming edges ignore the shift and address the
//! grid directly with the coordinate they are fed.

use crate::graph::Slot;
use crate::grid::{Coord, Grid, Offset};

/// Resolves group positions and grid reads for one evaluation point.
pub struct Resolver<'g> {
    grid: &'g Grid,
    sink: Option<Coord>,
    shift: Offset,
}

impl<'g> Resolver<'g> {
    /// A resolver evaluating at `shift` from the grid's sink.
    pub fn new(grid: &'g Grid, shift: Offset) -> Self {
        Self {
            grid,
            sink: grid.sink(),
            shift,
        }
    }

    /// A resolver for the cell at `cell`. `None` when no sink is placed.
    pub fn for_cell(grid: &'g Grid, cell: Coord) -> Option<Self> {
        let sink = grid.sink()?;
        Some(Self::new(grid, cell - sink))
    }

    /// The shift this resolver applies.
    pub fn shift(&self) -> Offset {
        self.shift
    }

    /// The cell being evaluated: the sink moved by the shift. `None` when no
    /// sink is placed.
    pub fn cell(&self) -> Option<Coord> {
        self.sink.map(|sink| sink + self.shift)
    }

    /// Position of a group with the given offset from the sink, or `None`
    /// when no sink is placed or the position falls off the grid.
    pub fn group_position(&self, group_offset: Offset) -> Option<Coord> {
        let coord = self.sink? + group_offset + self.shift;
        self.grid.contains(coord).then_some(coord)
    }

    /// Validate a coordinate fed in by two evaluated values.
    pub fn dynamic_position(&self, x: f64, y: f64) -> Option<Coord> {
        Coord::from_values(x, y).filter(|&coord| self.grid.contains(coord))
    }

    /// The value a member in `slot` reports for a resolved position. `X` and
    /// `Y` report the coordinate itself; `Channel(n)` reads the grid. A
    /// member without a slot reads the first channel.
    pub fn read(&self, coord: Coord, slot: Option<Slot>) -> f64 {
        match slot {
            Some(Slot::X) => coord.x as f64,
            Some(Slot::Y) => coord.y as f64,
            Some(Slot::Channel(channel)) => self.grid.value(coord, channel),
            None => self.grid.value(coord, 0),
        }
    }
}
