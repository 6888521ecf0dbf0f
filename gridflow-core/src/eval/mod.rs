//! Evaluation
//!
//! One full evaluation of a snapshot:
//!
//! 1. **Sort.** The scheduler orders the program. A cycle aborts the whole
//!    evaluation before anything is written.
//!
//! 2. **Per-cell pass.** Every unlocked cell is reset to undefined, then
//!    cells are visited in row-major order. Each visited cell runs the whole
//!    program shifted to that cell and stores the sink's outputs into its
//!    channels. Locked cells are skipped and keep their values; cells at or
//!    past `rhs_step` stay undefined. Reads see the cells already written in
//!    this pass, so a snapshot always evaluates to the same grid.
//!
//! 3. **Preview pass.** The program runs once more at zero shift, with at
//!    most `lhs_step` budget-consuming nodes allowed to evaluate. The results
//!    become the node values shown while a program is being built.
//!
//! Evaluation mutates the graph and grid it is handed. The Mutation API
//! only ever hands it private copies, which is what keeps a failed
//! evaluation from touching the caller's snapshot.

mod addressing;
mod evaluator;

pub use addressing::Resolver;
pub use evaluator::{Budget, Plan, Scratch};

use tracing::{debug, trace};

use crate::config::LookupTables;
use crate::error::Result;
use crate::graph::{Graph, Schedule};
use crate::grid::{Grid, Offset};

/// What a completed evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalReport {
    /// Nodes in the evaluated program.
    pub nodes: usize,
    /// Cells the per-cell pass computed.
    pub cells: usize,
}

/// Run a full evaluation, writing cell channels into `grid` and preview
/// values into `graph`.
pub fn evaluate(graph: &mut Graph, grid: &mut Grid, tables: &LookupTables) -> Result<EvalReport> {
    let schedule = Schedule::build(graph)?;
    let plan = Plan::compile(graph, &schedule);
    let mut scratch = Scratch::default();

    let cells = cell_pass(&plan, grid, tables, &mut scratch);
    preview_pass(&plan, graph, grid, tables, &mut scratch);

    let report = EvalReport {
        nodes: plan.step_count(),
        cells,
    };
    debug!(nodes = report.nodes, cells = report.cells, "evaluation complete");
    Ok(report)
}

/// Compute every cell within the `rhs_step` budget. Returns the number of
/// cells evaluated.
fn cell_pass(plan: &Plan, grid: &mut Grid, tables: &LookupTables, scratch: &mut Scratch) -> usize {
    grid.reset();
    if grid.sink().is_none() {
        trace!("no sink placed, skipping per-cell pass");
        return 0;
    }

    let limit = grid.rhs_step().unwrap_or(usize::MAX).min(grid.cells().len());
    let channel_count = grid.channel_count();
    let mut evaluated = 0;

    for index in 0..limit {
        let cell = &grid.cells()[index];
        if cell.locked {
            continue;
        }
        let Some(resolver) = Resolver::for_cell(grid, cell.coord) else {
            break;
        };
        plan.run(&resolver, tables, Budget::Unlimited, scratch);

        let target = &mut grid.cells_mut()[index];
        for &(channel, step) in plan.outputs() {
            if channel < channel_count {
                target.channels[channel] = scratch.values[step];
            }
        }
        target.sources = scratch.reads.clone();
        evaluated += 1;
    }

    trace!(evaluated, limit, "per-cell pass complete");
    evaluated
}

/// Evaluate at the sink itself under the `lhs_step` budget and publish the
/// results on the graph.
fn preview_pass(plan: &Plan, graph: &mut Graph, grid: &mut Grid, tables: &LookupTables, scratch: &mut Scratch) {
    let resolver = Resolver::new(grid, Offset::ZERO);
    plan.run(&resolver, tables, grid.lhs_step().into(), scratch);

    let sources = plan.source_steps().filter_map(|step| scratch.resolved[step]).collect();
    grid.set_sources(sources);

    for (step, key) in plan.keys().enumerate() {
        if let Some(node) = graph.node_mut(key) {
            node.set_preview(scratch.values[step], scratch.resolved[step]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeSpec, Immutable, NodeKind, NodeSpec, Slot, UnaryOp};
    use crate::grid::Coord;

    /// A sink group with one output fed by a constant.
    fn constant_program(value: f64) -> Graph {
        let mut graph = Graph::new();
        let sink = graph.insert_node(NodeSpec::new("Sink", NodeKind::Sink { table: None }));
        let out = graph.insert_node(
            NodeSpec::new("val1", NodeKind::Out(UnaryOp::Identity)).in_group(sink, Some(Slot::Channel(0))),
        );
        let constant = graph
            .add_node(NodeSpec::new("c", NodeKind::Immutable(Immutable::Constant(value))))
            .unwrap();
        graph.add_edge(EdgeSpec::new(constant, out)).unwrap();
        graph
    }

    #[test]
    fn constant_fills_every_cell() {
        let mut graph = constant_program(2.0);
        let mut grid = Grid::new(3, 2, 1);
        grid.set_sink(Some(Coord::new(0, 0)));

        let report = evaluate(&mut graph, &mut grid, &LookupTables::default()).unwrap();
        assert_eq!(report.cells, 6);
        assert_eq!(report.nodes, 3);
        assert!(grid.cells().iter().all(|cell| cell.channels[0] == 2.0));
    }

    #[test]
    fn rhs_step_limits_cells() {
        let mut graph = constant_program(2.0);
        let mut grid = Grid::new(3, 2, 1);
        grid.set_sink(Some(Coord::new(0, 0)));
        grid.set_steps(None, Some(4));

        evaluate(&mut graph, &mut grid, &LookupTables::default()).unwrap();
        let values: Vec<f64> = grid.cells().iter().map(|cell| cell.channels[0]).collect();
        assert_eq!(&values[..4], &[2.0, 2.0, 2.0, 2.0]);
        assert!(values[4].is_nan() && values[5].is_nan());
    }

    #[test]
    fn locked_cells_are_skipped() {
        let mut graph = constant_program(2.0);
        let mut grid = Grid::new(2, 1, 1);
        grid.set_sink(Some(Coord::new(0, 0)));
        grid.write_cell(Coord::new(1, 0), &[9.0], true).unwrap();

        let report = evaluate(&mut graph, &mut grid, &LookupTables::default()).unwrap();
        assert_eq!(report.cells, 1);
        assert_eq!(grid.value(Coord::new(1, 0), 0), 9.0);
    }

    #[test]
    fn no_sink_leaves_cells_undefined() {
        let mut graph = constant_program(2.0);
        let mut grid = Grid::new(2, 2, 1);
        let report = evaluate(&mut graph, &mut grid, &LookupTables::default()).unwrap();
        assert_eq!(report.cells, 0);
        assert!(grid.cells().iter().all(|cell| cell.channels[0].is_nan()));
    }

    #[test]
    fn preview_values_land_on_nodes() {
        let mut graph = constant_program(5.0);
        let mut grid = Grid::new(1, 1, 1);
        grid.set_sink(Some(Coord::new(0, 0)));
        evaluate(&mut graph, &mut grid, &LookupTables::default()).unwrap();

        let out = graph.nodes().find(|node| node.name() == "val1").unwrap();
        assert_eq!(out.value(), 5.0);
    }
}
