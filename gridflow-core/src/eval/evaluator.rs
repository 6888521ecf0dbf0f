//! Node Evaluator
//!
//! Before any cell is evaluated the sorted graph is compiled into a
//! [`Plan`]: a flat list of steps in topological order whose inputs are
//! step indices instead of keys. The per-cell pass then runs the same plan
//! once per cell with no map lookups.
//!
//! # Semantics per category
//!
//! - **Immutable**: a constant, or a grid reference resolved through its
//!   group (no inputs) or through two coordinate inputs.
//! - **Mutable / Out**: one input passed through a unary op. With no input,
//!   the `x`/`y` members of a Source group report their group's position.
//! - **Operation**: exactly two inputs, ordered left/right by port tags.
//! - **Conditional**: top = condition, left/right = branches.
//!
//! Anything malformed (wrong input count, missing branch, out-of-range
//! lookup) is undefined rather than an error.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::addressing::Resolver;
use crate::config::LookupTables;
use crate::graph::{Graph, Immutable, ListIndex, NodeKey, NodeKind, Port, Schedule, Slot, UnaryOp};
use crate::grid::{Coord, Offset};

/// One input edge, resolved to the step that produces its value.
#[derive(Debug, Clone, Copy)]
struct Input {
    step: usize,
    port: Option<Port>,
}

/// A group and the step evaluating it.
#[derive(Debug, Clone, Copy)]
struct GroupSlot {
    step: usize,
    offset: Offset,
}

/// A node ready for evaluation.
#[derive(Debug, Clone)]
struct Step {
    key: NodeKey,
    kind: NodeKind,
    slot: Option<Slot>,
    /// Index into [`Plan::groups`].
    group: Option<usize>,
    inputs: SmallVec<[Input; 3]>,
    budget: bool,
}

/// How many budget-consuming steps may evaluate before the rest are
/// forced to undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Unlimited,
    Limited(usize),
}

impl From<Option<usize>> for Budget {
    fn from(limit: Option<usize>) -> Self {
        limit.map_or(Budget::Unlimited, Budget::Limited)
    }
}

/// Reusable buffers for running a plan.
#[derive(Debug, Default)]
pub struct Scratch {
    /// Value per step. NaN is undefined.
    pub values: Vec<f64>,
    /// Resolved grid position per step.
    pub resolved: Vec<Option<Coord>>,
    /// Every grid coordinate a reference read during the run.
    pub reads: SmallVec<[Coord; 2]>,
}

/// A compiled program.
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<Step>,
    groups: Vec<GroupSlot>,
    /// `(channel, step)` for every output member of the sink.
    outputs: SmallVec<[(usize, usize); 3]>,
}

impl Plan {
    /// Compile `graph` in the order given by `schedule`.
    pub fn compile(graph: &Graph, schedule: &Schedule) -> Self {
        let order = schedule.order();
        let step_of: HashMap<NodeKey, usize> =
            order.iter().enumerate().map(|(step, &key)| (key, step)).collect();

        let mut groups = Vec::new();
        let mut group_of: HashMap<NodeKey, usize> = HashMap::new();
        for (step, &key) in order.iter().enumerate() {
            let offset = match graph.node(key).map(|node| node.kind()) {
                Some(NodeKind::Sink { .. }) => Offset::ZERO,
                Some(NodeKind::Source { offset }) => offset,
                _ => continue,
            };
            group_of.insert(key, groups.len());
            groups.push(GroupSlot { step, offset });
        }

        let sink = graph.sink_key();
        let mut steps = Vec::with_capacity(order.len());
        let mut outputs = SmallVec::new();

        for (step, &key) in order.iter().enumerate() {
            let Some(node) = graph.node(key) else {
                continue;
            };
            let inputs = graph
                .position(key)
                .map(|index| schedule.incoming(index))
                .unwrap_or_default()
                .iter()
                .filter_map(|edge| graph.edge(*edge))
                .filter_map(|edge| {
                    step_of.get(&edge.from).map(|&from| Input {
                        step: from,
                        port: edge.to_port,
                    })
                })
                .collect();

            if let (NodeKind::Out(_), Some(Slot::Channel(channel))) = (node.kind(), node.slot()) {
                if sink.is_some() && node.group() == sink {
                    outputs.push((channel, step));
                }
            }

            steps.push(Step {
                key,
                kind: node.kind(),
                slot: node.slot(),
                group: node.group().and_then(|group| group_of.get(&group).copied()),
                inputs,
                budget: node.consumes_budget(),
            });
        }

        Self { steps, groups, outputs }
    }

    /// Number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Node key evaluated by each step, in order.
    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.steps.iter().map(|step| step.key)
    }

    /// `(channel, step)` pairs naming the sink's output steps.
    pub fn outputs(&self) -> &[(usize, usize)] {
        &self.outputs
    }

    /// Step indices of the source groups.
    pub fn source_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .filter(|group| matches!(self.steps[group.step].kind, NodeKind::Source { .. }))
            .map(|group| group.step)
    }

    /// Evaluate every step at the resolver's shift.
    pub fn run(&self, resolver: &Resolver<'_>, tables: &LookupTables, budget: Budget, scratch: &mut Scratch) {
        scratch.values.clear();
        scratch.values.resize(self.steps.len(), f64::NAN);
        scratch.resolved.clear();
        scratch.resolved.resize(self.steps.len(), None);
        scratch.reads.clear();

        for group in &self.groups {
            scratch.resolved[group.step] = resolver.group_position(group.offset);
        }

        let mut consumed = 0usize;
        for (index, step) in self.steps.iter().enumerate() {
            let invalid = step.budget
                && match budget {
                    Budget::Unlimited => false,
                    Budget::Limited(limit) => {
                        let over = consumed >= limit;
                        consumed += 1;
                        over
                    }
                };
            if invalid {
                continue;
            }
            let value = self.evaluate(step, index, resolver, tables, scratch);
            scratch.values[index] = value;
        }
    }

    /// Evaluate a single step. May record a resolved position for the step
    /// and its group.
    fn evaluate(
        &self,
        step: &Step,
        index: usize,
        resolver: &Resolver<'_>,
        tables: &LookupTables,
        scratch: &mut Scratch,
    ) -> f64 {
        let values = &scratch.values;
        match step.kind {
            NodeKind::Sink { .. } | NodeKind::Source { .. } => f64::NAN,

            NodeKind::Immutable(Immutable::Constant(value)) => value,

            NodeKind::Immutable(Immutable::Reference) => {
                let position = match step.inputs.len() {
                    0 => step.group.and_then(|group| scratch.resolved[self.groups[group].step]),
                    2 => {
                        let Some((left, right)) = ordered_pair(&step.inputs) else {
                            return f64::NAN;
                        };
                        let coord = resolver.dynamic_position(values[left], values[right]);
                        if let (Some(coord), Some(group)) = (coord, step.group) {
                            scratch.resolved[self.groups[group].step] = Some(coord);
                        }
                        coord
                    }
                    _ => None,
                };
                let Some(coord) = position else {
                    return f64::NAN;
                };
                scratch.resolved[index] = Some(coord);
                if !matches!(step.slot, Some(Slot::X | Slot::Y)) {
                    scratch.reads.push(coord);
                }
                resolver.read(coord, step.slot)
            }

            NodeKind::Mutable(op) | NodeKind::Out(op) => match (bound_index(op, resolver), step.inputs.as_slice()) {
                (Some(index), _) => apply_unary(op, index, tables),
                (None, [input]) => apply_unary(op, values[input.step], tables),
                (None, []) => self.positional(step, scratch),
                (None, _) => f64::NAN,
            },

            NodeKind::Operation(op) => match ordered_pair(&step.inputs) {
                Some((left, right)) => op.apply(values[left], values[right]),
                None => f64::NAN,
            },

            NodeKind::Conditional => {
                let port = |wanted: Port| {
                    step.inputs
                        .iter()
                        .find(|input| input.port == Some(wanted))
                        .map(|input| values[input.step])
                };
                match (port(Port::Top), port(Port::Left), port(Port::Right)) {
                    (Some(condition), Some(left), Some(right)) if !condition.is_nan() => {
                        if condition != 0.0 {
                            left
                        } else {
                            right
                        }
                    }
                    _ => f64::NAN,
                }
            }
        }
    }

    /// The position an unconnected `x`/`y` member of a Source group reports.
    fn positional(&self, step: &Step, scratch: &Scratch) -> f64 {
        let Some(group) = step.group.map(|group| self.groups[group]) else {
            return f64::NAN;
        };
        if !matches!(self.steps[group.step].kind, NodeKind::Source { .. }) {
            return f64::NAN;
        }
        match (scratch.resolved[group.step], step.slot) {
            (Some(coord), Some(Slot::X)) => coord.x as f64,
            (Some(coord), Some(Slot::Y)) => coord.y as f64,
            _ => f64::NAN,
        }
    }
}

/// Order two inputs as (left, right). Untagged inputs keep edge order; a
/// right-tagged first input or left-tagged second input swaps them.
fn ordered_pair(inputs: &[Input]) -> Option<(usize, usize)> {
    let [first, second] = inputs else {
        return None;
    };
    if first.port == Some(Port::Right) || second.port == Some(Port::Left) {
        Some((second.step, first.step))
    } else {
        Some((first.step, second.step))
    }
}

/// The table index of a List op that does not read it from its input.
/// A cell-bound index is undefined when no sink is placed.
fn bound_index(op: UnaryOp, resolver: &Resolver<'_>) -> Option<f64> {
    match op.list_index()? {
        ListIndex::Input => None,
        ListIndex::Fixed(index) => Some(index as f64),
        ListIndex::X => Some(resolver.cell().map_or(f64::NAN, |cell| cell.x as f64)),
        ListIndex::Y => Some(resolver.cell().map_or(f64::NAN, |cell| cell.y as f64)),
    }
}

fn apply_unary(op: UnaryOp, value: f64, tables: &LookupTables) -> f64 {
    match op {
        UnaryOp::Identity => value,
        UnaryOp::Not if value.is_nan() => f64::NAN,
        UnaryOp::Not => {
            if value == 0.0 {
                1.0
            } else {
                0.0
            }
        }
        UnaryOp::ListA { .. } => tables.a(value).unwrap_or(f64::NAN),
        UnaryOp::ListB { .. } => tables.b(value).unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BinaryOp, EdgeSpec, NodeSpec};
    use crate::grid::Grid;

    fn constant(graph: &mut Graph, value: f64) -> NodeKey {
        graph
            .add_node(NodeSpec::new(value.to_string(), NodeKind::Immutable(Immutable::Constant(value))))
            .unwrap()
    }

    fn node(graph: &mut Graph, kind: NodeKind) -> NodeKey {
        graph.add_node(NodeSpec::new(kind.category(), kind)).unwrap()
    }

    /// Run the graph once at zero shift and return the value of `key`.
    fn value_of(graph: &Graph, key: NodeKey) -> f64 {
        let grid = Grid::new(1, 1, 1);
        let schedule = Schedule::build(graph).unwrap();
        let plan = Plan::compile(graph, &schedule);
        let mut scratch = Scratch::default();
        plan.run(&Resolver::new(&grid, Offset::ZERO), &LookupTables::default(), Budget::Unlimited, &mut scratch);
        let step = plan.keys().position(|k| k == key).unwrap();
        scratch.values[step]
    }

    #[test]
    fn addition_of_defined_operands() {
        let mut graph = Graph::new();
        let three = constant(&mut graph, 3.0);
        let four = constant(&mut graph, 4.0);
        let add = node(&mut graph, NodeKind::Operation(BinaryOp::Add));
        graph.add_edge(EdgeSpec::new(three, add)).unwrap();
        graph.add_edge(EdgeSpec::new(four, add)).unwrap();
        assert_eq!(value_of(&graph, add), 7.0);
    }

    #[test]
    fn ports_order_operands() {
        let mut graph = Graph::new();
        let ten = constant(&mut graph, 10.0);
        let two = constant(&mut graph, 2.0);
        let sub = node(&mut graph, NodeKind::Operation(BinaryOp::Sub));
        // First edge lands on the right port, so the pair is swapped.
        graph.add_edge(EdgeSpec::new(two, sub).to_port(Port::Right)).unwrap();
        graph.add_edge(EdgeSpec::new(ten, sub).to_port(Port::Left)).unwrap();
        assert_eq!(value_of(&graph, sub), 8.0);
    }

    #[test]
    fn operation_needs_exactly_two_inputs() {
        let mut graph = Graph::new();
        let one = constant(&mut graph, 1.0);
        let add = node(&mut graph, NodeKind::Operation(BinaryOp::Add));
        graph.add_edge(EdgeSpec::new(one, add)).unwrap();
        assert!(value_of(&graph, add).is_nan());
    }

    #[test]
    fn conditional_selects_branch() {
        let mut graph = Graph::new();
        let condition = constant(&mut graph, 0.0);
        let left = constant(&mut graph, 1.0);
        let right = constant(&mut graph, 2.0);
        let choose = node(&mut graph, NodeKind::Conditional);
        graph.add_edge(EdgeSpec::new(condition, choose).to_port(Port::Top)).unwrap();
        graph.add_edge(EdgeSpec::new(left, choose).to_port(Port::Left)).unwrap();
        graph.add_edge(EdgeSpec::new(right, choose).to_port(Port::Right)).unwrap();
        assert_eq!(value_of(&graph, choose), 2.0);
    }

    #[test]
    fn conditional_missing_branch_is_undefined() {
        let mut graph = Graph::new();
        let condition = constant(&mut graph, 1.0);
        let left = constant(&mut graph, 1.0);
        let choose = node(&mut graph, NodeKind::Conditional);
        graph.add_edge(EdgeSpec::new(condition, choose).to_port(Port::Top)).unwrap();
        graph.add_edge(EdgeSpec::new(left, choose).to_port(Port::Left)).unwrap();
        assert!(value_of(&graph, choose).is_nan());
    }

    #[test]
    fn unary_transforms() {
        let tables = LookupTables::new(vec![5.0, 6.0], vec![7.0]);
        assert_eq!(apply_unary(UnaryOp::Identity, 3.0, &tables), 3.0);
        assert_eq!(apply_unary(UnaryOp::Not, 0.0, &tables), 1.0);
        assert_eq!(apply_unary(UnaryOp::Not, 2.0, &tables), 0.0);
        assert!(apply_unary(UnaryOp::Not, f64::NAN, &tables).is_nan());
        let list_a = UnaryOp::ListA { index: ListIndex::Input };
        let list_b = UnaryOp::ListB { index: ListIndex::Input };
        assert_eq!(apply_unary(list_a, 1.0, &tables), 6.0);
        assert!(apply_unary(list_a, 2.0, &tables).is_nan());
        assert_eq!(apply_unary(list_b, 0.0, &tables), 7.0);
    }

    #[test]
    fn mutable_without_input_is_undefined_outside_sources() {
        let mut graph = Graph::new();
        let free = node(&mut graph, NodeKind::Mutable(UnaryOp::Identity));
        assert!(value_of(&graph, free).is_nan());
    }

    #[test]
    fn budget_invalidates_later_steps() {
        let mut graph = Graph::new();
        let one = constant(&mut graph, 1.0);
        let a = node(&mut graph, NodeKind::Mutable(UnaryOp::Identity));
        let b = node(&mut graph, NodeKind::Mutable(UnaryOp::Identity));
        graph.add_edge(EdgeSpec::new(one, a)).unwrap();
        graph.add_edge(EdgeSpec::new(a, b)).unwrap();

        let grid = Grid::new(1, 1, 1);
        let schedule = Schedule::build(&graph).unwrap();
        let plan = Plan::compile(&graph, &schedule);
        let mut scratch = Scratch::default();
        plan.run(&Resolver::new(&grid, Offset::ZERO), &LookupTables::default(), Budget::Limited(1), &mut scratch);

        let values: Vec<f64> = scratch.values.clone();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[1], 1.0);
        assert!(values[2].is_nan());
    }

    #[test]
    fn bound_list_index_ignores_input() {
        let mut graph = Graph::new();
        let one = constant(&mut graph, 1.0);
        let fixed = node(&mut graph, NodeKind::Mutable(UnaryOp::ListA { index: ListIndex::Fixed(3) }));
        let wired = node(&mut graph, NodeKind::Mutable(UnaryOp::ListA { index: ListIndex::Input }));
        let by_x = node(&mut graph, NodeKind::Mutable(UnaryOp::ListA { index: ListIndex::X }));
        graph.add_edge(EdgeSpec::new(one, fixed)).unwrap();
        graph.add_edge(EdgeSpec::new(one, wired)).unwrap();

        // Default table A is [3, 7, 1, 9, ...]. No sink is placed here.
        assert_eq!(value_of(&graph, fixed), 9.0);
        assert_eq!(value_of(&graph, wired), 7.0);
        assert!(value_of(&graph, by_x).is_nan());
    }
}
