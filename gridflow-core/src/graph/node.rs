//! Graph Nodes
//!
//! This module defines the node types that make up a program: group nodes
//! (the Sink and each Source), their positional members, and the
//! value-producing nodes a user wires between them.
//!
//! Node categories and operators are closed enums. The UI layer speaks in
//! operator names (`"Addition"`, `"List A"`, ...); those convert through
//! `FromStr` and `Display` so an unknown name is rejected at the boundary
//! instead of silently evaluating to undefined.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::grid::{Coord, Offset};

/// Unique identifier for a node in the program graph.
///
/// Keys are assigned by the owning [`Graph`](super::Graph) in increasing
/// order and never reused, so two independently edited snapshots number
/// their nodes the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey(u64);

impl NodeKey {
    /// Get the raw key value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeKey {
    fn from(key: u64) -> Self {
        Self(key)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error returned when an operator name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operator name {0:?}")]
pub struct UnknownOperator(pub String);

/// Error returned when a list index selection is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid list index {0:?}, expected a table position, \"x\", \"y\" or \"input\"")]
pub struct InvalidListIndex(pub String);

/// Where a List node takes its table index from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListIndex {
    /// The node's single input.
    #[default]
    Input,
    /// A fixed table position. Any input is ignored.
    Fixed(usize),
    /// The column of the cell being evaluated.
    X,
    /// The row of the cell being evaluated.
    Y,
}

impl FromStr for ListIndex {
    type Err = InvalidListIndex;

    /// Parses the selections a list context menu offers: a table position,
    /// `x`, `y`, or `input` to go back to the wired index.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "input" => Ok(ListIndex::Input),
            "x" => Ok(ListIndex::X),
            "y" => Ok(ListIndex::Y),
            other => other
                .parse()
                .map(ListIndex::Fixed)
                .map_err(|_| InvalidListIndex(other.to_string())),
        }
    }
}

/// Single-input transforms applied by Mutable and Out nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Pass the dependency through unchanged.
    #[default]
    Identity,
    /// Logical negation: 1 if the input is zero, otherwise 0.
    Not,
    /// Look up table A.
    ListA {
        #[serde(default)]
        index: ListIndex,
    },
    /// Look up table B.
    ListB {
        #[serde(default)]
        index: ListIndex,
    },
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Identity => "Identity",
            UnaryOp::Not => "Not",
            UnaryOp::ListA { .. } => "List A",
            UnaryOp::ListB { .. } => "List B",
        }
    }

    /// The index source of a List op.
    pub fn list_index(&self) -> Option<ListIndex> {
        match self {
            UnaryOp::ListA { index } | UnaryOp::ListB { index } => Some(*index),
            _ => None,
        }
    }

    /// The same List op reading its index from `index`. `None` for ops that
    /// are not lists.
    pub fn with_list_index(self, index: ListIndex) -> Option<Self> {
        match self {
            UnaryOp::ListA { .. } => Some(UnaryOp::ListA { index }),
            UnaryOp::ListB { .. } => Some(UnaryOp::ListB { index }),
            _ => None,
        }
    }
}

impl FromStr for UnaryOp {
    type Err = UnknownOperator;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "Identity" => Ok(UnaryOp::Identity),
            "Not" => Ok(UnaryOp::Not),
            "List A" => Ok(UnaryOp::ListA { index: ListIndex::Input }),
            "List B" => Ok(UnaryOp::ListB { index: ListIndex::Input }),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Two-input operators applied by Operation nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,

    // Logic
    Or,
    And,

    // Comparison
    Eq,
    Lt,
    Le,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Addition",
            BinaryOp::Sub => "Subtraction",
            BinaryOp::Mul => "Multiplication",
            BinaryOp::Div => "Division",
            BinaryOp::Mod => "Modulo",
            BinaryOp::Min => "Min",
            BinaryOp::Max => "Max",
            BinaryOp::Or => "Or",
            BinaryOp::And => "And",
            BinaryOp::Eq => "Equal",
            BinaryOp::Lt => "Less Than",
            BinaryOp::Le => "Less Than or Equal",
        }
    }

    /// Apply the operator. NaN is the undefined value.
    ///
    /// Every operator except `Or` propagates undefined. `Or` treats an
    /// undefined operand as zero, so two undefined operands yield a defined 0.
    pub fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        if *self == BinaryOp::Or {
            let l = !lhs.is_nan() && lhs != 0.0;
            let r = !rhs.is_nan() && rhs != 0.0;
            return truth(l || r);
        }
        if lhs.is_nan() || rhs.is_nan() {
            return f64::NAN;
        }
        let result = match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::Mul => lhs * rhs,
            BinaryOp::Div => lhs / rhs,
            BinaryOp::Mod => lhs % rhs,
            BinaryOp::Min => lhs.min(rhs),
            BinaryOp::Max => lhs.max(rhs),
            BinaryOp::And => truth(lhs != 0.0 && rhs != 0.0),
            BinaryOp::Eq => truth(lhs == rhs),
            BinaryOp::Lt => truth(lhs < rhs),
            BinaryOp::Le => truth(lhs <= rhs),
            BinaryOp::Or => unreachable!("handled above"),
        };
        if result.is_finite() {
            result
        } else {
            f64::NAN
        }
    }
}

impl FromStr for BinaryOp {
    type Err = UnknownOperator;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(match name {
            "Addition" => BinaryOp::Add,
            "Subtraction" => BinaryOp::Sub,
            "Multiplication" => BinaryOp::Mul,
            "Division" => BinaryOp::Div,
            "Modulo" => BinaryOp::Mod,
            "Min" => BinaryOp::Min,
            "Max" => BinaryOp::Max,
            "Or" => BinaryOp::Or,
            "And" => BinaryOp::And,
            "Equal" => BinaryOp::Eq,
            "Less Than" => BinaryOp::Lt,
            "Less Than or Equal" => BinaryOp::Le,
            other => return Err(UnknownOperator(other.to_string())),
        })
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an Immutable node produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Immutable {
    /// A literal. Never resolves a coordinate.
    Constant(f64),
    /// A grid reference resolved through the node's group, or through two
    /// incoming coordinate edges.
    Reference,
}

/// The role a member node plays inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    X,
    Y,
    /// Value channel, zero-based.
    Channel(usize),
}

impl Slot {
    /// The display name for a member in this slot.
    pub fn name(&self) -> String {
        match self {
            Slot::X => "x".to_string(),
            Slot::Y => "y".to_string(),
            Slot::Channel(n) => format!("val{}", n + 1),
        }
    }
}

/// The category of a node, with its category-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The sink group. `table` is the sink placement once one is set.
    Sink { table: Option<Coord> },

    /// A source group at a fixed displacement from the sink.
    Source { offset: Offset },

    /// A constant or a grid reference.
    Immutable(Immutable),

    /// A single-input transform.
    Mutable(UnaryOp),

    /// A terminal single-input transform. Out members of the sink are the
    /// program's outputs.
    Out(UnaryOp),

    /// A two-input operator.
    Operation(BinaryOp),

    /// Selects between a left and right branch on a top condition. Both
    /// branches must be connected even though only one is read.
    Conditional,
}

impl NodeKind {
    /// Whether this node is a Sink or Source group.
    pub fn is_group(&self) -> bool {
        matches!(self, NodeKind::Sink { .. } | NodeKind::Source { .. })
    }

    /// Short category name, as the UI labels node templates.
    pub fn category(&self) -> &'static str {
        match self {
            NodeKind::Sink { .. } => "sink",
            NodeKind::Source { .. } => "source",
            NodeKind::Immutable(_) => "immutable",
            NodeKind::Mutable(_) => "mutable",
            NodeKind::Out(_) => "out",
            NodeKind::Operation(_) => "operation",
            NodeKind::Conditional => "conditional",
        }
    }
}

/// A node in the program graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique key for this node.
    key: NodeKey,

    /// Display name.
    name: String,

    /// Category and payload.
    kind: NodeKind,

    /// Owning group, if this node is a group member.
    group: Option<NodeKey>,

    /// Role inside the owning group.
    slot: Option<Slot>,

    /// Value from the last preview pass. NaN means undefined.
    value: f64,

    /// Grid position resolved by the last preview pass (groups and
    /// reference members only).
    resolved: Option<Coord>,
}

impl Node {
    /// Create a node. Its value starts undefined.
    pub(crate) fn new(key: NodeKey, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            key,
            name: name.into(),
            kind,
            group: None,
            slot: None,
            value: f64::NAN,
            resolved: None,
        }
    }

    pub(crate) fn with_group(mut self, group: Option<NodeKey>) -> Self {
        self.group = group;
        self
    }

    pub(crate) fn with_slot(mut self, slot: Option<Slot>) -> Self {
        self.slot = slot;
        self
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn group(&self) -> Option<NodeKey> {
        self.group
    }

    pub fn slot(&self) -> Option<Slot> {
        self.slot
    }

    /// Preview value; NaN when undefined.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn resolved(&self) -> Option<Coord> {
        self.resolved
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// Whether the node counts against the preview budget. Only groups and
    /// Immutable nodes are exempt; the sink's outputs and a source's `x`/`y`
    /// members count like any other node.
    pub fn consumes_budget(&self) -> bool {
        !self.is_group() && !matches!(self.kind, NodeKind::Immutable(_))
    }

    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    pub(crate) fn set_preview(&mut self, value: f64, resolved: Option<Coord>) {
        self.value = value;
        self.resolved = resolved;
    }
}

/// Undefined preview values compare equal.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.name == other.name
            && self.kind == other.kind
            && self.group == other.group
            && self.slot == other.slot
            && self.value.to_bits() == other.value.to_bits()
            && self.resolved == other.resolved
    }
}
