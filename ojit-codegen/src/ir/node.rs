//! IR node kinds.
//!
//! A [`Node`] is every value or control point in the graph: a closed set of
//! kinds, an ordered list of inputs, and the reverse list of users that read
//! it. The closed set keeps analysis passes simple match statements instead
//! of open-ended dynamic dispatch — see the design notes on polymorphism over
//! node kinds.

use crate::ir::entities::{BlockId, NodeId};
use smallvec::SmallVec;
use std::rc::Rc;

/// Binary arithmetic, bitwise, and comparison operators.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    BitAnd,
}

/// Unary arithmetic and logical operators.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UnaryOperator {
    Neg,
    Not,
}

/// A constant value carried by a `Constant` node.
///
/// Integers are kept as `i64` for header room but range analysis (§4.4.7)
/// saturates to the 32-bit domain [`crate::range::Range`] describes; floats
/// only arise from division semantics (§4.4.1) and are never folded further.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ConstantValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ConstantValue {
    /// This constant as an `i64`, if it is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstantValue::Int(v) => Some(*v),
            ConstantValue::Bool(b) => Some(*b as i64),
            ConstantValue::Float(_) => None,
        }
    }
}

/// An interned property or variable-slot name.
pub type PropertyName = Rc<str>;

/// What kind of runtime fact a [`NodeKind::Guard`] is checking.
#[derive(Clone, PartialEq, Debug)]
pub enum GuardCheck {
    /// The checked value must have the named runtime type.
    Type(Rc<str>),
    /// The checked object must have the given hidden shape.
    Shape(u32),
    /// The checked value must fall within this range.
    Range(crate::range::Range),
    /// The checked value must not be null/undefined.
    NonNull,
}

/// The sentinel callee name the IR builder uses for a bounds check, so the
/// bounds-check elimination pass (§4.4.8) can recognize it structurally.
///
/// Per §9's open design note, a production design would give bounds checks
/// their own `NodeKind` rather than overloading `Call`; we keep the Call
/// encoding because it's what the source actually does and match on the
/// callee name instead of inventing a thirteenth node kind outside the
/// closed set in §3.
pub const BOUNDS_CHECK_CALLEE: &str = "bounds_check";

/// The sentinel callee name the polymorphic inline-cache lowering pass
/// (§4.4.9) uses to query an object's hidden shape as an ordinary integer
/// value, so a shape-check chain can compare it with `BinaryOp(Eq)` the same
/// way any other dispatch condition is built. Same Call-encoding rationale
/// as [`BOUNDS_CHECK_CALLEE`].
pub const SHAPE_OF_CALLEE: &str = "object_shape";

/// The closed set of node kinds forming the IR.
#[derive(Clone, PartialEq, Debug)]
pub enum NodeKind {
    /// A compile-time constant. No inputs.
    Constant(ConstantValue),
    /// The `index`-th incoming argument to the compiled function. No inputs.
    Parameter(u32),
    /// `inputs[0] op inputs[1]`.
    BinaryOp(BinaryOperator),
    /// `op inputs[0]`.
    UnaryOp(UnaryOperator),
    /// Merges one value per predecessor of its owning block, in predecessor
    /// order. `inputs[i]` is the reaching value from `block.preds[i]`.
    Phi,
    /// Reads property `name` off `inputs[0]`.
    LoadProperty(PropertyName),
    /// Writes `inputs[1]` to property `name` on `inputs[0]`.
    StoreProperty(PropertyName),
    /// Calls `callee` with `inputs` as arguments. Side-effecting.
    Call { callee: Rc<str> },
    /// Returns `inputs.get(0)`, or nothing for a `void` return.
    Return,
    /// Branches on `inputs[0]`; the taken/not-taken blocks are the owning
    /// block's two successors, not inputs.
    Branch,
    /// Marks a control-flow merge point at the head of a block with more
    /// than one predecessor. No data inputs; exists so guards and calls have
    /// something to serialize against at block entry.
    Merge,
    /// A speculative check. Side-effecting: a live root for DCE, and a
    /// deoptimization trigger exists for every guard. `inputs[0]` is the
    /// value being protected.
    Guard(GuardCheck),
}

impl NodeKind {
    /// Does this node have an observable side effect that DCE must treat as
    /// a live root (§4.4.2)?
    pub fn is_side_effecting(&self) -> bool {
        matches!(
            self,
            NodeKind::Return
                | NodeKind::StoreProperty(_)
                | NodeKind::Call { .. }
                | NodeKind::Branch
                | NodeKind::Guard(_)
        )
    }

    /// Is this node pure — safe to hoist, sink, or reorder relative to other
    /// pure nodes (§4.4.3, §4.4.10)?
    ///
    /// `LoadProperty` is treated as pure here, which is only sound modulo the
    /// no-aliasing-store-crossed-the-loop assumption called out in §9; callers
    /// doing LICM must additionally restrict movable loads per that note.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            NodeKind::Constant(_)
                | NodeKind::Parameter(_)
                | NodeKind::BinaryOp(_)
                | NodeKind::UnaryOp(_)
                | NodeKind::LoadProperty(_)
        )
    }

    /// Whether this node is one that `inputs` alone fully describes (i.e. it
    /// carries no block-successor edges).
    pub fn is_block_terminator(&self) -> bool {
        matches!(self, NodeKind::Branch | NodeKind::Return)
    }
}

/// A value or control point in the IR graph.
#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    inputs: SmallVec<[NodeId; 4]>,
    users: Vec<NodeId>,
    block: Option<BlockId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Node {
            id,
            kind,
            inputs: SmallVec::new(),
            users: Vec::new(),
            block: None,
        }
    }

    /// This node's own handle.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's kind.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Replace this node's kind in place (used by constant folding and
    /// strength reduction to rewrite a node without re-homing its users).
    pub(crate) fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    /// This node's ordered inputs.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut SmallVec<[NodeId; 4]> {
        &mut self.inputs
    }

    /// The nodes that use this node as an input, in no particular order.
    pub fn users(&self) -> &[NodeId] {
        &self.users
    }

    pub(crate) fn users_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.users
    }

    /// The block this node has been placed in, if any. Phi nodes may exist
    /// before placement (§4.1).
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    pub(crate) fn set_block(&mut self, block: Option<BlockId>) {
        self.block = block;
    }

    /// Convenience check used throughout the passes.
    pub fn is_side_effecting(&self) -> bool {
        self.kind.is_side_effecting()
    }

    /// Convenience check used throughout the passes.
    pub fn is_pure(&self) -> bool {
        self.kind.is_pure()
    }
}
