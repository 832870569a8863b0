//! Fluent IR builder (§4.1, C2).
//!
//! `GraphBuilder` wraps an [`IrGraph`] and tracks a "current block" cursor,
//! same shape as Cranelift's own `FunctionBuilder`: callers create a block,
//! make it current, append instructions to it, and connect it to its
//! successors. Every `append_*` call both allocates the node and wires its
//! inputs through [`IrGraph::add_input`], so the input/user invariant holds
//! by construction rather than by convention.
//!
//! Bytecode-level local variables aren't IR nodes — see [`Variable`]. The
//! builder lowers `def_var`/`use_var` to stores and loads against a single
//! synthetic, never-escaping frame object, so the SSA builder (C4) can
//! promote them to real dataflow using the same machinery scalar replacement
//! uses for any other non-escaping object.

use crate::ir::{
    BinaryOperator, ConstantValue, GuardCheck, IrGraph, NodeId, NodeKind, PropertyName,
    UnaryOperator, Variable, BOUNDS_CHECK_CALLEE, BlockId,
};
use crate::result::{CodegenError, CodegenResult};
use ojit_entity::EntityRef;
use std::collections::HashMap;
use std::rc::Rc;

/// Builds an [`IrGraph`] one instruction at a time.
pub struct GraphBuilder {
    graph: IrGraph,
    current_block: Option<BlockId>,
    frame: NodeId,
    var_names: HashMap<Variable, PropertyName>,
    next_var_id: u32,
}

/// The sentinel parameter index reserved for the synthetic frame object.
/// Never produced by [`GraphBuilder::parameter`].
const FRAME_PARAMETER_INDEX: u32 = u32::MAX;

impl GraphBuilder {
    /// Start building a new graph. Allocates the entry block, makes it
    /// current, and creates the synthetic frame object used for variable
    /// lowering.
    pub fn new() -> Self {
        let mut graph = IrGraph::new();
        let entry = graph.make_block();
        graph.set_entry(entry);
        let frame = graph.make_node(NodeKind::Parameter(FRAME_PARAMETER_INDEX));
        graph.append_to_block(entry, frame);
        GraphBuilder {
            graph,
            current_block: Some(entry),
            frame,
            var_names: HashMap::new(),
            next_var_id: 0,
        }
    }

    /// Declare a new logical local-variable slot.
    pub fn declare_var(&mut self) -> Variable {
        let id = self.next_var_id;
        self.next_var_id += 1;
        let var = Variable::new(id as usize);
        self.var_names.insert(var, Rc::from(format!("$local{id}")));
        var
    }

    fn var_name(&self, var: Variable) -> PropertyName {
        self.var_names[&var].clone()
    }

    /// Emit a write of `value` to `var` in the current block.
    pub fn def_var(&mut self, var: Variable, value: NodeId) -> CodegenResult<()> {
        self.store_property(self.frame, self.var_name(var), value)?;
        Ok(())
    }

    /// Emit a read of `var`'s current value in the current block.
    pub fn use_var(&mut self, var: Variable) -> CodegenResult<NodeId> {
        self.load_property(self.frame, self.var_name(var))
    }

    /// The synthetic frame object backing variable lowering. Exposed so the
    /// SSA builder and escape analysis can recognize and special-case it.
    pub fn frame_object(&self) -> NodeId {
        self.frame
    }

    /// Create a new, empty block. Does not make it current.
    pub fn create_block(&mut self) -> BlockId {
        self.graph.make_block()
    }

    /// Make `block` the current block: subsequent `append_*` calls place
    /// their node there.
    pub fn set_current_block(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    /// The current block, if one has been set.
    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    fn require_current_block(&self) -> CodegenResult<BlockId> {
        self.current_block
            .ok_or_else(|| CodegenError::BuilderMisuse("no current block set".into()))
    }

    fn append(&mut self, kind: NodeKind) -> CodegenResult<NodeId> {
        if self.graph.is_finalized() {
            return Err(CodegenError::BuilderMisuse(
                "building on a finalized graph".into(),
            ));
        }
        let block = self.require_current_block()?;
        let node = self.graph.make_node(kind);
        self.graph.append_to_block(block, node);
        Ok(node)
    }

    /// Append a constant.
    pub fn constant(&mut self, value: ConstantValue) -> CodegenResult<NodeId> {
        self.append(NodeKind::Constant(value))
    }

    /// Append a reference to the `index`-th function parameter.
    pub fn parameter(&mut self, index: u32) -> CodegenResult<NodeId> {
        debug_assert_ne!(index, FRAME_PARAMETER_INDEX, "index collides with the frame sentinel");
        self.append(NodeKind::Parameter(index))
    }

    /// Append `lhs op rhs`.
    pub fn binary(
        &mut self,
        op: BinaryOperator,
        lhs: NodeId,
        rhs: NodeId,
    ) -> CodegenResult<NodeId> {
        let node = self.append(NodeKind::BinaryOp(op))?;
        self.graph.add_input(node, lhs);
        self.graph.add_input(node, rhs);
        Ok(node)
    }

    /// Append `op operand`.
    pub fn unary(&mut self, op: UnaryOperator, operand: NodeId) -> CodegenResult<NodeId> {
        let node = self.append(NodeKind::UnaryOp(op))?;
        self.graph.add_input(node, operand);
        Ok(node)
    }

    /// Append a read of property `name` on `object`.
    pub fn load_property(&mut self, object: NodeId, name: PropertyName) -> CodegenResult<NodeId> {
        let node = self.append(NodeKind::LoadProperty(name))?;
        self.graph.add_input(node, object);
        Ok(node)
    }

    /// Append a write of `value` to property `name` on `object`.
    pub fn store_property(
        &mut self,
        object: NodeId,
        name: PropertyName,
        value: NodeId,
    ) -> CodegenResult<NodeId> {
        let node = self.append(NodeKind::StoreProperty(name))?;
        self.graph.add_input(node, object);
        self.graph.add_input(node, value);
        Ok(node)
    }

    /// Append a call to `callee` with `args`.
    pub fn call(&mut self, callee: impl Into<Rc<str>>, args: &[NodeId]) -> CodegenResult<NodeId> {
        let node = self.append(NodeKind::Call {
            callee: callee.into(),
        })?;
        for &arg in args {
            self.graph.add_input(node, arg);
        }
        Ok(node)
    }

    /// Append a bounds check call recognized structurally by §4.4.8.
    pub fn bounds_check(&mut self, index: NodeId, length: NodeId) -> CodegenResult<NodeId> {
        self.call(BOUNDS_CHECK_CALLEE, &[index, length])
    }

    /// Append a return of `value` (or a void return if `None`).
    pub fn ret(&mut self, value: Option<NodeId>) -> CodegenResult<NodeId> {
        let node = self.append(NodeKind::Return)?;
        if let Some(v) = value {
            self.graph.add_input(node, v);
        }
        Ok(node)
    }

    /// Append a conditional branch on `cond`; `then_block`/`else_block`
    /// become the current block's successors.
    pub fn branch(
        &mut self,
        cond: NodeId,
        then_block: BlockId,
        else_block: BlockId,
    ) -> CodegenResult<NodeId> {
        let block = self.require_current_block()?;
        let node = self.append(NodeKind::Branch)?;
        self.graph.add_input(node, cond);
        self.graph.connect(block, then_block);
        self.graph.connect(block, else_block);
        Ok(node)
    }

    /// Create an unplaced phi node. Some phis (loop headers visited before
    /// their latch) must exist before their block gets its full predecessor
    /// list, so phi creation is decoupled from placement (§4.1).
    pub fn make_phi(&mut self) -> CodegenResult<NodeId> {
        if self.graph.is_finalized() {
            return Err(CodegenError::BuilderMisuse(
                "building on a finalized graph".into(),
            ));
        }
        Ok(self.graph.make_node(NodeKind::Phi))
    }

    /// Place a previously created phi at the front of `block`.
    pub fn place_phi(&mut self, phi: NodeId, block: BlockId) {
        self.graph.prepend_to_block(block, phi);
    }

    /// Insert a speculative guard protecting `value`.
    pub fn guard(&mut self, check: GuardCheck, value: NodeId) -> CodegenResult<NodeId> {
        let node = self.append(NodeKind::Guard(check))?;
        self.graph.add_input(node, value);
        Ok(node)
    }

    /// Connect the current block to `succ` without emitting a branch (used
    /// for unconditional fallthrough/jump).
    pub fn jump(&mut self, succ: BlockId) -> CodegenResult<()> {
        let block = self.require_current_block()?;
        self.graph.connect(block, succ);
        Ok(())
    }

    /// Designate `block` as the graph's exit block.
    pub fn set_exit(&mut self, block: BlockId) {
        self.graph.set_exit(block);
    }

    /// Finalize the graph and hand it over. Fatal if no entry is designated
    /// or the graph was already finalized (§4.1).
    pub fn finalize(mut self) -> CodegenResult<IrGraph> {
        self.graph.finalize()?;
        Ok(self.graph)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ConstantValue;
    use ojit_entity::EntityRef;

    #[test]
    fn builds_constant_folding_scenario() {
        // Scenario 1 from §8: Constant(2), Constant(3), Add, Return.
        let mut b = GraphBuilder::new();
        let two = b.constant(ConstantValue::Int(2)).unwrap();
        let three = b.constant(ConstantValue::Int(3)).unwrap();
        let sum = b.binary(BinaryOperator::Add, two, three).unwrap();
        b.ret(Some(sum)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let g = b.finalize().unwrap();
        g.check_invariants().unwrap();
        assert_eq!(g.entry(), Some(entry));
    }

    #[test]
    fn double_finalize_is_fatal() {
        let mut b = GraphBuilder::new();
        b.ret(None).unwrap();
        let g = b.finalize().unwrap();
        let mut g = g;
        assert!(g.finalize().is_err());
    }

    #[test]
    fn append_requires_current_block() {
        let mut graph = IrGraph::new();
        let entry = graph.make_block();
        graph.set_entry(entry);
        // Directly driving the graph with no builder cursor set is a caller
        // error, not represented through GraphBuilder here; GraphBuilder
        // itself always has a current block after `new()`.
        let mut b = GraphBuilder::new();
        assert!(b.current_block().is_some());
        let _ = entry;
    }
}
