//! Basic blocks: straight-line sequences of nodes with one entry and one exit.

use crate::ir::entities::{BlockId, NodeId};

/// A basic block. Holds its contained nodes in execution order and its CFG
/// edges; predecessor and successor lists are kept symmetric by
/// [`crate::ir::graph::IrGraph::connect`].
#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
    nodes: Vec<NodeId>,
    preds: Vec<BlockId>,
    succs: Vec<BlockId>,
}

impl BasicBlock {
    pub(crate) fn new() -> Self {
        BasicBlock::default()
    }

    /// Nodes contained in this block, in execution order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.nodes
    }

    /// Predecessor blocks, in the order phi operands must line up with.
    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    pub(crate) fn preds_mut(&mut self) -> &mut Vec<BlockId> {
        &mut self.preds
    }

    /// Successor blocks.
    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    pub(crate) fn succs_mut(&mut self) -> &mut Vec<BlockId> {
        &mut self.succs
    }

    /// Index of `pred` in this block's predecessor list, if present. Used to
    /// find which phi operand slot corresponds to an incoming edge.
    pub fn pred_index(&self, pred: BlockId) -> Option<usize> {
        self.preds.iter().position(|&p| p == pred)
    }
}
