//! The IR graph: the whole compiled function's nodes and blocks.
//!
//! The graph exclusively owns its nodes and blocks in two append-only arenas;
//! every cross-reference is a non-owning [`NodeId`]/[`BlockId`] handle. The
//! single hardest invariant to maintain is that every input edge mirrors into
//! the target's user list — all mutation of inputs must go through
//! [`IrGraph::add_input`]/[`IrGraph::remove_input_at`] so that invariant can't
//! be violated by a stray `Vec` push somewhere in a pass.

use crate::ir::block::BasicBlock;
use crate::ir::entities::{BlockId, NodeId};
use crate::ir::node::{Node, NodeKind};
use crate::result::{CodegenError, CodegenResult};
use ojit_entity::{PrimaryMap, SecondaryMap};

/// The sea-of-nodes graph and CFG for a single compiled function.
pub struct IrGraph {
    nodes: PrimaryMap<NodeId, Node>,
    blocks: PrimaryMap<BlockId, BasicBlock>,
    removed: SecondaryMap<NodeId, bool>,
    entry: Option<BlockId>,
    exit: Option<BlockId>,
    finalized: bool,
}

impl IrGraph {
    /// Create an empty graph with no blocks, nodes, entry, or exit.
    pub fn new() -> Self {
        IrGraph {
            nodes: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            removed: SecondaryMap::new(),
            entry: None,
            exit: None,
            finalized: false,
        }
    }

    /// Allocate a new, unplaced node. Most callers want
    /// [`crate::builder::GraphBuilder`] instead of calling this directly.
    pub(crate) fn make_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push_with(|id| Node::new(id, kind))
    }

    /// Allocate a new, empty block.
    pub(crate) fn make_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::new())
    }

    /// Number of nodes allocated so far, live or dead.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of blocks allocated so far.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Look up a block.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    /// Iterate over every currently-allocated node id. Dead (removed) nodes
    /// are skipped: removal clears a node's block/inputs/users but the slot
    /// itself is never reused (arena indices must stay stable).
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().filter(move |&id| !self.is_removed(id))
    }

    /// Iterate over every block id, including unreachable ones.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys()
    }

    fn is_removed(&self, id: NodeId) -> bool {
        self.removed[id]
    }

    /// The designated entry block, once set by [`Self::finalize`] or the
    /// builder.
    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    /// The designated exit block.
    pub fn exit(&self) -> Option<BlockId> {
        self.exit
    }

    pub(crate) fn set_entry(&mut self, block: BlockId) {
        self.entry = Some(block);
    }

    pub(crate) fn set_exit(&mut self, block: BlockId) {
        self.exit = Some(block);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    /// Append `input` to `node`'s input list, mirroring the edge into
    /// `input`'s user list. This is the only routine allowed to push onto
    /// either list; every builder and pass operation goes through it.
    pub(crate) fn add_input(&mut self, node: NodeId, input: NodeId) {
        self.nodes[node].inputs_mut().push(input);
        self.nodes[input].users_mut().push(node);
    }

    /// Replace `node`'s `index`-th input with `new_input`, updating both
    /// users lists.
    pub(crate) fn set_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        let old_input = self.nodes[node].inputs()[index];
        self.nodes[node].inputs_mut()[index] = new_input;
        self.remove_user(old_input, node);
        self.nodes[new_input].users_mut().push(node);
    }

    fn remove_user(&mut self, of: NodeId, user: NodeId) {
        let users = self.nodes[of].users_mut();
        if let Some(pos) = users.iter().position(|&u| u == user) {
            users.remove(pos);
        }
    }

    /// Rewire every current user of `old` to use `new` instead. Used by
    /// constant folding, scalar replacement, and DCE's replacement step.
    pub(crate) fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        let users = self.nodes[old].users().to_vec();
        for user in users {
            let positions: Vec<usize> = self.nodes[user]
                .inputs()
                .iter()
                .enumerate()
                .filter(|(_, &i)| i == old)
                .map(|(i, _)| i)
                .collect();
            for pos in positions {
                self.nodes[user].inputs_mut()[pos] = new;
                self.nodes[new].users_mut().push(user);
            }
        }
        self.nodes[old].users_mut().clear();
    }

    /// Append `node` to the end of `block`'s node list and record the
    /// placement on the node itself. A node may only appear in one block.
    pub(crate) fn append_to_block(&mut self, block: BlockId, node: NodeId) {
        debug_assert!(
            self.nodes[node].block().is_none(),
            "node placed in two blocks"
        );
        self.blocks[block].nodes_mut().push(node);
        self.nodes[node].set_block(Some(block));
    }

    /// Insert `node` at the front of `block`'s node list (used to place phis
    /// and hoisted loop-invariant code).
    pub(crate) fn prepend_to_block(&mut self, block: BlockId, node: NodeId) {
        debug_assert!(self.nodes[node].block().is_none());
        self.blocks[block].nodes_mut().insert(0, node);
        self.nodes[node].set_block(Some(block));
    }

    /// Insert `node` into `anchor`'s block immediately before `anchor`. Used
    /// by inline-cache lowering (§4.4.9) to splice a shape guard in front of
    /// the property access it protects.
    pub(crate) fn insert_before(&mut self, anchor: NodeId, node: NodeId) {
        debug_assert!(self.nodes[node].block().is_none());
        let block = self.nodes[anchor]
            .block()
            .expect("anchor must already be placed");
        let nodes = self.blocks[block].nodes_mut();
        let pos = nodes
            .iter()
            .position(|&n| n == anchor)
            .expect("anchor must be in its own block's node list");
        nodes.insert(pos, node);
        self.nodes[node].set_block(Some(block));
    }

    /// Insert `node` into `anchor`'s block immediately after `anchor`. Used
    /// by speculative guard insertion (§4.5) to splice a guard right after
    /// the value it asserts a fact about.
    pub(crate) fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        debug_assert!(self.nodes[node].block().is_none());
        let block = self.nodes[anchor]
            .block()
            .expect("anchor must already be placed");
        let nodes = self.blocks[block].nodes_mut();
        let pos = nodes
            .iter()
            .position(|&n| n == anchor)
            .expect("anchor must be in its own block's node list");
        nodes.insert(pos + 1, node);
        self.nodes[node].set_block(Some(block));
    }

    /// Relocate an already-placed `node` to the end of `new_block`'s node
    /// list. Used by LICM (§4.4.6) to hoist loop-invariant computations into
    /// a loop's preheader.
    pub(crate) fn relocate_to_block(&mut self, node: NodeId, new_block: BlockId) {
        if let Some(old_block) = self.nodes[node].block() {
            let nodes = self.blocks[old_block].nodes_mut();
            if let Some(pos) = nodes.iter().position(|&n| n == node) {
                nodes.remove(pos);
            }
        }
        self.nodes[node].set_block(None);
        self.append_to_block(new_block, node);
    }

    /// Detach `node` from all of its current inputs, mirroring the removal
    /// into each input's user list, without touching block placement. Used
    /// by [`Self::remove_node`] and by passes that rewrite a node's kind in
    /// place (constant folding, strength reduction) and need to drop the
    /// operands the old kind used.
    pub(crate) fn clear_inputs(&mut self, node: NodeId) {
        let inputs = self.nodes[node].inputs().to_vec();
        for input in inputs {
            self.remove_user(input, node);
        }
        self.nodes[node].inputs_mut().clear();
    }

    /// Remove `node` from the graph: unlink it from its block and clear its
    /// inputs (mirroring the removal into each input's user list). The
    /// node's id remains allocated but dead. Callers (DCE, scalar
    /// replacement) are responsible for ensuring no live node still uses it.
    pub(crate) fn remove_node(&mut self, node: NodeId) {
        if let Some(block) = self.nodes[node].block() {
            let nodes = self.blocks[block].nodes_mut();
            if let Some(pos) = nodes.iter().position(|&n| n == node) {
                nodes.remove(pos);
            }
            self.nodes[node].set_block(None);
        }
        self.clear_inputs(node);
        self.removed[node] = true;
    }

    /// Connect `pred` to `succ` with a CFG edge, keeping predecessor and
    /// successor lists symmetric. Duplicate edges between the same pair are
    /// elided (§4.1).
    pub fn connect(&mut self, pred: BlockId, succ: BlockId) {
        if !self.blocks[pred].succs().contains(&succ) {
            self.blocks[pred].succs_mut().push(succ);
        }
        if !self.blocks[succ].preds().contains(&pred) {
            self.blocks[succ].preds_mut().push(pred);
        }
    }

    /// Finalize the graph: an entry block must have been designated.
    /// Building on a finalized graph, or finalizing twice, is fatal (§4.1).
    pub fn finalize(&mut self) -> CodegenResult<()> {
        if self.finalized {
            return Err(CodegenError::BuilderMisuse(
                "graph finalized twice".into(),
            ));
        }
        if self.entry.is_none() {
            return Err(CodegenError::BuilderMisuse(
                "finalized without a designated entry block".into(),
            ));
        }
        self.finalized = true;
        Ok(())
    }

    /// Check the universal invariants from §8 that must hold after every
    /// pass: input/user list symmetry and predecessor/successor symmetry.
    /// Used by tests and by the driver in debug builds between passes.
    pub fn check_invariants(&self) -> CodegenResult<()> {
        for id in self.node_ids() {
            let node = self.node(id);
            for &input in node.inputs() {
                if !self.nodes[input].users().contains(&id) {
                    return Err(CodegenError::MalformedInvariant(format!(
                        "{id} has input {input} but is not in {input}'s user list"
                    )));
                }
            }
            for &user in node.users() {
                if !self.nodes[user].inputs().contains(&id) {
                    return Err(CodegenError::MalformedInvariant(format!(
                        "{id} lists user {user} but {user} does not have {id} as an input"
                    )));
                }
            }
        }
        for id in self.block_ids() {
            let block = self.block(id);
            for &succ in block.succs() {
                if !self.blocks[succ].preds().contains(&id) {
                    return Err(CodegenError::MalformedInvariant(format!(
                        "{id} has successor {succ} but is not in {succ}'s predecessor list"
                    )));
                }
            }
            for &pred in block.preds() {
                if !self.blocks[pred].succs().contains(&id) {
                    return Err(CodegenError::MalformedInvariant(format!(
                        "{id} lists predecessor {pred} but {pred} does not have {id} as a successor"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for IrGraph {
    fn default() -> Self {
        Self::new()
    }
}
