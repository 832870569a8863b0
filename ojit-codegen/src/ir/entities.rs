//! Opaque handles into the IR graph's arenas.
//!
//! Every cross-reference in the graph — a node's inputs, a node's users, a
//! block's contained nodes, a block's predecessors and successors — is one of
//! these handles rather than a Rust reference. That turns the graph's dense
//! web of cycles into plain integers: equality is a `u32` comparison and
//! nothing needs a lifetime.

use ojit_entity::entity_impl;

/// A reference to a [`crate::ir::Node`] owned by an [`crate::ir::IrGraph`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
entity_impl!(NodeId, "n");

/// A reference to a [`crate::ir::BasicBlock`] owned by an [`crate::ir::IrGraph`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

/// A logical local-variable slot as seen by the bytecode being translated.
///
/// Variables are not IR nodes. The builder lowers reads and writes of a
/// variable to loads and stores against a synthetic per-function frame
/// object (see [`crate::ir::graph::IrGraph::frame_object`]); the SSA builder
/// later promotes that pattern to real dataflow, same as it would for any
/// other provably non-escaping object.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Variable(u32);
entity_impl!(Variable, "var");

#[cfg(test)]
mod tests {
    use super::*;
    use ojit_entity::EntityRef;

    #[test]
    fn ids_are_dense_and_display() {
        let n = NodeId::new(7);
        assert_eq!(n.index(), 7);
        assert_eq!(format!("{}", n), "n7");
        let b = BlockId::new(2);
        assert_eq!(format!("{}", b), "block2");
    }
}
