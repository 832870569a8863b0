//! Dead code elimination (§4.4.2).
//!
//! Mark-and-sweep from every node with an observable effect: the
//! side-effecting kinds (`Return`, `StoreProperty`, `Call`, `Branch`,
//! `Guard`) plus `Merge`, which carries no dataflow but anchors the block's
//! control-flow shape for guards and calls to serialize against. Everything
//! not transitively reachable from a root through the input edges is dead,
//! regardless of how many dead nodes reference each other (a cycle of two
//! otherwise-unused nodes is still garbage).

use crate::ir::{IrGraph, NodeId, NodeKind};
use rustc_hash::FxHashSet;

fn is_root(graph: &IrGraph, id: NodeId) -> bool {
    let node = graph.node(id);
    node.is_side_effecting() || matches!(node.kind(), NodeKind::Merge)
}

/// Remove every node not reachable from a live root. Returns the number of
/// nodes removed.
pub fn eliminate_dead_code(graph: &mut IrGraph) -> usize {
    let mut live: FxHashSet<NodeId> = FxHashSet::default();
    let mut worklist: Vec<NodeId> = graph.node_ids().filter(|&id| is_root(graph, id)).collect();
    live.extend(worklist.iter().copied());

    while let Some(id) = worklist.pop() {
        for &input in graph.node(id).inputs() {
            if live.insert(input) {
                worklist.push(input);
            }
        }
    }

    let dead: Vec<NodeId> = graph.node_ids().filter(|id| !live.contains(id)).collect();
    let removed = dead.len();
    for id in dead {
        graph.remove_node(id);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::ir::{BinaryOperator, ConstantValue};

    #[test]
    fn unused_pure_chain_is_removed() {
        let mut b = GraphBuilder::new();
        let two = b.constant(ConstantValue::Int(2)).unwrap();
        let three = b.constant(ConstantValue::Int(3)).unwrap();
        let _unused_sum = b.binary(BinaryOperator::Add, two, three).unwrap();
        let four = b.constant(ConstantValue::Int(4)).unwrap();
        b.ret(Some(four)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        let removed = eliminate_dead_code(&mut g);
        assert!(removed > 0);
        g.check_invariants().unwrap();
        assert!(g
            .node_ids()
            .all(|id| !matches!(g.node(id).kind(), NodeKind::BinaryOp(_))));
    }

    #[test]
    fn side_effecting_nodes_and_their_operands_survive() {
        let mut b = GraphBuilder::new();
        let zero = b.constant(ConstantValue::Int(0)).unwrap();
        let len = b.constant(ConstantValue::Int(10)).unwrap();
        let check = b.bounds_check(zero, len).unwrap();
        let _ = check;
        b.ret(None).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        eliminate_dead_code(&mut g);
        assert!(g.node_ids().any(|id| matches!(g.node(id).kind(), NodeKind::Constant(ConstantValue::Int(0)))));
        assert!(g.node_ids().any(|id| matches!(g.node(id).kind(), NodeKind::Constant(ConstantValue::Int(10)))));
    }
}
