//! Bounds-check elimination (§4.4.8).
//!
//! A bounds check is a `Call` to the sentinel [`crate::ir::BOUNDS_CHECK_CALLEE`]
//! name (§9's note on this being a `Call`-encoding wart rather than its own
//! node kind). One is removable when range analysis (§4.4.7) can prove the
//! index always falls in `[0, length)` — using the *minimum* of the length
//! operand's range, since the check must hold for every length the runtime
//! could actually pass, not just the most optimistic one — and nothing reads
//! the check's value (checks are inserted for their trap, never consumed).

use crate::ir::{IrGraph, NodeId, NodeKind, BOUNDS_CHECK_CALLEE};
use crate::passes::range_analysis::Ranges;

fn is_bounds_check(graph: &IrGraph, id: NodeId) -> bool {
    matches!(graph.node(id).kind(), NodeKind::Call { callee } if &**callee == BOUNDS_CHECK_CALLEE)
}

fn provably_in_bounds(graph: &IrGraph, ranges: &Ranges, id: NodeId) -> bool {
    let inputs = graph.node(id).inputs();
    if inputs.len() != 2 {
        return false;
    }
    let index_range = ranges.get(inputs[0]);
    let length_range = ranges.get(inputs[1]);
    index_range.lo >= 0 && index_range.hi < length_range.lo
}

/// Remove every bounds check provably satisfied on every execution. Returns
/// the number of checks removed.
pub fn eliminate_bounds_checks(graph: &mut IrGraph, ranges: &Ranges) -> usize {
    let candidates: Vec<NodeId> = graph
        .node_ids()
        .filter(|&id| is_bounds_check(graph, id))
        .collect();

    let mut eliminated = 0;
    for id in candidates {
        if graph.node(id).users().is_empty() && provably_in_bounds(graph, ranges, id) {
            graph.remove_node(id);
            eliminated += 1;
        }
    }
    eliminated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::ir::ConstantValue;
    use crate::passes::range_analysis;

    #[test]
    fn constant_index_within_constant_length_is_removed() {
        let mut b = GraphBuilder::new();
        let index = b.constant(ConstantValue::Int(2)).unwrap();
        let length = b.constant(ConstantValue::Int(10)).unwrap();
        let check = b.bounds_check(index, length).unwrap();
        b.ret(None).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        let ranges = range_analysis::analyze(&g);
        let eliminated = eliminate_bounds_checks(&mut g, &ranges);
        assert_eq!(eliminated, 1);
        assert!(!g.node_ids().any(|id| id == check));
    }

    #[test]
    fn unknown_index_keeps_the_check() {
        let mut b = GraphBuilder::new();
        let index = b.parameter(0).unwrap();
        let length = b.constant(ConstantValue::Int(10)).unwrap();
        let check = b.bounds_check(index, length).unwrap();
        b.ret(None).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        let ranges = range_analysis::analyze(&g);
        let eliminated = eliminate_bounds_checks(&mut g, &ranges);
        assert_eq!(eliminated, 0);
        assert!(g.node_ids().any(|id| id == check));
    }
}
