//! Loop-invariant code motion and unrolling (§4.4.6).
//!
//! A natural loop is found from a dominator-tree back edge `latch -> header`
//! where `header` dominates `latch` (Tarjan's classical definition); its
//! body is every block that reaches `latch` without passing through
//! `header`. Hoisting only fires when the header has a single predecessor
//! outside the loop body (the preheader) — loops reached through a critical
//! edge are left alone rather than splitting the edge, a known limitation
//! (§9). Unrolling is narrower still: it only recognizes the canonical
//! counted `for`-shaped loop (one phi, one `Add`-by-constant increment, one
//! constant-bound comparison driving the header's branch) with a small
//! compile-time-provable trip count, and fully unrolls it into the
//! preheader as straight-line code.

use crate::dominator_tree::DominatorTree;
use crate::ir::{BinaryOperator, BlockId, ConstantValue, IrGraph, NodeId, NodeKind};
use rustc_hash::FxHashSet;
use std::collections::HashMap;

/// A natural loop: its header, the set of blocks in its body (including the
/// header), and its preheader if one exists (a single predecessor of the
/// header lying outside the body).
pub struct Loop {
    pub header: BlockId,
    pub body: FxHashSet<BlockId>,
    pub preheader: Option<BlockId>,
}

/// Find every natural loop in `graph`.
pub fn find_loops(graph: &IrGraph, dt: &DominatorTree) -> Vec<Loop> {
    let mut loops = Vec::new();
    for header in graph.block_ids() {
        if !dt.is_reachable(header) {
            continue;
        }
        for &latch in graph.block(header).preds() {
            if dt.is_reachable(latch) && dt.dominates(header, latch) {
                let body = natural_loop_body(graph, header, latch);
                let preheader = find_preheader(graph, header, &body);
                loops.push(Loop {
                    header,
                    body,
                    preheader,
                });
            }
        }
    }
    loops
}

fn natural_loop_body(graph: &IrGraph, header: BlockId, latch: BlockId) -> FxHashSet<BlockId> {
    let mut body = FxHashSet::default();
    body.insert(header);
    if latch == header {
        return body;
    }
    body.insert(latch);
    let mut worklist = vec![latch];
    while let Some(b) = worklist.pop() {
        for &pred in graph.block(b).preds() {
            if body.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    body
}

fn find_preheader(graph: &IrGraph, header: BlockId, body: &FxHashSet<BlockId>) -> Option<BlockId> {
    let mut outside = graph
        .block(header)
        .preds()
        .iter()
        .copied()
        .filter(|p| !body.contains(p));
    let preheader = outside.next()?;
    if outside.next().is_some() {
        None
    } else {
        Some(preheader)
    }
}

/// Hoist every pure, loop-invariant computation in every loop with a
/// preheader out to that preheader. Returns the number of nodes hoisted.
pub fn hoist_invariant_code(graph: &mut IrGraph) -> usize {
    let dt = DominatorTree::compute(graph);
    let loops = find_loops(graph, &dt);
    let mut hoisted = 0;

    for lp in &loops {
        let Some(preheader) = lp.preheader else {
            continue;
        };
        let mut invariant: FxHashSet<NodeId> = FxHashSet::default();
        let mut changed = true;
        while changed {
            changed = false;
            for &block in &lp.body {
                for &node in graph.block(block).nodes() {
                    if invariant.contains(&node) || !graph.node(node).is_pure() {
                        continue;
                    }
                    let ready = graph.node(node).inputs().iter().all(|&input| {
                        match graph.node(input).block() {
                            Some(b) if lp.body.contains(&b) => invariant.contains(&input),
                            _ => true,
                        }
                    });
                    if ready {
                        invariant.insert(node);
                        changed = true;
                    }
                }
            }
        }
        for node in invariant {
            graph.relocate_to_block(node, preheader);
            hoisted += 1;
        }
    }
    hoisted
}

// Full unrolling is only attempted below a constant trip-count ceiling,
// matching the bound a bytecode-sized unroll budget would impose.
const UNROLL_LIMIT: i64 = 16;

fn as_int_constant(graph: &IrGraph, id: NodeId) -> Option<i64> {
    match graph.node(id).kind() {
        NodeKind::Constant(v) => v.as_int(),
        _ => None,
    }
}

fn trip_count_for(init: i64, bound: i64, step: i64, inclusive: bool) -> Option<i64> {
    let span = if inclusive {
        if init > bound {
            return Some(0);
        }
        bound.checked_sub(init)?
    } else {
        if init >= bound {
            return Some(0);
        }
        bound.checked_sub(init)?.checked_sub(1)?
    };
    Some(span / step + 1)
}

/// Fully unroll every loop matching the canonical counted shape with a
/// provably small trip count. Returns the number of loops unrolled.
pub fn unroll_counted_loops(graph: &mut IrGraph) -> usize {
    let dt = DominatorTree::compute(graph);
    let loops = find_loops(graph, &dt);
    let mut unrolled = 0;
    for lp in &loops {
        if try_unroll(graph, lp) {
            unrolled += 1;
        }
    }
    unrolled
}

fn try_unroll(graph: &mut IrGraph, lp: &Loop) -> bool {
    let Some(preheader) = lp.preheader else {
        return false;
    };
    if lp.body.len() != 2 {
        return false;
    }
    let header = lp.header;
    let Some(&latch) = lp.body.iter().find(|&&b| b != header) else {
        return false;
    };

    let header_preds = graph.block(header).preds().to_vec();
    if header_preds.len() != 2 {
        return false;
    }

    let phis: Vec<NodeId> = graph
        .block(header)
        .nodes()
        .iter()
        .copied()
        .filter(|&n| matches!(graph.node(n).kind(), NodeKind::Phi))
        .collect();
    let [iv_phi] = phis.as_slice() else {
        return false;
    };
    let iv_phi = *iv_phi;

    let Some(preheader_index) = graph.block(header).pred_index(preheader) else {
        return false;
    };
    let Some(latch_index) = graph.block(header).pred_index(latch) else {
        return false;
    };
    let iv_inputs = graph.node(iv_phi).inputs().to_vec();
    if iv_inputs.len() != 2 {
        return false;
    }
    let Some(init_c) = as_int_constant(graph, iv_inputs[preheader_index]) else {
        return false;
    };
    let step_value_node = iv_inputs[latch_index];

    let Some(&terminator) = graph.block(header).nodes().last() else {
        return false;
    };
    if !matches!(graph.node(terminator).kind(), NodeKind::Branch) {
        return false;
    }
    let cond = graph.node(terminator).inputs()[0];
    let NodeKind::BinaryOp(cmp_op) = graph.node(cond).kind().clone() else {
        return false;
    };
    let cmp_inputs = graph.node(cond).inputs().to_vec();
    if cmp_inputs.first() != Some(&iv_phi) {
        return false;
    }
    let Some(bound_c) = as_int_constant(graph, cmp_inputs[1]) else {
        return false;
    };

    let succs = graph.block(header).succs().to_vec();
    if succs.len() != 2 {
        return false;
    }
    let Some(&exit) = succs.iter().find(|&&s| s != latch) else {
        return false;
    };
    if graph.block(exit).nodes().iter().any(|&n| matches!(graph.node(n).kind(), NodeKind::Phi)) {
        return false;
    }

    let NodeKind::BinaryOp(BinaryOperator::Add) = graph.node(step_value_node).kind().clone() else {
        return false;
    };
    let step_inputs = graph.node(step_value_node).inputs().to_vec();
    if step_inputs.first() != Some(&iv_phi) {
        return false;
    }
    let Some(step_c) = as_int_constant(graph, step_inputs[1]) else {
        return false;
    };
    if step_c <= 0 {
        return false;
    }

    let trip_count = match cmp_op {
        BinaryOperator::Lt => trip_count_for(init_c, bound_c, step_c, false),
        BinaryOperator::Le => trip_count_for(init_c, bound_c, step_c, true),
        _ => None,
    };
    let Some(trip_count) = trip_count else {
        return false;
    };
    if trip_count == 0 || trip_count > UNROLL_LIMIT {
        return false;
    }

    let header_body_nodes: Vec<NodeId> = graph
        .block(header)
        .nodes()
        .iter()
        .copied()
        .filter(|&n| n != iv_phi && n != terminator)
        .collect();
    let latch_nodes: Vec<NodeId> = graph.block(latch).nodes().to_vec();

    let mut iv_value = init_c;
    for _ in 0..trip_count {
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        let iv_const = graph.make_node(NodeKind::Constant(ConstantValue::Int(iv_value)));
        graph.append_to_block(preheader, iv_const);
        remap.insert(iv_phi, iv_const);
        for &n in header_body_nodes.iter().chain(latch_nodes.iter()) {
            clone_into(graph, n, &mut remap, preheader);
        }
        iv_value += step_c;
    }

    disconnect_loop(graph, preheader, header, latch, exit);
    true
}

fn clone_into(
    graph: &mut IrGraph,
    node: NodeId,
    remap: &mut HashMap<NodeId, NodeId>,
    block: BlockId,
) -> NodeId {
    if let Some(&existing) = remap.get(&node) {
        return existing;
    }
    let kind = graph.node(node).kind().clone();
    let inputs: Vec<NodeId> = graph
        .node(node)
        .inputs()
        .iter()
        .map(|i| *remap.get(i).unwrap_or(i))
        .collect();
    let new_node = graph.make_node(kind);
    for input in inputs {
        graph.add_input(new_node, input);
    }
    graph.append_to_block(block, new_node);
    remap.insert(node, new_node);
    new_node
}

fn disconnect_loop(graph: &mut IrGraph, preheader: BlockId, header: BlockId, latch: BlockId, exit: BlockId) {
    graph.block_mut(preheader).succs_mut().retain(|&s| s != header);
    graph.block_mut(header).preds_mut().retain(|&p| p != preheader);
    graph.connect(preheader, exit);
    graph.block_mut(exit).preds_mut().retain(|&p| p != header);
    graph.block_mut(header).succs_mut().retain(|&s| s != exit);
    graph.block_mut(header).succs_mut().retain(|&s| s != latch);
    graph.block_mut(latch).preds_mut().retain(|&p| p != header);
    graph.block_mut(latch).succs_mut().retain(|&s| s != header);
    graph.block_mut(header).preds_mut().retain(|&p| p != latch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::ir::ConstantValue;

    #[test]
    fn loop_invariant_computation_is_hoisted_to_the_preheader() {
        // entry(preheader): p0
        // header: phi(v); inv = p0 + p0; branch true, body, exit
        // body: jump header
        // exit: return inv
        let mut b = GraphBuilder::new();
        let preheader = b.current_block().unwrap();
        let p0 = b.parameter(0).unwrap();
        let header = b.create_block();
        let body = b.create_block();
        let exit_block = b.create_block();
        b.jump(header).unwrap();

        b.set_current_block(header);
        let phi = b.make_phi().unwrap();
        b.place_phi(phi, header);
        let inv = b.binary(BinaryOperator::Add, p0, p0).unwrap();
        let cond = b.constant(ConstantValue::Bool(true)).unwrap();
        b.branch(cond, body, exit_block).unwrap();

        b.set_current_block(body);
        b.jump(header).unwrap();

        b.set_current_block(exit_block);
        b.ret(Some(inv)).unwrap();
        b.set_exit(exit_block);

        let mut g = b.finalize().unwrap();
        g.add_input(phi, p0);
        g.add_input(phi, p0);

        // Both the addition and the (trivially invariant) branch condition
        // get hoisted — LICM doesn't only move "the interesting" node.
        let hoisted = hoist_invariant_code(&mut g);
        assert_eq!(hoisted, 2);
        assert_eq!(g.node(inv).block(), Some(preheader));
        g.check_invariants().unwrap();
    }

    #[test]
    fn small_counted_loop_is_fully_unrolled() {
        // preheader: i = 0; jump header
        // header: phi(i); branch i < 3, body, exit
        // body: i2 = i + 1; jump header
        // exit: return 0
        let mut b = GraphBuilder::new();
        let preheader = b.current_block().unwrap();
        let zero = b.constant(ConstantValue::Int(0)).unwrap();
        let header = b.create_block();
        let body = b.create_block();
        let exit_block = b.create_block();
        b.jump(header).unwrap();

        b.set_current_block(header);
        let phi = b.make_phi().unwrap();
        b.place_phi(phi, header);
        let bound = b.constant(ConstantValue::Int(3)).unwrap();
        let cmp = b.binary(BinaryOperator::Lt, phi, bound).unwrap();
        b.branch(cmp, body, exit_block).unwrap();

        b.set_current_block(body);
        let one = b.constant(ConstantValue::Int(1)).unwrap();
        let next = b.binary(BinaryOperator::Add, phi, one).unwrap();
        b.jump(header).unwrap();

        b.set_current_block(exit_block);
        b.ret(Some(zero)).unwrap();
        b.set_exit(exit_block);

        let mut g = b.finalize().unwrap();
        g.add_input(phi, zero);
        g.add_input(phi, next);

        let unrolled = unroll_counted_loops(&mut g);
        assert_eq!(unrolled, 1);
        g.check_invariants().unwrap();
        assert_eq!(g.block(preheader).succs(), &[exit_block]);
        // 3 iterations, one constant + one add clone each.
        let cloned_adds = g
            .block(preheader)
            .nodes()
            .iter()
            .filter(|&&n| matches!(g.node(n).kind(), NodeKind::BinaryOp(BinaryOperator::Add)))
            .count();
        assert_eq!(cloned_adds, 3);
    }
}
