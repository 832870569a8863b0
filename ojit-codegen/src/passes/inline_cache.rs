//! Polymorphic inline-cache lowering (§4.4.9).
//!
//! Every `LoadProperty`/`StoreProperty` site the profiler (§6) saw run with a
//! single hidden shape gets a [`GuardCheck::Shape`] spliced in front of it,
//! protecting the object operand — the monomorphic inline cache.
//!
//! A site the profiler saw run under 2 to 4 distinct shapes is polymorphic;
//! lowering it builds the real shape dispatch: a chain of blocks, one per
//! candidate shape, each comparing the object's shape (read via the
//! [`crate::ir::SHAPE_OF_CALLEE`] sentinel call, the same Call-encoding
//! trick `ir::BOUNDS_CHECK_CALLEE` uses) against that shape and branching to
//! a block performing the access directly, falling through to the next
//! candidate on a mismatch and to a final block running the original,
//! unguarded access (the "slow path") if every shape misses. All paths
//! rejoin at a continuation block behind a phi merging whichever path's
//! result actually ran. Sites with more than 4 observed shapes (megamorphic)
//! are left unguarded: correct, just without any inline-cache fast path.

use crate::ir::{BinaryOperator, BlockId, ConstantValue, GuardCheck, IrGraph, NodeId, NodeKind, SHAPE_OF_CALLEE};
use crate::profile::ProfilingRecord;

/// The upper bound on observed shapes still worth a dispatch chain (§4.4.9).
const POLYMORPHIC_LIMIT: usize = 4;

/// Splice a monomorphic shape guard in front of every profiled
/// `LoadProperty`/`StoreProperty` site the profiler proved saw exactly one
/// shape. Returns the number of guards inserted.
pub fn lower_monomorphic_sites(graph: &mut IrGraph, profile: &ProfilingRecord) -> usize {
    let mut inserted = 0;
    for (&site, histogram) in &profile.type_feedback {
        if !histogram.is_monomorphic() {
            continue;
        }
        if !matches!(
            graph.node(site).kind(),
            NodeKind::LoadProperty(_) | NodeKind::StoreProperty(_)
        ) {
            continue;
        }
        let Some(&object) = graph.node(site).inputs().first() else {
            continue;
        };
        let shape = histogram.ranked()[0];
        let guard = graph.make_node(NodeKind::Guard(GuardCheck::Shape(shape)));
        graph.add_input(guard, object);
        graph.insert_before(site, guard);
        inserted += 1;
    }
    inserted
}

/// Build a shape-check dispatch chain in front of every profiled
/// `LoadProperty`/`StoreProperty` site the profiler saw run under 2 to
/// [`POLYMORPHIC_LIMIT`] distinct shapes. Returns the number of sites
/// lowered.
pub fn lower_polymorphic_sites(graph: &mut IrGraph, profile: &ProfilingRecord) -> usize {
    let sites: Vec<(NodeId, Vec<u32>)> = profile
        .type_feedback
        .iter()
        .filter(|(_, histogram)| histogram.is_polymorphic(POLYMORPHIC_LIMIT))
        .map(|(&site, histogram)| (site, histogram.ranked()))
        .collect();

    let mut lowered = 0;
    for (site, shapes) in sites {
        if !matches!(
            graph.node(site).kind(),
            NodeKind::LoadProperty(_) | NodeKind::StoreProperty(_)
        ) {
            continue;
        }
        if lower_one_site(graph, site, &shapes) {
            lowered += 1;
        }
    }
    lowered
}

/// Emit `object_shape(object) == shape` in `block`, returning the comparison
/// node.
fn shape_compare(graph: &mut IrGraph, block: BlockId, object: NodeId, shape: u32) -> NodeId {
    let shape_of = graph.make_node(NodeKind::Call {
        callee: SHAPE_OF_CALLEE.into(),
    });
    graph.add_input(shape_of, object);
    graph.append_to_block(block, shape_of);

    let constant = graph.make_node(NodeKind::Constant(ConstantValue::Int(shape as i64)));
    graph.append_to_block(block, constant);

    let cmp = graph.make_node(NodeKind::BinaryOp(BinaryOperator::Eq));
    graph.add_input(cmp, shape_of);
    graph.add_input(cmp, constant);
    graph.append_to_block(block, cmp);
    cmp
}

fn emit_branch(graph: &mut IrGraph, block: BlockId, cond: NodeId, then_block: BlockId, else_block: BlockId) {
    let branch = graph.make_node(NodeKind::Branch);
    graph.add_input(branch, cond);
    graph.append_to_block(block, branch);
    graph.connect(block, then_block);
    graph.connect(block, else_block);
}

fn lower_one_site(graph: &mut IrGraph, site: NodeId, shapes: &[u32]) -> bool {
    let Some(base) = graph.node(site).block() else {
        return false;
    };
    let Some(&object) = graph.node(site).inputs().first() else {
        return false;
    };
    let kind = graph.node(site).kind().clone();
    let original_inputs = graph.node(site).inputs().to_vec();

    let Some(site_pos) = graph.block(base).nodes().iter().position(|&n| n == site) else {
        return false;
    };
    let tail: Vec<NodeId> = graph.block(base).nodes()[site_pos + 1..].to_vec();

    // Everything that used to run after `site` now runs after the whole
    // dispatch, in a continuation block the dispatch's result phi feeds.
    let cont = graph.make_block();
    for &node in &tail {
        graph.relocate_to_block(node, cont);
    }

    // `cont` inherits `base`'s old control-flow successors; fix up each
    // successor's predecessor list in place so phi operand order survives.
    let old_succs = graph.block(base).succs().to_vec();
    for &succ in &old_succs {
        if let Some(index) = graph.block(succ).pred_index(base) {
            graph.block_mut(succ).preds_mut()[index] = cont;
        }
    }
    *graph.block_mut(cont).succs_mut() = old_succs;
    graph.block_mut(base).succs_mut().clear();

    // `site` itself becomes the fallback ("every shape missed") path.
    let fallback = graph.make_block();
    graph.relocate_to_block(site, fallback);

    let mut check_blocks = vec![base];
    for _ in 1..shapes.len() {
        check_blocks.push(graph.make_block());
    }
    let match_blocks: Vec<BlockId> = (0..shapes.len()).map(|_| graph.make_block()).collect();

    for (i, &shape) in shapes.iter().enumerate() {
        let check_block = check_blocks[i];
        let cmp = shape_compare(graph, check_block, object, shape);
        let next = check_blocks.get(i + 1).copied().unwrap_or(fallback);
        emit_branch(graph, check_block, cmp, match_blocks[i], next);
    }

    let mut path_results = Vec::with_capacity(shapes.len() + 1);
    for &match_block in &match_blocks {
        let clone = graph.make_node(kind.clone());
        for &input in &original_inputs {
            graph.add_input(clone, input);
        }
        graph.append_to_block(match_block, clone);
        graph.connect(match_block, cont);
        path_results.push(clone);
    }
    graph.connect(fallback, cont);
    path_results.push(site);

    let phi = graph.make_node(NodeKind::Phi);
    graph.replace_all_uses(site, phi);
    for result in path_results {
        graph.add_input(phi, result);
    }
    graph.prepend_to_block(cont, phi);

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::profile::ShapeHistogram;

    #[test]
    fn monomorphic_load_site_gets_a_shape_guard_spliced_in_front() {
        let mut b = GraphBuilder::new();
        let obj = b.parameter(0).unwrap();
        let field: std::rc::Rc<str> = std::rc::Rc::from("x");
        let load = b.load_property(obj, field).unwrap();
        b.ret(Some(load)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        let mut profile = ProfilingRecord::new();
        let mut hist = ShapeHistogram::default();
        hist.record(42);
        profile.type_feedback.insert(load, hist);

        let inserted = lower_monomorphic_sites(&mut g, &profile);
        assert_eq!(inserted, 1);
        g.check_invariants().unwrap();

        let nodes = g.block(entry).nodes().to_vec();
        let load_pos = nodes.iter().position(|&n| n == load).unwrap();
        let guard = nodes[load_pos - 1];
        match g.node(guard).kind() {
            NodeKind::Guard(GuardCheck::Shape(s)) => assert_eq!(*s, 42),
            other => panic!("expected a shape guard, got {other:?}"),
        }
        assert_eq!(g.node(guard).inputs(), &[obj]);
    }

    #[test]
    fn polymorphic_site_is_skipped_by_the_monomorphic_pass() {
        let mut b = GraphBuilder::new();
        let obj = b.parameter(0).unwrap();
        let field: std::rc::Rc<str> = std::rc::Rc::from("x");
        let load = b.load_property(obj, field).unwrap();
        b.ret(Some(load)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        let mut profile = ProfilingRecord::new();
        let mut hist = ShapeHistogram::default();
        hist.record(1);
        hist.record(2);
        profile.type_feedback.insert(load, hist);

        let inserted = lower_monomorphic_sites(&mut g, &profile);
        assert_eq!(inserted, 0);
        assert!(!g
            .node_ids()
            .any(|id| matches!(g.node(id).kind(), NodeKind::Guard(_))));
    }

    #[test]
    fn polymorphic_load_site_gets_a_shape_dispatch_chain() {
        let mut b = GraphBuilder::new();
        let obj = b.parameter(0).unwrap();
        let field: std::rc::Rc<str> = std::rc::Rc::from("x");
        let load = b.load_property(obj, field).unwrap();
        let consumer = b.unary(crate::ir::UnaryOperator::Neg, load).unwrap();
        b.ret(Some(consumer)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        let mut profile = ProfilingRecord::new();
        let mut hist = ShapeHistogram::default();
        hist.record(10);
        hist.record(20);
        hist.record(20);
        profile.type_feedback.insert(load, hist);

        let lowered = lower_polymorphic_sites(&mut g, &profile);
        assert_eq!(lowered, 1);
        g.check_invariants().unwrap();

        // Two shapes observed -> one extra shape-check block, two match
        // blocks, one fallback, one continuation, plus the original entry.
        assert_eq!(g.block_count(), 6);

        let shape_calls: Vec<NodeId> = g
            .node_ids()
            .filter(|&id| matches!(g.node(id).kind(), NodeKind::Call { callee } if &**callee == crate::ir::SHAPE_OF_CALLEE))
            .collect();
        assert_eq!(shape_calls.len(), 2);

        let loads: Vec<NodeId> = g
            .node_ids()
            .filter(|&id| matches!(g.node(id).kind(), NodeKind::LoadProperty(_)))
            .collect();
        assert_eq!(loads.len(), 3, "one load per matched shape plus the fallback");

        let phis: Vec<NodeId> = g
            .node_ids()
            .filter(|&id| matches!(g.node(id).kind(), NodeKind::Phi))
            .collect();
        let [phi] = phis.as_slice() else {
            panic!("expected exactly one merge phi, got {phis:?}");
        };
        assert_eq!(g.node(*phi).inputs().len(), 3);
        assert_eq!(g.node(consumer).inputs(), &[*phi]);

        let entry_branch = *g.block(entry).nodes().last().unwrap();
        assert!(matches!(g.node(entry_branch).kind(), NodeKind::Branch));
        assert_eq!(g.block(entry).succs().len(), 2);
    }
}
