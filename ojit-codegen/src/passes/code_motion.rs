//! Code motion / scheduling (§4.4.10).
//!
//! Nodes are scheduled into a block the moment the builder creates them
//! (§4.1) rather than floating free the way a true sea-of-nodes IR would, so
//! this pass is a post-pass "sink": a pure node with exactly one user is
//! moved down into that user's block if it isn't there already. Combined
//! with LICM's hoist (§4.4.6) this keeps pure, single-use computations as
//! close as possible to the control flow that actually needs them — out of
//! preheaders they were never loop-invariant relative to, and out of blocks
//! whose other successor never reaches the use.
//!
//! A node with more than one user is left where it is: picking a single
//! target block for a multi-use node can require inserting it at their
//! common dominator, which is LICM's job in reverse, not this pass's.

use crate::ir::{IrGraph, NodeKind, NodeId};
use rustc_hash::FxHashSet;

/// Sink every pure, single-use node into its user's block. Returns the
/// number of nodes moved.
pub fn schedule_late(graph: &mut IrGraph) -> usize {
    let mut moved = 0;
    let candidates: Vec<NodeId> = graph.node_ids().collect();
    for node in candidates {
        if !graph.node(node).is_pure() {
            continue;
        }
        let users = graph.node(node).users();
        let [user] = users else {
            continue;
        };
        let Some(target) = graph.node(*user).block() else {
            continue;
        };
        if graph.node(node).block() != Some(target) {
            graph.relocate_to_block(node, target);
            moved += 1;
        }
    }
    moved
}

/// Local instruction scheduling, distinct from [`schedule_late`]'s
/// cross-block sinking: within each block, topologically sort the already
/// assigned nodes so that data dependencies and the serialization order
/// between side-effecting nodes (Store, Call, Branch, Guard, Return) are
/// both respected, tie-breaking with the heuristics in §4.4.10 — a ready
/// `LoadProperty` goes first (latency hiding), then the ready node with the
/// most users (it's on more critical paths), then original program order.
pub fn schedule_blocks(graph: &mut IrGraph) -> usize {
    let mut changed = 0;
    for block in graph.block_ids().collect::<Vec<_>>() {
        let original: Vec<NodeId> = graph.block(block).nodes().to_vec();
        let scheduled = schedule_one_block(graph, &original);
        if scheduled != original {
            changed += 1;
            *graph.block_mut(block).nodes_mut() = scheduled;
        }
    }
    changed
}

fn schedule_one_block(graph: &IrGraph, original: &[NodeId]) -> Vec<NodeId> {
    let index_of: std::collections::HashMap<NodeId, usize> =
        original.iter().enumerate().map(|(i, &n)| (n, i)).collect();
    let in_block: FxHashSet<NodeId> = original.iter().copied().collect();

    // predecessor edges: data edges from same-block inputs, plus a
    // serialization edge from each side-effecting node to the next one.
    let mut preds: Vec<FxHashSet<NodeId>> = original
        .iter()
        .map(|&n| {
            graph
                .node(n)
                .inputs()
                .iter()
                .copied()
                .filter(|i| in_block.contains(i))
                .collect()
        })
        .collect();
    let mut last_effect: Option<NodeId> = None;
    for &n in original {
        if graph.node(n).is_side_effecting() {
            if let Some(prev) = last_effect {
                preds[index_of[&n]].insert(prev);
            }
            last_effect = Some(n);
        }
    }

    let mut remaining_preds = preds;
    let mut scheduled: Vec<NodeId> = Vec::with_capacity(original.len());
    let mut done: FxHashSet<NodeId> = FxHashSet::default();

    while scheduled.len() < original.len() {
        let mut ready: Vec<NodeId> = original
            .iter()
            .copied()
            .filter(|n| !done.contains(n) && remaining_preds[index_of[n]].is_empty())
            .collect();
        ready.sort_by_key(|&n| {
            let is_load = !matches!(graph.node(n).kind(), NodeKind::LoadProperty(_));
            let users = graph.node(n).users().len();
            (is_load, std::cmp::Reverse(users), index_of[&n])
        });
        let next = ready[0];
        scheduled.push(next);
        done.insert(next);
        for p in remaining_preds.iter_mut() {
            p.remove(&next);
        }
    }

    scheduled
}
