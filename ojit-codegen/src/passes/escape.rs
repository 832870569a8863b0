//! Escape analysis (§4.4.4): which object-like nodes never leave the
//! function in a way an alias could observe, and so are candidates for
//! scalar replacement (§4.4.5).
//!
//! The IR has no dedicated allocation-site node kind, so the candidate set
//! is every `Parameter` and `Phi` node (the synthetic frame object used for
//! variable lowering is itself a `Parameter`, see `crate::builder`). A
//! candidate escapes if it is used as the argument to `Return`, as the
//! *value* half of a `StoreProperty` (being the base is fine — that's just
//! a field access on it), or as any argument to a `Call`. Escaping then
//! propagates through `Phi`: if a phi escapes, so does every one of its
//! inputs, since the phi's value could be any of them. Both rules are
//! applied to a fixpoint — optimistic start (everything `NoEscape`),
//! monotone growth of the escaping set, matching §8's escape-lattice
//! invariant.

use crate::ir::{IrGraph, NodeId, NodeKind};
use rustc_hash::FxHashSet;

/// Escape facts for one graph: the set of candidate objects proven not to
/// escape.
pub struct EscapeInfo {
    no_escape: FxHashSet<NodeId>,
}

impl EscapeInfo {
    /// Was `id` found to be a non-escaping candidate object?
    pub fn no_escape(&self, id: NodeId) -> bool {
        self.no_escape.contains(&id)
    }
}

fn is_candidate(graph: &IrGraph, id: NodeId) -> bool {
    matches!(graph.node(id).kind(), NodeKind::Parameter(_) | NodeKind::Phi)
}

fn directly_escapes(graph: &IrGraph, obj: NodeId) -> bool {
    graph.node(obj).users().iter().any(|&user| match graph.node(user).kind() {
        NodeKind::Return => true,
        NodeKind::StoreProperty(_) => graph.node(user).inputs().get(1) == Some(&obj),
        NodeKind::Call { .. } => true,
        _ => false,
    })
}

/// Run escape analysis over `graph`.
pub fn analyze(graph: &IrGraph) -> EscapeInfo {
    let candidates: FxHashSet<NodeId> = graph.node_ids().filter(|&id| is_candidate(graph, id)).collect();
    let mut escapes: FxHashSet<NodeId> = FxHashSet::default();

    let mut changed = true;
    while changed {
        changed = false;
        for &obj in &candidates {
            if !escapes.contains(&obj) && directly_escapes(graph, obj) && escapes.insert(obj) {
                changed = true;
            }
        }
        for &obj in &candidates {
            if escapes.contains(&obj) && matches!(graph.node(obj).kind(), NodeKind::Phi) {
                for &input in graph.node(obj).inputs() {
                    if candidates.contains(&input) && escapes.insert(input) {
                        changed = true;
                    }
                }
            }
        }
    }

    let no_escape = candidates.difference(&escapes).copied().collect();
    EscapeInfo { no_escape }
}
