//! Speculative guard insertion and deoptimization metadata (§4.5, C6).
//!
//! A speculation is a fact the profiler (§6) observed held on every sample
//! but the static analyses in `passes/` (§4.4) can't prove universally — "this
//! parameter was always a small integer", "this call always hit the same
//! target". Optimizing on top of an unproven fact is only sound if a
//! [`NodeKind::Guard`] re-checks it at the point of use and the pipeline
//! records enough state (a [`DeoptPoint`]) to fall back to the interpreter
//! when a guard misses at runtime, rather than silently miscompiling the
//! rare case the profile didn't see.
//!
//! Inline-cache shape guards (§4.4.9, `passes::inline_cache`) are a special
//! case of this same mechanism restricted to property access sites; this
//! module covers the general one, driven by whatever range speculations the
//! embedder supplies (typically from profiled parameter types).

use crate::ir::{GuardCheck, IrGraph, NodeId, NodeKind};
use crate::range::Range;

/// Everything needed to resume interpretation if `guard` fails at runtime:
/// which guard, and which SSA values must be materialized back into the
/// interpreter's frame.
///
/// Tracking precise liveness per guard is a dataflow problem of its own;
/// this conservatively records every `Parameter` and `Phi` currently in the
/// graph; a real tier-up path would narrow this to the guard's actual
/// live-out set; the constitutent fact — "a superset of the live set is
/// always a sound (if more expensive) deopt metadata" — is why this
/// approximation can't cause a miscompile, only slower deopts.
#[derive(Clone, Debug)]
pub struct DeoptPoint {
    pub guard: NodeId,
    pub live_values: Vec<NodeId>,
}

/// Deoptimization metadata for every guard inserted by this module.
#[derive(Clone, Debug, Default)]
pub struct DeoptMetadata {
    points: Vec<DeoptPoint>,
}

impl DeoptMetadata {
    pub fn points(&self) -> &[DeoptPoint] {
        &self.points
    }

    pub fn for_guard(&self, guard: NodeId) -> Option<&DeoptPoint> {
        self.points.iter().find(|p| p.guard == guard)
    }
}

fn live_value_snapshot(graph: &IrGraph) -> Vec<NodeId> {
    graph
        .node_ids()
        .filter(|&id| matches!(graph.node(id).kind(), NodeKind::Parameter(_) | NodeKind::Phi))
        .collect()
}

/// Insert a `Guard(Range(expected))` immediately after each `(value,
/// expected)` speculation, recording a [`DeoptPoint`] for it. Returns the
/// number of guards inserted along with the accumulated metadata.
pub fn insert_range_speculations(
    graph: &mut IrGraph,
    speculations: &[(NodeId, Range)],
) -> (usize, DeoptMetadata) {
    let mut metadata = DeoptMetadata::default();
    let mut inserted = 0;
    for &(value, expected) in speculations {
        if graph.node(value).block().is_none() {
            continue;
        }
        let guard = graph.make_node(NodeKind::Guard(GuardCheck::Range(expected)));
        graph.add_input(guard, value);
        graph.insert_after(value, guard);
        let live_values = live_value_snapshot(graph);
        metadata.points.push(DeoptPoint { guard, live_values });
        inserted += 1;
    }
    (inserted, metadata)
}
