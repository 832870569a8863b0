//! Compiler driver (§4.7, C8): the tier-up decision and the fixed pipeline
//! that turns a built IR graph into a [`crate::artifact::CompiledArtifact`].
//!
//! Building the initial graph from bytecode (C2) is the caller's job — the
//! bytecode object's shape is outside this crate's scope (§1), so callers
//! drive [`crate::builder::GraphBuilder`] themselves and hand the finished
//! graph plus its frame object to [`compile`]. Everything from SSA
//! construction onward is this module's fixed, unconditional sequence.

use crate::artifact::{CompiledArtifact, DeoptTrigger, GuardDescriptor};
use crate::ir::{IrGraph, NodeId, NodeKind};
use crate::passes::{bounds_check, code_motion, const_fold, dce, escape, inline_cache, licm, range_analysis, scalar_replace, strength_reduction};
use crate::profile::ProfilingRecord;
use crate::range::Range;
use crate::regalloc;
use crate::result::CodegenResult;
use crate::speculation;
use crate::ssa;

/// Thresholds governing the tier-up decision (§4.7, §6).
#[derive(Copy, Clone, Debug)]
pub struct TierUpThresholds {
    /// Tier up once a function has been called at least this many times.
    pub call_count: u64,
    /// Tier up once cumulative baseline-tier execution time reaches this
    /// many milliseconds, regardless of call count.
    pub cumulative_baseline_millis: u64,
}

impl Default for TierUpThresholds {
    fn default() -> Self {
        TierUpThresholds {
            call_count: 1000,
            cumulative_baseline_millis: 100,
        }
    }
}

/// The tier-up predicate (§4.7, §6): should `function_id` be handed to the
/// optimizing compiler now? `function_id` does not otherwise affect the
/// decision — it exists so the interface matches the profiler's per-function
/// bookkeeping, and so a future policy could special-case particular
/// functions without changing this signature.
pub fn should_tier_up(
    thresholds: &TierUpThresholds,
    _function_id: u32,
    observed_call_count: u64,
    cumulative_baseline_millis: u64,
) -> bool {
    observed_call_count >= thresholds.call_count
        || cumulative_baseline_millis >= thresholds.cumulative_baseline_millis
}

/// Constant-fold and DCE to a fixpoint: a fold can orphan an operand that
/// DCE then removes, and removing a node can retrigger folding of whatever
/// used to depend on it. Returns once neither pass changes anything.
fn fold_and_eliminate_to_fixpoint(graph: &mut IrGraph) {
    loop {
        let folded = const_fold::fold_constants(graph);
        let eliminated = dce::eliminate_dead_code(graph);
        if folded == 0 && eliminated == 0 {
            break;
        }
    }
}

fn guard_descriptors(graph: &IrGraph, guard_ids: &[NodeId]) -> Vec<GuardDescriptor> {
    guard_ids
        .iter()
        .filter_map(|&id| match graph.node(id).kind() {
            NodeKind::Guard(check) => Some(GuardDescriptor { id, check: check.clone() }),
            _ => None,
        })
        .collect()
}

/// Every `Guard` node currently in `graph`, in the order they appear in
/// their blocks' node lists (stable and deterministic, since that's the
/// order the speculation/IC passes inserted them in).
fn all_guards(graph: &IrGraph) -> Vec<NodeId> {
    let mut guards = Vec::new();
    for block in graph.block_ids() {
        for &node in graph.block(block).nodes() {
            if matches!(graph.node(node).kind(), NodeKind::Guard(_)) {
                guards.push(node);
            }
        }
    }
    guards
}

/// Run the full optimization pipeline (§4.7) over `graph` and produce a
/// [`CompiledArtifact`]. `frame` is the builder's synthetic frame object
/// (see [`crate::builder::GraphBuilder::frame_object`]); `profile` is the
/// baseline tier's feedback, may be [`ProfilingRecord::default`] to disable
/// all speculation; `range_speculations` are the parameter/value ranges the
/// embedder wants guarded (typically derived from `profile`'s per-site type
/// feedback — deriving them automatically is future work, see DESIGN.md).
///
/// Code generation itself (turning the scheduled, register-allocated graph
/// into machine bytes) is out of scope; the artifact's `code` is always
/// empty and `entry_point` always 0.
pub fn compile(
    mut graph: IrGraph,
    frame: NodeId,
    profile: &ProfilingRecord,
    range_speculations: &[(NodeId, Range)],
) -> CodegenResult<CompiledArtifact> {
    // Build SSA (§4.3, C4).
    ssa::promote_variables(&mut graph, frame)?;

    // Constant folding (§4.4.1) + DCE (§4.4.2), to a fixpoint.
    fold_and_eliminate_to_fixpoint(&mut graph);

    // Loop optimizer: LICM then unrolling (§4.4.3).
    licm::hoist_invariant_code(&mut graph);
    licm::unroll_counted_loops(&mut graph);

    // Escape analysis + scalar replacement (§4.4.4, §4.4.5), frame already
    // promoted above so it's excluded from the generic sweep.
    let escape_info = escape::analyze(&graph);
    scalar_replace::replace_scalars(&mut graph, &escape_info, &[frame])?;

    // Strength reduction (§4.4.6).
    strength_reduction::reduce_strength(&mut graph);

    // Range analysis (§4.4.7) feeding bounds-check elimination (§4.4.8).
    let ranges = range_analysis::analyze(&graph);
    bounds_check::eliminate_bounds_checks(&mut graph, &ranges);

    // Polymorphic inline-cache lowering (§4.4.9).
    inline_cache::lower_monomorphic_sites(&mut graph, profile);
    inline_cache::lower_polymorphic_sites(&mut graph, profile);

    // Speculation: insert guards and build deopt metadata (§4.5, C6).
    let (_inserted, deopt_metadata) = speculation::insert_range_speculations(&mut graph, range_speculations);

    fold_and_eliminate_to_fixpoint(&mut graph);

    // Code motion then local scheduling (§4.4.10).
    code_motion::schedule_late(&mut graph);
    code_motion::schedule_blocks(&mut graph);

    // Register allocation (§4.6, C7). Not consulted further here — a real
    // code generator would use `allocation` to place each value; we only
    // need it to exist and be valid, since emission is out of scope.
    let live = regalloc::analyze_liveness(&graph);
    let interference = regalloc::build_interference(&graph, &live);
    let candidates = regalloc::candidates(&graph);
    let _allocation = regalloc::allocate(&interference, &candidates);

    // Guards and deopt triggers survive every pass above (DCE treats Guard
    // as a side-effecting live root), so collecting them now reflects
    // everything the pipeline inserted.
    let guard_ids = all_guards(&graph);
    let guards = guard_descriptors(&graph, &guard_ids);
    let deopt_info = deopt_metadata
        .points()
        .iter()
        .map(|point| DeoptTrigger {
            guard: point.guard,
            reason: "speculation failed".to_string(),
            resume_offset: 0,
            value_map: point.live_values.clone(),
        })
        .collect();

    CompiledArtifact::new(Vec::new(), 0, guards, deopt_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::ir::ConstantValue;

    #[test]
    fn tier_up_fires_on_call_count_or_time_whichever_first() {
        let thresholds = TierUpThresholds::default();
        assert!(!should_tier_up(&thresholds, 1, 10, 5));
        assert!(should_tier_up(&thresholds, 1, 1000, 5));
        assert!(should_tier_up(&thresholds, 1, 10, 100));
    }

    #[test]
    fn empty_function_compiles_through_the_whole_pipeline() {
        let mut b = GraphBuilder::new();
        let frame = b.frame_object();
        b.ret(None).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let graph = b.finalize().unwrap();

        let artifact = compile(graph, frame, &ProfilingRecord::new(), &[]).unwrap();
        assert!(artifact.code().is_empty());
        assert_eq!(artifact.entry_point(), 0);
        assert!(artifact.guards().is_empty());
        assert!(artifact.deopt_info().is_empty());
    }

    #[test]
    fn constant_folding_scenario_survives_the_full_pipeline() {
        // Scenario 1 from §8: Constant(2) + Constant(3), returned.
        let mut b = GraphBuilder::new();
        let frame = b.frame_object();
        let two = b.constant(ConstantValue::Int(2)).unwrap();
        let three = b.constant(ConstantValue::Int(3)).unwrap();
        let sum = b.binary(crate::ir::BinaryOperator::Add, two, three).unwrap();
        b.ret(Some(sum)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let graph = b.finalize().unwrap();

        let artifact = compile(graph, frame, &ProfilingRecord::new(), &[]).unwrap();
        assert!(artifact.guards().is_empty());
    }

    #[test]
    fn range_speculation_produces_a_guard_and_a_matching_deopt_trigger() {
        let mut b = GraphBuilder::new();
        let frame = b.frame_object();
        let p0 = b.parameter(0).unwrap();
        b.ret(Some(p0)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let graph = b.finalize().unwrap();

        let speculations = [(p0, Range { lo: 0, hi: 255 })];
        let artifact = compile(graph, frame, &ProfilingRecord::new(), &speculations).unwrap();
        assert_eq!(artifact.guards().len(), 1);
        assert_eq!(artifact.deopt_info().len(), 1);
        assert_eq!(artifact.deopt_info()[0].guard, artifact.guards()[0].id);
    }
}
