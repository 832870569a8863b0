//! Compiled output artifact (§6): what the driver hands back to the
//! embedder in place of actually emitting machine code, which is out of
//! scope here.

use crate::ir::{GuardCheck, NodeId};
use crate::result::{CodegenError, CodegenResult};

/// One guard the optimizer inserted, as the embedder's code generator would
/// need to see it to emit the runtime check.
#[derive(Clone, Debug)]
pub struct GuardDescriptor {
    /// The guard node's identity within the graph it came from.
    pub id: NodeId,
    /// What the guard checks.
    pub check: GuardCheck,
}

/// A deoptimization trigger (§3): what to do if a guard fails at runtime.
#[derive(Clone, Debug)]
pub struct DeoptTrigger {
    /// Which guard this trigger belongs to.
    pub guard: NodeId,
    /// Human-readable failure reason, surfaced in diagnostics.
    pub reason: String,
    /// The bytecode offset execution should resume at in the baseline tier.
    pub resume_offset: u32,
    /// Placeholder value map (§9): the SSA values that must be materialized
    /// back into the interpreter's frame. A real implementation couples
    /// this with the register allocator's assignment for each value.
    pub value_map: Vec<NodeId>,
}

/// The compiled output: opaque code, its entry offset, and everything the
/// runtime needs to deoptimize out of it.
///
/// Invariants, enforced at construction: every trigger's guard id appears in
/// `guards`, and triggers appear in the same relative order as their guards
/// do in `guards`.
#[derive(Clone, Debug)]
pub struct CompiledArtifact {
    code: Vec<u8>,
    entry_point: u32,
    guards: Vec<GuardDescriptor>,
    deopt_info: Vec<DeoptTrigger>,
}

impl CompiledArtifact {
    /// Build an artifact, validating the guard/trigger invariants.
    pub fn new(
        code: Vec<u8>,
        entry_point: u32,
        guards: Vec<GuardDescriptor>,
        deopt_info: Vec<DeoptTrigger>,
    ) -> CodegenResult<Self> {
        let mut last_guard_position: Option<usize> = None;
        for trigger in &deopt_info {
            let position = guards.iter().position(|g| g.id == trigger.guard).ok_or_else(|| {
                CodegenError::MalformedInvariant(format!(
                    "deopt trigger references guard {:?} not present in guards",
                    trigger.guard
                ))
            })?;
            if let Some(last) = last_guard_position {
                if position < last {
                    return Err(CodegenError::MalformedInvariant(
                        "deopt triggers are not in guard order".to_string(),
                    ));
                }
            }
            last_guard_position = Some(position);
        }

        Ok(CompiledArtifact {
            code,
            entry_point,
            guards,
            deopt_info,
        })
    }

    /// The opaque compiled code. Empty when code generation itself is out of
    /// scope, as it is for this crate.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Offset of the function's entry point within `code`.
    pub fn entry_point(&self) -> u32 {
        self.entry_point
    }

    /// Every guard the optimizer inserted, in insertion order.
    pub fn guards(&self) -> &[GuardDescriptor] {
        &self.guards
    }

    /// Every deoptimization trigger, ordered with their guards.
    pub fn deopt_info(&self) -> &[DeoptTrigger] {
        &self.deopt_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ojit_entity::EntityRef;

    fn node(i: u32) -> NodeId {
        NodeId::new(i as usize)
    }

    #[test]
    fn well_formed_artifact_is_accepted() {
        let guards = vec![
            GuardDescriptor { id: node(0), check: GuardCheck::NonNull },
            GuardDescriptor { id: node(1), check: GuardCheck::NonNull },
        ];
        let deopt_info = vec![
            DeoptTrigger { guard: node(0), reason: "null check".into(), resume_offset: 10, value_map: vec![] },
            DeoptTrigger { guard: node(1), reason: "null check".into(), resume_offset: 20, value_map: vec![] },
        ];
        assert!(CompiledArtifact::new(vec![], 0, guards, deopt_info).is_ok());
    }

    #[test]
    fn trigger_referencing_an_absent_guard_is_rejected() {
        let guards = vec![GuardDescriptor { id: node(0), check: GuardCheck::NonNull }];
        let deopt_info = vec![DeoptTrigger {
            guard: node(99),
            reason: "bogus".into(),
            resume_offset: 0,
            value_map: vec![],
        }];
        assert!(CompiledArtifact::new(vec![], 0, guards, deopt_info).is_err());
    }

    #[test]
    fn triggers_out_of_guard_order_are_rejected() {
        let guards = vec![
            GuardDescriptor { id: node(0), check: GuardCheck::NonNull },
            GuardDescriptor { id: node(1), check: GuardCheck::NonNull },
        ];
        let deopt_info = vec![
            DeoptTrigger { guard: node(1), reason: "b".into(), resume_offset: 1, value_map: vec![] },
            DeoptTrigger { guard: node(0), reason: "a".into(), resume_offset: 0, value_map: vec![] },
        ];
        assert!(CompiledArtifact::new(vec![], 0, guards, deopt_info).is_err());
    }
}
