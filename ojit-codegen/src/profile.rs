//! Runtime profiling feedback (§6) consumed by the optimizing pipeline.
//!
//! The interpreter tier (outside this crate's scope) is assumed to have
//! gathered this data by sampling the bytecode it ran before handing the
//! function to the optimizer; nothing in this crate ever ends up writing a
//! `ProfilingRecord` itself, only reading one.

use crate::ir::NodeId;
use std::collections::HashMap;

/// The hidden-object shapes observed at one property access site, most
/// frequently seen first.
#[derive(Clone, Debug, Default)]
pub struct ShapeHistogram {
    shapes: Vec<(u32, u32)>,
}

impl ShapeHistogram {
    pub fn record(&mut self, shape: u32) {
        if let Some(entry) = self.shapes.iter_mut().find(|(s, _)| *s == shape) {
            entry.1 += 1;
        } else {
            self.shapes.push((shape, 1));
        }
    }

    /// Shapes seen at this site, most-frequent first.
    pub fn ranked(&self) -> Vec<u32> {
        let mut shapes = self.shapes.clone();
        shapes.sort_by(|a, b| b.1.cmp(&a.1));
        shapes.into_iter().map(|(s, _)| s).collect()
    }

    /// Is this site monomorphic (every sample saw the same shape)?
    pub fn is_monomorphic(&self) -> bool {
        self.shapes.len() == 1
    }

    /// Polymorphic but bounded: 2 to `limit` distinct shapes seen.
    pub fn is_polymorphic(&self, limit: usize) -> bool {
        (2..=limit).contains(&self.shapes.len())
    }
}

/// Everything the interpreter tier learned about one function's execution
/// before handing it to the optimizer — type feedback per property access
/// site, observed call targets per call site, and branch taken/not-taken
/// counts, keyed by the IR node that will represent that site once built.
#[derive(Clone, Debug, Default)]
pub struct ProfilingRecord {
    pub type_feedback: HashMap<NodeId, ShapeHistogram>,
    pub call_targets: HashMap<NodeId, Vec<String>>,
    pub branch_frequencies: HashMap<NodeId, BranchFrequency>,
}

/// How often a branch's condition was observed true vs. false.
#[derive(Copy, Clone, Debug, Default)]
pub struct BranchFrequency {
    pub taken: u32,
    pub not_taken: u32,
}

impl BranchFrequency {
    /// Fraction of observations that took the branch, `None` with no data.
    pub fn taken_ratio(&self) -> Option<f64> {
        let total = self.taken + self.not_taken;
        if total == 0 {
            None
        } else {
            Some(self.taken as f64 / total as f64)
        }
    }
}

impl ProfilingRecord {
    pub fn new() -> Self {
        Self::default()
    }
}
