//! The optimization pipeline (§4.4): independent passes over an [`crate::ir::IrGraph`],
//! each one a small, focused rewrite. The driver (§4.7) sequences these in a
//! fixed order; each pass leaves the graph's input/user and pred/succ
//! invariants intact, so [`crate::ir::IrGraph::check_invariants`] can run
//! between any two of them.

pub mod bounds_check;
pub mod code_motion;
pub mod const_fold;
pub mod dce;
pub mod escape;
pub mod inline_cache;
pub mod licm;
pub mod range_analysis;
pub mod scalar_replace;
pub mod strength_reduction;
