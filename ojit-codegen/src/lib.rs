//! Optimizing JIT compiler core: sea-of-nodes IR, SSA construction via
//! dominance frontiers, a fixed pipeline of classical and speculative
//! optimization passes, guard insertion with deoptimization metadata, and
//! Chaitin-style graph-coloring register allocation.
//!
//! [`driver`] is the entry point that sequences the whole pipeline;
//! [`artifact`] is what it hands back to the embedder.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub mod artifact;
pub mod builder;
pub mod dominator_tree;
pub mod driver;
pub mod ir;
pub mod passes;
pub mod profile;
pub mod range;
pub mod regalloc;
pub mod speculation;
pub mod ssa;

mod partition_slice;
mod result;

pub use crate::result::{CodegenError, CodegenResult};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
