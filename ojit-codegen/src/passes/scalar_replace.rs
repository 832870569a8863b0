//! Scalar replacement (§4.4.5): promote every non-escaping object's fields
//! to direct dataflow.
//!
//! Reuses [`crate::ssa::promote_object`] — the same dominance-frontier phi
//! insertion and dominator-tree-preorder renaming the SSA builder (§4.3)
//! runs for the synthetic frame object, generalized to any object escape
//! analysis (§4.4.4) proves doesn't escape. `exclude` is normally the frame
//! object, already promoted earlier in the pipeline by the SSA builder
//! itself.

use crate::ir::{IrGraph, NodeId};
use crate::passes::escape::EscapeInfo;
use crate::result::CodegenResult;
use crate::ssa;

/// Replace every non-escaping candidate object's field accesses with direct
/// dataflow. Returns the number of objects replaced.
pub fn replace_scalars(
    graph: &mut IrGraph,
    escape: &EscapeInfo,
    exclude: &[NodeId],
) -> CodegenResult<usize> {
    let candidates: Vec<NodeId> = graph
        .node_ids()
        .filter(|&id| escape.no_escape(id) && !exclude.contains(&id))
        .collect();

    for &obj in &candidates {
        ssa::promote_object(graph, obj)?;
    }
    Ok(candidates.len())
}
