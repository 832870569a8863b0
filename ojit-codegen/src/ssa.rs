//! SSA construction (§4.3, C4): promotes the builder's frame-object
//! store/load pattern to real phi-based dataflow.
//!
//! This runs as a pass over an already-built graph rather than incrementally
//! during translation the way `cranelift-frontend`'s `FunctionBuilder` does
//! it, but the algorithm is the same one Cytron et al. describe and the one
//! `frontend.rs`'s `use_var`/`def_var`/block-sealing machinery implements
//! under the hood: collect every store to a variable as a definition site,
//! insert phis at the iterated dominance frontier of those sites, then
//! rename by walking the dominator tree in preorder with a stack per
//! variable of its current reaching value. A variable's frame stores and
//! loads are deleted once resolved, leaving ordinary dataflow edges behind —
//! the exact mechanism scalar replacement (§4.4.5) reuses for any other
//! non-escaping object's fields.

use crate::dominator_tree::DominatorTree;
use crate::ir::{BlockId, IrGraph, NodeId, NodeKind, PropertyName};
use crate::result::{CodegenError, CodegenResult};
use std::collections::HashMap;

/// Promote every store/load of `frame`'s properties to SSA values.
///
/// `frame` is normally [`crate::builder::GraphBuilder::frame_object`],
/// captured before [`crate::builder::GraphBuilder::finalize`] consumes the
/// builder. Thin wrapper over [`promote_object`], which is the generic
/// mechanism scalar replacement (§4.4.5) reuses for any other non-escaping
/// object.
pub fn promote_variables(graph: &mut IrGraph, frame: NodeId) -> CodegenResult<()> {
    promote_object(graph, frame)
}

/// Promote every store/load of `object`'s properties to real dataflow,
/// deleting the stores and loads once resolved. `object` must not escape (no
/// alias could have observed a store this pass erases) — callers pass either
/// the builder's frame object or a fact proven by escape analysis.
pub(crate) fn promote_object(graph: &mut IrGraph, object: NodeId) -> CodegenResult<()> {
    let dt = DominatorTree::compute(graph);

    let mut def_blocks: HashMap<PropertyName, Vec<BlockId>> = HashMap::new();
    for id in graph.node_ids() {
        if let NodeKind::StoreProperty(name) = graph.node(id).kind() {
            if graph.node(id).inputs().first() == Some(&object) {
                if let Some(block) = graph.node(id).block() {
                    let sites = def_blocks.entry(name.clone()).or_default();
                    if !sites.contains(&block) {
                        sites.push(block);
                    }
                }
            }
        }
    }

    let phis = insert_phis(graph, &dt, &def_blocks);
    let children = dominator_tree_children(graph, &dt);

    let mut defs = DefStacks::new();
    let mut loads_to_remove = Vec::new();
    let mut stores_to_remove = Vec::new();
    rename_block(
        graph,
        &phis,
        &children,
        object,
        dt.entry(),
        &mut defs,
        &mut loads_to_remove,
        &mut stores_to_remove,
    )?;

    for load in loads_to_remove {
        graph.remove_node(load);
    }
    for store in stores_to_remove {
        graph.remove_node(store);
    }
    Ok(())
}

/// Phis created per block, keyed by the variable they resolve. Each phi's
/// inputs are pre-sized to its block's predecessor count, filled with the
/// frame object as a placeholder until the renaming walk reaches each
/// predecessor and overwrites its slot.
type PhiTable = HashMap<BlockId, HashMap<PropertyName, NodeId>>;

fn insert_phis(
    graph: &mut IrGraph,
    dt: &DominatorTree,
    def_blocks: &HashMap<PropertyName, Vec<BlockId>>,
) -> PhiTable {
    let mut phis: PhiTable = HashMap::new();
    for (name, defs) in def_blocks {
        for block in dt.iterated_frontier(defs) {
            if phis.get(&block).and_then(|m| m.get(name)).is_some() {
                continue;
            }
            let phi = graph.make_node(NodeKind::Phi);
            let pred_count = graph.block(block).preds().len();
            // Pre-size with a placeholder so the renaming walk can overwrite
            // each predecessor's slot by index rather than by append order.
            for _ in 0..pred_count {
                graph.add_input(phi, frame_placeholder(graph, block));
            }
            graph.prepend_to_block(block, phi);
            phis.entry(block).or_default().insert(name.clone(), phi);
        }
    }
    phis
}

/// Any existing node works as a placeholder input; the frame parameter
/// itself (always node 0 in practice) is always live, so borrow it via the
/// block's own entry parameter chain isn't needed — we just need *a* valid
/// `NodeId` to satisfy the input/user invariant until renaming overwrites it.
fn frame_placeholder(graph: &IrGraph, block: BlockId) -> NodeId {
    graph
        .block(block)
        .nodes()
        .first()
        .copied()
        .unwrap_or_else(|| graph.node_ids().next().expect("graph has at least one node"))
}

fn dominator_tree_children(
    graph: &IrGraph,
    dt: &DominatorTree,
) -> HashMap<BlockId, Vec<BlockId>> {
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for block in graph.block_ids() {
        if let Some(idom) = dt.idom(block) {
            children.entry(idom).or_default().push(block);
        }
    }
    children
}

/// Per-variable stack of reaching definitions, restored to the enclosing
/// scope's state when a dominator-tree subtree finishes.
struct DefStacks {
    stacks: HashMap<PropertyName, Vec<NodeId>>,
}

impl DefStacks {
    fn new() -> Self {
        DefStacks {
            stacks: HashMap::new(),
        }
    }

    fn push(&mut self, name: PropertyName, value: NodeId) {
        self.stacks.entry(name).or_default().push(value);
    }

    fn top(&self, name: &PropertyName) -> Option<NodeId> {
        self.stacks.get(name).and_then(|s| s.last().copied())
    }

    fn pop(&mut self, name: &PropertyName) {
        if let Some(s) = self.stacks.get_mut(name) {
            s.pop();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn rename_block(
    graph: &mut IrGraph,
    phis: &PhiTable,
    children: &HashMap<BlockId, Vec<BlockId>>,
    frame: NodeId,
    block: BlockId,
    defs: &mut DefStacks,
    loads_to_remove: &mut Vec<NodeId>,
    stores_to_remove: &mut Vec<NodeId>,
) -> CodegenResult<()> {
    let mut pushed: Vec<PropertyName> = Vec::new();

    if let Some(block_phis) = phis.get(&block) {
        for (name, &phi) in block_phis {
            defs.push(name.clone(), phi);
            pushed.push(name.clone());
        }
    }

    for node in graph.block(block).nodes().to_vec() {
        match graph.node(node).kind().clone() {
            NodeKind::StoreProperty(name) if graph.node(node).inputs().first() == Some(&frame) => {
                let value = graph.node(node).inputs()[1];
                defs.push(name.clone(), value);
                pushed.push(name);
                stores_to_remove.push(node);
            }
            NodeKind::LoadProperty(name) if graph.node(node).inputs().first() == Some(&frame) => {
                let value = defs.top(&name).ok_or_else(|| {
                    CodegenError::MalformedInvariant(format!(
                        "load of variable `{name}` in {block} has no reaching definition"
                    ))
                })?;
                graph.replace_all_uses(node, value);
                loads_to_remove.push(node);
            }
            _ => {}
        }
    }

    for succ in graph.block(block).succs().to_vec() {
        let Some(pred_index) = graph.block(succ).pred_index(block) else {
            continue;
        };
        if let Some(succ_phis) = phis.get(&succ) {
            for (name, &phi) in succ_phis {
                if let Some(value) = defs.top(name) {
                    graph.set_input(phi, pred_index, value);
                }
            }
        }
    }

    if let Some(kids) = children.get(&block) {
        for &kid in kids {
            rename_block(
                graph,
                phis,
                children,
                frame,
                kid,
                defs,
                loads_to_remove,
                stores_to_remove,
            )?;
        }
    }

    for name in pushed {
        defs.pop(&name);
    }
    Ok(())
}
