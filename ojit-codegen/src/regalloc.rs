//! Chaitin-style graph-coloring register allocation (§4.6, C8).
//!
//! Three classical stages: liveness analysis over the CFG, an interference
//! graph built from it (two values interfere if simultaneously live),
//! then simplify/spill/color on that graph. Simplify repeatedly removes a
//! node with fewer than `NUM_REGISTERS` neighbors (always colorable once its
//! neighbors are colored); when none remains, it optimistically removes a
//! high-degree node as a potential spill and keeps going, the way Chaitin's
//! original algorithm does, rather than spilling eagerly. The low/high
//! degree split each iteration reuses [`crate::partition_slice::partition_slice`].

use crate::ir::{BlockId, IrGraph, NodeId, NodeKind};
use crate::partition_slice::partition_slice;
use ojit_entity::SecondaryMap;
use rustc_hash::{FxHashMap, FxHashSet};

/// The number of allocatable machine registers this allocator targets.
pub const NUM_REGISTERS: usize = 14;

/// Per-block live-in/live-out sets.
pub struct LiveSets {
    live_in: SecondaryMap<BlockId, FxHashSet<NodeId>>,
    live_out: SecondaryMap<BlockId, FxHashSet<NodeId>>,
}

fn empty_set() -> &'static FxHashSet<NodeId> {
    static EMPTY_SET: std::sync::OnceLock<FxHashSet<NodeId>> = std::sync::OnceLock::new();
    EMPTY_SET.get_or_init(FxHashSet::default)
}

impl LiveSets {
    pub fn live_in(&self, block: BlockId) -> &FxHashSet<NodeId> {
        self.live_in.get(block).unwrap_or_else(|| empty_set())
    }

    pub fn live_out(&self, block: BlockId) -> &FxHashSet<NodeId> {
        self.live_out.get(block).unwrap_or_else(|| empty_set())
    }
}

/// Does this node produce a value that might need a register (as opposed to
/// a pure control or void-effect node)?
fn is_value(graph: &IrGraph, id: NodeId) -> bool {
    !matches!(
        graph.node(id).kind(),
        NodeKind::Branch | NodeKind::Return | NodeKind::Merge | NodeKind::StoreProperty(_)
    )
}

/// Classical backward fixpoint liveness: `live_out[B] = ⋃ live_in[succ]`,
/// `live_in[B] = uses[B] ∪ (live_out[B] - defs[B])`.
pub fn analyze_liveness(graph: &IrGraph) -> LiveSets {
    let mut live_in: SecondaryMap<BlockId, FxHashSet<NodeId>> = SecondaryMap::new();
    let mut live_out: SecondaryMap<BlockId, FxHashSet<NodeId>> = SecondaryMap::new();
    let blocks: Vec<BlockId> = graph.block_ids().collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &block in blocks.iter().rev() {
            let mut out = FxHashSet::default();
            for &succ in graph.block(block).succs() {
                out.extend(live_in.get(succ).cloned().unwrap_or_default());
            }

            let mut cur = out.clone();
            for &node in graph.block(block).nodes().iter().rev() {
                if is_value(graph, node) {
                    cur.remove(&node);
                }
                for &input in graph.node(node).inputs() {
                    if is_value(graph, input) {
                        cur.insert(input);
                    }
                }
            }

            if live_out.get(block) != Some(&out) {
                live_out[block] = out;
                changed = true;
            }
            if live_in.get(block) != Some(&cur) {
                live_in[block] = cur;
                changed = true;
            }
        }
    }

    LiveSets { live_in, live_out }
}

/// The interference graph: an undirected adjacency of values simultaneously
/// live at some program point.
#[derive(Default)]
pub struct InterferenceGraph {
    adjacency: FxHashMap<NodeId, FxHashSet<NodeId>>,
}

impl InterferenceGraph {
    fn add_edge(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn neighbors(&self, n: NodeId) -> &FxHashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<FxHashSet<NodeId>> = std::sync::OnceLock::new();
        self.adjacency
            .get(&n)
            .unwrap_or_else(|| EMPTY.get_or_init(FxHashSet::default))
    }

    pub fn degree(&self, n: NodeId) -> usize {
        self.neighbors(n).len()
    }
}

/// Build the interference graph from `graph`'s liveness. Walks each block
/// backward maintaining a running live set; the node defined at each step
/// interferes with everything still live after it.
pub fn build_interference(graph: &IrGraph, live: &LiveSets) -> InterferenceGraph {
    let mut ig = InterferenceGraph::default();
    for block in graph.block_ids() {
        let mut current = live.live_out(block).clone();
        for &node in graph.block(block).nodes().iter().rev() {
            if is_value(graph, node) {
                for &other in &current {
                    ig.add_edge(node, other);
                }
                current.remove(&node);
            }
            for &input in graph.node(node).inputs() {
                if is_value(graph, input) {
                    current.insert(input);
                }
            }
        }
    }
    ig
}

/// Where a value ended up: a physical register slot, or a spill slot in the
/// deopt-safe spill area.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Allocation {
    Register(u8),
    Spill(u32),
}

/// The final register allocation: one [`Allocation`] per value candidate.
#[derive(Default)]
pub struct AllocationMap {
    assignments: FxHashMap<NodeId, Allocation>,
}

impl AllocationMap {
    pub fn get(&self, id: NodeId) -> Option<Allocation> {
        self.assignments.get(&id).copied()
    }

    pub fn spill_count(&self) -> usize {
        self.assignments
            .values()
            .filter(|a| matches!(a, Allocation::Spill(_)))
            .count()
    }
}

/// Every value-producing node in `graph`, in no particular order — the
/// allocator's candidate set.
pub fn candidates(graph: &IrGraph) -> Vec<NodeId> {
    graph.node_ids().filter(|&id| is_value(graph, id)).collect()
}

/// Run simplify/spill/color over `interference` for exactly `candidates`.
pub fn allocate(interference: &InterferenceGraph, candidates: &[NodeId]) -> AllocationMap {
    let mut working: FxHashMap<NodeId, FxHashSet<NodeId>> = FxHashMap::default();
    for &n in candidates {
        working.insert(n, interference.neighbors(n).clone());
    }

    let mut remaining: Vec<NodeId> = candidates.to_vec();
    let mut stack: Vec<NodeId> = Vec::new();

    while !remaining.is_empty() {
        let low_degree_count = partition_slice(&mut remaining, |&n| {
            working.get(&n).map_or(0, |s| s.len()) < NUM_REGISTERS
        });
        let chosen = if low_degree_count > 0 {
            remaining.swap_remove(0)
        } else {
            remaining.swap_remove(remaining.len() - 1)
        };
        stack.push(chosen);
        if let Some(neighbors) = working.remove(&chosen) {
            for nb in neighbors {
                if let Some(s) = working.get_mut(&nb) {
                    s.remove(&chosen);
                }
            }
        }
    }

    let mut assignments: FxHashMap<NodeId, Allocation> = FxHashMap::default();
    let mut next_spill = 0u32;
    while let Some(n) = stack.pop() {
        let used: FxHashSet<u8> = interference
            .neighbors(n)
            .iter()
            .filter_map(|nb| match assignments.get(nb) {
                Some(Allocation::Register(r)) => Some(*r),
                _ => None,
            })
            .collect();
        let allocation = (0..NUM_REGISTERS as u8)
            .find(|c| !used.contains(c))
            .map(Allocation::Register)
            .unwrap_or_else(|| {
                let slot = next_spill;
                next_spill += 1;
                Allocation::Spill(slot)
            });
        assignments.insert(n, allocation);
    }

    AllocationMap { assignments }
}
