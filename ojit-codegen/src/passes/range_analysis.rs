//! Range analysis (§4.4.7): a forward dataflow fixpoint computing a
//! conservative [`Range`] for every node.
//!
//! `Phi` takes the union of its inputs' ranges (so a loop-carried value
//! widens toward `TOP` across iterations rather than being computed once and
//! left wrong); everything else not explicitly handled is `TOP`. Iterates to
//! a fixpoint because a loop body's range can depend on its own
//! back-edge-carried phi.

use crate::ir::{BinaryOperator, IrGraph, NodeId, NodeKind};
use crate::range::Range;
use ojit_entity::SecondaryMap;

/// Node ranges for one graph, as computed by [`analyze`].
pub struct Ranges(SecondaryMap<NodeId, Range>);

impl Ranges {
    /// The computed range for `id`, or `TOP` if analysis never visited it.
    pub fn get(&self, id: NodeId) -> Range {
        self.0[id]
    }
}

/// Compute ranges for every node in `graph`.
pub fn analyze(graph: &IrGraph) -> Ranges {
    let mut ranges: SecondaryMap<NodeId, Range> = SecondaryMap::with_default(Range::TOP);
    let ids: Vec<NodeId> = graph.node_ids().collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &id in &ids {
            let new_range = compute(graph, &ranges, id);
            if new_range != ranges[id] {
                ranges[id] = new_range;
                changed = true;
            }
        }
    }
    Ranges(ranges)
}

fn compute(graph: &IrGraph, ranges: &SecondaryMap<NodeId, Range>, id: NodeId) -> Range {
    match graph.node(id).kind() {
        NodeKind::Constant(v) => v.as_int().map(Range::constant).unwrap_or(Range::TOP),
        NodeKind::BinaryOp(op) => {
            let inputs = graph.node(id).inputs();
            let lhs = ranges[inputs[0]];
            let rhs = ranges[inputs[1]];
            use BinaryOperator::*;
            match op {
                Add => lhs.add(&rhs),
                Sub => lhs.sub(&rhs),
                Mul => lhs.mul(&rhs),
                Div => lhs.div(&rhs),
                Eq | Ne | Lt | Le | Gt | Ge => Range::comparison(),
                _ => Range::TOP,
            }
        }
        NodeKind::Phi => graph
            .node(id)
            .inputs()
            .iter()
            .map(|&i| ranges[i])
            .reduce(|a, b| a.union(&b))
            .unwrap_or(Range::TOP),
        _ => Range::TOP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::ir::ConstantValue;

    #[test]
    fn constant_arithmetic_is_a_precise_point() {
        let mut b = GraphBuilder::new();
        let two = b.constant(ConstantValue::Int(2)).unwrap();
        let three = b.constant(ConstantValue::Int(3)).unwrap();
        let sum = b.binary(BinaryOperator::Add, two, three).unwrap();
        b.ret(Some(sum)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let g = b.finalize().unwrap();

        let ranges = analyze(&g);
        assert_eq!(ranges.get(sum), Range::constant(5));
    }

    #[test]
    fn phi_widens_to_the_union_of_its_inputs() {
        let mut b = GraphBuilder::new();
        let left = b.create_block();
        let right = b.create_block();
        let merge = b.create_block();
        let cond = b.constant(ConstantValue::Bool(true)).unwrap();
        b.branch(cond, left, right).unwrap();

        b.set_current_block(left);
        let one = b.constant(ConstantValue::Int(1)).unwrap();
        b.jump(merge).unwrap();

        b.set_current_block(right);
        let nine = b.constant(ConstantValue::Int(9)).unwrap();
        b.jump(merge).unwrap();

        b.set_current_block(merge);
        let phi = b.make_phi().unwrap();
        b.place_phi(phi, merge);
        let mut g = b.finalize().unwrap();
        // The SSA builder normally wires phi inputs; wire them directly here
        // since this test only exercises range analysis.
        g.add_input(phi, one);
        g.add_input(phi, nine);

        let ranges = analyze(&g);
        assert_eq!(ranges.get(phi), Range { lo: 1, hi: 9 });
    }
}
