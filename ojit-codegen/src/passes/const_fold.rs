//! Constant folding (§4.4.1).
//!
//! Rewrites a `BinaryOp`/`UnaryOp` node whose operands are all `Constant` in
//! place into a `Constant` node carrying the computed result, via
//! `Node::set_kind` — the node's identity and user list are untouched, so
//! every consumer keeps working without rewiring. Folds that would be
//! unsound to precompute (division/remainder by zero, a shift amount that
//! overflows, integer overflow on a checked op) are left alone for the
//! runtime to handle, matching the "don't fold across a trap" rule in §4.4.1.

use crate::ir::{BinaryOperator, ConstantValue, IrGraph, NodeId, NodeKind, UnaryOperator};

/// Fold every foldable node in `graph`. Returns the number of nodes folded.
pub fn fold_constants(graph: &mut IrGraph) -> usize {
    let mut folded = 0;
    let ids: Vec<NodeId> = graph.node_ids().collect();
    for id in ids {
        if let Some(value) = try_fold(graph, id) {
            graph.clear_inputs(id);
            graph.node_mut(id).set_kind(NodeKind::Constant(value));
            folded += 1;
        }
    }
    folded
}

fn try_fold(graph: &IrGraph, id: NodeId) -> Option<ConstantValue> {
    match graph.node(id).kind().clone() {
        NodeKind::BinaryOp(op) => {
            let inputs = graph.node(id).inputs();
            let lhs = as_constant(graph, inputs[0])?;
            let rhs = as_constant(graph, inputs[1])?;
            fold_binary(op, lhs, rhs)
        }
        NodeKind::UnaryOp(op) => {
            let operand = as_constant(graph, graph.node(id).inputs()[0])?;
            fold_unary(op, operand)
        }
        _ => None,
    }
}

fn as_constant(graph: &IrGraph, id: NodeId) -> Option<ConstantValue> {
    match graph.node(id).kind() {
        NodeKind::Constant(v) => Some(*v),
        _ => None,
    }
}

fn fold_binary(op: BinaryOperator, lhs: ConstantValue, rhs: ConstantValue) -> Option<ConstantValue> {
    use BinaryOperator::*;
    match op {
        Add | Sub | Mul | Div | Rem | Shl | Shr | BitAnd => {
            let l = lhs.as_int()?;
            let r = rhs.as_int()?;
            let result = match op {
                Add => l.checked_add(r)?,
                Sub => l.checked_sub(r)?,
                Mul => l.checked_mul(r)?,
                Div if r != 0 => l.checked_div(r)?,
                Rem if r != 0 => l.checked_rem(r)?,
                Div | Rem => return None,
                Shl => l.checked_shl(u32::try_from(r).ok()?)?,
                Shr => l.checked_shr(u32::try_from(r).ok()?)?,
                BitAnd => l & r,
                _ => unreachable!(),
            };
            Some(ConstantValue::Int(result))
        }
        Eq | Ne | Lt | Le | Gt | Ge => {
            let l = lhs.as_int()?;
            let r = rhs.as_int()?;
            let result = match op {
                Eq => l == r,
                Ne => l != r,
                Lt => l < r,
                Le => l <= r,
                Gt => l > r,
                Ge => l >= r,
                _ => unreachable!(),
            };
            Some(ConstantValue::Bool(result))
        }
    }
}

fn fold_unary(op: UnaryOperator, operand: ConstantValue) -> Option<ConstantValue> {
    match op {
        UnaryOperator::Neg => operand.as_int().and_then(i64::checked_neg).map(ConstantValue::Int),
        UnaryOperator::Not => match operand {
            ConstantValue::Bool(b) => Some(ConstantValue::Bool(!b)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;

    #[test]
    fn folds_scenario_1_from_the_design_notes() {
        // Constant(2), Constant(3), Add, Return.
        let mut b = GraphBuilder::new();
        let two = b.constant(ConstantValue::Int(2)).unwrap();
        let three = b.constant(ConstantValue::Int(3)).unwrap();
        let sum = b.binary(BinaryOperator::Add, two, three).unwrap();
        b.ret(Some(sum)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        let folded = fold_constants(&mut g);
        assert_eq!(folded, 1);
        assert_eq!(g.node(sum).kind(), &NodeKind::Constant(ConstantValue::Int(5)));
        assert!(g.node(sum).inputs().is_empty());
        g.check_invariants().unwrap();
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let mut b = GraphBuilder::new();
        let ten = b.constant(ConstantValue::Int(10)).unwrap();
        let zero = b.constant(ConstantValue::Int(0)).unwrap();
        let div = b.binary(BinaryOperator::Div, ten, zero).unwrap();
        b.ret(Some(div)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        fold_constants(&mut g);
        assert!(matches!(g.node(div).kind(), NodeKind::BinaryOp(BinaryOperator::Div)));
    }

    #[test]
    fn comparison_folds_to_bool() {
        let mut b = GraphBuilder::new();
        let a = b.constant(ConstantValue::Int(4)).unwrap();
        let c = b.constant(ConstantValue::Int(9)).unwrap();
        let lt = b.binary(BinaryOperator::Lt, a, c).unwrap();
        b.ret(Some(lt)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        fold_constants(&mut g);
        assert_eq!(g.node(lt).kind(), &NodeKind::Constant(ConstantValue::Bool(true)));
    }
}
