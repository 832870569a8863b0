//! Strength reduction (§4.4.3): replace an expensive operation with a
//! cheaper one that computes the same result.
//!
//! Multiplication by a power-of-two constant becomes a shift — sound for any
//! integer, including negative ones, since left-shifting reproduces the same
//! two's-complement bit pattern multiplication by `2^k` would; multiplication
//! is commutative, so either operand may carry the constant. Division and
//! modulo by a power of two become a shift right / bitwise AND the same way,
//! but since neither operator is commutative the constant must be the right
//! operand. Identity forms (`x + 0`, `x - 0`, `x * 1`, `x << 0`, `x >> 0`)
//! collapse to their operand; `x * 0` collapses to zero. These leave the
//! original node without users, so a later DCE pass sweeps it.

use crate::ir::{BinaryOperator, ConstantValue, IrGraph, NodeId, NodeKind};

enum Rewrite {
    ReplaceWith(NodeId),
    ToShl(NodeId, u32),
    ToShr(NodeId, u32),
    ToAnd(NodeId, i64),
    ToZero,
}

/// Apply every available strength reduction in `graph`. Returns the number
/// of nodes rewritten.
pub fn reduce_strength(graph: &mut IrGraph) -> usize {
    let mut changed = 0;
    let ids: Vec<NodeId> = graph.node_ids().collect();
    for id in ids {
        if let Some(rewrite) = plan(graph, id) {
            apply(graph, id, rewrite);
            changed += 1;
        }
    }
    changed
}

fn as_int_constant(graph: &IrGraph, id: NodeId) -> Option<i64> {
    match graph.node(id).kind() {
        NodeKind::Constant(v) => v.as_int(),
        _ => None,
    }
}

fn power_of_two_log2(v: i64) -> Option<u32> {
    (v > 0 && (v as u64).is_power_of_two()).then(|| v.trailing_zeros())
}

fn plan(graph: &IrGraph, id: NodeId) -> Option<Rewrite> {
    let NodeKind::BinaryOp(op) = graph.node(id).kind().clone() else {
        return None;
    };
    let inputs = graph.node(id).inputs();
    if inputs.len() != 2 {
        return None;
    }
    let (lhs, rhs) = (inputs[0], inputs[1]);
    let lhs_const = as_int_constant(graph, lhs);
    let rhs_const = as_int_constant(graph, rhs);

    use BinaryOperator::*;
    match op {
        Mul => {
            if rhs_const == Some(0) || lhs_const == Some(0) {
                return Some(Rewrite::ToZero);
            }
            if let Some(k) = rhs_const.and_then(power_of_two_log2) {
                return Some(if k == 0 {
                    Rewrite::ReplaceWith(lhs)
                } else {
                    Rewrite::ToShl(lhs, k)
                });
            }
            if let Some(k) = lhs_const.and_then(power_of_two_log2) {
                return Some(if k == 0 {
                    Rewrite::ReplaceWith(rhs)
                } else {
                    Rewrite::ToShl(rhs, k)
                });
            }
            None
        }
        Div => {
            let k = rhs_const.and_then(power_of_two_log2)?;
            Some(if k == 0 { Rewrite::ReplaceWith(lhs) } else { Rewrite::ToShr(lhs, k) })
        }
        Rem => {
            let k = rhs_const.and_then(power_of_two_log2)?;
            let constant = rhs_const.unwrap();
            Some(if k == 0 { Rewrite::ToZero } else { Rewrite::ToAnd(lhs, constant - 1) })
        }
        Add if rhs_const == Some(0) => Some(Rewrite::ReplaceWith(lhs)),
        Add if lhs_const == Some(0) => Some(Rewrite::ReplaceWith(rhs)),
        Sub if rhs_const == Some(0) => Some(Rewrite::ReplaceWith(lhs)),
        Shl | Shr if rhs_const == Some(0) => Some(Rewrite::ReplaceWith(lhs)),
        _ => None,
    }
}

fn apply(graph: &mut IrGraph, id: NodeId, rewrite: Rewrite) {
    match rewrite {
        Rewrite::ReplaceWith(value) => graph.replace_all_uses(id, value),
        Rewrite::ToShl(operand, shift) => {
            let shift_const = graph.make_node(NodeKind::Constant(ConstantValue::Int(shift as i64)));
            if let Some(block) = graph.node(id).block() {
                graph.prepend_to_block(block, shift_const);
            }
            graph.clear_inputs(id);
            graph.add_input(id, operand);
            graph.add_input(id, shift_const);
            graph.node_mut(id).set_kind(NodeKind::BinaryOp(BinaryOperator::Shl));
        }
        Rewrite::ToShr(operand, shift) => {
            let shift_const = graph.make_node(NodeKind::Constant(ConstantValue::Int(shift as i64)));
            if let Some(block) = graph.node(id).block() {
                graph.prepend_to_block(block, shift_const);
            }
            graph.clear_inputs(id);
            graph.add_input(id, operand);
            graph.add_input(id, shift_const);
            graph.node_mut(id).set_kind(NodeKind::BinaryOp(BinaryOperator::Shr));
        }
        Rewrite::ToAnd(operand, mask) => {
            let mask_const = graph.make_node(NodeKind::Constant(ConstantValue::Int(mask)));
            if let Some(block) = graph.node(id).block() {
                graph.prepend_to_block(block, mask_const);
            }
            graph.clear_inputs(id);
            graph.add_input(id, operand);
            graph.add_input(id, mask_const);
            graph.node_mut(id).set_kind(NodeKind::BinaryOp(BinaryOperator::BitAnd));
        }
        Rewrite::ToZero => {
            graph.clear_inputs(id);
            graph.node_mut(id).set_kind(NodeKind::Constant(ConstantValue::Int(0)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;

    #[test]
    fn multiply_by_power_of_two_becomes_shift() {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0).unwrap();
        let eight = b.constant(ConstantValue::Int(8)).unwrap();
        let mul = b.binary(BinaryOperator::Mul, x, eight).unwrap();
        b.ret(Some(mul)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        reduce_strength(&mut g);
        assert!(matches!(g.node(mul).kind(), NodeKind::BinaryOp(BinaryOperator::Shl)));
        assert_eq!(g.node(mul).inputs()[0], x);
        let shift_amount = g.node(mul).inputs()[1];
        assert_eq!(g.node(shift_amount).kind(), &NodeKind::Constant(ConstantValue::Int(3)));
        g.check_invariants().unwrap();
    }

    #[test]
    fn divide_by_power_of_two_becomes_shift_right() {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0).unwrap();
        let four = b.constant(ConstantValue::Int(4)).unwrap();
        let div = b.binary(BinaryOperator::Div, x, four).unwrap();
        b.ret(Some(div)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        reduce_strength(&mut g);
        assert!(matches!(g.node(div).kind(), NodeKind::BinaryOp(BinaryOperator::Shr)));
        assert_eq!(g.node(div).inputs()[0], x);
        let shift_amount = g.node(div).inputs()[1];
        assert_eq!(g.node(shift_amount).kind(), &NodeKind::Constant(ConstantValue::Int(2)));
        g.check_invariants().unwrap();
    }

    #[test]
    fn divide_by_power_of_two_on_the_left_operand_is_not_reduced() {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0).unwrap();
        let four = b.constant(ConstantValue::Int(4)).unwrap();
        let div = b.binary(BinaryOperator::Div, four, x).unwrap();
        b.ret(Some(div)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        reduce_strength(&mut g);
        assert!(matches!(g.node(div).kind(), NodeKind::BinaryOp(BinaryOperator::Div)));
    }

    #[test]
    fn modulo_by_power_of_two_becomes_bitwise_and() {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0).unwrap();
        let eight = b.constant(ConstantValue::Int(8)).unwrap();
        let rem = b.binary(BinaryOperator::Rem, x, eight).unwrap();
        b.ret(Some(rem)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        reduce_strength(&mut g);
        assert!(matches!(g.node(rem).kind(), NodeKind::BinaryOp(BinaryOperator::BitAnd)));
        assert_eq!(g.node(rem).inputs()[0], x);
        let mask = g.node(rem).inputs()[1];
        assert_eq!(g.node(mask).kind(), &NodeKind::Constant(ConstantValue::Int(7)));
        g.check_invariants().unwrap();
    }

    #[test]
    fn modulo_by_one_is_zero() {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0).unwrap();
        let one = b.constant(ConstantValue::Int(1)).unwrap();
        let rem = b.binary(BinaryOperator::Rem, x, one).unwrap();
        b.ret(Some(rem)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        reduce_strength(&mut g);
        assert_eq!(g.node(rem).kind(), &NodeKind::Constant(ConstantValue::Int(0)));
    }

    #[test]
    fn add_zero_is_identity() {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0).unwrap();
        let zero = b.constant(ConstantValue::Int(0)).unwrap();
        let add = b.binary(BinaryOperator::Add, x, zero).unwrap();
        let consumer = b.unary(crate::ir::UnaryOperator::Neg, add).unwrap();
        b.ret(Some(consumer)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        reduce_strength(&mut g);
        assert_eq!(g.node(consumer).inputs(), &[x]);
        assert!(g.node(add).users().is_empty());
    }

    #[test]
    fn multiply_by_zero_is_zero() {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0).unwrap();
        let zero = b.constant(ConstantValue::Int(0)).unwrap();
        let mul = b.binary(BinaryOperator::Mul, x, zero).unwrap();
        b.ret(Some(mul)).unwrap();
        let entry = b.current_block().unwrap();
        b.set_exit(entry);
        let mut g = b.finalize().unwrap();

        reduce_strength(&mut g);
        assert_eq!(g.node(mul).kind(), &NodeKind::Constant(ConstantValue::Int(0)));
    }
}
