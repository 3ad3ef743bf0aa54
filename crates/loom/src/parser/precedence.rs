//! Operator-precedence reduction for `infixCall` (spec.md §4.2).
//!
//! `+ -` bind weakest (0), `* /` next (1), `% ^` tightest (2); anything else
//! is treated as precedence 0. Ties reduce left to right.

use crate::ast::{Call, Identifier, Node};
use crate::types::DataType;

fn precedence(op: &str) -> u8 {
    match op {
        "*" | "/" => 1,
        "%" | "^" => 2,
        _ => 0,
    }
}

/// Repeatedly reduces the strongest-binding adjacent operand pair into a
/// `Call(op, [lhs, rhs])`, until a single operand remains.
pub fn reduce(mut operands: Vec<Node>, mut operators: Vec<Identifier>) -> Node {
    while !operators.is_empty() {
        let best = operators
            .iter()
            .enumerate()
            .skip(1)
            .fold(0, |best, (i, op)| if precedence(&op.name) > precedence(&operators[best].name) { i } else { best });

        let lhs = operands.remove(best);
        let rhs = operands.remove(best);
        let op = operators.remove(best);
        let position = op.position;
        let reduced = Node::Call(Call { callee: Box::new(op), arguments: vec![lhs, rhs], data_type: DataType::unknown(), position });
        operands.insert(best, reduced);
    }

    operands.into_iter().next().expect("reduce is only called with at least one operand")
}
