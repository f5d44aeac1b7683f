//! Shared helpers for the integration suite: expression builders and a
//! reference evaluator with explicit two's-complement width semantics.
#![allow(dead_code)]

use opal_verify::ast::{BinaryOp, ExprKind, ExprRef, Expression, UnaryOp};
use opal_verify::error::Span;
use opal_verify::types::IntWidth;
use std::collections::HashMap;

pub fn sp() -> Span {
    Span::unknown()
}

pub fn var(name: &str) -> ExprRef {
    Expression::variable(name, sp())
}

pub fn int32(value: i64) -> ExprRef {
    Expression::int32(value, sp())
}

pub fn int8(value: i64) -> ExprRef {
    Expression::int(value as i128, IntWidth::W8, true, sp())
}

pub fn boolean(value: bool) -> ExprRef {
    Expression::boolean(value, sp())
}

pub fn bin(op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
    Expression::binary(op, left, right, sp())
}

pub fn not(operand: ExprRef) -> ExprRef {
    Expression::not(operand, sp())
}

/// Variable assignment for the reference evaluator
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub ints: HashMap<String, i128>,
    pub bools: HashMap<String, bool>,
}

/// Environment with the given integer assignments
pub fn env_with(ints: &[(&str, i128)]) -> Env {
    let mut environment = Env::default();
    for (name, value) in ints {
        environment.ints.insert(name.to_string(), *value);
    }
    environment
}

/// Evaluated value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i128),
    Bool(bool),
}

fn truncate(value: i128, bits: u32) -> i128 {
    let mask = (1i128 << bits) - 1;
    let low = value & mask;
    if (low >> (bits - 1)) & 1 == 1 {
        low - (1i128 << bits)
    } else {
        low
    }
}

/// Reference evaluation under two's-complement semantics at each
/// literal's width; defaults variables to the given width
pub fn eval(expr: &ExprRef, env: &Env, width_bits: u32) -> Option<Value> {
    let value = match &expr.kind {
        ExprKind::IntLiteral { value, .. } => Value::Int(*value),
        ExprKind::BoolLiteral(b) => Value::Bool(*b),
        ExprKind::Variable(name) => {
            if let Some(v) = env.ints.get(name) {
                Value::Int(*v)
            } else if let Some(b) = env.bools.get(name) {
                Value::Bool(*b)
            } else {
                return None;
            }
        }
        ExprKind::Unary { op, operand } => {
            let inner = eval(operand, env, width_bits)?;
            match (op, inner) {
                (UnaryOp::Negate, Value::Int(v)) => {
                    Value::Int(truncate(v.wrapping_neg(), width_bits))
                }
                (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
                (UnaryOp::BitNot, Value::Int(v)) => Value::Int(truncate(!v, width_bits)),
                _ => return None,
            }
        }
        ExprKind::Binary { op, left, right } => {
            let l = eval(left, env, width_bits)?;
            let r = eval(right, env, width_bits)?;
            match (l, r) {
                (Value::Int(a), Value::Int(b)) => match op {
                    BinaryOp::Add => Value::Int(truncate(a.wrapping_add(b), width_bits)),
                    BinaryOp::Sub => Value::Int(truncate(a.wrapping_sub(b), width_bits)),
                    BinaryOp::Mul => Value::Int(truncate(a.wrapping_mul(b), width_bits)),
                    BinaryOp::Eq => Value::Bool(a == b),
                    BinaryOp::Ne => Value::Bool(a != b),
                    BinaryOp::Lt => Value::Bool(a < b),
                    BinaryOp::Le => Value::Bool(a <= b),
                    BinaryOp::Gt => Value::Bool(a > b),
                    BinaryOp::Ge => Value::Bool(a >= b),
                    BinaryOp::BitAnd => Value::Int(truncate(a & b, width_bits)),
                    BinaryOp::BitOr => Value::Int(truncate(a | b, width_bits)),
                    BinaryOp::BitXor => Value::Int(truncate(a ^ b, width_bits)),
                    _ => return None,
                },
                (Value::Bool(a), Value::Bool(b)) => match op {
                    BinaryOp::And => Value::Bool(a && b),
                    BinaryOp::Or => Value::Bool(a || b),
                    BinaryOp::Eq => Value::Bool(a == b),
                    BinaryOp::Ne => Value::Bool(a != b),
                    _ => return None,
                },
                _ => return None,
            }
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => match eval(condition, env, width_bits)? {
            Value::Bool(true) => eval(then_expr, env, width_bits)?,
            Value::Bool(false) => eval(else_expr, env, width_bits)?,
            Value::Int(_) => return None,
        },
        ExprKind::Implies {
            antecedent,
            consequent,
        } => {
            let a = eval(antecedent, env, width_bits)?;
            let c = eval(consequent, env, width_bits)?;
            match (a, c) {
                (Value::Bool(a), Value::Bool(c)) => Value::Bool(!a || c),
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(value)
}
