// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Contract expression canonicalizer
//!
//! A fixed-point term rewriter over contract expressions: constant folding,
//! algebraic and boolean identities, conditional and implication collapse,
//! and quantifier elimination over literal bodies. Rewrites preserve meaning
//! under two's-complement integer and IEEE-754 float semantics and never
//! introduce divisions or modulo. Division and modulo by a literal zero are
//! deliberately left alone; the bug-pattern checkers flag them.
//!
//! The rewriter is total: unrecognized nodes pass through unchanged, and an
//! unchanged result is the same `Arc` as the input so callers can cheaply
//! detect a fixed point.

use crate::ast::{BinaryOp, ExprKind, ExprRef, Expression, UnaryOp};
use crate::types::IntWidth;
use std::sync::Arc;

/// Cap on fixed-point iterations; in practice two or three suffice
pub const MAX_ITER: usize = 10;

/// Informational outcome of canonicalizing one contract expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplificationNote {
    /// The contract collapsed to the literal `true`
    Tautology,
    /// The contract collapsed to the literal `false`
    Contradiction,
    /// The contract was rewritten but did not collapse
    Simplified,
}

/// Result of canonicalizing an expression
#[derive(Debug, Clone)]
pub struct Simplification {
    pub expr: ExprRef,
    pub note: Option<SimplificationNote>,
}

/// Canonicalize an expression and report what happened
pub fn canonicalize(expr: &ExprRef) -> Simplification {
    let mut current = expr.clone();
    for _ in 0..MAX_ITER {
        let next = simplify_once(&current);
        if Arc::ptr_eq(&next, &current) {
            break;
        }
        current = next;
    }

    let note = if current.is_true() && !expr.is_true() {
        Some(SimplificationNote::Tautology)
    } else if current.is_false() && !expr.is_false() {
        Some(SimplificationNote::Contradiction)
    } else if !Arc::ptr_eq(&current, expr) {
        Some(SimplificationNote::Simplified)
    } else {
        None
    };

    Simplification {
        expr: current,
        note,
    }
}

/// Canonicalize, discarding the note
pub fn simplify(expr: &ExprRef) -> ExprRef {
    canonicalize(expr).expr
}

/// Structural equality that treats commutative operators as unordered
///
/// Spans are ignored. `+`, `*`, `&&`, `||`, `==`, `!=` and the bitwise
/// and/or/xor compare operands in either order; everything else compares
/// positionally.
pub fn structurally_equal(a: &Expression, b: &Expression) -> bool {
    use ExprKind::*;
    match (&a.kind, &b.kind) {
        (
            IntLiteral {
                value: v1,
                width: w1,
                signed: s1,
            },
            IntLiteral {
                value: v2,
                width: w2,
                signed: s2,
            },
        ) => v1 == v2 && w1 == w2 && s1 == s2,
        (
            FloatLiteral {
                value: v1,
                double: d1,
            },
            FloatLiteral {
                value: v2,
                double: d2,
            },
        ) => v1.to_bits() == v2.to_bits() && d1 == d2,
        (BoolLiteral(b1), BoolLiteral(b2)) => b1 == b2,
        (DecimalLiteral(d1), DecimalLiteral(d2)) => d1 == d2,
        (StringLiteral(s1), StringLiteral(s2)) => s1 == s2,
        (NullLiteral, NullLiteral) | (OptionNone, OptionNone) => true,
        (Variable(n1), Variable(n2)) => n1 == n2,
        (
            Unary {
                op: o1,
                operand: e1,
            },
            Unary {
                op: o2,
                operand: e2,
            },
        ) => o1 == o2 && structurally_equal(e1, e2),
        (
            Binary {
                op: o1,
                left: l1,
                right: r1,
            },
            Binary {
                op: o2,
                left: l2,
                right: r2,
            },
        ) => {
            if o1 != o2 {
                return false;
            }
            let positional = structurally_equal(l1, l2) && structurally_equal(r1, r2);
            if positional {
                return true;
            }
            o1.is_commutative() && structurally_equal(l1, r2) && structurally_equal(r1, l2)
        }
        (
            Conditional {
                condition: c1,
                then_expr: t1,
                else_expr: e1,
            },
            Conditional {
                condition: c2,
                then_expr: t2,
                else_expr: e2,
            },
        ) => {
            structurally_equal(c1, c2) && structurally_equal(t1, t2) && structurally_equal(e1, e2)
        }
        (
            FieldAccess {
                object: o1,
                field: f1,
            },
            FieldAccess {
                object: o2,
                field: f2,
            },
        ) => f1 == f2 && structurally_equal(o1, o2),
        (
            Index {
                collection: c1,
                index: i1,
            },
            Index {
                collection: c2,
                index: i2,
            },
        ) => structurally_equal(c1, c2) && structurally_equal(i1, i2),
        (Length(e1), Length(e2)) | (Count(e1), Count(e2)) => structurally_equal(e1, e2),
        (
            Contains {
                collection: c1,
                element: e1,
            },
            Contains {
                collection: c2,
                element: e2,
            },
        ) => structurally_equal(c1, c2) && structurally_equal(e1, e2),
        (
            NullCoalesce {
                value: v1,
                fallback: f1,
            },
            NullCoalesce {
                value: v2,
                fallback: f2,
            },
        ) => structurally_equal(v1, v2) && structurally_equal(f1, f2),
        (
            NullConditional {
                object: o1,
                field: f1,
            },
            NullConditional {
                object: o2,
                field: f2,
            },
        ) => f1 == f2 && structurally_equal(o1, o2),
        (OptionSome(e1), OptionSome(e2))
        | (ResultOk(e1), ResultOk(e2))
        | (ResultErr(e1), ResultErr(e2)) => structurally_equal(e1, e2),
        (
            Call {
                function: f1,
                args: a1,
            },
            Call {
                function: f2,
                args: a2,
            },
        ) => {
            f1 == f2
                && a1.len() == a2.len()
                && a1
                    .iter()
                    .zip(a2.iter())
                    .all(|(x, y)| structurally_equal(x, y))
        }
        (
            MethodCall {
                receiver: r1,
                method: m1,
                args: a1,
            },
            MethodCall {
                receiver: r2,
                method: m2,
                args: a2,
            },
        ) => {
            m1 == m2
                && structurally_equal(r1, r2)
                && a1.len() == a2.len()
                && a1
                    .iter()
                    .zip(a2.iter())
                    .all(|(x, y)| structurally_equal(x, y))
        }
        (
            Quantifier {
                kind: k1,
                binders: b1,
                body: e1,
            },
            Quantifier {
                kind: k2,
                binders: b2,
                body: e2,
            },
        ) => {
            k1 == k2
                && b1.len() == b2.len()
                && b1
                    .iter()
                    .zip(b2.iter())
                    .all(|(x, y)| x.name == y.name && x.ty == y.ty)
                && structurally_equal(e1, e2)
        }
        (
            Implies {
                antecedent: a1,
                consequent: c1,
            },
            Implies {
                antecedent: a2,
                consequent: c2,
            },
        ) => structurally_equal(a1, a2) && structurally_equal(c1, c2),
        (Record { fields: f1 }, Record { fields: f2 }) => {
            f1.len() == f2.len()
                && f1
                    .iter()
                    .zip(f2.iter())
                    .all(|((n1, v1), (n2, v2))| n1 == n2 && structurally_equal(v1, v2))
        }
        (Tuple(t1), Tuple(t2)) => {
            t1.len() == t2.len()
                && t1
                    .iter()
                    .zip(t2.iter())
                    .all(|(x, y)| structurally_equal(x, y))
        }
        _ => false,
    }
}

/// Truncate a value to the two's-complement range of the given width
fn truncate(value: i128, width: IntWidth, signed: bool) -> i128 {
    let bits = width.bits();
    let mask = (1i128 << bits) - 1;
    let low = value & mask;
    if signed && (low >> (bits - 1)) & 1 == 1 {
        low - (1i128 << bits)
    } else {
        low
    }
}

/// Whether an expression is known to be integer-typed without consulting
/// the type checker; used by the `x % 1` rule, which is only sound for
/// integers
fn integer_shaped(expr: &Expression) -> bool {
    match &expr.kind {
        ExprKind::IntLiteral { .. } | ExprKind::Length(_) | ExprKind::Count(_) => true,
        ExprKind::Unary {
            op: UnaryOp::Negate | UnaryOp::BitNot,
            operand,
        } => integer_shaped(operand),
        ExprKind::Binary { op, left, right } => matches!(
            op,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Mod
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::Shl
                | BinaryOp::Shr
        ) && integer_shaped(left)
            && integer_shaped(right),
        _ => false,
    }
}

/// One bottom-up rewriting pass
fn simplify_once(expr: &ExprRef) -> ExprRef {
    let span = expr.span.clone();
    match &expr.kind {
        ExprKind::Unary { op, operand } => {
            let inner = simplify_once(operand);
            if let Some(rewritten) = rewrite_unary(*op, &inner, expr) {
                return rewritten;
            }
            if Arc::ptr_eq(&inner, operand) {
                expr.clone()
            } else {
                Expression::unary(*op, inner, span)
            }
        }
        ExprKind::Binary { op, left, right } => {
            let l = simplify_once(left);
            let r = simplify_once(right);
            if let Some(rewritten) = rewrite_binary(*op, &l, &r, expr) {
                return rewritten;
            }
            if Arc::ptr_eq(&l, left) && Arc::ptr_eq(&r, right) {
                expr.clone()
            } else {
                Expression::binary(*op, l, r, span)
            }
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            let c = simplify_once(condition);
            let t = simplify_once(then_expr);
            let e = simplify_once(else_expr);
            if c.is_true() {
                return t;
            }
            if c.is_false() {
                return e;
            }
            if structurally_equal(&t, &e) {
                return t;
            }
            if t.is_true() && e.is_false() {
                return c;
            }
            if t.is_false() && e.is_true() {
                return Expression::not(c, span);
            }
            if Arc::ptr_eq(&c, condition) && Arc::ptr_eq(&t, then_expr) && Arc::ptr_eq(&e, else_expr)
            {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::Conditional {
                        condition: c,
                        then_expr: t,
                        else_expr: e,
                    },
                    span,
                )
            }
        }
        ExprKind::Implies {
            antecedent,
            consequent,
        } => {
            let a = simplify_once(antecedent);
            let c = simplify_once(consequent);
            if a.is_false() || c.is_true() {
                return Expression::boolean(true, span);
            }
            if a.is_true() {
                return c;
            }
            if c.is_false() {
                return Expression::not(a, span);
            }
            if structurally_equal(&a, &c) {
                return Expression::boolean(true, span);
            }
            // !p -> p collapses to p
            if let ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } = &a.kind
            {
                if structurally_equal(operand, &c) {
                    return c;
                }
            }
            if Arc::ptr_eq(&a, antecedent) && Arc::ptr_eq(&c, consequent) {
                expr.clone()
            } else {
                Expression::implies(a, c, span)
            }
        }
        ExprKind::Quantifier {
            kind,
            binders,
            body,
        } => {
            let b = simplify_once(body);
            // Bound integer domains are non-empty, so a literal body decides
            // the whole formula for either quantifier.
            if b.is_true() {
                return Expression::boolean(true, span);
            }
            if b.is_false() {
                return Expression::boolean(false, span);
            }
            if Arc::ptr_eq(&b, body) {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::Quantifier {
                        kind: *kind,
                        binders: binders.clone(),
                        body: b,
                    },
                    span,
                )
            }
        }
        // Remaining composite nodes: simplify children, no node-level rules
        _ => rebuild_children(expr),
    }
}

/// Simplify every child of a node with no rewrite rules of its own,
/// preserving reference identity when nothing changes
fn rebuild_children(expr: &ExprRef) -> ExprRef {
    let span = expr.span.clone();
    match &expr.kind {
        ExprKind::FieldAccess { object, field } => {
            let o = simplify_once(object);
            if Arc::ptr_eq(&o, object) {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::FieldAccess {
                        object: o,
                        field: field.clone(),
                    },
                    span,
                )
            }
        }
        ExprKind::Index { collection, index } => {
            let c = simplify_once(collection);
            let i = simplify_once(index);
            if Arc::ptr_eq(&c, collection) && Arc::ptr_eq(&i, index) {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::Index {
                        collection: c,
                        index: i,
                    },
                    span,
                )
            }
        }
        ExprKind::Length(inner) => {
            let e = simplify_once(inner);
            if Arc::ptr_eq(&e, inner) {
                expr.clone()
            } else {
                Expression::new(ExprKind::Length(e), span)
            }
        }
        ExprKind::Count(inner) => {
            let e = simplify_once(inner);
            if Arc::ptr_eq(&e, inner) {
                expr.clone()
            } else {
                Expression::new(ExprKind::Count(e), span)
            }
        }
        ExprKind::Contains {
            collection,
            element,
        } => {
            let c = simplify_once(collection);
            let e = simplify_once(element);
            if Arc::ptr_eq(&c, collection) && Arc::ptr_eq(&e, element) {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::Contains {
                        collection: c,
                        element: e,
                    },
                    span,
                )
            }
        }
        ExprKind::NullCoalesce { value, fallback } => {
            let v = simplify_once(value);
            let f = simplify_once(fallback);
            if matches!(v.kind, ExprKind::NullLiteral) {
                return f;
            }
            if Arc::ptr_eq(&v, value) && Arc::ptr_eq(&f, fallback) {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::NullCoalesce {
                        value: v,
                        fallback: f,
                    },
                    span,
                )
            }
        }
        ExprKind::NullConditional { object, field } => {
            let o = simplify_once(object);
            if Arc::ptr_eq(&o, object) {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::NullConditional {
                        object: o,
                        field: field.clone(),
                    },
                    span,
                )
            }
        }
        ExprKind::OptionSome(inner) => {
            let e = simplify_once(inner);
            if Arc::ptr_eq(&e, inner) {
                expr.clone()
            } else {
                Expression::new(ExprKind::OptionSome(e), span)
            }
        }
        ExprKind::ResultOk(inner) => {
            let e = simplify_once(inner);
            if Arc::ptr_eq(&e, inner) {
                expr.clone()
            } else {
                Expression::new(ExprKind::ResultOk(e), span)
            }
        }
        ExprKind::ResultErr(inner) => {
            let e = simplify_once(inner);
            if Arc::ptr_eq(&e, inner) {
                expr.clone()
            } else {
                Expression::new(ExprKind::ResultErr(e), span)
            }
        }
        ExprKind::Call { function, args } => {
            let new_args: Vec<ExprRef> = args.iter().map(simplify_once).collect();
            if new_args
                .iter()
                .zip(args.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
            {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::Call {
                        function: function.clone(),
                        args: new_args,
                    },
                    span,
                )
            }
        }
        ExprKind::MethodCall {
            receiver,
            method,
            args,
        } => {
            let r = simplify_once(receiver);
            let new_args: Vec<ExprRef> = args.iter().map(simplify_once).collect();
            if Arc::ptr_eq(&r, receiver)
                && new_args
                    .iter()
                    .zip(args.iter())
                    .all(|(a, b)| Arc::ptr_eq(a, b))
            {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::MethodCall {
                        receiver: r,
                        method: method.clone(),
                        args: new_args,
                    },
                    span,
                )
            }
        }
        ExprKind::Record { fields } => {
            let new_fields: Vec<(String, ExprRef)> = fields
                .iter()
                .map(|(name, value)| (name.clone(), simplify_once(value)))
                .collect();
            if new_fields
                .iter()
                .zip(fields.iter())
                .all(|((_, a), (_, b))| Arc::ptr_eq(a, b))
            {
                expr.clone()
            } else {
                Expression::new(ExprKind::Record { fields: new_fields }, span)
            }
        }
        ExprKind::Tuple(items) => {
            let new_items: Vec<ExprRef> = items.iter().map(simplify_once).collect();
            if new_items
                .iter()
                .zip(items.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
            {
                expr.clone()
            } else {
                Expression::new(ExprKind::Tuple(new_items), span)
            }
        }
        // Leaves
        _ => expr.clone(),
    }
}

/// Rewrite a unary node whose operand is already simplified
fn rewrite_unary(op: UnaryOp, operand: &ExprRef, original: &ExprRef) -> Option<ExprRef> {
    let span = original.span.clone();
    match op {
        UnaryOp::Not => {
            match &operand.kind {
                ExprKind::BoolLiteral(b) => Some(Expression::boolean(!b, span)),
                // !!x collapses
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: inner,
                } => Some(inner.clone()),
                // De Morgan, both operators
                ExprKind::Binary {
                    op: BinaryOp::And,
                    left,
                    right,
                } => Some(Expression::binary(
                    BinaryOp::Or,
                    Expression::not(left.clone(), span.clone()),
                    Expression::not(right.clone(), span.clone()),
                    span,
                )),
                ExprKind::Binary {
                    op: BinaryOp::Or,
                    left,
                    right,
                } => Some(Expression::binary(
                    BinaryOp::And,
                    Expression::not(left.clone(), span.clone()),
                    Expression::not(right.clone(), span.clone()),
                    span,
                )),
                _ => None,
            }
        }
        UnaryOp::Negate => match &operand.kind {
            ExprKind::IntLiteral {
                value,
                width,
                signed,
            } => Some(Expression::int(
                truncate(value.wrapping_neg(), *width, *signed),
                *width,
                *signed,
                span,
            )),
            ExprKind::FloatLiteral { value, double } => Some(Expression::new(
                ExprKind::FloatLiteral {
                    value: -value,
                    double: *double,
                },
                span,
            )),
            _ => None,
        },
        UnaryOp::BitNot => match &operand.kind {
            ExprKind::IntLiteral {
                value,
                width,
                signed,
            } => Some(Expression::int(
                truncate(!value, *width, *signed),
                *width,
                *signed,
                span,
            )),
            _ => None,
        },
        // Increment and decrement mutate; they have no rewrite rules
        _ => None,
    }
}

/// Rewrite a binary node whose operands are already simplified
fn rewrite_binary(
    op: BinaryOp,
    left: &ExprRef,
    right: &ExprRef,
    original: &ExprRef,
) -> Option<ExprRef> {
    let span = original.span.clone();

    // Constant folding first; it subsumes several identities for literals.
    if let Some(folded) = fold_constants(op, left, right, &span) {
        return Some(folded);
    }

    match op {
        BinaryOp::Add => {
            if is_int_zero(right) {
                return Some(left.clone());
            }
            if is_int_zero(left) {
                return Some(right.clone());
            }
            None
        }
        BinaryOp::Sub => {
            if is_int_zero(right) {
                return Some(left.clone());
            }
            if structurally_equal(left, right) {
                return Some(zero_like(left, right, span));
            }
            None
        }
        BinaryOp::Mul => {
            if is_int_one(right) {
                return Some(left.clone());
            }
            if is_int_one(left) {
                return Some(right.clone());
            }
            if is_int_zero(right) {
                return Some(zero_like(left, right, span));
            }
            if is_int_zero(left) {
                return Some(zero_like(right, left, span));
            }
            None
        }
        BinaryOp::Div => {
            if is_int_one(right) {
                return Some(left.clone());
            }
            None
        }
        BinaryOp::Mod => {
            if is_int_one(right) && integer_shaped(left) {
                return Some(zero_like(left, right, span));
            }
            None
        }
        BinaryOp::And => {
            if left.is_true() {
                return Some(right.clone());
            }
            if right.is_true() {
                return Some(left.clone());
            }
            if left.is_false() || right.is_false() {
                return Some(Expression::boolean(false, span));
            }
            if structurally_equal(left, right) {
                return Some(left.clone());
            }
            if complement_of(left, right) {
                return Some(Expression::boolean(false, span));
            }
            None
        }
        BinaryOp::Or => {
            if left.is_false() {
                return Some(right.clone());
            }
            if right.is_false() {
                return Some(left.clone());
            }
            if left.is_true() || right.is_true() {
                return Some(Expression::boolean(true, span));
            }
            if structurally_equal(left, right) {
                return Some(left.clone());
            }
            if complement_of(left, right) {
                return Some(Expression::boolean(true, span));
            }
            None
        }
        BinaryOp::Eq => {
            if right.is_true() {
                return Some(left.clone());
            }
            if left.is_true() {
                return Some(right.clone());
            }
            if right.is_false() {
                return Some(Expression::not(left.clone(), span));
            }
            if left.is_false() {
                return Some(Expression::not(right.clone(), span));
            }
            if structurally_equal(left, right) {
                return Some(Expression::boolean(true, span));
            }
            None
        }
        BinaryOp::Ne => {
            if structurally_equal(left, right) {
                return Some(Expression::boolean(false, span));
            }
            None
        }
        _ => None,
    }
}

fn is_int_zero(expr: &Expression) -> bool {
    matches!(expr.kind, ExprKind::IntLiteral { value: 0, .. })
}

fn is_int_one(expr: &Expression) -> bool {
    matches!(expr.kind, ExprKind::IntLiteral { value: 1, .. })
}

/// `x && !x` or `!x && x`, up to commutative structural equality
fn complement_of(a: &Expression, b: &Expression) -> bool {
    if let ExprKind::Unary {
        op: UnaryOp::Not,
        operand,
    } = &b.kind
    {
        if structurally_equal(a, operand) {
            return true;
        }
    }
    if let ExprKind::Unary {
        op: UnaryOp::Not,
        operand,
    } = &a.kind
    {
        if structurally_equal(operand, b) {
            return true;
        }
    }
    false
}

/// A zero literal with width and signedness borrowed from whichever operand
/// is an integer literal, defaulting to i32
fn zero_like(a: &Expression, b: &Expression, span: crate::error::Span) -> ExprRef {
    for candidate in [a, b] {
        if let ExprKind::IntLiteral { width, signed, .. } = candidate.kind {
            return Expression::int(0, width, signed, span);
        }
    }
    Expression::int(0, IntWidth::W32, true, span)
}

/// Fold a binary operation over two literals
fn fold_constants(
    op: BinaryOp,
    left: &ExprRef,
    right: &ExprRef,
    span: &crate::error::Span,
) -> Option<ExprRef> {
    use ExprKind::*;
    match (&left.kind, &right.kind) {
        (
            IntLiteral {
                value: l,
                width: wl,
                signed: sl,
            },
            IntLiteral {
                value: r,
                width: wr,
                signed: sr,
            },
        ) => {
            if wl != wr || sl != sr {
                return None;
            }
            fold_int(op, *l, *r, *wl, *sl, span)
        }
        (
            FloatLiteral {
                value: l,
                double: dl,
            },
            FloatLiteral {
                value: r,
                double: dr,
            },
        ) => fold_float(op, *l, *r, *dl || *dr, span),
        // Mixed int/float promotes the integer side
        (IntLiteral { value: l, .. }, FloatLiteral { value: r, double }) => {
            fold_float(op, *l as f64, *r, *double, span)
        }
        (FloatLiteral { value: l, double }, IntLiteral { value: r, .. }) => {
            fold_float(op, *l, *r as f64, *double, span)
        }
        _ => None,
    }
}

fn fold_int(
    op: BinaryOp,
    l: i128,
    r: i128,
    width: IntWidth,
    signed: bool,
    span: &crate::error::Span,
) -> Option<ExprRef> {
    let span = span.clone();
    let bits = width.bits();
    let mask = (1i128 << bits) - 1;
    let arithmetic = |v: i128| Expression::int(truncate(v, width, signed), width, signed, span.clone());
    let comparison = |b: bool| Expression::boolean(b, span.clone());

    let result = match op {
        BinaryOp::Add => arithmetic(l.wrapping_add(r)),
        BinaryOp::Sub => arithmetic(l.wrapping_sub(r)),
        BinaryOp::Mul => arithmetic(l.wrapping_mul(r)),
        // Division and modulo by a literal zero stay in the tree as runtime
        // checks; the division checker reports them.
        BinaryOp::Div if r != 0 => arithmetic(l.wrapping_div(r)),
        BinaryOp::Mod if r != 0 => arithmetic(l.wrapping_rem(r)),
        BinaryOp::Pow if (0..=63).contains(&r) => {
            let mut acc: i128 = 1;
            for _ in 0..r {
                acc = truncate(acc.wrapping_mul(l), width, signed);
            }
            arithmetic(acc)
        }
        BinaryOp::Eq => comparison(l == r),
        BinaryOp::Ne => comparison(l != r),
        BinaryOp::Lt => comparison(l < r),
        BinaryOp::Le => comparison(l <= r),
        BinaryOp::Gt => comparison(l > r),
        BinaryOp::Ge => comparison(l >= r),
        BinaryOp::BitAnd => arithmetic((l & mask) & (r & mask)),
        BinaryOp::BitOr => arithmetic((l & mask) | (r & mask)),
        BinaryOp::BitXor => arithmetic((l & mask) ^ (r & mask)),
        BinaryOp::Shl if (0..bits as i128).contains(&r) => arithmetic((l & mask) << r),
        BinaryOp::Shr if (0..bits as i128).contains(&r) => {
            if signed {
                arithmetic(l >> r)
            } else {
                arithmetic((l & mask) >> r)
            }
        }
        _ => return None,
    };
    Some(result)
}

fn fold_float(
    op: BinaryOp,
    l: f64,
    r: f64,
    double: bool,
    span: &crate::error::Span,
) -> Option<ExprRef> {
    let span = span.clone();
    let arithmetic =
        |v: f64| Expression::new(ExprKind::FloatLiteral { value: v, double }, span.clone());
    let comparison = |b: bool| Expression::boolean(b, span.clone());

    let result = match op {
        BinaryOp::Add => arithmetic(l + r),
        BinaryOp::Sub => arithmetic(l - r),
        BinaryOp::Mul => arithmetic(l * r),
        // Float division by a literal zero also stays put
        BinaryOp::Div if r != 0.0 => arithmetic(l / r),
        BinaryOp::Eq => comparison(l == r),
        BinaryOp::Ne => comparison(l != r),
        BinaryOp::Lt => comparison(l < r),
        BinaryOp::Le => comparison(l <= r),
        BinaryOp::Gt => comparison(l > r),
        BinaryOp::Ge => comparison(l >= r),
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Span;

    fn sp() -> Span {
        Span::unknown()
    }

    fn var(name: &str) -> ExprRef {
        Expression::variable(name, sp())
    }

    fn int(v: i64) -> ExprRef {
        Expression::int32(v, sp())
    }

    fn bin(op: BinaryOp, l: ExprRef, r: ExprRef) -> ExprRef {
        Expression::binary(op, l, r, sp())
    }

    #[test]
    fn test_constant_folding_arithmetic() {
        let expr = bin(BinaryOp::Add, int(2), int(3));
        let result = simplify(&expr);
        assert_eq!(result.as_int_literal(), Some(5));
    }

    #[test]
    fn test_folding_wraps_at_width() {
        let expr = bin(BinaryOp::Add, int(i32::MAX as i64), int(1));
        let result = simplify(&expr);
        assert_eq!(result.as_int_literal(), Some(i32::MIN as i128));
    }

    #[test]
    fn test_division_by_literal_zero_not_folded() {
        let expr = bin(BinaryOp::Div, int(1), int(0));
        let result = simplify(&expr);
        assert!(matches!(
            result.kind,
            ExprKind::Binary {
                op: BinaryOp::Div,
                ..
            }
        ));
    }

    #[test]
    fn test_additive_identity() {
        let expr = bin(BinaryOp::Add, var("x"), int(0));
        let result = simplify(&expr);
        assert!(matches!(&result.kind, ExprKind::Variable(n) if n == "x"));
    }

    #[test]
    fn test_self_subtraction() {
        let expr = bin(BinaryOp::Sub, var("x"), var("x"));
        let result = simplify(&expr);
        assert_eq!(result.as_int_literal(), Some(0));
    }

    #[test]
    fn test_multiplication_absorbs_zero() {
        let expr = bin(BinaryOp::Mul, var("x"), int(0));
        assert_eq!(simplify(&expr).as_int_literal(), Some(0));
        let expr = bin(BinaryOp::Mul, int(0), var("x"));
        assert_eq!(simplify(&expr).as_int_literal(), Some(0));
    }

    #[test]
    fn test_boolean_complement() {
        let expr = bin(BinaryOp::And, var("p"), Expression::not(var("p"), sp()));
        assert!(simplify(&expr).is_false());

        let expr = bin(BinaryOp::Or, Expression::not(var("p"), sp()), var("p"));
        assert!(simplify(&expr).is_true());
    }

    #[test]
    fn test_de_morgan() {
        // !(a && b) becomes !a || !b
        let expr = Expression::not(bin(BinaryOp::And, var("a"), var("b")), sp());
        let result = simplify(&expr);
        match &result.kind {
            ExprKind::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                assert!(matches!(
                    left.kind,
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        ..
                    }
                ));
                assert!(matches!(
                    right.kind,
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        ..
                    }
                ));
            }
            other => panic!("expected disjunction, got {:?}", other),
        }
    }

    #[test]
    fn test_double_negation() {
        let expr = Expression::not(Expression::not(var("p"), sp()), sp());
        let result = simplify(&expr);
        assert!(matches!(&result.kind, ExprKind::Variable(n) if n == "p"));
    }

    #[test]
    fn test_equality_with_true_literal() {
        let expr = bin(BinaryOp::Eq, var("p"), Expression::boolean(true, sp()));
        let result = simplify(&expr);
        assert!(matches!(&result.kind, ExprKind::Variable(n) if n == "p"));
    }

    #[test]
    fn test_self_equality_is_tautology() {
        let expr = bin(BinaryOp::Eq, var("x"), var("x"));
        let outcome = canonicalize(&expr);
        assert!(outcome.expr.is_true());
        assert_eq!(outcome.note, Some(SimplificationNote::Tautology));
    }

    #[test]
    fn test_commutative_equality_in_rules() {
        // (a + b) == (b + a) is recognized as x == x
        let expr = bin(
            BinaryOp::Eq,
            bin(BinaryOp::Add, var("a"), var("b")),
            bin(BinaryOp::Add, var("b"), var("a")),
        );
        assert!(simplify(&expr).is_true());
    }

    #[test]
    fn test_implication_rules() {
        let p = var("p");
        // false -> p
        let expr = Expression::implies(Expression::boolean(false, sp()), p.clone(), sp());
        assert!(simplify(&expr).is_true());
        // p -> false
        let expr = Expression::implies(p.clone(), Expression::boolean(false, sp()), sp());
        assert!(matches!(
            simplify(&expr).kind,
            ExprKind::Unary {
                op: UnaryOp::Not,
                ..
            }
        ));
        // p -> p
        let expr = Expression::implies(p.clone(), p.clone(), sp());
        assert!(simplify(&expr).is_true());
        // !p -> p collapses to p
        let expr = Expression::implies(Expression::not(p.clone(), sp()), p.clone(), sp());
        assert!(matches!(&simplify(&expr).kind, ExprKind::Variable(n) if n == "p"));
    }

    #[test]
    fn test_conditional_rules() {
        let c = var("c");
        // c ? true : false
        let expr = Expression::new(
            ExprKind::Conditional {
                condition: c.clone(),
                then_expr: Expression::boolean(true, sp()),
                else_expr: Expression::boolean(false, sp()),
            },
            sp(),
        );
        assert!(matches!(&simplify(&expr).kind, ExprKind::Variable(n) if n == "c"));

        // c ? x : x
        let expr = Expression::new(
            ExprKind::Conditional {
                condition: c,
                then_expr: var("x"),
                else_expr: var("x"),
            },
            sp(),
        );
        assert!(matches!(&simplify(&expr).kind, ExprKind::Variable(n) if n == "x"));
    }

    #[test]
    fn test_quantifier_over_literal_body() {
        use crate::ast::{QuantifierBinder, QuantifierKind};
        use crate::types::Type;

        let expr = Expression::new(
            ExprKind::Quantifier {
                kind: QuantifierKind::Forall,
                binders: vec![QuantifierBinder {
                    name: "i".to_string(),
                    ty: Type::I32,
                }],
                // i == i simplifies to true, then the quantifier collapses
                body: bin(BinaryOp::Eq, var("i"), var("i")),
            },
            sp(),
        );
        assert!(simplify(&expr).is_true());
    }

    #[test]
    fn test_unchanged_returns_same_rc() {
        let expr = bin(BinaryOp::Lt, var("x"), var("y"));
        let result = simplify(&expr);
        assert!(Arc::ptr_eq(&expr, &result));
        assert!(canonicalize(&expr).note.is_none());
    }

    #[test]
    fn test_int_min_negation_wraps() {
        let expr = Expression::unary(UnaryOp::Negate, int(i32::MIN as i64), sp());
        let result = simplify(&expr);
        // Two's complement: -INT_MIN == INT_MIN
        assert_eq!(result.as_int_literal(), Some(i32::MIN as i128));
    }

    #[test]
    fn test_modulo_one_on_integer_shaped() {
        // (a & b) % 1 is integer-shaped only when operands are
        let expr = bin(BinaryOp::Mod, bin(BinaryOp::Add, int(3), var("x")), int(1));
        // x has unknown type, so the rule must not fire
        assert!(matches!(simplify(&expr).kind, ExprKind::Binary { .. }));

        let expr = bin(
            BinaryOp::Mod,
            bin(BinaryOp::Shl, int(3), int(1)),
            int(1),
        );
        assert_eq!(simplify(&expr).as_int_literal(), Some(0));
    }

    #[test]
    fn test_mixed_int_float_promotion() {
        let expr = bin(
            BinaryOp::Mul,
            int(2),
            Expression::new(
                ExprKind::FloatLiteral {
                    value: 1.5,
                    double: true,
                },
                sp(),
            ),
        );
        let result = simplify(&expr);
        match result.kind {
            ExprKind::FloatLiteral { value, .. } => assert_eq!(value, 3.0),
            ref other => panic!("expected float literal, got {:?}", other),
        }
    }
}
