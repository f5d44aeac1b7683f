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

//! Integer overflow checking
//!
//! At every `+`, `-`, `*`, `<<` and unary negate on signed integers:
//! a checked compile-time fold first, which reports deterministically when
//! two literals overflow their width; otherwise the width-appropriate
//! overflow predicate goes to the solver under the path condition.
//! `INT_MIN` negation is flagged at every width.

use super::{solve_under_path, BugPatternOptions, PathState, PatternChecker};
use crate::ast::{BinaryOp, ExprKind, ExprRef, UnaryOp};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink, Severity};
use crate::smt::solver::CheckOutcome;
use crate::types::IntWidth;

pub struct IntegerOverflow {
    options: BugPatternOptions,
}

impl IntegerOverflow {
    pub fn new(options: BugPatternOptions) -> Self {
        Self { options }
    }
}

impl PatternChecker for IntegerOverflow {
    fn check_expression(
        &mut self,
        expr: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    ) {
        match &expr.kind {
            ExprKind::Binary {
                op: op @ (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Shl),
                left,
                right,
            } => self.check_binary(expr, *op, left, right, state, sink),
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => self.check_negate(expr, operand, state, sink),
            _ => {}
        }
    }
}

impl IntegerOverflow {
    fn check_binary(
        &self,
        expr: &ExprRef,
        op: BinaryOp,
        left: &ExprRef,
        right: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    ) {
        // Two literals: fold in checked mode and report deterministically.
        if let (
            ExprKind::IntLiteral {
                value: l,
                width,
                signed: true,
            },
            ExprKind::IntLiteral { value: r, .. },
        ) = (&left.kind, &right.kind)
        {
            if let Some(description) = literal_overflow(op, *l, *r, *width) {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::IntegerOverflow,
                    description,
                    Severity::Warning,
                );
            }
            return;
        }

        if !self.options.smt_active() {
            return;
        }

        let query = solve_under_path(state, self.options.smt_timeout_ms, |encoder| {
            let l = encoder.encode(left)?;
            let r = encoder.encode(right)?;
            if !l.signed || !r.signed {
                return Err(crate::error::EncodeError::UnsupportedConstruct {
                    construct: "overflow predicate on unsigned operands".to_string(),
                });
            }
            Ok(match op {
                BinaryOp::Add => encoder.overflow_add(l.term, r.term),
                BinaryOp::Sub => encoder.overflow_sub(l.term, r.term),
                BinaryOp::Mul => encoder.overflow_mul(l.term, r.term),
                BinaryOp::Shl => encoder.overflow_shl(l.term, r.term),
                _ => unreachable!("filtered by the caller"),
            })
        });

        if let Some((CheckOutcome::Sat, counterexample)) = query {
            sink.report_parts(
                expr.span.clone(),
                DiagnosticCode::IntegerOverflow,
                format!(
                    "'{}' can overflow its width ({})",
                    expr, counterexample
                ),
                Severity::Warning,
            );
        }
    }

    fn check_negate(
        &self,
        expr: &ExprRef,
        operand: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    ) {
        // A literal operand settles negation immediately.
        if let ExprKind::IntLiteral {
            value,
            width,
            signed: true,
        } = &operand.kind
        {
            if *value == width.min_signed() {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::IntegerOverflow,
                    format!(
                        "negating the minimum {}-bit value overflows",
                        width.bits()
                    ),
                    Severity::Warning,
                );
            }
            return;
        }

        if !self.options.smt_active() {
            return;
        }

        let query = solve_under_path(state, self.options.smt_timeout_ms, |encoder| {
            let inner = encoder.encode(operand)?;
            if !inner.signed {
                return Err(crate::error::EncodeError::UnsupportedConstruct {
                    construct: "negation of an unsigned operand".to_string(),
                });
            }
            Ok(encoder.overflow_neg(inner.term))
        });

        if let Some((CheckOutcome::Sat, counterexample)) = query {
            sink.report_parts(
                expr.span.clone(),
                DiagnosticCode::IntegerOverflow,
                format!(
                    "'{}' overflows when the operand is the minimum value ({})",
                    expr, counterexample
                ),
                Severity::Warning,
            );
        }
    }
}

/// Checked fold of a literal pair; a description means overflow
fn literal_overflow(op: BinaryOp, l: i128, r: i128, width: IntWidth) -> Option<String> {
    let exact = match op {
        BinaryOp::Add => l.checked_add(r)?,
        BinaryOp::Sub => l.checked_sub(r)?,
        BinaryOp::Mul => l.checked_mul(r)?,
        BinaryOp::Shl => {
            if !(0..width.bits() as i128).contains(&r) {
                return Some(format!(
                    "shift amount {} is outside the {}-bit width",
                    r,
                    width.bits()
                ));
            }
            l.checked_shl(r as u32)?
        }
        _ => return None,
    };
    if exact < width.min_signed() || exact > width.max_signed() {
        Some(format!(
            "constant expression {} {} {} overflows {} bits",
            l,
            op.symbol(),
            r,
            width.bits()
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, Expression, Function, Statement, StmtKind, Visibility};
    use crate::checks::walk_function;
    use crate::diagnostics::CollectingSink;
    use crate::error::Span;
    use crate::types::Type;
    use std::collections::HashMap;

    fn sp() -> Span {
        Span::unknown()
    }

    fn function(params: &[(&str, Type)], body: Block) -> Function {
        Function {
            name: "f".to_string(),
            id: 0,
            visibility: Visibility::Public,
            type_params: vec![],
            params: params
                .iter()
                .map(|(n, t)| crate::ast::Parameter::by_value(*n, t.clone()))
                .collect(),
            output: Type::I32,
            effects: vec![],
            preconditions: vec![],
            postconditions: vec![],
            body,
            is_async: false,
            span: sp(),
        }
    }

    fn run(function: &Function, options: BugPatternOptions) -> CollectingSink {
        let mut sink = CollectingSink::new();
        let mut checker = IntegerOverflow::new(options);
        walk_function(function, &HashMap::new(), &mut checker, &mut sink);
        sink
    }

    fn no_smt() -> BugPatternOptions {
        BugPatternOptions {
            use_smt: false,
            ..BugPatternOptions::default()
        }
    }

    #[test]
    fn test_literal_add_overflow_is_deterministic() {
        let body = vec![Statement::new(
            StmtKind::Return(Some(Expression::binary(
                BinaryOp::Add,
                Expression::int32(i32::MAX as i64, sp()),
                Expression::int32(1, sp()),
                sp(),
            ))),
            sp(),
        )];
        let f = function(&[], body);
        let sink = run(&f, no_smt());
        let found = sink.with_code(DiagnosticCode::IntegerOverflow);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn test_small_literals_are_silent() {
        let body = vec![Statement::new(
            StmtKind::Return(Some(Expression::binary(
                BinaryOp::Mul,
                Expression::int32(3, sp()),
                Expression::int32(4, sp()),
                sp(),
            ))),
            sp(),
        )];
        let f = function(&[], body);
        let sink = run(&f, no_smt());
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_int_min_negation_every_width() {
        for width in IntWidth::all() {
            let operand = Expression::int(width.min_signed(), width, true, sp());
            let body = vec![Statement::new(
                StmtKind::Return(Some(Expression::unary(UnaryOp::Negate, operand, sp()))),
                sp(),
            )];
            let f = function(&[], body);
            let sink = run(&f, no_smt());
            assert!(
                sink.has_code(DiagnosticCode::IntegerOverflow),
                "width {} missed",
                width.bits()
            );
        }
    }

    #[test]
    fn test_unconstrained_add_warns_with_solver() {
        if !crate::smt::is_available() {
            return;
        }
        let body = vec![Statement::new(
            StmtKind::Return(Some(Expression::binary(
                BinaryOp::Add,
                Expression::variable("a", sp()),
                Expression::variable("b", sp()),
                sp(),
            ))),
            sp(),
        )];
        let f = function(&[("a", Type::I32), ("b", Type::I32)], body);
        let sink = run(&f, BugPatternOptions::default());
        assert!(sink.has_code(DiagnosticCode::IntegerOverflow));
    }

    #[test]
    fn test_bounded_operands_are_silent_with_solver() {
        if !crate::smt::is_available() {
            return;
        }
        // if a < 1000 && a > 0 && b < 1000 && b > 0 { a + b } cannot overflow
        let bound = |name: &str, op, v| {
            Expression::binary(op, Expression::variable(name, sp()), Expression::int32(v, sp()), sp())
        };
        let guard = Expression::binary(
            BinaryOp::And,
            Expression::binary(
                BinaryOp::And,
                bound("a", BinaryOp::Lt, 1000),
                bound("a", BinaryOp::Gt, 0),
                sp(),
            ),
            Expression::binary(
                BinaryOp::And,
                bound("b", BinaryOp::Lt, 1000),
                bound("b", BinaryOp::Gt, 0),
                sp(),
            ),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::If {
                condition: guard,
                then_body: vec![Statement::new(
                    StmtKind::Return(Some(Expression::binary(
                        BinaryOp::Add,
                        Expression::variable("a", sp()),
                        Expression::variable("b", sp()),
                        sp(),
                    ))),
                    sp(),
                )],
                else_ifs: vec![],
                else_body: None,
            },
            sp(),
        )];
        let f = function(&[("a", Type::I32), ("b", Type::I32)], body);
        let sink = run(&f, BugPatternOptions::default());
        assert!(
            !sink.has_code(DiagnosticCode::IntegerOverflow),
            "got {:?}",
            sink.diagnostics
        );
    }
}
