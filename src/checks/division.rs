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

//! Division-by-zero checking
//!
//! A literal zero divisor is an error outright, a non-zero literal is
//! skipped, and anything else is asked of the solver under the current
//! path condition. Without a solver the checker falls back to looking for
//! a `v != 0`, `v > 0`, or `v < 0` guard on the path.

use super::{solve_under_path, BugPatternOptions, PathState, PatternChecker};
use crate::ast::{BinaryOp, ExprKind, ExprRef, Expression, UnaryOp};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink, Severity};
use crate::simplify::structurally_equal;
use crate::smt::solver::CheckOutcome;

pub struct DivisionByZero {
    options: BugPatternOptions,
}

impl DivisionByZero {
    pub fn new(options: BugPatternOptions) -> Self {
        Self { options }
    }
}

impl PatternChecker for DivisionByZero {
    fn check_expression(
        &mut self,
        expr: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    ) {
        let (op, divisor) = match &expr.kind {
            ExprKind::Binary {
                op: op @ (BinaryOp::Div | BinaryOp::Mod),
                right,
                ..
            } => (*op, right),
            _ => return,
        };

        // A literal divisor settles the question without any reasoning.
        if let Some(value) = divisor.as_int_literal() {
            if value == 0 {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::DivisionByZero,
                    format!(
                        "{} by a zero literal",
                        if op == BinaryOp::Div {
                            "division"
                        } else {
                            "modulo"
                        }
                    ),
                    Severity::Error,
                );
            }
            return;
        }

        if self.options.smt_active() {
            let query = solve_under_path(state, self.options.smt_timeout_ms, |encoder| {
                let encoded = encoder.encode(divisor)?;
                let zero = encoder
                    .solver()
                    .bv_literal(0, encoded.term.width().unwrap_or(32));
                Ok(encoder.solver().eq(encoded.term, zero))
            });
            match query {
                Some((CheckOutcome::Unsat, _)) => {}
                Some((CheckOutcome::Sat, counterexample)) => {
                    sink.report_parts(
                        expr.span.clone(),
                        DiagnosticCode::DivisionByZero,
                        format!("divisor '{}' can be zero ({})", divisor, counterexample),
                        Severity::Warning,
                    );
                }
                Some((CheckOutcome::Unknown, _)) => {
                    sink.report_parts(
                        expr.span.clone(),
                        DiagnosticCode::DivisionByZero,
                        format!("divisor '{}' could not be proved non-zero", divisor),
                        Severity::Info,
                    );
                }
                // Encoding failed; fall through to the syntactic heuristic.
                None => self.heuristic(expr, divisor, state, sink),
            }
        } else {
            self.heuristic(expr, divisor, state, sink);
        }
    }
}

impl DivisionByZero {
    /// Warn iff the divisor is a plain variable with no non-zero guard
    /// anywhere in the path condition
    fn heuristic(
        &self,
        expr: &ExprRef,
        divisor: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    ) {
        if !matches!(divisor.kind, ExprKind::Variable(_)) {
            return;
        }
        let guarded = state
            .conditions
            .iter()
            .any(|cond| implies_nonzero(cond, divisor));
        if !guarded {
            sink.report_parts(
                expr.span.clone(),
                DiagnosticCode::DivisionByZero,
                format!("divisor '{}' is not guarded against zero", divisor),
                Severity::Warning,
            );
        }
    }
}

/// Whether a path condition rules out `divisor == 0`
///
/// Recognizes `v != 0`, `v > 0`, `v < 0` in either operand order, and the
/// negated equality an else-branch contributes.
fn implies_nonzero(condition: &Expression, divisor: &Expression) -> bool {
    match &condition.kind {
        ExprKind::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => implies_nonzero(left, divisor) || implies_nonzero(right, divisor),
        ExprKind::Binary { op, left, right } => {
            let zero_on_right = right.as_int_literal() == Some(0) && structurally_equal(left, divisor);
            let zero_on_left = left.as_int_literal() == Some(0) && structurally_equal(right, divisor);
            match op {
                BinaryOp::Ne => zero_on_right || zero_on_left,
                BinaryOp::Gt | BinaryOp::Lt => zero_on_right || zero_on_left,
                _ => false,
            }
        }
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => match &operand.kind {
            ExprKind::Binary {
                op: BinaryOp::Eq,
                left,
                right,
            } => {
                (right.as_int_literal() == Some(0) && structurally_equal(left, divisor))
                    || (left.as_int_literal() == Some(0) && structurally_equal(right, divisor))
            }
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, Function, Statement, StmtKind, Visibility};
    use crate::checks::walk_function;
    use crate::diagnostics::CollectingSink;
    use crate::error::Span;
    use crate::types::Type;
    use std::collections::HashMap;

    fn sp() -> Span {
        Span::unknown()
    }

    fn div(num: ExprRef, den: ExprRef) -> ExprRef {
        Expression::binary(BinaryOp::Div, num, den, sp())
    }

    fn ret(expr: ExprRef) -> Statement {
        Statement::new(StmtKind::Return(Some(expr)), sp())
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
        let mut checker = DivisionByZero::new(options);
        walk_function(function, &HashMap::new(), &mut checker, &mut sink);
        sink
    }

    fn heuristic_options() -> BugPatternOptions {
        BugPatternOptions {
            use_smt: false,
            ..BugPatternOptions::default()
        }
    }

    #[test]
    fn test_literal_zero_divisor_is_error() {
        let body = vec![ret(div(
            Expression::variable("a", sp()),
            Expression::int32(0, sp()),
        ))];
        let f = function(&[("a", Type::I32)], body);
        let sink = run(&f, heuristic_options());
        let found = sink.with_code(DiagnosticCode::DivisionByZero);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Error);
    }

    #[test]
    fn test_nonzero_literal_divisor_is_skipped() {
        let body = vec![ret(div(
            Expression::variable("a", sp()),
            Expression::int32(4, sp()),
        ))];
        let f = function(&[("a", Type::I32)], body);
        let sink = run(&f, heuristic_options());
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_unguarded_variable_warns_in_heuristic_mode() {
        let body = vec![ret(div(
            Expression::variable("a", sp()),
            Expression::variable("b", sp()),
        ))];
        let f = function(&[("a", Type::I32), ("b", Type::I32)], body);
        let sink = run(&f, heuristic_options());
        let found = sink.with_code(DiagnosticCode::DivisionByZero);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn test_then_branch_guard_silences_heuristic() {
        // if b != 0 { return a / b } else { return 0 }
        let guard = Expression::binary(
            BinaryOp::Ne,
            Expression::variable("b", sp()),
            Expression::int32(0, sp()),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::If {
                condition: guard,
                then_body: vec![ret(div(
                    Expression::variable("a", sp()),
                    Expression::variable("b", sp()),
                ))],
                else_ifs: vec![],
                else_body: Some(vec![ret(Expression::int32(0, sp()))]),
            },
            sp(),
        )];
        let f = function(&[("a", Type::I32), ("b", Type::I32)], body);
        let sink = run(&f, heuristic_options());
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_guarded_division_is_silent_with_solver() {
        if !crate::smt::is_available() {
            return;
        }
        let guard = Expression::binary(
            BinaryOp::Ne,
            Expression::variable("b", sp()),
            Expression::int32(0, sp()),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::If {
                condition: guard,
                then_body: vec![ret(div(
                    Expression::variable("a", sp()),
                    Expression::variable("b", sp()),
                ))],
                else_ifs: vec![],
                else_body: Some(vec![ret(Expression::int32(0, sp()))]),
            },
            sp(),
        )];
        let f = function(&[("a", Type::I32), ("b", Type::I32)], body);
        let sink = run(&f, BugPatternOptions::default());
        assert!(
            sink.diagnostics.is_empty(),
            "got: {:?}",
            sink.diagnostics
        );
    }

    #[test]
    fn test_unguarded_division_warns_with_solver() {
        if !crate::smt::is_available() {
            return;
        }
        let body = vec![ret(div(
            Expression::variable("a", sp()),
            Expression::variable("b", sp()),
        ))];
        let f = function(&[("a", Type::I32), ("b", Type::I32)], body);
        let sink = run(&f, BugPatternOptions::default());
        let found = sink.with_code(DiagnosticCode::DivisionByZero);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Warning);
        assert!(found[0].message.contains("b=0") || found[0].message.contains("b="));
    }
}
