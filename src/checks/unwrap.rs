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

//! Unsafe unwrap checking
//!
//! A purely syntactic check, no SMT: a call shaped like `.unwrap()` on a
//! receiver `r` is safe only when the current path carries a guard for
//! `r` — an `r.is_some()`-style call on the then-branch, a comparison
//! against `null`/`None`, or an enclosing pattern match that bound `r`'s
//! inner value.

use super::{PathState, PatternChecker};
use crate::ast::{BinaryOp, ExprKind, ExprRef, Expression};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink, Severity};
use crate::simplify::structurally_equal;

/// Method names that dereference without checking
const UNSAFE_METHODS: &[&str] = &[
    "unwrap",
    "expect",
    "get_unchecked",
    "unwrap_unchecked",
    "value",
];

/// Safe variants that provide their own fallback
const SAFE_METHODS: &[&str] = &[
    "unwrap_or",
    "unwrap_or_else",
    "unwrap_or_default",
    "map_or",
    "map_or_else",
];

/// Guard calls that establish presence on the then-branch
const GUARD_METHODS: &[&str] = &["is_some", "is_ok", "has_value", "is_present"];

pub struct UnsafeUnwrap;

impl UnsafeUnwrap {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnsafeUnwrap {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternChecker for UnsafeUnwrap {
    fn check_expression(
        &mut self,
        expr: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    ) {
        let (receiver, method) = match &expr.kind {
            ExprKind::MethodCall {
                receiver, method, ..
            } => (receiver, method),
            _ => return,
        };

        if SAFE_METHODS.contains(&method.as_str()) || !UNSAFE_METHODS.contains(&method.as_str()) {
            return;
        }

        if is_guarded(receiver, state) {
            return;
        }

        sink.report_parts(
            expr.span.clone(),
            DiagnosticCode::UnsafeUnwrap,
            format!(
                "'.{}()' on '{}' without a guard in scope",
                method, receiver
            ),
            Severity::Warning,
        );
    }
}

fn is_guarded(receiver: &ExprRef, state: &PathState) -> bool {
    let condition_guards = state
        .conditions
        .iter()
        .any(|cond| condition_guards_receiver(cond, receiver));
    let pattern_guards = state
        .bound_inner
        .iter()
        .any(|bound| structurally_equal(bound, receiver));
    condition_guards || pattern_guards
}

/// Whether one positive path condition establishes the receiver's presence
fn condition_guards_receiver(condition: &Expression, receiver: &Expression) -> bool {
    match &condition.kind {
        // r.is_some() and friends
        ExprKind::MethodCall {
            receiver: guarded,
            method,
            ..
        } => GUARD_METHODS.contains(&method.as_str()) && structurally_equal(guarded, receiver),

        // r != null / r != None, either operand order
        ExprKind::Binary {
            op: BinaryOp::Ne,
            left,
            right,
        } => {
            let is_absent =
                |e: &Expression| matches!(e.kind, ExprKind::NullLiteral | ExprKind::OptionNone);
            (is_absent(right) && structurally_equal(left, receiver))
                || (is_absent(left) && structurally_equal(right, receiver))
        }

        // Conjunctions distribute
        ExprKind::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            condition_guards_receiver(left, receiver) || condition_guards_receiver(right, receiver)
        }

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        Block, Function, MatchArm, Pattern, Statement, StmtKind, Visibility,
    };
    use crate::checks::walk_function;
    use crate::diagnostics::CollectingSink;
    use crate::error::Span;
    use crate::types::Type;
    use std::collections::HashMap;

    fn sp() -> Span {
        Span::unknown()
    }

    fn unwrap_call(receiver: &str) -> ExprRef {
        Expression::new(
            ExprKind::MethodCall {
                receiver: Expression::variable(receiver, sp()),
                method: "unwrap".to_string(),
                args: vec![],
            },
            sp(),
        )
    }

    fn guard_call(receiver: &str, method: &str) -> ExprRef {
        Expression::new(
            ExprKind::MethodCall {
                receiver: Expression::variable(receiver, sp()),
                method: method.to_string(),
                args: vec![],
            },
            sp(),
        )
    }

    fn function(body: Block) -> Function {
        Function {
            name: "h".to_string(),
            id: 0,
            visibility: Visibility::Public,
            type_params: vec![],
            params: vec![crate::ast::Parameter::by_value(
                "x",
                Type::optional(Type::I32),
            )],
            output: Type::I32,
            effects: vec![],
            preconditions: vec![],
            postconditions: vec![],
            body,
            is_async: false,
            span: sp(),
        }
    }

    fn run(function: &Function) -> CollectingSink {
        let mut sink = CollectingSink::new();
        let mut checker = UnsafeUnwrap::new();
        walk_function(function, &HashMap::new(), &mut checker, &mut sink);
        sink
    }

    #[test]
    fn test_bare_unwrap_warns() {
        let body = vec![Statement::new(StmtKind::Return(Some(unwrap_call("x"))), sp())];
        let sink = run(&function(body));
        let found = sink.with_code(DiagnosticCode::UnsafeUnwrap);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].severity, Severity::Warning);
    }

    #[test]
    fn test_is_some_guard_on_then_branch() {
        let body = vec![Statement::new(
            StmtKind::If {
                condition: guard_call("x", "is_some"),
                then_body: vec![Statement::new(StmtKind::Return(Some(unwrap_call("x"))), sp())],
                else_ifs: vec![],
                else_body: Some(vec![Statement::new(
                    StmtKind::Return(Some(Expression::int32(0, sp()))),
                    sp(),
                )]),
            },
            sp(),
        )];
        let sink = run(&function(body));
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_unwrap_on_else_branch_still_warns() {
        let body = vec![Statement::new(
            StmtKind::If {
                condition: guard_call("x", "is_some"),
                then_body: vec![Statement::new(
                    StmtKind::Return(Some(Expression::int32(0, sp()))),
                    sp(),
                )],
                else_ifs: vec![],
                else_body: Some(vec![Statement::new(
                    StmtKind::Return(Some(unwrap_call("x"))),
                    sp(),
                )]),
            },
            sp(),
        )];
        let sink = run(&function(body));
        assert!(sink.has_code(DiagnosticCode::UnsafeUnwrap));
    }

    #[test]
    fn test_not_null_comparison_guards() {
        let condition = Expression::binary(
            BinaryOp::Ne,
            Expression::variable("x", sp()),
            Expression::new(ExprKind::NullLiteral, sp()),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::If {
                condition,
                then_body: vec![Statement::new(StmtKind::Return(Some(unwrap_call("x"))), sp())],
                else_ifs: vec![],
                else_body: None,
            },
            sp(),
        )];
        let sink = run(&function(body));
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_pattern_binding_guards() {
        // match x { Some(v) => x.unwrap(), None => 0 }
        let arms = vec![
            MatchArm {
                pattern: Pattern::Some(Box::new(Pattern::Binding("v".to_string()))),
                guard: None,
                body: vec![Statement::new(StmtKind::Return(Some(unwrap_call("x"))), sp())],
            },
            MatchArm {
                pattern: Pattern::None,
                guard: None,
                body: vec![Statement::new(
                    StmtKind::Return(Some(Expression::int32(0, sp()))),
                    sp(),
                )],
            },
        ];
        let body = vec![Statement::new(
            StmtKind::Match {
                scrutinee: Expression::variable("x", sp()),
                arms,
            },
            sp(),
        )];
        let sink = run(&function(body));
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_safe_variants_are_ignored() {
        let call = Expression::new(
            ExprKind::MethodCall {
                receiver: Expression::variable("x", sp()),
                method: "unwrap_or".to_string(),
                args: vec![Expression::int32(0, sp())],
            },
            sp(),
        );
        let body = vec![Statement::new(StmtKind::Return(Some(call)), sp())];
        let sink = run(&function(body));
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_conjunction_guard_distributes() {
        // if x.is_some() && y > 0 { x.unwrap() }
        let condition = Expression::binary(
            BinaryOp::And,
            guard_call("x", "is_some"),
            Expression::binary(
                BinaryOp::Gt,
                Expression::variable("y", sp()),
                Expression::int32(0, sp()),
                sp(),
            ),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::If {
                condition,
                then_body: vec![Statement::new(StmtKind::Return(Some(unwrap_call("x"))), sp())],
                else_ifs: vec![],
                else_body: None,
            },
            sp(),
        )];
        let sink = run(&function(body));
        assert!(sink.diagnostics.is_empty());
    }
}
