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

//! Path-sensitive bug pattern checkers
//!
//! Four checkers walk each function with a shared path-condition stack:
//! entering a then-branch appends the branch condition, an else-branch its
//! negation, and a loop body the loop condition. Loops are unrolled once,
//! with the code after the loop seeing the negated condition. Each checker
//! decides per suspect operation whether to consult the solver or a local
//! heuristic.

pub mod bounds;
pub mod division;
pub mod overflow;
pub mod unwrap;

use crate::ast::{Block, ExprRef, Expression, Function, Statement, StmtKind};
use crate::diagnostics::DiagnosticSink;
use crate::error::Span;
use crate::smt::encoder::Encoder;
use crate::smt::solver::{CheckOutcome, SolverContext, Term};
use crate::smt::z3;
use crate::types::Type;
use crate::error::EncodeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-pattern enables plus the solver knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugPatternOptions {
    pub check_division_by_zero: bool,
    pub check_index_bounds: bool,
    pub check_overflow: bool,
    pub check_unsafe_unwrap: bool,
    /// Consult the solver; without it checkers use syntactic heuristics
    pub use_smt: bool,
    pub smt_timeout_ms: u64,
}

impl Default for BugPatternOptions {
    fn default() -> Self {
        Self {
            check_division_by_zero: true,
            check_index_bounds: true,
            check_overflow: true,
            check_unsafe_unwrap: true,
            use_smt: true,
            smt_timeout_ms: 5000,
        }
    }
}

impl BugPatternOptions {
    /// Whether solver-backed checking is both requested and possible
    pub fn smt_active(&self) -> bool {
        self.use_smt && z3::is_available()
    }
}

/// Everything a checker may consult at one program point
pub struct PathState {
    /// Branch conditions that must hold to reach this point
    pub conditions: Vec<ExprRef>,
    /// Receivers whose inner value is bound by an enclosing pattern match
    pub bound_inner: Vec<ExprRef>,
    /// Variables in scope with resolved types, for solver declarations
    pub declarations: Vec<(String, Type)>,
}

impl PathState {
    fn new(declarations: Vec<(String, Type)>) -> Self {
        Self {
            conditions: Vec::new(),
            bound_inner: Vec::new(),
            declarations,
        }
    }
}

/// One bug-pattern checker; invoked for every expression node reached
pub trait PatternChecker {
    fn check_expression(
        &mut self,
        expr: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    );
}

/// Loop invariants synthesized by the induction scaffold, keyed by the
/// span of the `while` statement they belong to
pub type LoopInvariants = HashMap<Span, ExprRef>;

/// Walk a function with one checker, maintaining the path-condition stack
///
/// The walk starts from the function's own preconditions: callers must
/// establish them, so every path through the body may assume them.
pub fn walk_function(
    function: &Function,
    invariants: &LoopInvariants,
    checker: &mut dyn PatternChecker,
    sink: &mut dyn DiagnosticSink,
) {
    let declarations = function
        .params
        .iter()
        .map(|p| (p.name.clone(), p.ty.clone()))
        .collect();
    let mut state = PathState::new(declarations);
    state.conditions = function
        .preconditions
        .iter()
        .map(|clause| crate::simplify::simplify(&clause.expression))
        .collect();
    walk_block(&function.body, invariants, &mut state, checker, sink);
}

fn visit_tree(
    expr: &ExprRef,
    state: &PathState,
    checker: &mut dyn PatternChecker,
    sink: &mut dyn DiagnosticSink,
) {
    checker.check_expression(expr, state, sink);
    let mut children = Vec::new();
    expr.for_each_child(&mut |c| children.push(c.clone()));
    for child in children {
        visit_tree(&child, state, checker, sink);
    }
}

fn negated(condition: &ExprRef) -> ExprRef {
    Expression::not(condition.clone(), condition.span.clone())
}

fn walk_block(
    block: &Block,
    invariants: &LoopInvariants,
    state: &mut PathState,
    checker: &mut dyn PatternChecker,
    sink: &mut dyn DiagnosticSink,
) {
    let conditions_at_entry = state.conditions.len();
    let declarations_at_entry = state.declarations.len();

    for stmt in block {
        walk_statement(stmt, invariants, state, checker, sink);
    }

    state.conditions.truncate(conditions_at_entry);
    state.declarations.truncate(declarations_at_entry);
}

fn walk_statement(
    stmt: &Statement,
    invariants: &LoopInvariants,
    state: &mut PathState,
    checker: &mut dyn PatternChecker,
    sink: &mut dyn DiagnosticSink,
) {
    match &stmt.kind {
        StmtKind::Bind {
            name,
            ty,
            initializer,
            ..
        } => {
            if let Some(init) = initializer {
                visit_tree(init, state, checker, sink);
            }
            if let Some(ty) = ty {
                state.declarations.push((name.clone(), ty.clone()));
            }
        }
        StmtKind::Assign { target, value } | StmtKind::CompoundAssign { target, value, .. } => {
            visit_tree(target, state, checker, sink);
            visit_tree(value, state, checker, sink);
        }
        StmtKind::Call(expr)
        | StmtKind::Throw(expr)
        | StmtKind::YieldReturn(expr) => {
            visit_tree(expr, state, checker, sink);
        }
        StmtKind::Return(Some(expr)) => visit_tree(expr, state, checker, sink),
        StmtKind::Print(args) => {
            for arg in args {
                visit_tree(arg, state, checker, sink);
            }
        }
        StmtKind::If {
            condition,
            then_body,
            else_ifs,
            else_body,
        } => {
            visit_tree(condition, state, checker, sink);

            state.conditions.push(condition.clone());
            walk_block(then_body, invariants, state, checker, sink);
            state.conditions.pop();

            // Each later branch sees the negations of everything before it.
            let mut accumulated = vec![negated(condition)];
            for else_if in else_ifs {
                let depth = state.conditions.len();
                state.conditions.extend(accumulated.iter().cloned());
                visit_tree(&else_if.condition, state, checker, sink);
                state.conditions.push(else_if.condition.clone());
                walk_block(&else_if.body, invariants, state, checker, sink);
                state.conditions.truncate(depth);
                accumulated.push(negated(&else_if.condition));
            }
            if let Some(else_block) = else_body {
                let depth = state.conditions.len();
                state.conditions.extend(accumulated);
                walk_block(else_block, invariants, state, checker, sink);
                state.conditions.truncate(depth);
            }
        }
        StmtKind::While { condition, body } => {
            visit_tree(condition, state, checker, sink);

            // Single unrolling: the body under the condition (plus any
            // synthesized invariant), the code after under its negation.
            let depth = state.conditions.len();
            state.conditions.push(condition.clone());
            if let Some(invariant) = invariants.get(&stmt.span) {
                state.conditions.push(invariant.clone());
            }
            walk_block(body, invariants, state, checker, sink);
            state.conditions.truncate(depth);

            state.conditions.push(negated(condition));
        }
        StmtKind::DoWhile { body, condition } => {
            // The first iteration runs unconditionally.
            walk_block(body, invariants, state, checker, sink);
            visit_tree(condition, state, checker, sink);
            state.conditions.push(negated(condition));
        }
        StmtKind::For {
            variable,
            start,
            end,
            step,
            body,
        } => {
            visit_tree(start, state, checker, sink);
            visit_tree(end, state, checker, sink);
            if let Some(step) = step {
                visit_tree(step, state, checker, sink);
            }

            state.declarations.push((variable.clone(), Type::I32));
            let loop_var = Expression::variable(variable.clone(), stmt.span.clone());
            let descending = matches!(
                step.as_ref().map(|s| s.as_int_literal()),
                Some(Some(v)) if v < 0
            );
            let in_range = Expression::binary(
                if descending {
                    crate::ast::BinaryOp::Ge
                } else {
                    crate::ast::BinaryOp::Le
                },
                loop_var.clone(),
                end.clone(),
                stmt.span.clone(),
            );
            let from_start = Expression::binary(
                if descending {
                    crate::ast::BinaryOp::Le
                } else {
                    crate::ast::BinaryOp::Ge
                },
                loop_var,
                start.clone(),
                stmt.span.clone(),
            );

            state.conditions.push(in_range);
            state.conditions.push(from_start);
            walk_block(body, invariants, state, checker, sink);
            state.conditions.pop();
            state.conditions.pop();
        }
        StmtKind::ForEach {
            variable,
            iterable,
            body,
        } => {
            visit_tree(iterable, state, checker, sink);
            let depth = state.declarations.len();
            state.declarations.push((variable.clone(), Type::I32));
            walk_block(body, invariants, state, checker, sink);
            state.declarations.truncate(depth);
        }
        StmtKind::Match { scrutinee, arms } => {
            visit_tree(scrutinee, state, checker, sink);
            for arm in arms {
                let cond_depth = state.conditions.len();
                let bound_depth = state.bound_inner.len();
                if let Some(guard) = &arm.guard {
                    visit_tree(guard, state, checker, sink);
                    state.conditions.push(guard.clone());
                }
                if arm.pattern.binds_inner_value() {
                    state.bound_inner.push(scrutinee.clone());
                }
                walk_block(&arm.body, invariants, state, checker, sink);
                state.conditions.truncate(cond_depth);
                state.bound_inner.truncate(bound_depth);
            }
        }
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            walk_block(body, invariants, state, checker, sink);
            for clause in catches {
                walk_block(&clause.body, invariants, state, checker, sink);
            }
            if let Some(finally_block) = finally {
                walk_block(finally_block, invariants, state, checker, sink);
            }
        }
        StmtKind::Using { resource, body, .. } => {
            visit_tree(resource, state, checker, sink);
            walk_block(body, invariants, state, checker, sink);
        }
        _ => {}
    }
}

/// Solver query under the current path condition
///
/// Declares every in-scope variable, asserts each encodable path conjunct,
/// then asserts the dangerous predicate built by `predicate`. Unencodable
/// path conjuncts are dropped, which can only widen the model set; a
/// "safe" (unsat) verdict is therefore still sound. Returns `None` when
/// the predicate itself cannot be encoded or no solver is present.
pub(crate) fn solve_under_path(
    state: &PathState,
    timeout_ms: u64,
    predicate: impl FnOnce(&mut Encoder) -> Result<Term, EncodeError>,
) -> Option<(CheckOutcome, String)> {
    if !z3::is_available() {
        return None;
    }
    let mut solver = SolverContext::new(timeout_ms).ok()?;
    let mut encoder = Encoder::new(&mut solver);
    for (name, ty) in &state.declarations {
        encoder.declare_variable(name, ty);
    }

    let mut path_terms = Vec::new();
    for condition in &state.conditions {
        if let Ok(term) = encoder.encode_bool(condition) {
            path_terms.push(term);
        }
    }
    let dangerous = predicate(&mut encoder).ok()?;

    for term in path_terms {
        solver.assert_term(term);
    }
    solver.assert_term(dangerous);

    let outcome = solver.check();
    let counterexample = if outcome == CheckOutcome::Sat {
        solver.counterexample()
    } else {
        String::new()
    };
    Some((outcome, counterexample))
}

/// Run every enabled checker over a function
pub fn run_bug_patterns(
    function: &Function,
    invariants: &LoopInvariants,
    options: &BugPatternOptions,
    sink: &mut dyn DiagnosticSink,
) {
    if options.check_division_by_zero {
        let mut checker = division::DivisionByZero::new(options.clone());
        walk_function(function, invariants, &mut checker, sink);
    }
    if options.check_index_bounds {
        let mut checker = bounds::IndexOutOfBounds::new(options.clone());
        walk_function(function, invariants, &mut checker, sink);
    }
    if options.check_overflow {
        let mut checker = overflow::IntegerOverflow::new(options.clone());
        walk_function(function, invariants, &mut checker, sink);
    }
    if options.check_unsafe_unwrap {
        let mut checker = unwrap::UnsafeUnwrap::new();
        walk_function(function, invariants, &mut checker, sink);
    }
}
