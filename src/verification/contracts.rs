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

//! Static discharge of function contracts
//!
//! Preconditions are checked for well-formedness and mutual consistency;
//! postconditions are proved from the precondition conjunction plus
//! whatever relation on `result` a straight-line body yields. A proven
//! contract licenses the emitter to drop its runtime check; every other
//! status keeps the check in place.

use super::{ContractStatus, VerificationOptions};
use crate::ast::{
    self, ContractClause, ExprKind, ExprRef, Expression, Function, Parameter, StmtKind,
};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink, Severity};
use crate::simplify::{self, SimplificationNote};
use crate::smt::{self, prover, ResultCache};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Maximum quantifier nesting a contract may use before it is rejected
const MAX_QUANTIFIER_DEPTH: usize = 2;

/// Verify one function's contracts, reporting diagnostics along the way
pub fn verify_function(
    function: &Function,
    module_constants: &HashSet<String>,
    options: &VerificationOptions,
    cache: Option<&ResultCache>,
    sink: &mut dyn DiagnosticSink,
) -> super::FunctionVerificationResult {
    let solver_usable = smt::is_available();

    // Simplify and well-formedness-check everything up front.
    let preconditions = prepare_clauses(
        &function.preconditions,
        function,
        module_constants,
        false,
        sink,
    );
    let postconditions = prepare_clauses(
        &function.postconditions,
        function,
        module_constants,
        true,
        sink,
    );

    let precondition_statuses = check_preconditions(
        &preconditions,
        &function.params,
        solver_usable,
        options,
        sink,
    );

    let body_relation = body_result_relation(function);
    if body_relation.is_some() {
        debug!(function = %function.name, "body yields a result relation");
    }
    let postcondition_statuses = check_postconditions(
        function,
        &preconditions,
        &postconditions,
        body_relation,
        solver_usable,
        options,
        cache,
        sink,
    );

    super::FunctionVerificationResult {
        id: function.id,
        name: function.name.clone(),
        precondition_statuses,
        postcondition_statuses,
    }
}

/// Simplify and consistency-check module-wide invariants
///
/// Invariants may only reference module constants; any pair that cannot
/// hold together is flagged the same way dead preconditions are.
pub fn check_module_invariants(
    module: &ast::Module,
    options: &VerificationOptions,
    sink: &mut dyn DiagnosticSink,
) {
    let constants: HashSet<String> = module.constant_names();
    let constant_params: Vec<Parameter> = module
        .constants
        .iter()
        .map(|c| Parameter::by_value(c.name.clone(), c.ty.clone()))
        .collect();

    let mut prepared = Vec::new();
    for clause in &module.invariants {
        let mut ok = true;
        for name in clause.expression.free_variables() {
            if !constants.contains(&name) {
                sink.report_parts(
                    clause.span.clone(),
                    DiagnosticCode::UndefinedReference,
                    format!("module invariant references undefined name '{}'", name),
                    Severity::Error,
                );
                ok = false;
            }
        }
        if !ok {
            continue;
        }
        let outcome = simplify::canonicalize(&clause.expression);
        match outcome.note {
            Some(SimplificationNote::Tautology) => sink.report_parts(
                clause.span.clone(),
                DiagnosticCode::ContractTautology,
                format!("invariant '{}' is always true", clause.expression),
                Severity::Info,
            ),
            Some(SimplificationNote::Contradiction) => sink.report_parts(
                clause.span.clone(),
                DiagnosticCode::ContractContradiction,
                format!("invariant '{}' is always false", clause.expression),
                Severity::Info,
            ),
            Some(SimplificationNote::Simplified) => sink.report_parts(
                clause.span.clone(),
                DiagnosticCode::ContractSimplified,
                format!(
                    "invariant '{}' simplifies to '{}'",
                    clause.expression, outcome.expr
                ),
                Severity::Info,
            ),
            None => {}
        }
        prepared.push((outcome.expr, clause.span.clone()));
    }

    if !smt::is_available() {
        return;
    }
    for i in 0..prepared.len() {
        for j in (i + 1)..prepared.len() {
            let (a, _) = &prepared[i];
            let (b, span) = &prepared[j];
            if a.is_true() || b.is_true() {
                continue;
            }
            if prover::check_satisfiable(
                &constant_params,
                &[a.clone(), b.clone()],
                options.timeout_ms,
            ) == Some(false)
            {
                sink.report_parts(
                    span.clone(),
                    DiagnosticCode::ContractContradiction,
                    format!("invariants '{}' and '{}' cannot hold together", a, b),
                    Severity::Warning,
                );
            }
        }
    }
}

/// Simplify constructor and property-accessor preconditions
///
/// These have no postconditions and no `result`; they get the same
/// canonicalization notes and undefined-name checks as function contracts.
pub fn check_member_contracts(
    class: &ast::Class,
    module_constants: &HashSet<String>,
    sink: &mut dyn DiagnosticSink,
) {
    for constructor in &class.constructors {
        let params: HashSet<&str> = constructor.params.iter().map(|p| p.name.as_str()).collect();
        for clause in &constructor.preconditions {
            report_member_clause(clause, &params, module_constants, "constructor", sink);
        }
    }
    for property in &class.properties {
        for accessor in &property.accessors {
            // Setters and initializers see the incoming `value`.
            let mut params: HashSet<&str> = HashSet::new();
            if matches!(
                accessor.kind,
                ast::AccessorKind::Set | ast::AccessorKind::Init
            ) {
                params.insert("value");
            }
            for clause in &accessor.preconditions {
                report_member_clause(clause, &params, module_constants, "accessor", sink);
            }
        }
    }
}

fn report_member_clause(
    clause: &ContractClause,
    params: &HashSet<&str>,
    module_constants: &HashSet<String>,
    owner: &str,
    sink: &mut dyn DiagnosticSink,
) {
    for name in clause.expression.free_variables() {
        if !params.contains(name.as_str()) && !module_constants.contains(&name) {
            sink.report_parts(
                clause.span.clone(),
                DiagnosticCode::UndefinedReference,
                format!("{} precondition references undefined name '{}'", owner, name),
                Severity::Error,
            );
            return;
        }
    }
    let outcome = simplify::canonicalize(&clause.expression);
    match outcome.note {
        Some(SimplificationNote::Tautology) => sink.report_parts(
            clause.span.clone(),
            DiagnosticCode::ContractTautology,
            format!("{} precondition '{}' is always true", owner, clause.expression),
            Severity::Info,
        ),
        Some(SimplificationNote::Contradiction) => sink.report_parts(
            clause.span.clone(),
            DiagnosticCode::ContractContradiction,
            format!(
                "{} precondition '{}' is always false",
                owner, clause.expression
            ),
            Severity::Info,
        ),
        Some(SimplificationNote::Simplified) => sink.report_parts(
            clause.span.clone(),
            DiagnosticCode::ContractSimplified,
            format!(
                "{} precondition '{}' simplifies to '{}'",
                owner, clause.expression, outcome.expr
            ),
            Severity::Info,
        ),
        None => {}
    }
}

/// A contract clause after well-formedness checking and canonicalization
pub(super) struct PreparedClause {
    /// Canonical form; `None` when well-formedness failed
    pub expr: Option<ExprRef>,
    pub span: crate::error::Span,
}

pub(super) fn prepare_clauses(
    clauses: &[ContractClause],
    function: &Function,
    module_constants: &HashSet<String>,
    is_postcondition: bool,
    sink: &mut dyn DiagnosticSink,
) -> Vec<PreparedClause> {
    clauses
        .iter()
        .map(|clause| {
            if !check_well_formed(
                &clause.expression,
                function,
                module_constants,
                is_postcondition,
                sink,
            ) {
                return PreparedClause {
                    expr: None,
                    span: clause.span.clone(),
                };
            }

            let outcome = simplify::canonicalize(&clause.expression);
            match outcome.note {
                Some(SimplificationNote::Tautology) => sink.report_parts(
                    clause.span.clone(),
                    DiagnosticCode::ContractTautology,
                    format!("contract '{}' is always true", clause.expression),
                    Severity::Info,
                ),
                Some(SimplificationNote::Contradiction) => sink.report_parts(
                    clause.span.clone(),
                    DiagnosticCode::ContractContradiction,
                    format!("contract '{}' is always false", clause.expression),
                    Severity::Info,
                ),
                Some(SimplificationNote::Simplified) => sink.report_parts(
                    clause.span.clone(),
                    DiagnosticCode::ContractSimplified,
                    format!(
                        "contract '{}' simplifies to '{}'",
                        clause.expression, outcome.expr
                    ),
                    Severity::Info,
                ),
                None => {}
            }

            PreparedClause {
                expr: Some(outcome.expr),
                span: clause.span.clone(),
            }
        })
        .collect()
}

/// Names a contract expression may reference: parameters, module
/// constants, quantifier binders, and `result` in non-void postconditions
fn check_well_formed(
    expr: &ExprRef,
    function: &Function,
    module_constants: &HashSet<String>,
    is_postcondition: bool,
    sink: &mut dyn DiagnosticSink,
) -> bool {
    let mut ok = true;

    let params: HashSet<&str> = function.params.iter().map(|p| p.name.as_str()).collect();
    for name in expr.free_variables() {
        if name == "result" {
            if !is_postcondition {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::UndefinedReference,
                    "'result' is only in scope in postconditions".to_string(),
                    Severity::Error,
                );
                ok = false;
            } else if function.is_void() {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::UndefinedReference,
                    "'result' is not in scope for a void function".to_string(),
                    Severity::Error,
                );
                ok = false;
            }
            continue;
        }
        if !params.contains(name.as_str()) && !module_constants.contains(&name) {
            sink.report_parts(
                expr.span.clone(),
                DiagnosticCode::UndefinedReference,
                format!("contract references undefined name '{}'", name),
                Severity::Error,
            );
            ok = false;
        }
    }

    // Quantifier binders must be finite, enumerable integer types, and
    // nesting is capped to keep proofs tractable.
    let mut quantifier_ok = true;
    check_quantifiers(expr, 0, &mut quantifier_ok, sink);
    ok && quantifier_ok
}

fn check_quantifiers(
    expr: &ExprRef,
    depth: usize,
    ok: &mut bool,
    sink: &mut dyn DiagnosticSink,
) {
    if let ExprKind::Quantifier { binders, body, .. } = &expr.kind {
        if depth >= MAX_QUANTIFIER_DEPTH {
            sink.report_parts(
                expr.span.clone(),
                DiagnosticCode::QuantifierNestedComplexity,
                format!(
                    "quantifier nesting deeper than {} is not supported",
                    MAX_QUANTIFIER_DEPTH
                ),
                Severity::Error,
            );
            *ok = false;
            return;
        }
        for binder in binders {
            if !binder.ty.is_enumerable_integer() {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::QuantifierNonIntegerType,
                    format!(
                        "quantifier variable '{}' has non-integer type {}",
                        binder.name, binder.ty
                    ),
                    Severity::Error,
                );
                *ok = false;
            }
        }
        check_quantifiers(body, depth + 1, ok, sink);
        return;
    }
    let mut children = Vec::new();
    expr.for_each_child(&mut |c| children.push(c.clone()));
    for child in children {
        check_quantifiers(&child, depth, ok, sink);
    }
}

fn check_preconditions(
    preconditions: &[PreparedClause],
    params: &[Parameter],
    solver_usable: bool,
    options: &VerificationOptions,
    sink: &mut dyn DiagnosticSink,
) -> Vec<ContractStatus> {
    let statuses: Vec<ContractStatus> = preconditions
        .iter()
        .map(|clause| {
            let expr = match &clause.expr {
                Some(expr) => expr,
                None => return ContractStatus::Skipped,
            };
            if expr.is_true() {
                return ContractStatus::Proven;
            }
            if expr.is_false() {
                sink.report_parts(
                    clause.span.clone(),
                    DiagnosticCode::PreconditionMayBeViolated,
                    "precondition can never hold".to_string(),
                    Severity::Warning,
                );
                return ContractStatus::Disproven {
                    counterexample: "unsatisfiable for every input".to_string(),
                };
            }
            if !solver_usable {
                return ContractStatus::Skipped;
            }
            match prover::check_satisfiable(params, &[expr.clone()], options.timeout_ms) {
                Some(true) => ContractStatus::Unproven,
                Some(false) => {
                    sink.report_parts(
                        clause.span.clone(),
                        DiagnosticCode::PreconditionMayBeViolated,
                        "precondition can never hold".to_string(),
                        Severity::Warning,
                    );
                    ContractStatus::Disproven {
                        counterexample: "unsatisfiable for every input".to_string(),
                    }
                }
                None => ContractStatus::Unproven,
            }
        })
        .collect();

    // Any pair whose conjunction is unsatisfiable is dead.
    if solver_usable {
        for i in 0..preconditions.len() {
            for j in (i + 1)..preconditions.len() {
                let (Some(a), Some(b)) = (&preconditions[i].expr, &preconditions[j].expr) else {
                    continue;
                };
                if a.is_true() || b.is_true() {
                    continue;
                }
                if prover::check_satisfiable(
                    params,
                    &[a.clone(), b.clone()],
                    options.timeout_ms,
                ) == Some(false)
                {
                    sink.report_parts(
                        preconditions[j].span.clone(),
                        DiagnosticCode::ContractContradiction,
                        format!("preconditions '{}' and '{}' cannot hold together", a, b),
                        Severity::Warning,
                    );
                }
            }
        }
    }

    statuses
}

#[allow(clippy::too_many_arguments)]
fn check_postconditions(
    function: &Function,
    preconditions: &[PreparedClause],
    postconditions: &[PreparedClause],
    body_relation: Option<ExprRef>,
    solver_usable: bool,
    options: &VerificationOptions,
    cache: Option<&ResultCache>,
    sink: &mut dyn DiagnosticSink,
) -> Vec<ContractStatus> {
    let mut antecedents: Vec<ExprRef> = preconditions
        .iter()
        .filter_map(|c| c.expr.clone())
        .collect();
    if let Some(relation) = body_relation {
        antecedents.push(relation);
    }

    postconditions
        .iter()
        .map(|clause| {
            let expr = match &clause.expr {
                Some(expr) => expr,
                None => return ContractStatus::Skipped,
            };
            if expr.is_true() {
                return ContractStatus::Proven;
            }
            if expr.is_false() {
                sink.report_parts(
                    clause.span.clone(),
                    DiagnosticCode::PostconditionMayBeViolated,
                    "postcondition can never hold".to_string(),
                    Severity::Warning,
                );
                return ContractStatus::Disproven {
                    counterexample: "unsatisfiable".to_string(),
                };
            }
            if !solver_usable {
                return ContractStatus::Skipped;
            }

            let outcome = prover::prove_implication(
                &function.params,
                Some(&function.output),
                &antecedents,
                expr,
                options.timeout_ms,
                cache,
            );
            match outcome {
                prover::ProofOutcome::Proven => ContractStatus::Proven,
                prover::ProofOutcome::Disproven { counterexample } => {
                    sink.report_parts(
                        clause.span.clone(),
                        DiagnosticCode::PostconditionMayBeViolated,
                        format!(
                            "postcondition '{}' is not implied by the preconditions ({})",
                            expr, counterexample
                        ),
                        Severity::Warning,
                    );
                    ContractStatus::Disproven { counterexample }
                }
                prover::ProofOutcome::Unknown => {
                    if options.verbose {
                        sink.report_parts(
                            clause.span.clone(),
                            DiagnosticCode::ImplicationUnknown,
                            format!("postcondition '{}' could not be decided in time", expr),
                            Severity::Info,
                        );
                    }
                    ContractStatus::Unproven
                }
                prover::ProofOutcome::Unsupported => ContractStatus::Unsupported,
            }
        })
        .collect()
}

/// Extract `result == f(params)` from a straight-line arithmetic body
///
/// Tracks simple bindings and assignments, substituting as it goes; the
/// first return of a pure arithmetic expression produces the relation.
/// Control flow or impure operations abandon the attempt.
fn body_result_relation(function: &Function) -> Option<ExprRef> {
    if function.is_void() {
        return None;
    }
    let mut env: HashMap<String, ExprRef> = HashMap::new();

    for stmt in &function.body {
        match &stmt.kind {
            StmtKind::Bind {
                name,
                initializer: Some(init),
                ..
            } => {
                let value = ast::substitute(init, &env);
                if !is_pure_arithmetic(&value) {
                    return None;
                }
                env.insert(name.clone(), value);
            }
            StmtKind::Bind {
                initializer: None, ..
            } => return None,
            StmtKind::Assign { target, value } => {
                let name = match &target.kind {
                    ExprKind::Variable(name) => name.clone(),
                    _ => return None,
                };
                let value = ast::substitute(value, &env);
                if !is_pure_arithmetic(&value) {
                    return None;
                }
                env.insert(name, value);
            }
            StmtKind::Return(Some(value)) => {
                let value = ast::substitute(value, &env);
                if !is_pure_arithmetic(&value) {
                    return None;
                }
                let span = value.span.clone();
                let result = Expression::variable("result", span.clone());
                return Some(Expression::binary(
                    crate::ast::BinaryOp::Eq,
                    result,
                    value,
                    span,
                ));
            }
            _ => return None,
        }
    }
    None
}

/// Literals, variables, and the operator subset the encoder can express
fn is_pure_arithmetic(expr: &ExprRef) -> bool {
    match &expr.kind {
        ExprKind::IntLiteral { .. } | ExprKind::BoolLiteral(_) | ExprKind::Variable(_) => true,
        ExprKind::Unary {
            op:
                crate::ast::UnaryOp::Negate
                | crate::ast::UnaryOp::Not
                | crate::ast::UnaryOp::BitNot,
            operand,
        } => is_pure_arithmetic(operand),
        ExprKind::Binary { op, left, right } => {
            !matches!(op, crate::ast::BinaryOp::Pow)
                && is_pure_arithmetic(left)
                && is_pure_arithmetic(right)
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            is_pure_arithmetic(condition)
                && is_pure_arithmetic(then_expr)
                && is_pure_arithmetic(else_expr)
        }
        _ => false,
    }
}
