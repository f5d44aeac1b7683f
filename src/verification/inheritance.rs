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

//! Liskov substitutability between interface and implementation
//!
//! An implementing method may only weaken preconditions and strengthen
//! postconditions. Interface contracts are a conjunction; each obligation
//! clause is satisfied when any single clause of the other side implies
//! it, which keeps violation reports local to one clause. When no clause
//! matches, the last disproven implication supplies the counterexample.
//!
//! Without a solver the check degrades to an operator-strength heuristic
//! over identical comparison operands; heuristic failures never produce a
//! violation.

use super::VerificationOptions;
use crate::ast::{
    self, BinaryOp, Class, ContractClause, ExprKind, ExprRef, Expression, Function, Interface,
    MethodSignature, Module, Parameter,
};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink, Severity};
use crate::error::Span;
use crate::simplify::structurally_equal;
use crate::smt::{self, prover, ResultCache};
use serde::Serialize;
use std::collections::HashMap;

/// Contract relationship between one interface method and its implementer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InheritanceState {
    /// Neither side has contracts; trivially valid
    NoContracts,
    /// Only the interface has contracts; the implementer inherits them
    Inherited,
    /// Both sides have contracts and every implication was provable
    Valid,
    /// Some implication was disproven
    Violation,
}

/// Why a method violates substitutability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    StrongerPrecondition,
    WeakerPostcondition,
}

/// A disproven implication with its witness
#[derive(Debug, Clone, Serialize)]
pub struct ContractViolation {
    pub kind: ViolationKind,
    pub span: Span,
    pub counterexample: String,
}

/// Contracts the emitter must materialize for an inheriting method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InheritedContractInfo {
    pub interface_name: String,
    pub preconditions: Vec<ContractClause>,
    pub postconditions: Vec<ContractClause>,
}

/// Result for one (interface, method) pair of a class
#[derive(Debug, Clone, Serialize)]
pub struct MethodInheritanceResult {
    pub interface_name: String,
    pub method_name: String,
    pub state: InheritanceState,
    pub violations: Vec<ContractViolation>,
}

/// Results for every interface a class implements
#[derive(Debug, Clone, Serialize)]
pub struct ClassInheritanceResult {
    pub class_name: String,
    pub methods: Vec<MethodInheritanceResult>,
}

/// Module-level inheritance results plus the inherited-contract map the
/// emitter consumes to generate runtime checks verbatim
#[derive(Debug, Clone, Serialize, Default)]
pub struct ModuleInheritanceResult {
    pub classes: Vec<ClassInheritanceResult>,
    pub inherited: HashMap<(String, String), InheritedContractInfo>,
}

/// Check every class of a module against the interfaces it claims
pub fn check_module(
    module: &Module,
    options: &VerificationOptions,
    cache: Option<&ResultCache>,
    sink: &mut dyn DiagnosticSink,
) -> ModuleInheritanceResult {
    let mut result = ModuleInheritanceResult::default();
    let solver_usable = smt::is_available();
    let mut unavailability_reported = false;

    for class in &module.classes {
        let mut class_result = ClassInheritanceResult {
            class_name: class.name.clone(),
            methods: Vec::new(),
        };

        for interface_name in &class.interfaces {
            let Some(interface) = module.interface(interface_name) else {
                // Unknown interface names are the resolver's to report.
                continue;
            };
            for signature in &interface.methods {
                let method_result = check_method(
                    class,
                    interface,
                    signature,
                    solver_usable,
                    &mut unavailability_reported,
                    options,
                    cache,
                    &mut result.inherited,
                    sink,
                );
                if let Some(method_result) = method_result {
                    class_result.methods.push(method_result);
                }
            }
        }
        result.classes.push(class_result);
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn check_method(
    class: &Class,
    interface: &Interface,
    signature: &MethodSignature,
    solver_usable: bool,
    unavailability_reported: &mut bool,
    options: &VerificationOptions,
    cache: Option<&ResultCache>,
    inherited: &mut HashMap<(String, String), InheritedContractInfo>,
    sink: &mut dyn DiagnosticSink,
) -> Option<MethodInheritanceResult> {
    // Parameter-type vectors must match position-wise; a mismatch is a
    // separate resolution error, not ours.
    let implementation = class.find_implementation(signature)?;

    let state = if !signature.has_contracts() && !implementation.has_contracts() {
        MethodInheritanceResult {
            interface_name: interface.name.clone(),
            method_name: signature.name.clone(),
            state: InheritanceState::NoContracts,
            violations: Vec::new(),
        }
    } else if !implementation.has_contracts() {
        inherited.insert(
            (class.name.clone(), signature.name.clone()),
            InheritedContractInfo {
                interface_name: interface.name.clone(),
                preconditions: signature.preconditions.clone(),
                postconditions: signature.postconditions.clone(),
            },
        );
        sink.report_parts(
            implementation.span.clone(),
            DiagnosticCode::InheritedContracts,
            format!(
                "'{}.{}' inherits the contracts of '{}.{}'",
                class.name, signature.name, interface.name, signature.name
            ),
            Severity::Info,
        );
        MethodInheritanceResult {
            interface_name: interface.name.clone(),
            method_name: signature.name.clone(),
            state: InheritanceState::Inherited,
            violations: Vec::new(),
        }
    } else if solver_usable {
        check_directions(
            class,
            interface,
            signature,
            implementation,
            options,
            cache,
            sink,
        )
    } else {
        if !*unavailability_reported {
            *unavailability_reported = true;
            sink.report_parts(
                implementation.span.clone(),
                DiagnosticCode::Z3UnavailableForInheritance,
                "solver unavailable; substitutability checked heuristically".to_string(),
                Severity::Info,
            );
        }
        check_heuristically(class, interface, signature, implementation, sink)
    };
    Some(state)
}

/// Rename implementer parameter names to the interface's, position-wise,
/// so both sides talk about the same variables
fn align_parameters(signature: &MethodSignature, implementation: &Function) -> Vec<ExprRef> {
    let map: HashMap<String, ExprRef> = implementation
        .params
        .iter()
        .zip(signature.params.iter())
        .filter(|(impl_p, sig_p)| impl_p.name != sig_p.name)
        .map(|(impl_p, sig_p)| {
            (
                impl_p.name.clone(),
                Expression::variable(sig_p.name.clone(), impl_p.span.clone()),
            )
        })
        .collect();
    implementation
        .preconditions
        .iter()
        .chain(implementation.postconditions.iter())
        .map(|clause| ast::substitute(&clause.expression, &map))
        .collect()
}

fn clause_exprs(clauses: &[ContractClause]) -> Vec<ExprRef> {
    clauses.iter().map(|c| c.expression.clone()).collect()
}

fn check_directions(
    class: &Class,
    interface: &Interface,
    signature: &MethodSignature,
    implementation: &Function,
    options: &VerificationOptions,
    cache: Option<&ResultCache>,
    sink: &mut dyn DiagnosticSink,
) -> MethodInheritanceResult {
    let aligned = align_parameters(signature, implementation);
    let impl_pre: Vec<ExprRef> = aligned[..implementation.preconditions.len()].to_vec();
    let impl_post: Vec<ExprRef> = aligned[implementation.preconditions.len()..].to_vec();
    let sig_pre = clause_exprs(&signature.preconditions);
    let sig_post = clause_exprs(&signature.postconditions);

    let mut violations = Vec::new();

    // Preconditions: the interface's promise must cover every demand the
    // implementer adds, so each implementer clause is an obligation.
    if let Some(counterexample) = match_clause_lists(
        &signature.params,
        None,
        &sig_pre,
        &impl_pre,
        implementation.span.clone(),
        options,
        cache,
        sink,
    ) {
        sink.report_parts(
            implementation.span.clone(),
            DiagnosticCode::StrongerPrecondition,
            format!(
                "'{}.{}' strengthens the precondition of '{}.{}' (counterexample: {})",
                class.name, signature.name, interface.name, signature.name, counterexample
            ),
            Severity::Error,
        );
        violations.push(ContractViolation {
            kind: ViolationKind::StrongerPrecondition,
            span: implementation.span.clone(),
            counterexample,
        });
    }

    // Postconditions: every interface promise is an obligation on the
    // implementer; `result` carries the implementer's output type.
    if let Some(counterexample) = match_clause_lists(
        &signature.params,
        Some(&implementation.output),
        &impl_post,
        &sig_post,
        implementation.span.clone(),
        options,
        cache,
        sink,
    ) {
        sink.report_parts(
            implementation.span.clone(),
            DiagnosticCode::WeakerPostcondition,
            format!(
                "'{}.{}' weakens the postcondition of '{}.{}' (counterexample: {})",
                class.name, signature.name, interface.name, signature.name, counterexample
            ),
            Severity::Error,
        );
        violations.push(ContractViolation {
            kind: ViolationKind::WeakerPostcondition,
            span: implementation.span.clone(),
            counterexample,
        });
    }

    let state = if violations.is_empty() {
        sink.report_parts(
            implementation.span.clone(),
            DiagnosticCode::ContractInheritanceValid,
            format!(
                "'{}.{}' is substitutable for '{}.{}'",
                class.name, signature.name, interface.name, signature.name
            ),
            Severity::Info,
        );
        InheritanceState::Valid
    } else {
        InheritanceState::Violation
    };

    MethodInheritanceResult {
        interface_name: interface.name.clone(),
        method_name: signature.name.clone(),
        state,
        violations,
    }
}

/// Match each obligation against the hypothesis clauses one at a time
///
/// Returns the representative counterexample when some obligation has no
/// matching hypothesis clause. Deliberately conservative: the full
/// hypothesis conjunction is not used, so a violation always names a
/// single clause, and only the *last* disproven result is surfaced.
#[allow(clippy::too_many_arguments)]
fn match_clause_lists(
    params: &[Parameter],
    result_type: Option<&crate::types::Type>,
    hypotheses: &[ExprRef],
    obligations: &[ExprRef],
    span: Span,
    options: &VerificationOptions,
    cache: Option<&ResultCache>,
    sink: &mut dyn DiagnosticSink,
) -> Option<String> {
    let hypothesis_list: Vec<ExprRef> = if hypotheses.is_empty() {
        vec![Expression::boolean(true, span.clone())]
    } else {
        hypotheses.to_vec()
    };

    let mut last_disproven: Option<String> = None;
    let mut any_unmatched = false;

    for obligation in obligations {
        let mut matched = false;
        for hypothesis in &hypothesis_list {
            match prover::prove_implication(
                params,
                result_type,
                std::slice::from_ref(hypothesis),
                obligation,
                options.timeout_ms,
                cache,
            ) {
                prover::ProofOutcome::Proven => {
                    sink.report_parts(
                        span.clone(),
                        DiagnosticCode::ImplicationProvenByZ3,
                        format!("'{}' implies '{}'", hypothesis, obligation),
                        Severity::Info,
                    );
                    matched = true;
                    break;
                }
                prover::ProofOutcome::Disproven { counterexample } => {
                    last_disproven = Some(counterexample);
                }
                prover::ProofOutcome::Unknown | prover::ProofOutcome::Unsupported => {}
            }
        }
        if !matched {
            any_unmatched = true;
        }
    }

    if !any_unmatched {
        return None;
    }
    match last_disproven {
        Some(counterexample) => Some(counterexample),
        None => {
            // Nothing matched, but nothing was refuted either: timeouts or
            // unencodable clauses. Degrade without claiming a violation.
            sink.report_parts(
                span,
                DiagnosticCode::ImplicationUnknown,
                "some contract implications could not be decided".to_string(),
                Severity::Info,
            );
            None
        }
    }
}

/// Solver-free fallback: operator strength on identical comparison
/// operands. Never produces a violation; unmatched obligations degrade to
/// an informational diagnostic and the state stays valid.
fn check_heuristically(
    class: &Class,
    interface: &Interface,
    signature: &MethodSignature,
    implementation: &Function,
    sink: &mut dyn DiagnosticSink,
) -> MethodInheritanceResult {
    let aligned = align_parameters(signature, implementation);
    let impl_pre = &aligned[..implementation.preconditions.len()];
    let impl_post = &aligned[implementation.preconditions.len()..];
    let sig_pre = clause_exprs(&signature.preconditions);
    let sig_post = clause_exprs(&signature.postconditions);

    let pre_ok = impl_pre.iter().all(|obligation| {
        sig_pre
            .iter()
            .any(|hypothesis| implies_by_strength(hypothesis, obligation))
    });
    let post_ok = sig_post.iter().all(|obligation| {
        impl_post
            .iter()
            .any(|hypothesis| implies_by_strength(hypothesis, obligation))
    });

    if pre_ok && post_ok {
        sink.report_parts(
            implementation.span.clone(),
            DiagnosticCode::ContractInheritanceValid,
            format!(
                "'{}.{}' is substitutable for '{}.{}' (heuristic)",
                class.name, signature.name, interface.name, signature.name
            ),
            Severity::Info,
        );
    } else {
        sink.report_parts(
            implementation.span.clone(),
            DiagnosticCode::ImplicationUnknown,
            format!(
                "substitutability of '{}.{}' could not be decided without a solver",
                class.name, signature.name
            ),
            Severity::Info,
        );
    }

    MethodInheritanceResult {
        interface_name: interface.name.clone(),
        method_name: signature.name.clone(),
        state: InheritanceState::Valid,
        violations: Vec::new(),
    }
}

/// `hypothesis => obligation` by operator strength on identical operands
fn implies_by_strength(hypothesis: &ExprRef, obligation: &ExprRef) -> bool {
    if structurally_equal(hypothesis, obligation) {
        return true;
    }
    let (ExprKind::Binary {
        op: h_op,
        left: h_left,
        right: h_right,
    }, ExprKind::Binary {
        op: o_op,
        left: o_left,
        right: o_right,
    }) = (&hypothesis.kind, &obligation.kind)
    else {
        return false;
    };
    if !structurally_equal(h_left, o_left) || !structurally_equal(h_right, o_right) {
        return false;
    }
    matches!(
        (h_op, o_op),
        (BinaryOp::Gt, BinaryOp::Ge) | (BinaryOp::Lt, BinaryOp::Le) | (BinaryOp::Eq, BinaryOp::Ne)
    )
}
