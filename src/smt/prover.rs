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

//! Implication prover
//!
//! Proves `A => C` by asking the solver for a model of `A && !C`: none
//! means proven, one is the counterexample, and anything else is unknown.
//! This single entry point drives the contract verifier and both
//! directions of the substitutability check.

use super::cache::{CacheKey, CachedOutcome, ResultCache};
use super::encoder::Encoder;
use super::solver::{CheckOutcome, SolverContext};
use super::z3;
use crate::ast::{BinaryOp, ExprRef, Expression, Parameter};
use crate::simplify;
use crate::types::Type;
use tracing::debug;

/// Outcome of one implication proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofOutcome {
    Proven,
    Disproven { counterexample: String },
    /// Solver timeout, resource limit, or missing solver
    Unknown,
    /// Either side fell outside the encodable fragment
    Unsupported,
}

/// Conjunction of a clause list; empty lists collapse to `true`
pub fn conjunction(clauses: &[ExprRef]) -> ExprRef {
    let span = clauses
        .first()
        .map(|c| c.span.clone())
        .unwrap_or_else(crate::error::Span::unknown);
    match clauses.split_first() {
        None => Expression::boolean(true, span),
        Some((first, rest)) => rest.iter().fold(first.clone(), |acc, clause| {
            Expression::binary(BinaryOp::And, acc, clause.clone(), span.clone())
        }),
    }
}

/// Prove that the conjunction of `antecedents` implies `consequent`
///
/// Parameters are declared fresh; `result` is declared lazily from
/// `result_type`, defaulting to `i32`. Trivial cases settle without a
/// solver so tautological contracts stay provable even when the native
/// library is missing.
pub fn prove_implication(
    params: &[Parameter],
    result_type: Option<&Type>,
    antecedents: &[ExprRef],
    consequent: &ExprRef,
    timeout_ms: u64,
    cache: Option<&ResultCache>,
) -> ProofOutcome {
    let antecedent = simplify::simplify(&conjunction(antecedents));
    let consequent = simplify::simplify(consequent);

    // Settled by canonicalization alone.
    if consequent.is_true() || antecedent.is_false() {
        return ProofOutcome::Proven;
    }

    let formula = Expression::implies(
        antecedent.clone(),
        consequent.clone(),
        consequent.span.clone(),
    );
    let key = CacheKey::for_formula(&formula, timeout_ms);
    if let Some(cache) = cache {
        match cache.get(&key) {
            Some(CachedOutcome::Proven) => return ProofOutcome::Proven,
            Some(CachedOutcome::Disproven { counterexample }) => {
                return ProofOutcome::Disproven { counterexample }
            }
            None => {}
        }
    }

    if !z3::is_available() {
        return ProofOutcome::Unknown;
    }

    let mut solver = match SolverContext::new(timeout_ms) {
        Ok(solver) => solver,
        Err(_) => return ProofOutcome::Unknown,
    };
    let mut encoder = Encoder::new(&mut solver);
    encoder.declare_parameters(params);
    encoder.set_result_type(result_type.cloned());

    let antecedent_term = match encoder.encode_bool(&antecedent) {
        Ok(term) => term,
        Err(err) => {
            debug!(error = %err, "antecedent not encodable");
            return ProofOutcome::Unsupported;
        }
    };
    let consequent_term = match encoder.encode_bool(&consequent) {
        Ok(term) => term,
        Err(err) => {
            debug!(error = %err, "consequent not encodable");
            return ProofOutcome::Unsupported;
        }
    };

    let negated = solver.not(consequent_term);
    solver.assert_term(antecedent_term);
    solver.assert_term(negated);

    match solver.check() {
        CheckOutcome::Unsat => {
            if let Some(cache) = cache {
                cache.insert(key, CachedOutcome::Proven);
            }
            ProofOutcome::Proven
        }
        CheckOutcome::Sat => {
            let counterexample = solver.counterexample();
            if let Some(cache) = cache {
                cache.insert(
                    key,
                    CachedOutcome::Disproven {
                        counterexample: counterexample.clone(),
                    },
                );
            }
            ProofOutcome::Disproven { counterexample }
        }
        CheckOutcome::Unknown => ProofOutcome::Unknown,
    }
}

/// Ask whether a conjunction of clauses is satisfiable at all
///
/// Used to flag contradictory precondition pairs as dead.
pub fn check_satisfiable(
    params: &[Parameter],
    clauses: &[ExprRef],
    timeout_ms: u64,
) -> Option<bool> {
    let formula = simplify::simplify(&conjunction(clauses));
    if formula.is_true() {
        return Some(true);
    }
    if formula.is_false() {
        return Some(false);
    }
    if !z3::is_available() {
        return None;
    }

    let mut solver = SolverContext::new(timeout_ms).ok()?;
    let mut encoder = Encoder::new(&mut solver);
    encoder.declare_parameters(params);
    let term = encoder.encode_bool(&formula).ok()?;
    solver.assert_term(term);
    match solver.check() {
        CheckOutcome::Sat => Some(true),
        CheckOutcome::Unsat => Some(false),
        CheckOutcome::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Span;
    use crate::types::Type;

    fn sp() -> Span {
        Span::unknown()
    }

    fn var(name: &str) -> ExprRef {
        Expression::variable(name, sp())
    }

    fn cmp(op: BinaryOp, name: &str, value: i64) -> ExprRef {
        Expression::binary(op, var(name), Expression::int32(value, sp()), sp())
    }

    fn x_param() -> Vec<Parameter> {
        vec![Parameter::by_value("x", Type::I32)]
    }

    #[test]
    fn test_tautological_consequent_needs_no_solver() {
        // x == x simplifies to true regardless of solver availability
        let consequent = Expression::binary(BinaryOp::Eq, var("x"), var("x"), sp());
        let outcome = prove_implication(&x_param(), None, &[], &consequent, 1000, None);
        assert_eq!(outcome, ProofOutcome::Proven);
    }

    #[test]
    fn test_vacuous_antecedent_needs_no_solver() {
        let contradiction = Expression::boolean(false, sp());
        let consequent = cmp(BinaryOp::Gt, "x", 0);
        let outcome =
            prove_implication(&x_param(), None, &[contradiction], &consequent, 1000, None);
        assert_eq!(outcome, ProofOutcome::Proven);
    }

    #[test]
    fn test_weakening_is_proven() {
        if !z3::is_available() {
            return;
        }
        // x > 0 implies x >= 0
        let outcome = prove_implication(
            &x_param(),
            None,
            &[cmp(BinaryOp::Gt, "x", 0)],
            &cmp(BinaryOp::Ge, "x", 0),
            5000,
            None,
        );
        assert_eq!(outcome, ProofOutcome::Proven);
    }

    #[test]
    fn test_strengthening_is_disproven_with_zero_witness() {
        if !z3::is_available() {
            return;
        }
        // x >= 0 does not imply x > 0; the witness is x = 0
        let outcome = prove_implication(
            &x_param(),
            None,
            &[cmp(BinaryOp::Ge, "x", 0)],
            &cmp(BinaryOp::Gt, "x", 0),
            5000,
            None,
        );
        match outcome {
            ProofOutcome::Disproven { counterexample } => {
                assert!(counterexample.contains("x=0"), "was: {}", counterexample);
            }
            other => panic!("expected disproven, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_when_floats_appear() {
        if !z3::is_available() {
            return;
        }
        let float = Expression::new(
            crate::ast::ExprKind::FloatLiteral {
                value: 0.5,
                double: true,
            },
            sp(),
        );
        let consequent = Expression::binary(BinaryOp::Gt, var("x"), float, sp());
        let outcome = prove_implication(&x_param(), None, &[], &consequent, 1000, None);
        assert_eq!(outcome, ProofOutcome::Unsupported);
    }

    #[test]
    fn test_cache_round_trip() {
        if !z3::is_available() {
            return;
        }
        let cache = ResultCache::new(64);
        let antecedents = [cmp(BinaryOp::Gt, "x", 0)];
        let consequent = cmp(BinaryOp::Ge, "x", 0);

        let first = prove_implication(
            &x_param(),
            None,
            &antecedents,
            &consequent,
            5000,
            Some(&cache),
        );
        let second = prove_implication(
            &x_param(),
            None,
            &antecedents,
            &consequent,
            5000,
            Some(&cache),
        );
        assert_eq!(first, ProofOutcome::Proven);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_contradictory_pair_is_unsatisfiable() {
        if !z3::is_available() {
            return;
        }
        let clauses = [cmp(BinaryOp::Gt, "x", 10), cmp(BinaryOp::Lt, "x", 5)];
        assert_eq!(check_satisfiable(&x_param(), &clauses, 5000), Some(false));
    }
}
