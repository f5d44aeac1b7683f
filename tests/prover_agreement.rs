//! The implication prover against brute force
//!
//! For 8-bit inputs the whole domain is small enough to enumerate, so the
//! prover's verdicts can be checked exactly: `Proven` iff no assignment
//! satisfies `A && !C`. These tests only run where the native solver is
//! present; the suite stays green without it.

mod common;

use common::{bin, env_with, eval, int8, sp, Value};
use opal_verify::ast::{BinaryOp, ExprRef, Expression, Parameter};
use opal_verify::smt::{self, prover::ProofOutcome, ResultCache};
use opal_verify::types::{IntWidth, Type};
use proptest::prelude::*;

fn i8_params() -> Vec<Parameter> {
    vec![
        Parameter::by_value("x", Type::int(IntWidth::W8, true)),
        Parameter::by_value("y", Type::int(IntWidth::W8, true)),
    ]
}

/// One comparison clause over x or y against a constant
fn clause() -> impl Strategy<Value = ExprRef> {
    (
        prop::sample::select(vec![
            BinaryOp::Eq,
            BinaryOp::Ne,
            BinaryOp::Lt,
            BinaryOp::Le,
            BinaryOp::Gt,
            BinaryOp::Ge,
        ]),
        prop::sample::select(vec!["x", "y"]),
        -128i64..128,
    )
        .prop_map(|(op, name, constant)| {
            bin(op, Expression::variable(name, sp()), int8(constant))
        })
}

/// Brute force: does any 8-bit assignment satisfy `A && !C`?
fn brute_force_counterexample(antecedent: &ExprRef, consequent: &ExprRef) -> Option<(i128, i128)> {
    for x in -128i128..=127 {
        for y in -128i128..=127 {
            let environment = env_with(&[("x", x), ("y", y)]);
            let a = eval(antecedent, &environment, 8);
            let c = eval(consequent, &environment, 8);
            if a == Some(Value::Bool(true)) && c == Some(Value::Bool(false)) {
                return Some((x, y));
            }
        }
    }
    None
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// `prove(A, C)` returns `Proven` exactly when enumeration finds no
    /// counterexample
    #[test]
    fn agreement_with_enumeration(a in clause(), c in clause()) {
        if !smt::is_available() {
            return Ok(());
        }
        let outcome = smt::prover::prove_implication(
            &i8_params(),
            None,
            std::slice::from_ref(&a),
            &c,
            5000,
            None,
        );
        let brute = brute_force_counterexample(&a, &c);
        match (&outcome, &brute) {
            (ProofOutcome::Proven, None) => {}
            (ProofOutcome::Disproven { .. }, Some(_)) => {}
            // Simplification can settle an implication the enumeration also
            // settles; any other combination is a disagreement.
            (other, brute) => {
                prop_assert!(
                    false,
                    "prover said {:?} but brute force found {:?} for {} => {}",
                    other,
                    brute,
                    a,
                    c
                );
            }
        }
    }

    /// Conjunctive antecedents agree as well
    #[test]
    fn agreement_with_conjunction(a1 in clause(), a2 in clause(), c in clause()) {
        if !smt::is_available() {
            return Ok(());
        }
        let outcome = smt::prover::prove_implication(
            &i8_params(),
            None,
            &[a1.clone(), a2.clone()],
            &c,
            5000,
            None,
        );
        let conjoined = bin(BinaryOp::And, a1.clone(), a2.clone());
        let brute = brute_force_counterexample(&conjoined, &c);
        match (&outcome, &brute) {
            (ProofOutcome::Proven, None) => {}
            (ProofOutcome::Disproven { .. }, Some(_)) => {}
            (other, brute) => {
                prop_assert!(
                    false,
                    "prover said {:?} but brute force found {:?} for {} && {} => {}",
                    other,
                    brute,
                    a1,
                    a2,
                    c
                );
            }
        }
    }
}

#[test]
fn cached_outcome_is_stable() {
    if !smt::is_available() {
        return;
    }
    let cache = ResultCache::new(128);
    let a = bin(BinaryOp::Gt, common::var("x"), int8(10));
    let c = bin(BinaryOp::Ge, common::var("x"), int8(10));

    let first = smt::prover::prove_implication(
        &i8_params(),
        None,
        std::slice::from_ref(&a),
        &c,
        5000,
        Some(&cache),
    );
    for _ in 0..3 {
        let again = smt::prover::prove_implication(
            &i8_params(),
            None,
            std::slice::from_ref(&a),
            &c,
            5000,
            Some(&cache),
        );
        assert_eq!(first, again);
    }
    assert_eq!(first, ProofOutcome::Proven);
}

#[test]
fn disproven_has_a_usable_witness() {
    if !smt::is_available() {
        return;
    }
    // x >= 0 does not imply x >= 1; the witness must actually refute it.
    let a = bin(BinaryOp::Ge, common::var("x"), int8(0));
    let c = bin(BinaryOp::Ge, common::var("x"), int8(1));
    match smt::prover::prove_implication(&i8_params(), None, std::slice::from_ref(&a), &c, 5000, None)
    {
        ProofOutcome::Disproven { counterexample } => {
            assert!(counterexample.contains("x=0"), "was {}", counterexample);
        }
        other => panic!("expected disproven, got {:?}", other),
    }
}
