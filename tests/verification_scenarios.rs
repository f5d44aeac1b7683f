//! End-to-end verification scenarios over hand-built typed modules:
//! substitutability in both directions, guard-sensitive bug patterns,
//! contract discharge, and the degraded behavior without a native solver.

mod common;

use common::{bin, int32, sp, var};
use opal_verify::ast::{
    BinaryOp, Class, ContractClause, ExprKind, Expression, Function, Interface, MethodSignature,
    Module, Parameter, Statement, StmtKind, Visibility,
};
use opal_verify::types::{IntWidth, Type};
use opal_verify::verification::InheritanceState;
use opal_verify::{
    CollectingSink, ContractStatus, DiagnosticCode, Severity, VerificationOptions, Verifier,
};

fn function(name: &str, id: u32, params: Vec<Parameter>, body: Vec<Statement>) -> Function {
    Function {
        name: name.to_string(),
        id,
        visibility: Visibility::Public,
        type_params: vec![],
        params,
        output: Type::I32,
        effects: vec![],
        preconditions: vec![],
        postconditions: vec![],
        body,
        is_async: false,
        span: sp(),
    }
}

fn i32_param(name: &str) -> Parameter {
    Parameter::by_value(name, Type::I32)
}

fn ret(expr: opal_verify::ast::ExprRef) -> Statement {
    Statement::new(StmtKind::Return(Some(expr)), sp())
}

fn requires(expr: opal_verify::ast::ExprRef) -> ContractClause {
    ContractClause::new(expr)
}

/// Module with one interface method and one implementing class
fn lsp_module(
    interface_pre: Vec<ContractClause>,
    implementation_pre: Vec<ContractClause>,
) -> Module {
    let mut module = Module::new("scenario", 1);
    module.interfaces.push(Interface {
        name: "Calculator".to_string(),
        id: 2,
        type_params: vec![],
        methods: vec![MethodSignature {
            name: "apply".to_string(),
            id: 3,
            params: vec![i32_param("x")],
            output: Type::I32,
            preconditions: interface_pre,
            postconditions: vec![],
            span: sp(),
        }],
        span: sp(),
    });
    let mut method = function("apply", 4, vec![i32_param("x")], vec![ret(var("x"))]);
    method.preconditions = implementation_pre;
    module.classes.push(Class {
        name: "Doubler".to_string(),
        id: 5,
        type_params: vec![],
        base: None,
        interfaces: vec!["Calculator".to_string()],
        fields: vec![],
        properties: vec![],
        constructors: vec![],
        methods: vec![method],
        span: sp(),
    });
    module
}

#[test]
fn s1_precondition_weakening_is_valid() {
    if !opal_verify::smt::is_available() {
        return;
    }
    // Interface: requires x > 0. Implementation: requires x >= 0.
    let module = lsp_module(
        vec![requires(bin(BinaryOp::Gt, var("x"), int32(0)))],
        vec![requires(bin(BinaryOp::Ge, var("x"), int32(0)))],
    );
    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    let result = verifier.check_inheritance(&module, &mut sink);

    assert_eq!(
        result.classes[0].methods[0].state,
        InheritanceState::Valid
    );
    assert!(sink.has_code(DiagnosticCode::ImplicationProvenByZ3));
}

#[test]
fn s2_precondition_strengthening_is_a_violation() {
    if !opal_verify::smt::is_available() {
        return;
    }
    // Interface: requires x >= 0. Implementation: requires x > 0.
    let module = lsp_module(
        vec![requires(bin(BinaryOp::Ge, var("x"), int32(0)))],
        vec![requires(bin(BinaryOp::Gt, var("x"), int32(0)))],
    );
    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    let result = verifier.check_inheritance(&module, &mut sink);

    assert_eq!(
        result.classes[0].methods[0].state,
        InheritanceState::Violation
    );
    let diags = sink.with_code(DiagnosticCode::StrongerPrecondition);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].severity, Severity::Error);
    assert!(diags[0].message.contains("x=0"), "was: {}", diags[0].message);
}

#[test]
fn s3_guard_eliminates_division_warning() {
    if !opal_verify::smt::is_available() {
        return;
    }
    // fn g(a, b) { if b != 0 { return a / b } else { return 0 } }
    let guard = bin(BinaryOp::Ne, var("b"), int32(0));
    let body = vec![Statement::new(
        StmtKind::If {
            condition: guard,
            then_body: vec![ret(bin(BinaryOp::Div, var("a"), var("b")))],
            else_ifs: vec![],
            else_body: Some(vec![ret(int32(0))]),
        },
        sp(),
    )];
    let mut module = Module::new("scenario", 1);
    module
        .functions
        .push(function("g", 2, vec![i32_param("a"), i32_param("b")], body));

    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    verifier.verify_module(&module, &mut sink);
    assert!(
        !sink.has_code(DiagnosticCode::DivisionByZero),
        "got: {:?}",
        sink.diagnostics
    );
}

#[test]
fn s4_overflow_warning_with_counterexample_in_range() {
    if !opal_verify::smt::is_available() {
        return;
    }
    // fn add(a, b) requires a > 2e9 && b > 2e9 { return a + b }
    // 2e9 does not fit in i32, so the contract uses i64.
    let big = |v: i64| Expression::int(v as i128, IntWidth::W64, true, sp());
    let param = |n: &str| Parameter::by_value(n, Type::int(IntWidth::W64, true));
    let mut add = function(
        "add",
        2,
        vec![param("a"), param("b")],
        vec![ret(bin(BinaryOp::Add, var("a"), var("b")))],
    );
    add.output = Type::int(IntWidth::W64, true);
    add.preconditions = vec![
        requires(bin(BinaryOp::Gt, var("a"), big(2_000_000_000))),
        requires(bin(BinaryOp::Gt, var("b"), big(2_000_000_000))),
    ];
    let mut module = Module::new("scenario", 1);
    module.functions.push(add);

    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    verifier.verify_module(&module, &mut sink);

    let warnings = sink.with_code(DiagnosticCode::IntegerOverflow);
    assert!(!warnings.is_empty(), "expected an overflow warning");
    assert_eq!(warnings[0].severity, Severity::Warning);
}

#[test]
fn s5_unwrap_without_guard_warns() {
    // fn h(x: Option<i32>) -> i32 { return x.unwrap() }
    let unwrap = Expression::new(
        ExprKind::MethodCall {
            receiver: var("x"),
            method: "unwrap".to_string(),
            args: vec![],
        },
        sp(),
    );
    let mut h = function("h", 2, vec![], vec![ret(unwrap)]);
    h.params = vec![Parameter::by_value("x", Type::optional(Type::I32))];
    let mut module = Module::new("scenario", 1);
    module.functions.push(h);

    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    verifier.verify_module(&module, &mut sink);

    let warnings = sink.with_code(DiagnosticCode::UnsafeUnwrap);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].severity, Severity::Warning);
}

#[test]
fn s6_tautological_postcondition_elided() {
    // Postcondition result == result simplifies to true and is proven
    // with no solver involvement at all.
    let mut f = function("f", 2, vec![i32_param("x")], vec![ret(var("x"))]);
    f.postconditions = vec![requires(bin(BinaryOp::Eq, var("result"), var("result")))];
    let mut module = Module::new("scenario", 1);
    module.functions.push(f);

    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    let result = verifier.verify_module(&module, &mut sink);

    assert_eq!(
        result.functions[0].postcondition_statuses,
        vec![ContractStatus::Proven]
    );
    assert!(result.functions[0].postcondition_statuses[0].allows_check_elision());
    assert!(sink.has_code(DiagnosticCode::ContractTautology));
}

#[test]
fn literal_division_by_zero_is_an_error_on_any_path() {
    // Even under an impossible branch, x / 0 with a literal zero reports.
    let impossible = bin(BinaryOp::Lt, int32(1), int32(0));
    let body = vec![Statement::new(
        StmtKind::If {
            condition: impossible,
            then_body: vec![ret(bin(BinaryOp::Div, var("x"), int32(0)))],
            else_ifs: vec![],
            else_body: Some(vec![ret(int32(0))]),
        },
        sp(),
    )];
    let mut module = Module::new("scenario", 1);
    module
        .functions
        .push(function("f", 2, vec![i32_param("x")], body));

    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    verifier.verify_module(&module, &mut sink);

    let errors = sink.with_code(DiagnosticCode::DivisionByZero);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].severity, Severity::Error);
}

#[test]
fn empty_contracts_mean_no_contracts_state() {
    let module = lsp_module(vec![], vec![]);
    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    let result = verifier.check_inheritance(&module, &mut sink);

    assert_eq!(
        result.classes[0].methods[0].state,
        InheritanceState::NoContracts
    );
    // No contracts, no solver involvement; nothing to report beyond the
    // availability notice a solver-less machine gets.
    assert!(sink
        .diagnostics
        .iter()
        .all(|d| d.code == DiagnosticCode::VerificationSkipped));
}

#[test]
fn missing_solver_degrades_to_skipped() {
    if opal_verify::smt::is_available() {
        return;
    }
    // Without the native library every non-trivial contract is skipped and
    // exactly one informational diagnostic announces the degradation.
    let mut f = function("f", 2, vec![i32_param("x")], vec![ret(var("x"))]);
    f.preconditions = vec![requires(bin(BinaryOp::Gt, var("x"), int32(0)))];
    let mut module = Module::new("scenario", 1);
    module.functions.push(f);

    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    let result = verifier.verify_module(&module, &mut sink);

    assert_eq!(
        result.functions[0].precondition_statuses,
        vec![ContractStatus::Skipped]
    );
    let notices = sink.with_code(DiagnosticCode::VerificationSkipped);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, Severity::Info);

    // A second module through the same verifier stays quiet.
    let mut second_sink = CollectingSink::new();
    verifier.verify_module(&module, &mut second_sink);
    assert!(!second_sink.has_code(DiagnosticCode::VerificationSkipped));
}

#[test]
fn int_min_negation_reported_at_every_width() {
    for width in IntWidth::all() {
        let minimum = Expression::int(width.min_signed(), width, true, sp());
        let body = vec![ret(Expression::unary(
            opal_verify::ast::UnaryOp::Negate,
            minimum,
            sp(),
        ))];
        let mut module = Module::new("scenario", 1);
        module.functions.push(function("f", 2, vec![], body));

        let verifier = Verifier::default();
        let mut sink = CollectingSink::new();
        verifier.verify_module(&module, &mut sink);
        assert!(
            sink.has_code(DiagnosticCode::IntegerOverflow),
            "width {} not reported",
            width.bits()
        );
    }
}

#[test]
fn uninitialized_variable_diagnosed_through_the_driver() {
    let body = vec![
        Statement::new(
            StmtKind::Bind {
                name: "t".to_string(),
                ty: Some(Type::I32),
                mutable: true,
                initializer: None,
            },
            sp(),
        ),
        ret(var("t")),
    ];
    let mut module = Module::new("scenario", 1);
    module.functions.push(function("f", 2, vec![], body));

    let verifier = Verifier::default();
    let mut sink = CollectingSink::new();
    verifier.verify_module(&module, &mut sink);
    assert!(sink.has_code(DiagnosticCode::UninitializedVariable));
}

#[test]
fn underconstrained_postcondition_is_disproven() {
    if !opal_verify::smt::is_available() {
        return;
    }
    // Nothing relates `result` to the inputs, so `result > 0` has a
    // refuting model and the runtime check must stay.
    let mut f = function("f", 2, vec![i32_param("x")], vec![]);
    f.postconditions = vec![requires(bin(BinaryOp::Gt, var("result"), int32(0)))];
    let mut module = Module::new("scenario", 1);
    module.functions.push(f);

    let options = VerificationOptions {
        verbose: true,
        ..VerificationOptions::default()
    };
    let verifier = Verifier::new(options);
    let mut sink = CollectingSink::new();
    let result = verifier.verify_module(&module, &mut sink);

    match &result.functions[0].postcondition_statuses[0] {
        ContractStatus::Disproven { counterexample } => {
            assert!(counterexample.contains("result="), "was {}", counterexample);
            assert!(sink.has_code(DiagnosticCode::PostconditionMayBeViolated));
        }
        other => panic!("unexpected status {:?}", other),
    }
}
