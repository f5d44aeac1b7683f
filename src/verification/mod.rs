//! Verification pipeline for typed Opal modules
//!
//! The driver runs the canonicalizer over every contract, builds a CFG per
//! function for the dataflow checks, drives the bug-pattern checkers with
//! synthesized loop invariants, discharges contracts against the solver,
//! and finally checks interface substitutability at module scope. Modules
//! are independent, so a batch can verify in parallel; every solver
//! context stays confined to the thread that created it.

pub mod contracts;
pub mod inheritance;
pub mod induction;

pub use inheritance::{
    ClassInheritanceResult, ContractViolation, InheritanceState, InheritedContractInfo,
    MethodInheritanceResult, ModuleInheritanceResult, ViolationKind,
};

use crate::ast::{Function, Module, NodeId};
use crate::cfg::Cfg;
use crate::checks::{self, BugPatternOptions};
use crate::dataflow;
use crate::diagnostics::{
    CollectingSink, Diagnostic, DiagnosticCode, DiagnosticSink, Severity,
};
use crate::smt::{self, ResultCache};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Configuration of one verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOptions {
    /// Per-check solver timeout in milliseconds
    pub timeout_ms: u64,
    /// Emit informational diagnostics for undecided implications
    pub verbose: bool,
    /// Reuse proof outcomes across contracts with identical formulas
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    /// Settings for the four bug-pattern checkers
    pub bug_patterns: BugPatternOptions,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            verbose: false,
            cache_enabled: true,
            cache_capacity: 4096,
            bug_patterns: BugPatternOptions::default(),
        }
    }
}

/// Status of a single contract clause after static verification
///
/// `Proven` licenses the emitter to omit the runtime check; every other
/// status keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContractStatus {
    Proven,
    Unproven,
    Disproven { counterexample: String },
    Unsupported,
    Skipped,
}

impl ContractStatus {
    /// Whether emission may drop the runtime check for this clause
    pub fn allows_check_elision(&self) -> bool {
        matches!(self, ContractStatus::Proven)
    }
}

/// Per-function contract verification outcome
#[derive(Debug, Clone, Serialize)]
pub struct FunctionVerificationResult {
    pub id: NodeId,
    pub name: String,
    pub precondition_statuses: Vec<ContractStatus>,
    pub postcondition_statuses: Vec<ContractStatus>,
}

impl FunctionVerificationResult {
    pub fn all_proven(&self) -> bool {
        self.precondition_statuses
            .iter()
            .chain(self.postcondition_statuses.iter())
            .all(|s| *s == ContractStatus::Proven)
    }

    fn count(&self, wanted: fn(&ContractStatus) -> bool) -> usize {
        self.precondition_statuses
            .iter()
            .chain(self.postcondition_statuses.iter())
            .filter(|s| wanted(s))
            .count()
    }
}

/// Results for a whole module, in function declaration order
#[derive(Debug, Clone, Serialize)]
pub struct ModuleVerificationResult {
    pub module_name: String,
    pub module_id: NodeId,
    pub functions: Vec<FunctionVerificationResult>,
}

/// The verification driver
///
/// One instance can verify many modules; the proof cache and the solver
/// availability flag are the only shared state, and both are safe to
/// share across verification threads.
pub struct Verifier {
    options: VerificationOptions,
    cache: Option<ResultCache>,
    availability_reported: AtomicBool,
}

impl Verifier {
    pub fn new(options: VerificationOptions) -> Self {
        let cache = if options.cache_enabled {
            Some(ResultCache::new(options.cache_capacity))
        } else {
            None
        };
        Self {
            options,
            cache,
            availability_reported: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &VerificationOptions {
        &self.options
    }

    /// Verify every function and method of a module
    pub fn verify_module(
        &self,
        module: &Module,
        sink: &mut dyn DiagnosticSink,
    ) -> ModuleVerificationResult {
        self.report_availability_once(module, sink);
        let constants = module.constant_names();

        contracts::check_module_invariants(module, &self.options, sink);

        let mut functions = Vec::new();
        for function in &module.functions {
            functions.push(self.verify_function(function, &constants, sink));
        }
        for class in &module.classes {
            for method in &class.methods {
                functions.push(self.verify_function(method, &constants, sink));
            }
            contracts::check_member_contracts(class, &constants, sink);
        }
        for enum_decl in &module.enums {
            for method in &enum_decl.extension_methods {
                functions.push(self.verify_function(method, &constants, sink));
            }
        }

        let proven: usize = functions
            .iter()
            .map(|f| f.count(|s| *s == ContractStatus::Proven))
            .sum();
        let total: usize = functions
            .iter()
            .map(|f| f.precondition_statuses.len() + f.postcondition_statuses.len())
            .sum();
        sink.report_parts(
            module.span.clone(),
            DiagnosticCode::VerificationSummary,
            format!(
                "module '{}': {}/{} contracts statically proven across {} functions",
                module.name,
                proven,
                total,
                functions.len()
            ),
            Severity::Info,
        );
        info!(module = %module.name, proven, total, "module verification finished");

        ModuleVerificationResult {
            module_name: module.name.clone(),
            module_id: module.id,
            functions,
        }
    }

    fn verify_function(
        &self,
        function: &Function,
        constants: &HashSet<String>,
        sink: &mut dyn DiagnosticSink,
    ) -> FunctionVerificationResult {
        debug!(function = %function.name, "verifying");

        // Dataflow diagnostics from the CFG.
        let cfg = Cfg::build(&function.body);
        let parameters = function.params.iter().map(|p| p.name.clone()).collect();
        dataflow::check_uninitialized_uses(&cfg, parameters, sink);

        // Loop invariants strengthen the checkers' path conditions.
        let invariants = induction::synthesize(function, &self.options, self.cache.as_ref());
        checks::run_bug_patterns(function, &invariants, &self.options.bug_patterns, sink);

        contracts::verify_function(
            function,
            constants,
            &self.options,
            self.cache.as_ref(),
            sink,
        )
    }

    /// Check interface substitutability for every class of a module
    pub fn check_inheritance(
        &self,
        module: &Module,
        sink: &mut dyn DiagnosticSink,
    ) -> ModuleInheritanceResult {
        self.report_availability_once(module, sink);
        inheritance::check_module(module, &self.options, self.cache.as_ref(), sink)
    }

    /// Verify a batch of modules in parallel, results in input order
    ///
    /// Each module gets its own collecting sink; solver contexts never
    /// cross threads.
    pub fn verify_modules(
        &self,
        modules: &[Module],
    ) -> Vec<(ModuleVerificationResult, Vec<Diagnostic>)> {
        modules
            .par_iter()
            .map(|module| {
                let mut sink = CollectingSink::new();
                let result = self.verify_module(module, &mut sink);
                (result, sink.diagnostics)
            })
            .collect()
    }

    /// One informational diagnostic per run when the native solver is
    /// missing; everything afterwards silently uses heuristics
    fn report_availability_once(&self, module: &Module, sink: &mut dyn DiagnosticSink) {
        if smt::is_available() {
            return;
        }
        if !self.availability_reported.swap(true, Ordering::SeqCst) {
            sink.report_parts(
                module.span.clone(),
                DiagnosticCode::VerificationSkipped,
                "native SMT solver not found; contracts will not be statically discharged"
                    .to_string(),
                Severity::Info,
            );
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(VerificationOptions::default())
    }
}
