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

//! Structured diagnostics produced by the verification core
//!
//! The core never formats or prints; it reports `Diagnostic` values with
//! stable codes through a caller-supplied sink. The CLI and language server
//! own presentation.

use crate::error::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Stable diagnostic codes emitted by the verification core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    UnknownSectionMarker,
    TypeMismatch,
    UndefinedReference,
    QuantifierNonIntegerType,
    QuantifierNestedComplexity,
    InheritedContracts,
    ContractInheritanceValid,
    StrongerPrecondition,
    WeakerPostcondition,
    ImplicationProvenByZ3,
    ImplicationUnknown,
    Z3UnavailableForInheritance,
    ContractTautology,
    ContractContradiction,
    ContractSimplified,
    DivisionByZero,
    IndexOutOfBounds,
    IntegerOverflow,
    UnsafeUnwrap,
    UninitializedVariable,
    PreconditionMayBeViolated,
    PostconditionMayBeViolated,
    VerificationSummary,
    VerificationSkipped,
}

impl DiagnosticCode {
    /// The stable code string as documented for downstream tooling
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::UnknownSectionMarker => "UnknownSectionMarker",
            DiagnosticCode::TypeMismatch => "TypeMismatch",
            DiagnosticCode::UndefinedReference => "UndefinedReference",
            DiagnosticCode::QuantifierNonIntegerType => "QuantifierNonIntegerType",
            DiagnosticCode::QuantifierNestedComplexity => "QuantifierNestedComplexity",
            DiagnosticCode::InheritedContracts => "InheritedContracts",
            DiagnosticCode::ContractInheritanceValid => "ContractInheritanceValid",
            DiagnosticCode::StrongerPrecondition => "StrongerPrecondition",
            DiagnosticCode::WeakerPostcondition => "WeakerPostcondition",
            DiagnosticCode::ImplicationProvenByZ3 => "ImplicationProvenByZ3",
            DiagnosticCode::ImplicationUnknown => "ImplicationUnknown",
            DiagnosticCode::Z3UnavailableForInheritance => "Z3UnavailableForInheritance",
            DiagnosticCode::ContractTautology => "ContractTautology",
            DiagnosticCode::ContractContradiction => "ContractContradiction",
            DiagnosticCode::ContractSimplified => "ContractSimplified",
            DiagnosticCode::DivisionByZero => "DivisionByZero",
            DiagnosticCode::IndexOutOfBounds => "IndexOutOfBounds",
            DiagnosticCode::IntegerOverflow => "IntegerOverflow",
            DiagnosticCode::UnsafeUnwrap => "UnsafeUnwrap",
            DiagnosticCode::UninitializedVariable => "UninitializedVariable",
            DiagnosticCode::PreconditionMayBeViolated => "PreconditionMayBeViolated",
            DiagnosticCode::PostconditionMayBeViolated => "PostconditionMayBeViolated",
            DiagnosticCode::VerificationSummary => "VerificationSummary",
            DiagnosticCode::VerificationSkipped => "VerificationSkipped",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, severity: Severity, span: Span, message: String) -> Self {
        Self {
            code,
            severity,
            span,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [{}] at {}: {}",
            self.severity, self.code, self.span, self.message
        )
    }
}

/// Sink for diagnostics produced during verification
///
/// The compiler driver passes its own sink; tests use [`CollectingSink`].
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);

    fn report_parts(
        &mut self,
        span: Span,
        code: DiagnosticCode,
        message: String,
        severity: Severity,
    ) {
        self.report(Diagnostic::new(code, severity, span, message));
    }
}

/// Vec-backed sink for tests and library consumers
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics with the given code
    pub fn with_code(&self, code: DiagnosticCode) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.code == code).collect()
    }

    /// Whether any diagnostic carries the given code
    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }

    /// Number of diagnostics at the given severity
    pub fn count_at(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
