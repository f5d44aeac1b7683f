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

//! Contract verification core for the Opal compiler
//!
//! Takes a typed module whose functions, methods, and properties carry
//! formal contracts and (a) canonicalizes every contract expression,
//! (b) statically discharges contracts against Z3, (c) enforces Liskov
//! substitutability between interfaces and implementations, and
//! (d) detects division-by-zero, out-of-bounds indexing, integer
//! overflow, and unchecked unwraps with path-sensitive reasoning.
//!
//! The lexer, parser, type checker, emitter, and CLI live in sibling
//! crates; this crate consumes resolved [`ast::Module`] values and
//! produces structured results plus diagnostics through a caller-supplied
//! [`diagnostics::DiagnosticSink`]. The native solver is discovered at
//! runtime; when it is absent everything degrades to syntactic
//! heuristics and contracts are reported as skipped rather than failing.

pub mod ast;
pub mod cfg;
pub mod checks;
pub mod dataflow;
pub mod diagnostics;
pub mod error;
pub mod simplify;
pub mod smt;
pub mod types;
pub mod verification;

pub use checks::BugPatternOptions;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticCode, DiagnosticSink, Severity};
pub use verification::{
    ContractStatus, FunctionVerificationResult, ModuleInheritanceResult,
    ModuleVerificationResult, VerificationOptions, Verifier,
};
