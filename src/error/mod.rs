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

//! Error handling for the Opal verification core
//!
//! Source locations, spans, and the typed error enums used by the SMT
//! layer. Contract violations and bug-pattern findings are *data*
//! (diagnostics and result records), not errors; the enums here cover
//! the internal fallible paths only.

use std::fmt;
use thiserror::Error;

/// Source location information for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl SourceLocation {
    pub fn new(file: String, line: usize, column: usize, offset: usize) -> Self {
        Self {
            file,
            line,
            column,
            offset,
        }
    }

    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".to_string(),
            line: 0,
            column: 0,
            offset: 0,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Source span covering a range of characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl Span {
    pub fn new(start: SourceLocation, end: SourceLocation) -> Self {
        Self { start, end }
    }

    pub fn single(location: SourceLocation) -> Self {
        Self {
            start: location.clone(),
            end: location,
        }
    }

    pub fn unknown() -> Self {
        Self::single(SourceLocation::unknown())
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Errors produced while translating a contract expression to QF_BV
///
/// Callers translate every variant except `UnknownVariable` to the
/// `Unsupported` contract status; nothing here is user-visible on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("construct outside the QF_BV subset: {construct}")]
    UnsupportedConstruct { construct: String },

    #[error("variable '{name}' is not declared in the solver context")]
    UnknownVariable { name: String },

    #[error("operand widths do not agree: {left} vs {right} bits")]
    WidthMismatch { left: u32, right: u32 },

    #[error("expected a boolean formula, found a bit-vector term")]
    ExpectedBoolean,

    #[error("expected a bit-vector term, found a boolean formula")]
    ExpectedBitVector,

    #[error("call to '{callee}' is not in the encodable whitelist")]
    UnsupportedCall { callee: String },
}

/// Errors produced by the native solver driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("native SMT library is not available")]
    Unavailable,

    #[error("solver returned unknown (likely timeout after {timeout_ms} ms)")]
    Timeout { timeout_ms: u64 },

    #[error("native solver error (code {code})")]
    Native { code: i32 },

    #[error("formula is not well-sorted for this query")]
    InvalidFormula,
}

/// Failure to load the native solver library during the availability probe
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("no candidate library could be loaded (last: {last_error})")]
    NotFound { last_error: String },

    #[error("library loaded but symbol '{symbol}' is missing: {source}")]
    MissingSymbol {
        symbol: String,
        source: libloading::Error,
    },

    #[error("library loaded but the smoke test failed")]
    SmokeTestFailed,
}
