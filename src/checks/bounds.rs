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

//! Array and list index bounds checking
//!
//! A literal negative index is an error outright. For anything else the
//! solver is asked whether `index < 0` is reachable under the path
//! condition. The upper bound is only checked when the collection is a
//! plain variable, because only then is there a length symbol to compare
//! against; without one, just the negative direction is provable.

use super::{solve_under_path, BugPatternOptions, PathState, PatternChecker};
use crate::ast::{ExprKind, ExprRef};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink, Severity};
use crate::smt::solver::CheckOutcome;

pub struct IndexOutOfBounds {
    options: BugPatternOptions,
}

impl IndexOutOfBounds {
    pub fn new(options: BugPatternOptions) -> Self {
        Self { options }
    }
}

impl PatternChecker for IndexOutOfBounds {
    fn check_expression(
        &mut self,
        expr: &ExprRef,
        state: &PathState,
        sink: &mut dyn DiagnosticSink,
    ) {
        let (collection, index) = match &expr.kind {
            ExprKind::Index { collection, index } => (collection, index),
            _ => return,
        };

        // A literal index settles the lower bound without any reasoning.
        if let Some(value) = index.as_int_literal() {
            if value < 0 {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::IndexOutOfBounds,
                    format!("index is the negative literal {}", value),
                    Severity::Error,
                );
            }
            return;
        }

        if !self.options.smt_active() {
            return;
        }

        // Negative-index direction.
        let query = solve_under_path(state, self.options.smt_timeout_ms, |encoder| {
            let encoded = encoder.encode(index)?;
            let zero = encoder
                .solver()
                .bv_literal(0, encoded.term.width().unwrap_or(32));
            Ok(encoder.solver().bv_slt(encoded.term, zero))
        });
        if let Some((CheckOutcome::Sat, counterexample)) = query {
            sink.report_parts(
                expr.span.clone(),
                DiagnosticCode::IndexOutOfBounds,
                format!("index '{}' can be negative ({})", index, counterexample),
                Severity::Warning,
            );
            return;
        }

        // Upper bound, only against a known length symbol.
        if matches!(collection.kind, ExprKind::Variable(_)) {
            let length_expr = crate::ast::Expression::new(
                ExprKind::Length(collection.clone()),
                expr.span.clone(),
            );
            let query = solve_under_path(state, self.options.smt_timeout_ms, |encoder| {
                let idx = encoder.encode(index)?;
                let len = encoder.encode(&length_expr)?;
                Ok(encoder.solver().bv_sge(idx.term, len.term))
            });
            if let Some((CheckOutcome::Sat, counterexample)) = query {
                sink.report_parts(
                    expr.span.clone(),
                    DiagnosticCode::IndexOutOfBounds,
                    format!(
                        "index '{}' can reach the length of '{}' ({})",
                        index, collection, counterexample
                    ),
                    Severity::Warning,
                );
            }
        }
    }
}
