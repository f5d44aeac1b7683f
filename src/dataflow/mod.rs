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

//! Data flow analysis framework
//!
//! Generic forward and backward analyses over the CFG: a lattice of facts
//! with a join, per-statement transfer functions, and a worklist iterated
//! to a fixed point. Termination holds because every implemented lattice
//! has finite height and transfers are monotone.

use crate::ast::{ExprRef, Statement, StmtKind};
use crate::cfg::{BlockId, Cfg, Terminator};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink, Severity};
use crate::error::Span;
use std::collections::{BTreeMap, VecDeque};

/// Direction of data flow analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A data flow analysis problem
pub trait DataflowAnalysis {
    /// The type of data flow facts
    type Fact: Clone + PartialEq;

    /// Direction of analysis
    fn direction(&self) -> Direction;

    /// Fact at the entry (forward) or exits (backward)
    fn initial_fact(&self) -> Self::Fact;

    /// Transfer function for statements
    fn transfer_statement(&self, stmt: &Statement, fact: Self::Fact) -> Self::Fact;

    /// Transfer function for terminators
    fn transfer_terminator(&self, term: &Terminator, fact: Self::Fact) -> Self::Fact;

    /// Join at merge points
    fn join(&self, facts: &[Self::Fact]) -> Self::Fact;
}

/// Results of running an analysis to its fixed point
pub struct DataflowResults<A: DataflowAnalysis> {
    /// Fact at each block entry
    pub entry_facts: Vec<A::Fact>,
    /// Fact at each block exit
    pub exit_facts: Vec<A::Fact>,
    /// Worklist iterations spent reaching the fixed point
    pub iterations: usize,
}

/// Run an analysis over a CFG until the facts stabilize
pub fn run_analysis<A: DataflowAnalysis>(cfg: &Cfg, analysis: &A) -> DataflowResults<A> {
    match analysis.direction() {
        Direction::Forward => run_forward(cfg, analysis),
        Direction::Backward => run_backward(cfg, analysis),
    }
}

fn run_forward<A: DataflowAnalysis>(cfg: &Cfg, analysis: &A) -> DataflowResults<A> {
    let n = cfg.blocks.len();
    let preds = cfg.predecessors();
    let mut entry_facts: Vec<A::Fact> = vec![analysis.initial_fact(); n];
    let mut exit_facts: Vec<A::Fact> = vec![analysis.initial_fact(); n];
    let mut iterations = 0;

    let mut worklist: VecDeque<BlockId> = VecDeque::new();
    worklist.push_back(cfg.entry);

    while let Some(id) = worklist.pop_front() {
        iterations += 1;

        let input = if id == cfg.entry {
            analysis.initial_fact()
        } else {
            let incoming: Vec<A::Fact> = preds[id]
                .iter()
                .map(|p| exit_facts[*p].clone())
                .collect();
            if incoming.is_empty() {
                analysis.initial_fact()
            } else {
                analysis.join(&incoming)
            }
        };
        entry_facts[id] = input.clone();

        let block = cfg.block(id);
        let mut fact = input;
        for stmt in &block.statements {
            fact = analysis.transfer_statement(stmt, fact);
        }
        fact = analysis.transfer_terminator(&block.terminator, fact);

        if exit_facts[id] != fact {
            exit_facts[id] = fact;
            for succ in cfg.successors(id) {
                if !worklist.contains(&succ) {
                    worklist.push_back(succ);
                }
            }
        }
    }

    DataflowResults {
        entry_facts,
        exit_facts,
        iterations,
    }
}

fn run_backward<A: DataflowAnalysis>(cfg: &Cfg, analysis: &A) -> DataflowResults<A> {
    let n = cfg.blocks.len();
    let preds = cfg.predecessors();
    let mut entry_facts: Vec<A::Fact> = vec![analysis.initial_fact(); n];
    let mut exit_facts: Vec<A::Fact> = vec![analysis.initial_fact(); n];
    let mut iterations = 0;

    let mut worklist: VecDeque<BlockId> = cfg.exits().into_iter().collect();
    if worklist.is_empty() {
        // A function whose every path loops forever; seed everything.
        worklist.extend(0..n);
    }

    while let Some(id) = worklist.pop_front() {
        iterations += 1;

        let successors = cfg.successors(id);
        let output = if successors.is_empty() {
            analysis.initial_fact()
        } else {
            let incoming: Vec<A::Fact> = successors
                .iter()
                .map(|s| entry_facts[*s].clone())
                .collect();
            analysis.join(&incoming)
        };
        exit_facts[id] = output.clone();

        let block = cfg.block(id);
        let mut fact = analysis.transfer_terminator(&block.terminator, output);
        for stmt in block.statements.iter().rev() {
            fact = analysis.transfer_statement(stmt, fact);
        }

        if entry_facts[id] != fact {
            entry_facts[id] = fact;
            for pred in &preds[id] {
                if !worklist.contains(pred) {
                    worklist.push_back(*pred);
                }
            }
        }
    }

    DataflowResults {
        entry_facts,
        exit_facts,
        iterations,
    }
}

/// Initialization state of one variable
///
/// `Uninitialized < MaybeInitialized < Initialized`; merging control flow
/// paths that disagree lands in the middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    MaybeInitialized,
    Initialized,
}

impl InitState {
    fn merge(self, other: InitState) -> InitState {
        if self == other {
            self
        } else {
            InitState::MaybeInitialized
        }
    }
}

/// Forward must-analysis for uses of variables before initialization
///
/// Parameters start `Initialized`; a `Bind` with an initializer promotes
/// its variable, a bare `Bind` introduces it `Uninitialized`, and any
/// assignment initializes its target.
pub struct UninitializedVariables {
    parameters: Vec<String>,
}

impl UninitializedVariables {
    pub fn new(parameters: Vec<String>) -> Self {
        Self { parameters }
    }
}

impl DataflowAnalysis for UninitializedVariables {
    type Fact = BTreeMap<String, InitState>;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn initial_fact(&self) -> Self::Fact {
        self.parameters
            .iter()
            .map(|p| (p.clone(), InitState::Initialized))
            .collect()
    }

    fn transfer_statement(&self, stmt: &Statement, mut fact: Self::Fact) -> Self::Fact {
        match &stmt.kind {
            StmtKind::Bind {
                name, initializer, ..
            } => {
                let state = if initializer.is_some() {
                    InitState::Initialized
                } else {
                    InitState::Uninitialized
                };
                fact.insert(name.clone(), state);
            }
            StmtKind::Assign { target, .. } | StmtKind::CompoundAssign { target, .. } => {
                if let crate::ast::ExprKind::Variable(name) = &target.kind {
                    fact.insert(name.clone(), InitState::Initialized);
                }
            }
            _ => {}
        }
        fact
    }

    fn transfer_terminator(&self, _term: &Terminator, fact: Self::Fact) -> Self::Fact {
        fact
    }

    fn join(&self, facts: &[Self::Fact]) -> Self::Fact {
        let mut result: Self::Fact = BTreeMap::new();
        let mut first = true;
        for fact in facts {
            if first {
                result = fact.clone();
                first = false;
                continue;
            }
            let mut merged = BTreeMap::new();
            for (name, state) in fact {
                let joined = match result.get(name) {
                    Some(existing) => existing.merge(*state),
                    // Absent on the other path means never declared there.
                    None => InitState::MaybeInitialized.merge(*state),
                };
                merged.insert(name.clone(), joined);
            }
            for (name, state) in &result {
                merged
                    .entry(name.clone())
                    .or_insert_with(|| InitState::MaybeInitialized.merge(*state));
            }
            result = merged;
        }
        result
    }
}

/// Variables read by a statement, with the span to blame
fn statement_reads(stmt: &Statement) -> Vec<(String, Span)> {
    let mut reads = Vec::new();
    let mut add_expr = |expr: &ExprRef| {
        for name in expr.free_variables() {
            reads.push((name, expr.span.clone()));
        }
    };

    match &stmt.kind {
        StmtKind::Bind {
            initializer: Some(init),
            ..
        } => add_expr(init),
        StmtKind::Bind { .. } => {}
        StmtKind::Assign { target, value } => {
            add_expr(value);
            // Writing through an index or field reads the base.
            if !matches!(target.kind, crate::ast::ExprKind::Variable(_)) {
                add_expr(target);
            }
        }
        StmtKind::CompoundAssign { target, value, op: _ } => {
            add_expr(value);
            add_expr(target);
        }
        StmtKind::Call(expr)
        | StmtKind::Throw(expr)
        | StmtKind::YieldReturn(expr) => add_expr(expr),
        StmtKind::Return(Some(expr)) => add_expr(expr),
        StmtKind::Print(args) => {
            for arg in args {
                add_expr(arg);
            }
        }
        _ => {}
    }
    reads
}

/// Report every use of a variable that may not be initialized
///
/// Error when the state is `Uninitialized` on all paths, warning when only
/// some paths initialize it.
pub fn check_uninitialized_uses(
    cfg: &Cfg,
    parameters: Vec<String>,
    sink: &mut dyn DiagnosticSink,
) -> usize {
    let analysis = UninitializedVariables::new(parameters);
    let results = run_analysis(cfg, &analysis);
    let reachable = cfg.reachable();
    let mut reported = 0;

    for block in &cfg.blocks {
        if !reachable[block.id] {
            continue;
        }
        let mut fact = results.entry_facts[block.id].clone();
        for stmt in &block.statements {
            for (name, span) in statement_reads(stmt) {
                match fact.get(&name) {
                    Some(InitState::Uninitialized) => {
                        reported += 1;
                        sink.report_parts(
                            span,
                            DiagnosticCode::UninitializedVariable,
                            format!("variable '{}' is used before initialization", name),
                            Severity::Error,
                        );
                    }
                    Some(InitState::MaybeInitialized) => {
                        reported += 1;
                        sink.report_parts(
                            span,
                            DiagnosticCode::UninitializedVariable,
                            format!("variable '{}' may be uninitialized on some paths", name),
                            Severity::Warning,
                        );
                    }
                    _ => {}
                }
            }
            fact = analysis.transfer_statement(stmt, fact);
        }

        let terminator_read = match &block.terminator {
            Terminator::Branch { condition, .. } => Some(condition),
            Terminator::Return(Some(value)) | Terminator::Throw(Some(value)) => Some(value),
            _ => None,
        };
        if let Some(expr) = terminator_read {
            for name in expr.free_variables() {
                match fact.get(&name) {
                    Some(InitState::Uninitialized) => {
                        reported += 1;
                        sink.report_parts(
                            expr.span.clone(),
                            DiagnosticCode::UninitializedVariable,
                            format!("variable '{}' is used before initialization", name),
                            Severity::Error,
                        );
                    }
                    Some(InitState::MaybeInitialized) => {
                        reported += 1;
                        sink.report_parts(
                            expr.span.clone(),
                            DiagnosticCode::UninitializedVariable,
                            format!("variable '{}' may be uninitialized on some paths", name),
                            Severity::Warning,
                        );
                    }
                    _ => {}
                }
            }
        }
    }
    reported
}
