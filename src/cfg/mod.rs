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

//! Control flow graph construction
//!
//! One CFG per function, built on demand from the structured statement
//! list. Structured control flow is lowered straightforwardly: `if` makes
//! two successors carrying the condition and its negation, loops make
//! header/body/exit blocks with back edges, and `try`/`catch` gives every
//! potentially throwing statement an exceptional edge to the nearest
//! handler. Only simple statements land inside blocks; control transfer is
//! entirely in the terminators.

use crate::ast::{Block, ExprKind, ExprRef, Expression, Statement, StmtKind};
use crate::error::Span;
use std::collections::VecDeque;

/// Index of a basic block within its CFG
pub type BlockId = usize;

/// Block terminator
#[derive(Debug, Clone)]
pub enum Terminator {
    /// Unconditional transfer
    Goto(BlockId),

    /// Two-way branch; the `then` edge carries `condition`, the `else`
    /// edge carries its negation
    Branch {
        condition: ExprRef,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Function return
    Return(Option<ExprRef>),

    /// Raised exception; transfers to the exceptional target if one is
    /// in scope, otherwise leaves the function
    Throw(Option<ExprRef>),
}

/// A basic block
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
    /// Nearest catch handler; every statement in this block may transfer
    /// here when it throws
    pub exception_target: Option<BlockId>,
}

/// Control flow graph of a single function body
#[derive(Debug, Clone)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl Cfg {
    /// Lower a function body to a CFG
    pub fn build(body: &Block) -> Cfg {
        let mut builder = CfgBuilder::new();
        builder.lower_block(body);
        builder.finish()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Successor block ids, exceptional edge included
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let block = &self.blocks[id];
        let mut succ = match &block.terminator {
            Terminator::Goto(target) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Return(_) => vec![],
            Terminator::Throw(_) => match block.exception_target {
                Some(handler) => vec![handler],
                None => vec![],
            },
        };
        if let Some(handler) = block.exception_target {
            if !succ.contains(&handler) {
                succ.push(handler);
            }
        }
        succ
    }

    /// Predecessor lists for every block
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for id in 0..self.blocks.len() {
            for succ in self.successors(id) {
                preds[succ].push(id);
            }
        }
        preds
    }

    /// Blocks reachable from the entry
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut queue = VecDeque::new();
        seen[self.entry] = true;
        queue.push_back(self.entry);
        while let Some(id) = queue.pop_front() {
            for succ in self.successors(id) {
                if !seen[succ] {
                    seen[succ] = true;
                    queue.push_back(succ);
                }
            }
        }
        seen
    }

    /// Ids of non-empty blocks the entry can never reach
    pub fn unreachable_blocks(&self) -> Vec<BlockId> {
        let reachable = self.reachable();
        self.blocks
            .iter()
            .filter(|b| !reachable[b.id] && !b.statements.is_empty())
            .map(|b| b.id)
            .collect()
    }

    /// Exit blocks (returns and unhandled throws)
    pub fn exits(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| self.successors(b.id).is_empty())
            .map(|b| b.id)
            .collect()
    }
}

/// Loop targets for break and continue
struct LoopFrame {
    continue_target: BlockId,
    break_target: BlockId,
}

struct ProtoBlock {
    statements: Vec<Statement>,
    terminator: Option<Terminator>,
    exception_target: Option<BlockId>,
}

struct CfgBuilder {
    blocks: Vec<ProtoBlock>,
    current: BlockId,
    loops: Vec<LoopFrame>,
    handler: Option<BlockId>,
}

impl CfgBuilder {
    fn new() -> Self {
        let entry = ProtoBlock {
            statements: Vec::new(),
            terminator: None,
            exception_target: None,
        };
        Self {
            blocks: vec![entry],
            current: 0,
            loops: Vec::new(),
            handler: None,
        }
    }

    fn new_block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(ProtoBlock {
            statements: Vec::new(),
            terminator: None,
            exception_target: self.handler,
        });
        id
    }

    fn switch_to(&mut self, id: BlockId) {
        self.current = id;
    }

    fn push_statement(&mut self, stmt: Statement) {
        self.blocks[self.current].statements.push(stmt);
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current];
        if block.terminator.is_none() {
            block.terminator = Some(terminator);
        }
    }

    fn is_terminated(&self) -> bool {
        self.blocks[self.current].terminator.is_some()
    }

    fn lower_block(&mut self, statements: &[Statement]) {
        for stmt in statements {
            if self.is_terminated() {
                // Code after return/break/continue lands in a fresh,
                // unreachable block so it is still analyzable.
                let dead = self.new_block();
                self.switch_to(dead);
            }
            self.lower_statement(stmt);
        }
    }

    fn lower_statement(&mut self, stmt: &Statement) {
        match &stmt.kind {
            StmtKind::If {
                condition,
                then_body,
                else_ifs,
                else_body,
            } => self.lower_if(condition, then_body, else_ifs, else_body, &stmt.span),
            StmtKind::While { condition, body } => self.lower_while(condition, body),
            StmtKind::DoWhile { body, condition } => self.lower_do_while(body, condition),
            StmtKind::For {
                variable,
                start,
                end,
                step,
                body,
            } => self.lower_for(variable, start, end, step.as_ref(), body, &stmt.span),
            StmtKind::ForEach {
                variable,
                iterable,
                body,
            } => self.lower_foreach(variable, iterable, body, &stmt.span),
            StmtKind::Return(value) => {
                self.terminate(Terminator::Return(value.clone()));
            }
            StmtKind::Throw(value) => {
                self.terminate(Terminator::Throw(Some(value.clone())));
            }
            StmtKind::Rethrow => {
                self.terminate(Terminator::Throw(None));
            }
            StmtKind::Break => {
                let target = self.loops.last().map(|f| f.break_target);
                match target {
                    Some(t) => self.terminate(Terminator::Goto(t)),
                    None => self.terminate(Terminator::Return(None)),
                }
            }
            StmtKind::Continue => {
                let target = self.loops.last().map(|f| f.continue_target);
                match target {
                    Some(t) => self.terminate(Terminator::Goto(t)),
                    None => self.terminate(Terminator::Return(None)),
                }
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.lower_try(body, catches, finally.as_ref(), &stmt.span),
            StmtKind::Match { scrutinee, arms } => self.lower_match(scrutinee, arms, &stmt.span),
            StmtKind::Using {
                binding,
                resource,
                body,
            } => {
                // Scoped acquisition lowers to a binding plus the body
                self.push_statement(Statement::new(
                    StmtKind::Bind {
                        name: binding.clone(),
                        ty: None,
                        mutable: false,
                        initializer: Some(resource.clone()),
                    },
                    stmt.span.clone(),
                ));
                self.lower_block(body);
            }
            StmtKind::YieldBreak => {
                self.terminate(Terminator::Return(None));
            }
            // Simple statements stay in the current block
            _ => self.push_statement(stmt.clone()),
        }
    }

    fn lower_if(
        &mut self,
        condition: &ExprRef,
        then_body: &Block,
        else_ifs: &[crate::ast::ElseIf],
        else_body: &Option<Block>,
        span: &Span,
    ) {
        let then_block = self.new_block();
        let else_block = self.new_block();
        let join = self.new_block();

        self.terminate(Terminator::Branch {
            condition: condition.clone(),
            then_block,
            else_block,
        });

        self.switch_to(then_block);
        self.lower_block(then_body);
        self.terminate(Terminator::Goto(join));

        self.switch_to(else_block);
        if let Some((first, rest)) = else_ifs.split_first() {
            // else-if chains lower as a nested if in the else block
            let nested = Statement::new(
                StmtKind::If {
                    condition: first.condition.clone(),
                    then_body: first.body.clone(),
                    else_ifs: rest.to_vec(),
                    else_body: else_body.clone(),
                },
                span.clone(),
            );
            self.lower_statement(&nested);
        } else if let Some(else_stmts) = else_body {
            self.lower_block(else_stmts);
        }
        self.terminate(Terminator::Goto(join));

        self.switch_to(join);
    }

    fn lower_while(&mut self, condition: &ExprRef, body: &Block) {
        let header = self.new_block();
        let body_block = self.new_block();
        let exit = self.new_block();

        self.terminate(Terminator::Goto(header));
        self.switch_to(header);
        self.terminate(Terminator::Branch {
            condition: condition.clone(),
            then_block: body_block,
            else_block: exit,
        });

        self.loops.push(LoopFrame {
            continue_target: header,
            break_target: exit,
        });
        self.switch_to(body_block);
        self.lower_block(body);
        self.terminate(Terminator::Goto(header));
        self.loops.pop();

        self.switch_to(exit);
    }

    fn lower_do_while(&mut self, body: &Block, condition: &ExprRef) {
        let body_block = self.new_block();
        let cond_block = self.new_block();
        let exit = self.new_block();

        self.terminate(Terminator::Goto(body_block));

        self.loops.push(LoopFrame {
            continue_target: cond_block,
            break_target: exit,
        });
        self.switch_to(body_block);
        self.lower_block(body);
        self.terminate(Terminator::Goto(cond_block));
        self.loops.pop();

        self.switch_to(cond_block);
        self.terminate(Terminator::Branch {
            condition: condition.clone(),
            then_block: body_block,
            else_block: exit,
        });

        self.switch_to(exit);
    }

    fn lower_for(
        &mut self,
        variable: &str,
        start: &ExprRef,
        end: &ExprRef,
        step: Option<&ExprRef>,
        body: &Block,
        span: &Span,
    ) {
        // Initialization in the preceding block
        self.push_statement(Statement::new(
            StmtKind::Bind {
                name: variable.to_string(),
                ty: None,
                mutable: true,
                initializer: Some(start.clone()),
            },
            span.clone(),
        ));

        let descending = matches!(
            step.map(|s| s.as_int_literal()),
            Some(Some(v)) if v < 0
        );
        let loop_var = Expression::variable(variable, span.clone());
        let condition = Expression::binary(
            if descending {
                crate::ast::BinaryOp::Ge
            } else {
                crate::ast::BinaryOp::Le
            },
            loop_var.clone(),
            end.clone(),
            span.clone(),
        );

        let header = self.new_block();
        let body_block = self.new_block();
        let step_block = self.new_block();
        let exit = self.new_block();

        self.terminate(Terminator::Goto(header));
        self.switch_to(header);
        self.terminate(Terminator::Branch {
            condition,
            then_block: body_block,
            else_block: exit,
        });

        self.loops.push(LoopFrame {
            continue_target: step_block,
            break_target: exit,
        });
        self.switch_to(body_block);
        self.lower_block(body);
        self.terminate(Terminator::Goto(step_block));
        self.loops.pop();

        self.switch_to(step_block);
        let step_value = step
            .cloned()
            .unwrap_or_else(|| Expression::int32(1, span.clone()));
        self.push_statement(Statement::new(
            StmtKind::Assign {
                target: loop_var.clone(),
                value: Expression::binary(
                    crate::ast::BinaryOp::Add,
                    loop_var,
                    step_value,
                    span.clone(),
                ),
            },
            span.clone(),
        ));
        self.terminate(Terminator::Goto(header));

        self.switch_to(exit);
    }

    fn lower_foreach(&mut self, variable: &str, iterable: &ExprRef, body: &Block, span: &Span) {
        let header = self.new_block();
        let body_block = self.new_block();
        let exit = self.new_block();

        self.terminate(Terminator::Goto(header));
        self.switch_to(header);
        // Synthetic continuation test standing in for the iterator protocol
        let condition = Expression::new(
            ExprKind::MethodCall {
                receiver: iterable.clone(),
                method: "has_next".to_string(),
                args: vec![],
            },
            span.clone(),
        );
        self.terminate(Terminator::Branch {
            condition,
            then_block: body_block,
            else_block: exit,
        });

        self.loops.push(LoopFrame {
            continue_target: header,
            break_target: exit,
        });
        self.switch_to(body_block);
        // The element binding is initialized by the loop itself
        self.push_statement(Statement::new(
            StmtKind::Bind {
                name: variable.to_string(),
                ty: None,
                mutable: false,
                initializer: Some(iterable.clone()),
            },
            span.clone(),
        ));
        self.lower_block(body);
        self.terminate(Terminator::Goto(header));
        self.loops.pop();

        self.switch_to(exit);
    }

    fn lower_try(
        &mut self,
        body: &Block,
        catches: &[crate::ast::CatchClause],
        finally: Option<&Block>,
        span: &Span,
    ) {
        let join = self.new_block();
        let handler = if catches.is_empty() {
            None
        } else {
            Some(self.new_block())
        };

        let body_block = self.new_block();
        self.terminate(Terminator::Goto(body_block));

        let saved_handler = self.handler;
        self.handler = handler.or(saved_handler);
        self.switch_to(body_block);
        self.blocks[body_block].exception_target = self.handler;
        self.lower_block(body);
        self.terminate(Terminator::Goto(join));
        self.handler = saved_handler;

        if let Some(handler_block) = handler {
            self.switch_to(handler_block);
            // Catch clauses run in order; a clause that does not rethrow
            // proceeds to the join.
            for clause in catches {
                if let Some(binding) = &clause.binding {
                    self.push_statement(Statement::new(
                        StmtKind::Bind {
                            name: binding.clone(),
                            ty: clause.exception_type.clone(),
                            mutable: false,
                            initializer: Some(Expression::new(
                                ExprKind::NullLiteral,
                                span.clone(),
                            )),
                        },
                        span.clone(),
                    ));
                }
                self.lower_block(&clause.body);
            }
            self.terminate(Terminator::Goto(join));
        }

        self.switch_to(join);
        if let Some(finally_body) = finally {
            self.lower_block(finally_body);
        }
    }

    fn lower_match(&mut self, scrutinee: &ExprRef, arms: &[crate::ast::MatchArm], span: &Span) {
        let join = self.new_block();
        let mut next_test = self.current;

        for arm in arms {
            self.switch_to(next_test);
            let arm_block = self.new_block();
            next_test = self.new_block();

            // The branch condition is the guard when present, otherwise a
            // synthetic pattern test; the unwrap checker consumes pattern
            // bindings from the structured walker, not from here.
            let condition = arm.guard.clone().unwrap_or_else(|| {
                Expression::new(
                    ExprKind::Call {
                        function: "pattern_matches".to_string(),
                        args: vec![scrutinee.clone()],
                    },
                    span.clone(),
                )
            });
            self.terminate(Terminator::Branch {
                condition,
                then_block: arm_block,
                else_block: next_test,
            });

            self.switch_to(arm_block);
            if let crate::ast::Pattern::Binding(name) = &arm.pattern {
                self.push_statement(Statement::new(
                    StmtKind::Bind {
                        name: name.clone(),
                        ty: None,
                        mutable: false,
                        initializer: Some(scrutinee.clone()),
                    },
                    span.clone(),
                ));
            }
            self.lower_block(&arm.body);
            self.terminate(Terminator::Goto(join));
        }

        self.switch_to(next_test);
        self.terminate(Terminator::Goto(join));
        self.switch_to(join);
    }

    fn finish(mut self) -> Cfg {
        // Seal the block left open at the end of the function
        self.terminate(Terminator::Return(None));

        let blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(id, proto)| BasicBlock {
                id,
                statements: proto.statements,
                terminator: proto.terminator.unwrap_or(Terminator::Return(None)),
                exception_target: proto.exception_target,
            })
            .collect();

        Cfg { blocks, entry: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    fn sp() -> Span {
        Span::unknown()
    }

    fn ret(value: Option<ExprRef>) -> Statement {
        Statement::new(StmtKind::Return(value), sp())
    }

    fn bind(name: &str, init: Option<ExprRef>) -> Statement {
        Statement::new(
            StmtKind::Bind {
                name: name.to_string(),
                ty: None,
                mutable: true,
                initializer: init,
            },
            sp(),
        )
    }

    #[test]
    fn test_straight_line_body() {
        let body = vec![
            bind("x", Some(Expression::int32(1, sp()))),
            ret(Some(Expression::variable("x", sp()))),
        ];
        let cfg = Cfg::build(&body);
        assert_eq!(cfg.blocks[cfg.entry].statements.len(), 1);
        assert!(matches!(
            cfg.blocks[cfg.entry].terminator,
            Terminator::Return(Some(_))
        ));
    }

    #[test]
    fn test_if_produces_branch_and_join() {
        let condition = Expression::binary(
            BinaryOp::Gt,
            Expression::variable("x", sp()),
            Expression::int32(0, sp()),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::If {
                condition,
                then_body: vec![bind("y", Some(Expression::int32(1, sp())))],
                else_ifs: vec![],
                else_body: Some(vec![bind("y", Some(Expression::int32(2, sp())))]),
            },
            sp(),
        )];
        let cfg = Cfg::build(&body);

        match &cfg.blocks[cfg.entry].terminator {
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                assert_ne!(then_block, else_block);
            }
            other => panic!("expected branch, got {:?}", other),
        }
        // entry, then, else, join
        assert_eq!(cfg.blocks.len(), 4);
    }

    #[test]
    fn test_while_has_back_edge() {
        let condition = Expression::binary(
            BinaryOp::Lt,
            Expression::variable("i", sp()),
            Expression::int32(10, sp()),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::While {
                condition,
                body: vec![bind("x", Some(Expression::variable("i", sp())))],
            },
            sp(),
        )];
        let cfg = Cfg::build(&body);
        let preds = cfg.predecessors();

        // The header must have two predecessors: entry and the loop body.
        let header = match cfg.blocks[cfg.entry].terminator {
            Terminator::Goto(h) => h,
            ref other => panic!("expected goto to header, got {:?}", other),
        };
        assert_eq!(preds[header].len(), 2);
    }

    #[test]
    fn test_code_after_return_is_unreachable() {
        let body = vec![
            ret(None),
            bind("x", Some(Expression::int32(1, sp()))),
        ];
        let cfg = Cfg::build(&body);
        assert_eq!(cfg.unreachable_blocks().len(), 1);
    }

    #[test]
    fn test_try_catch_exceptional_edge() {
        let call = Statement::new(
            StmtKind::Call(Expression::new(
                ExprKind::Call {
                    function: "may_throw".to_string(),
                    args: vec![],
                },
                sp(),
            )),
            sp(),
        );
        let body = vec![Statement::new(
            StmtKind::Try {
                body: vec![call],
                catches: vec![crate::ast::CatchClause {
                    exception_type: None,
                    binding: Some("e".to_string()),
                    body: vec![],
                }],
                finally: None,
            },
            sp(),
        )];
        let cfg = Cfg::build(&body);

        // Some block carries an exceptional successor.
        let has_exceptional = cfg
            .blocks
            .iter()
            .any(|b| b.exception_target.is_some() && !b.statements.is_empty());
        assert!(has_exceptional);
    }

    #[test]
    fn test_break_targets_loop_exit() {
        let condition = Expression::boolean(true, sp());
        let body = vec![
            Statement::new(
                StmtKind::While {
                    condition,
                    body: vec![Statement::new(StmtKind::Break, sp())],
                },
                sp(),
            ),
            ret(None),
        ];
        let cfg = Cfg::build(&body);
        let reachable = cfg.reachable();
        // The exit block after the loop must be reachable through the break.
        let exits = cfg.exits();
        assert!(exits.iter().any(|&e| reachable[e]));
    }
}
