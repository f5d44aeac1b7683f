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

//! Translation of typed contract expressions to QF_BV
//!
//! Sized integers map to bit-vectors of their width, booleans map to SMT
//! booleans, and everything else is out of the fragment: floats, strings,
//! decimals, user types, collections, and any call. Callers translate an
//! `EncodeError` into the `Unsupported` contract status.
//!
//! Array lengths get one uninterpreted, non-negative bit-vector symbol per
//! collection variable, which is what lets index bounds be checked against
//! guards that mention `arr.length`.

use super::solver::{SolverContext, Term};
use crate::ast::{BinaryOp, ExprKind, Expression, Parameter, UnaryOp};
use crate::error::EncodeError;
use crate::types::Type;
use std::collections::{HashMap, HashSet};

/// Default width for `result` when the output type is missing
const DEFAULT_RESULT_WIDTH: u32 = 32;

/// An encoded term plus the signedness the source type gave it
#[derive(Debug, Clone, Copy)]
pub struct Encoded {
    pub term: Term,
    pub signed: bool,
}

impl Encoded {
    fn boolean(term: Term) -> Self {
        Self { term, signed: true }
    }
}

/// Expression-to-term encoder over one solver context
pub struct Encoder<'ctx> {
    solver: &'ctx mut SolverContext,
    variables: HashMap<String, (Term, bool)>,
    unsupported_params: HashSet<String>,
    lengths: HashMap<String, Term>,
    result_type: Option<Type>,
}

impl<'ctx> Encoder<'ctx> {
    pub fn new(solver: &'ctx mut SolverContext) -> Self {
        Self {
            solver,
            variables: HashMap::new(),
            unsupported_params: HashSet::new(),
            lengths: HashMap::new(),
            result_type: None,
        }
    }

    pub fn solver(&mut self) -> &mut SolverContext {
        self.solver
    }

    /// Declare a parameter as a fresh constant of the right sort
    ///
    /// Parameters outside the fragment are remembered and only fail when a
    /// contract actually references them.
    pub fn declare_parameter(&mut self, param: &Parameter) {
        self.declare_variable(&param.name, &param.ty);
    }

    /// Declare every parameter of a list
    pub fn declare_parameters(&mut self, params: &[Parameter]) {
        for param in params {
            self.declare_parameter(param);
        }
    }

    /// Declare a named variable of a resolved type
    pub fn declare_variable(&mut self, name: &str, ty: &Type) {
        match ty {
            Type::Int { width, signed } => {
                let term = self.solver.declare_bitvector(name, width.bits());
                self.variables.insert(name.to_string(), (term, *signed));
            }
            Type::Bool => {
                let term = self.solver.declare_boolean(name);
                self.variables.insert(name.to_string(), (term, true));
            }
            _ => {
                self.unsupported_params.insert(name.to_string());
            }
        }
    }

    /// Set the declared output type; `result` is declared lazily on first
    /// reference in a postcondition
    pub fn set_result_type(&mut self, ty: Option<Type>) {
        self.result_type = ty;
    }

    fn ensure_result(&mut self) -> Result<(Term, bool), EncodeError> {
        if let Some(existing) = self.variables.get("result") {
            return Ok(*existing);
        }
        let declared = match &self.result_type {
            Some(Type::Int { width, signed }) => {
                (self.solver.declare_bitvector("result", width.bits()), *signed)
            }
            Some(Type::Bool) => (self.solver.declare_boolean("result"), true),
            Some(other) => {
                return Err(EncodeError::UnsupportedConstruct {
                    construct: format!("result of type {}", other),
                })
            }
            None => (
                self.solver.declare_bitvector("result", DEFAULT_RESULT_WIDTH),
                true,
            ),
        };
        self.variables.insert("result".to_string(), declared);
        Ok(declared)
    }

    /// Length symbol for a collection variable, non-negative by construction
    fn length_symbol(&mut self, collection: &Expression) -> Result<Term, EncodeError> {
        let name = match &collection.kind {
            ExprKind::Variable(name) => name.clone(),
            _ => {
                return Err(EncodeError::UnsupportedConstruct {
                    construct: "length of a non-variable collection".to_string(),
                })
            }
        };
        if let Some(term) = self.lengths.get(&name) {
            return Ok(*term);
        }
        let symbol_name = format!("{}.length", name);
        let term = self
            .solver
            .declare_bitvector(&symbol_name, DEFAULT_RESULT_WIDTH);
        let zero = self.solver.bv_literal(0, DEFAULT_RESULT_WIDTH);
        let nonneg = self.solver.bv_sge(term, zero);
        self.solver.assert_term(nonneg);
        self.lengths.insert(name, term);
        Ok(term)
    }

    /// Encode an expression that must come out boolean
    pub fn encode_bool(&mut self, expr: &Expression) -> Result<Term, EncodeError> {
        let encoded = self.encode(expr)?;
        if encoded.term.is_bool() {
            Ok(encoded.term)
        } else {
            Err(EncodeError::ExpectedBoolean)
        }
    }

    /// Encode an expression into the QF_BV + boolean fragment
    pub fn encode(&mut self, expr: &Expression) -> Result<Encoded, EncodeError> {
        match &expr.kind {
            ExprKind::IntLiteral {
                value,
                width,
                signed,
            } => Ok(Encoded {
                term: self.solver.bv_literal(*value, width.bits()),
                signed: *signed,
            }),
            ExprKind::BoolLiteral(b) => Ok(Encoded::boolean(self.solver.bool_literal(*b))),
            ExprKind::Variable(name) => {
                if name == "result" {
                    let (term, signed) = self.ensure_result()?;
                    return Ok(Encoded { term, signed });
                }
                if let Some((term, signed)) = self.variables.get(name) {
                    Ok(Encoded {
                        term: *term,
                        signed: *signed,
                    })
                } else if self.unsupported_params.contains(name) {
                    Err(EncodeError::UnsupportedConstruct {
                        construct: format!("parameter '{}' outside the fragment", name),
                    })
                } else {
                    Err(EncodeError::UnknownVariable { name: name.clone() })
                }
            }
            ExprKind::Unary { op, operand } => self.encode_unary(*op, operand),
            ExprKind::Binary { op, left, right } => self.encode_binary(*op, left, right),
            ExprKind::Implies {
                antecedent,
                consequent,
            } => {
                let a = self.encode_bool(antecedent)?;
                let c = self.encode_bool(consequent)?;
                Ok(Encoded::boolean(self.solver.implies(a, c)))
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond = self.encode_bool(condition)?;
                let (then_e, else_e) = self.encode_same_width(then_expr, else_expr)?;
                if then_e.term.sort() != else_e.term.sort() {
                    return Err(EncodeError::ExpectedBitVector);
                }
                Ok(Encoded {
                    term: self.solver.ite(cond, then_e.term, else_e.term),
                    signed: then_e.signed,
                })
            }
            ExprKind::Length(inner) | ExprKind::Count(inner) => {
                let term = self.length_symbol(inner)?;
                Ok(Encoded { term, signed: true })
            }
            ExprKind::Quantifier { .. } => Err(EncodeError::UnsupportedConstruct {
                construct: "quantifier (outside the quantifier-free fragment)".to_string(),
            }),
            ExprKind::FloatLiteral { .. } => Err(EncodeError::UnsupportedConstruct {
                construct: "float literal".to_string(),
            }),
            ExprKind::DecimalLiteral(_) => Err(EncodeError::UnsupportedConstruct {
                construct: "decimal literal".to_string(),
            }),
            ExprKind::StringLiteral(_) => Err(EncodeError::UnsupportedConstruct {
                construct: "string literal".to_string(),
            }),
            ExprKind::NullLiteral => Err(EncodeError::UnsupportedConstruct {
                construct: "null literal".to_string(),
            }),
            ExprKind::Call { function, .. } => Err(EncodeError::UnsupportedCall {
                callee: function.clone(),
            }),
            ExprKind::MethodCall { method, .. } => Err(EncodeError::UnsupportedCall {
                callee: method.clone(),
            }),
            ExprKind::FieldAccess { .. } => Err(EncodeError::UnsupportedConstruct {
                construct: "field access on a non-bitvector shape".to_string(),
            }),
            ExprKind::Index { .. } => Err(EncodeError::UnsupportedConstruct {
                construct: "array access on a non-bitvector shape".to_string(),
            }),
            _ => Err(EncodeError::UnsupportedConstruct {
                construct: "expression outside the QF_BV subset".to_string(),
            }),
        }
    }

    fn encode_unary(&mut self, op: UnaryOp, operand: &Expression) -> Result<Encoded, EncodeError> {
        match op {
            UnaryOp::Not => {
                let inner = self.encode_bool(operand)?;
                Ok(Encoded::boolean(self.solver.not(inner)))
            }
            UnaryOp::Negate => {
                let inner = self.encode(operand)?;
                if inner.term.is_bool() {
                    return Err(EncodeError::ExpectedBitVector);
                }
                Ok(Encoded {
                    term: self.solver.bv_neg(inner.term),
                    signed: inner.signed,
                })
            }
            UnaryOp::BitNot => {
                let inner = self.encode(operand)?;
                if inner.term.is_bool() {
                    return Err(EncodeError::ExpectedBitVector);
                }
                Ok(Encoded {
                    term: self.solver.bv_not(inner.term),
                    signed: inner.signed,
                })
            }
            _ => Err(EncodeError::UnsupportedConstruct {
                construct: "increment/decrement in a contract".to_string(),
            }),
        }
    }

    /// Encode two operands, re-encoding a bare literal at the other side's
    /// width so `x > 0` works at every width without explicit suffixes
    fn encode_same_width(
        &mut self,
        left: &Expression,
        right: &Expression,
    ) -> Result<(Encoded, Encoded), EncodeError> {
        let l = self.encode(left)?;
        let r = self.encode(right)?;
        match (l.term.width(), r.term.width()) {
            (Some(lw), Some(rw)) if lw != rw => {
                if let ExprKind::IntLiteral { value, .. } = &right.kind {
                    let term = self.solver.bv_literal(*value, lw);
                    return Ok((
                        l,
                        Encoded {
                            term,
                            signed: l.signed,
                        },
                    ));
                }
                if let ExprKind::IntLiteral { value, .. } = &left.kind {
                    let term = self.solver.bv_literal(*value, rw);
                    return Ok((
                        Encoded {
                            term,
                            signed: r.signed,
                        },
                        r,
                    ));
                }
                Err(EncodeError::WidthMismatch { left: lw, right: rw })
            }
            _ => Ok((l, r)),
        }
    }

    fn encode_binary(
        &mut self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Encoded, EncodeError> {
        // Logical connectives take booleans; everything else bit-vectors.
        match op {
            BinaryOp::And => {
                let l = self.encode_bool(left)?;
                let r = self.encode_bool(right)?;
                return Ok(Encoded::boolean(self.solver.and(&[l, r])));
            }
            BinaryOp::Or => {
                let l = self.encode_bool(left)?;
                let r = self.encode_bool(right)?;
                return Ok(Encoded::boolean(self.solver.or(&[l, r])));
            }
            _ => {}
        }

        let (l, r) = self.encode_same_width(left, right)?;

        // Equality also applies to booleans.
        if l.term.is_bool() || r.term.is_bool() {
            return match op {
                BinaryOp::Eq if l.term.is_bool() && r.term.is_bool() => {
                    Ok(Encoded::boolean(self.solver.eq(l.term, r.term)))
                }
                BinaryOp::Ne if l.term.is_bool() && r.term.is_bool() => {
                    Ok(Encoded::boolean(self.solver.ne(l.term, r.term)))
                }
                _ => Err(EncodeError::ExpectedBitVector),
            };
        }

        if l.signed != r.signed {
            return Err(EncodeError::UnsupportedConstruct {
                construct: "mixed signed/unsigned operands".to_string(),
            });
        }
        let signed = l.signed;
        let s = &mut *self.solver;

        let encoded = match op {
            BinaryOp::Add => Encoded {
                term: s.bv_add(l.term, r.term),
                signed,
            },
            BinaryOp::Sub => Encoded {
                term: s.bv_sub(l.term, r.term),
                signed,
            },
            BinaryOp::Mul => Encoded {
                term: s.bv_mul(l.term, r.term),
                signed,
            },
            BinaryOp::Div => Encoded {
                term: if signed {
                    s.bv_sdiv(l.term, r.term)
                } else {
                    s.bv_udiv(l.term, r.term)
                },
                signed,
            },
            BinaryOp::Mod => Encoded {
                term: if signed {
                    s.bv_smod(l.term, r.term)
                } else {
                    s.bv_urem(l.term, r.term)
                },
                signed,
            },
            BinaryOp::BitAnd => Encoded {
                term: s.bv_and(l.term, r.term),
                signed,
            },
            BinaryOp::BitOr => Encoded {
                term: s.bv_or(l.term, r.term),
                signed,
            },
            BinaryOp::BitXor => Encoded {
                term: s.bv_xor(l.term, r.term),
                signed,
            },
            BinaryOp::Shl => Encoded {
                term: s.bv_shl(l.term, r.term),
                signed,
            },
            BinaryOp::Shr => Encoded {
                term: if signed {
                    s.bv_ashr(l.term, r.term)
                } else {
                    s.bv_lshr(l.term, r.term)
                },
                signed,
            },
            BinaryOp::Eq => Encoded::boolean(s.eq(l.term, r.term)),
            BinaryOp::Ne => Encoded::boolean(s.ne(l.term, r.term)),
            BinaryOp::Lt => Encoded::boolean(if signed {
                s.bv_slt(l.term, r.term)
            } else {
                s.bv_ult(l.term, r.term)
            }),
            BinaryOp::Le => Encoded::boolean(if signed {
                s.bv_sle(l.term, r.term)
            } else {
                s.bv_ule(l.term, r.term)
            }),
            BinaryOp::Gt => Encoded::boolean(if signed {
                s.bv_sgt(l.term, r.term)
            } else {
                s.bv_ugt(l.term, r.term)
            }),
            BinaryOp::Ge => Encoded::boolean(if signed {
                s.bv_sge(l.term, r.term)
            } else {
                s.bv_uge(l.term, r.term)
            }),
            BinaryOp::Pow => {
                return Err(EncodeError::UnsupportedConstruct {
                    construct: "power operator".to_string(),
                })
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        Ok(encoded)
    }

    /// `a + b` overflows: both positive with a non-positive sum, or both
    /// negative with a non-negative sum
    pub fn overflow_add(&mut self, a: Term, b: Term) -> Term {
        let width = a.width().unwrap_or(DEFAULT_RESULT_WIDTH);
        let s = &mut *self.solver;
        let zero = s.bv_literal(0, width);
        let sum = s.bv_add(a, b);

        let both_pos = s.and(&[s.bv_sgt(a, zero), s.bv_sgt(b, zero), s.bv_sle(sum, zero)]);
        let both_neg = s.and(&[s.bv_slt(a, zero), s.bv_slt(b, zero), s.bv_sge(sum, zero)]);
        s.or(&[both_pos, both_neg])
    }

    /// `a - b` overflows: operand signs differ and the result sign matches
    /// the subtrahend
    pub fn overflow_sub(&mut self, a: Term, b: Term) -> Term {
        let width = a.width().unwrap_or(DEFAULT_RESULT_WIDTH);
        let s = &mut *self.solver;
        let zero = s.bv_literal(0, width);
        let diff = s.bv_sub(a, b);

        let pos_minus_neg = s.and(&[
            s.bv_sge(a, zero),
            s.bv_slt(b, zero),
            s.bv_slt(diff, zero),
        ]);
        let neg_minus_pos = s.and(&[
            s.bv_slt(a, zero),
            s.bv_sge(b, zero),
            s.bv_sge(diff, zero),
        ]);
        s.or(&[pos_minus_neg, neg_minus_pos])
    }

    /// `a * b` overflows: dividing the product back by a non-zero `b`
    /// does not recover `a`
    pub fn overflow_mul(&mut self, a: Term, b: Term) -> Term {
        let width = a.width().unwrap_or(DEFAULT_RESULT_WIDTH);
        let s = &mut *self.solver;
        let zero = s.bv_literal(0, width);
        let product = s.bv_mul(a, b);
        let recovered = s.bv_sdiv(product, b);

        let b_nonzero = s.ne(b, zero);
        let mismatch = s.ne(recovered, a);
        s.and(&[b_nonzero, mismatch])
    }

    /// `-a` overflows exactly when `a` is the minimum signed value
    pub fn overflow_neg(&mut self, a: Term) -> Term {
        let width = a.width().unwrap_or(DEFAULT_RESULT_WIDTH);
        let min = -(1i128 << (width - 1));
        let s = &mut *self.solver;
        let min_term = s.bv_literal(min, width);
        s.eq(a, min_term)
    }

    /// `a << b` overflows: shifting back loses bits, or the shift amount
    /// reaches the width
    pub fn overflow_shl(&mut self, a: Term, b: Term) -> Term {
        let width = a.width().unwrap_or(DEFAULT_RESULT_WIDTH);
        let s = &mut *self.solver;
        let shifted = s.bv_shl(a, b);
        let back = s.bv_ashr(shifted, b);
        let lost = s.ne(back, a);
        let width_term = s.bv_literal(width as i128, width);
        let too_far = s.bv_uge(b, width_term);
        s.or(&[lost, too_far])
    }
}
