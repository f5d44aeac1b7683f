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

//! Solver context lifecycle and check driver
//!
//! A `SolverContext` owns one native Z3 context and solver. Contexts are
//! scoped to a verification unit (one function, one inheritance check),
//! are not thread-safe, and release their native resources on every exit
//! path through `Drop`. The per-check timeout is installed as a solver
//! parameter at construction.

use super::z3::{self, Z3Ast, Z3Lbool, Z3Library, Z3_L_FALSE, Z3_L_TRUE, Z3_L_UNDEF};
use crate::error::SolverError;
use std::ffi::{CStr, CString};
use std::os::raw::c_uint;
use tracing::trace;

/// Sort of a built term
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSort {
    Bool,
    BitVec(u32),
}

/// A term built inside one solver context; valid only for that context
#[derive(Debug, Clone, Copy)]
pub struct Term {
    pub(crate) ast: Z3Ast,
    pub(crate) sort: TermSort,
}

impl Term {
    pub fn sort(&self) -> TermSort {
        self.sort
    }

    pub fn is_bool(&self) -> bool {
        self.sort == TermSort::Bool
    }

    pub fn width(&self) -> Option<u32> {
        match self.sort {
            TermSort::BitVec(w) => Some(w),
            TermSort::Bool => None,
        }
    }
}

/// Outcome of one satisfiability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Unsat,
    Sat,
    /// Timeout or resource limit; degrades gracefully upstream
    Unknown,
}

/// One native solver context scoped to a verification unit
///
/// Holds raw pointers into the native library, so it is deliberately
/// neither `Send` nor `Sync`; one context stays on one thread.
pub struct SolverContext {
    lib: &'static Z3Library,
    ctx: z3::Z3Context,
    solver: z3::Z3Solver,
    declarations: Vec<(String, Z3Ast, TermSort)>,
}

impl SolverContext {
    /// Create a context with the given per-check timeout
    ///
    /// Fails with `SolverError::Unavailable` when the native library did
    /// not load; callers fall back to heuristics.
    pub fn new(timeout_ms: u64) -> Result<Self, SolverError> {
        let lib = z3::global().ok_or(SolverError::Unavailable)?;
        unsafe {
            let config = (lib.mk_config)();
            let ctx = (lib.mk_context)(config);
            (lib.del_config)(config);
            if ctx.is_null() {
                return Err(SolverError::Native { code: -1 });
            }
            (lib.set_error_handler)(ctx, None);

            let solver = (lib.mk_solver)(ctx);
            (lib.solver_inc_ref)(ctx, solver);

            let params = (lib.mk_params)(ctx);
            (lib.params_inc_ref)(ctx, params);
            let timeout_name = CString::new("timeout").expect("static name");
            let symbol = (lib.mk_string_symbol)(ctx, timeout_name.as_ptr());
            (lib.params_set_uint)(ctx, params, symbol, timeout_ms.min(u32::MAX as u64) as c_uint);
            (lib.solver_set_params)(ctx, solver, params);
            (lib.params_dec_ref)(ctx, params);

            Ok(Self {
                lib,
                ctx,
                solver,
                declarations: Vec::new(),
            })
        }
    }

    /// Declare a fresh bit-vector constant
    pub fn declare_bitvector(&mut self, name: &str, width: u32) -> Term {
        unsafe {
            let sort = (self.lib.mk_bv_sort)(self.ctx, width as c_uint);
            let cname = CString::new(name).unwrap_or_else(|_| CString::new("v").expect("fallback"));
            let symbol = (self.lib.mk_string_symbol)(self.ctx, cname.as_ptr());
            let ast = (self.lib.mk_const)(self.ctx, symbol, sort);
            self.declarations
                .push((name.to_string(), ast, TermSort::BitVec(width)));
            Term {
                ast,
                sort: TermSort::BitVec(width),
            }
        }
    }

    /// Declare a fresh boolean constant
    pub fn declare_boolean(&mut self, name: &str) -> Term {
        unsafe {
            let sort = (self.lib.mk_bool_sort)(self.ctx);
            let cname = CString::new(name).unwrap_or_else(|_| CString::new("v").expect("fallback"));
            let symbol = (self.lib.mk_string_symbol)(self.ctx, cname.as_ptr());
            let ast = (self.lib.mk_const)(self.ctx, symbol, sort);
            self.declarations
                .push((name.to_string(), ast, TermSort::Bool));
            Term {
                ast,
                sort: TermSort::Bool,
            }
        }
    }

    /// Already-declared constant by name
    pub fn lookup(&self, name: &str) -> Option<Term> {
        self.declarations
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, ast, sort)| Term {
                ast: *ast,
                sort: *sort,
            })
    }

    /// Bit-vector literal of the given width
    pub fn bv_literal(&self, value: i128, width: u32) -> Term {
        let mask = if width == 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        };
        let unsigned = (value as u128) & mask;
        unsafe {
            let sort = (self.lib.mk_bv_sort)(self.ctx, width as c_uint);
            let text = CString::new(unsigned.to_string()).expect("decimal digits");
            let ast = (self.lib.mk_numeral)(self.ctx, text.as_ptr(), sort);
            Term {
                ast,
                sort: TermSort::BitVec(width),
            }
        }
    }

    pub fn bool_literal(&self, value: bool) -> Term {
        unsafe {
            let ast = if value {
                (self.lib.mk_true)(self.ctx)
            } else {
                (self.lib.mk_false)(self.ctx)
            };
            Term {
                ast,
                sort: TermSort::Bool,
            }
        }
    }

    fn binary(&self, f: unsafe extern "C" fn(z3::Z3Context, Z3Ast, Z3Ast) -> Z3Ast, a: Term, b: Term, sort: TermSort) -> Term {
        unsafe {
            Term {
                ast: f(self.ctx, a.ast, b.ast),
                sort,
            }
        }
    }

    pub fn bv_add(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvadd, a, b, a.sort)
    }

    pub fn bv_sub(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvsub, a, b, a.sort)
    }

    pub fn bv_mul(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvmul, a, b, a.sort)
    }

    pub fn bv_sdiv(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvsdiv, a, b, a.sort)
    }

    pub fn bv_smod(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvsmod, a, b, a.sort)
    }

    pub fn bv_udiv(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvudiv, a, b, a.sort)
    }

    pub fn bv_urem(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvurem, a, b, a.sort)
    }

    pub fn bv_and(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvand, a, b, a.sort)
    }

    pub fn bv_or(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvor, a, b, a.sort)
    }

    pub fn bv_xor(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvxor, a, b, a.sort)
    }

    pub fn bv_shl(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvshl, a, b, a.sort)
    }

    pub fn bv_ashr(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvashr, a, b, a.sort)
    }

    pub fn bv_lshr(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvlshr, a, b, a.sort)
    }

    pub fn bv_neg(&self, a: Term) -> Term {
        unsafe {
            Term {
                ast: (self.lib.mk_bvneg)(self.ctx, a.ast),
                sort: a.sort,
            }
        }
    }

    pub fn bv_not(&self, a: Term) -> Term {
        unsafe {
            Term {
                ast: (self.lib.mk_bvnot)(self.ctx, a.ast),
                sort: a.sort,
            }
        }
    }

    pub fn bv_slt(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvslt, a, b, TermSort::Bool)
    }

    pub fn bv_sle(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvsle, a, b, TermSort::Bool)
    }

    pub fn bv_sgt(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvsgt, a, b, TermSort::Bool)
    }

    pub fn bv_sge(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvsge, a, b, TermSort::Bool)
    }

    pub fn bv_ult(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvult, a, b, TermSort::Bool)
    }

    pub fn bv_ule(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvule, a, b, TermSort::Bool)
    }

    pub fn bv_ugt(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvugt, a, b, TermSort::Bool)
    }

    pub fn bv_uge(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_bvuge, a, b, TermSort::Bool)
    }

    pub fn eq(&self, a: Term, b: Term) -> Term {
        self.binary(self.lib.mk_eq, a, b, TermSort::Bool)
    }

    pub fn ne(&self, a: Term, b: Term) -> Term {
        self.not(self.eq(a, b))
    }

    pub fn not(&self, a: Term) -> Term {
        unsafe {
            Term {
                ast: (self.lib.mk_not)(self.ctx, a.ast),
                sort: TermSort::Bool,
            }
        }
    }

    pub fn and(&self, terms: &[Term]) -> Term {
        unsafe {
            let asts: Vec<Z3Ast> = terms.iter().map(|t| t.ast).collect();
            Term {
                ast: (self.lib.mk_and)(self.ctx, asts.len() as c_uint, asts.as_ptr()),
                sort: TermSort::Bool,
            }
        }
    }

    pub fn or(&self, terms: &[Term]) -> Term {
        unsafe {
            let asts: Vec<Z3Ast> = terms.iter().map(|t| t.ast).collect();
            Term {
                ast: (self.lib.mk_or)(self.ctx, asts.len() as c_uint, asts.as_ptr()),
                sort: TermSort::Bool,
            }
        }
    }

    /// Implication encoded as `or(not(a), c)`
    pub fn implies(&self, antecedent: Term, consequent: Term) -> Term {
        self.or(&[self.not(antecedent), consequent])
    }

    pub fn ite(&self, cond: Term, then_t: Term, else_t: Term) -> Term {
        unsafe {
            Term {
                ast: (self.lib.mk_ite)(self.ctx, cond.ast, then_t.ast, else_t.ast),
                sort: then_t.sort,
            }
        }
    }

    /// Assert a boolean term
    pub fn assert_term(&mut self, term: Term) {
        unsafe {
            (self.lib.solver_assert)(self.ctx, self.solver, term.ast);
        }
    }

    /// Run the satisfiability check, blocking up to the configured timeout
    pub fn check(&mut self) -> CheckOutcome {
        let result: Z3Lbool = unsafe { (self.lib.solver_check)(self.ctx, self.solver) };
        let outcome = match result {
            Z3_L_FALSE => CheckOutcome::Unsat,
            Z3_L_TRUE => CheckOutcome::Sat,
            Z3_L_UNDEF => CheckOutcome::Unknown,
            _ => CheckOutcome::Unknown,
        };
        trace!(?outcome, "solver check finished");
        outcome
    }

    /// Format the model as `name=value, ...` over every declared variable
    ///
    /// Only meaningful right after `check()` returned `Sat`. Per-variable
    /// evaluation failures degrade to `<eval failed>`.
    pub fn counterexample(&self) -> String {
        unsafe {
            let model = (self.lib.solver_get_model)(self.ctx, self.solver);
            if model.is_null() {
                return String::from("<no model>");
            }
            (self.lib.model_inc_ref)(self.ctx, model);

            let mut parts = Vec::with_capacity(self.declarations.len());
            for (name, ast, sort) in &self.declarations {
                let mut out: Z3Ast = std::ptr::null_mut();
                let ok = (self.lib.model_eval)(self.ctx, model, *ast, true, &mut out);
                let rendered = if ok && !out.is_null() {
                    self.render_value(out, *sort)
                } else {
                    String::from("<eval failed>")
                };
                parts.push(format!("{}={}", name, rendered));
            }

            (self.lib.model_dec_ref)(self.ctx, model);
            parts.join(", ")
        }
    }

    unsafe fn render_value(&self, ast: Z3Ast, sort: TermSort) -> String {
        match sort {
            TermSort::Bool => {
                let ptr = (self.lib.ast_to_string)(self.ctx, ast);
                if ptr.is_null() {
                    String::from("<eval failed>")
                } else {
                    CStr::from_ptr(ptr).to_string_lossy().into_owned()
                }
            }
            TermSort::BitVec(width) => {
                let ptr = (self.lib.get_numeral_string)(self.ctx, ast);
                if ptr.is_null() {
                    return String::from("<eval failed>");
                }
                let text = CStr::from_ptr(ptr).to_string_lossy().into_owned();
                // Numerals come back unsigned; show the two's-complement
                // signed value, which is what contracts talk about.
                match text.parse::<u128>() {
                    Ok(unsigned) if width < 128 => {
                        let half = 1u128 << (width - 1);
                        if unsigned >= half {
                            let signed = unsigned as i128 - (1i128 << width);
                            signed.to_string()
                        } else {
                            text
                        }
                    }
                    _ => text,
                }
            }
        }
    }
}

impl Drop for SolverContext {
    fn drop(&mut self) {
        unsafe {
            (self.lib.solver_dec_ref)(self.ctx, self.solver);
            (self.lib.del_context)(self.ctx);
        }
    }
}
