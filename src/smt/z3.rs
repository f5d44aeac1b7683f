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

//! Runtime bindings to the native Z3 library
//!
//! Z3 is loaded at runtime, never linked: the probe tries a bundled copy
//! next to the executable, then the `runtimes/<os>-<arch>/native/` layout,
//! then the system loader path. Loading happens once per process under a
//! lock; failure latches as unavailable and verification degrades to
//! heuristics. The symbol table below is the full surface the encoder and
//! solver driver need, resolved eagerly so a half-usable library is
//! rejected up front.

use crate::error::ProbeError;
use libloading::Library;
use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_uint};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info};

pub type Z3Config = *mut c_void;
pub type Z3Context = *mut c_void;
pub type Z3Solver = *mut c_void;
pub type Z3Sort = *mut c_void;
pub type Z3Ast = *mut c_void;
pub type Z3Symbol = *mut c_void;
pub type Z3Model = *mut c_void;
pub type Z3Params = *mut c_void;

/// Z3_lbool: -1 unsat/false, 0 undef, 1 sat/true
pub type Z3Lbool = c_int;

pub const Z3_L_FALSE: Z3Lbool = -1;
pub const Z3_L_UNDEF: Z3Lbool = 0;
pub const Z3_L_TRUE: Z3Lbool = 1;

/// Error handler callback installed as `None` so native errors surface as
/// error codes instead of process aborts
pub type Z3ErrorHandler = Option<unsafe extern "C" fn(Z3Context, c_int)>;

macro_rules! z3_library {
    ($(fn $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*) => {
        /// Resolved symbol table over the loaded native library
        ///
        /// Field names mirror the C API without the `Z3_` prefix.
        pub struct Z3Library {
            _lib: Library,
            $(pub $name: unsafe extern "C" fn($($ty),*) -> $ret,)*
        }

        impl Z3Library {
            fn from_library(lib: Library) -> Result<Self, ProbeError> {
                unsafe {
                    $(
                        let $name = *lib
                            .get::<unsafe extern "C" fn($($ty),*) -> $ret>(
                                concat!("Z3_", stringify!($name), "\0").as_bytes(),
                            )
                            .map_err(|source| ProbeError::MissingSymbol {
                                symbol: concat!("Z3_", stringify!($name)).to_string(),
                                source,
                            })?;
                    )*
                    Ok(Self {
                        _lib: lib,
                        $($name,)*
                    })
                }
            }
        }
    };
}

z3_library! {
    fn mk_config() -> Z3Config;
    fn del_config(cfg: Z3Config) -> ();
    fn mk_context(cfg: Z3Config) -> Z3Context;
    fn del_context(ctx: Z3Context) -> ();
    fn set_error_handler(ctx: Z3Context, handler: Z3ErrorHandler) -> ();
    fn get_error_code(ctx: Z3Context) -> c_int;

    fn mk_string_symbol(ctx: Z3Context, name: *const c_char) -> Z3Symbol;
    fn mk_bool_sort(ctx: Z3Context) -> Z3Sort;
    fn mk_bv_sort(ctx: Z3Context, size: c_uint) -> Z3Sort;
    fn mk_const(ctx: Z3Context, name: Z3Symbol, sort: Z3Sort) -> Z3Ast;
    fn mk_numeral(ctx: Z3Context, text: *const c_char, sort: Z3Sort) -> Z3Ast;

    fn mk_true(ctx: Z3Context) -> Z3Ast;
    fn mk_false(ctx: Z3Context) -> Z3Ast;
    fn mk_eq(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_not(ctx: Z3Context, operand: Z3Ast) -> Z3Ast;
    fn mk_and(ctx: Z3Context, count: c_uint, args: *const Z3Ast) -> Z3Ast;
    fn mk_or(ctx: Z3Context, count: c_uint, args: *const Z3Ast) -> Z3Ast;
    fn mk_ite(ctx: Z3Context, cond: Z3Ast, then_t: Z3Ast, else_t: Z3Ast) -> Z3Ast;

    fn mk_bvadd(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvsub(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvmul(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvsdiv(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvsmod(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvudiv(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvurem(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvand(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvor(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvxor(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvnot(ctx: Z3Context, operand: Z3Ast) -> Z3Ast;
    fn mk_bvneg(ctx: Z3Context, operand: Z3Ast) -> Z3Ast;
    fn mk_bvshl(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvashr(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvlshr(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvslt(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvsle(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvsgt(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvsge(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvult(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvule(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvugt(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;
    fn mk_bvuge(ctx: Z3Context, left: Z3Ast, right: Z3Ast) -> Z3Ast;

    fn mk_solver(ctx: Z3Context) -> Z3Solver;
    fn solver_inc_ref(ctx: Z3Context, solver: Z3Solver) -> ();
    fn solver_dec_ref(ctx: Z3Context, solver: Z3Solver) -> ();
    fn mk_params(ctx: Z3Context) -> Z3Params;
    fn params_inc_ref(ctx: Z3Context, params: Z3Params) -> ();
    fn params_dec_ref(ctx: Z3Context, params: Z3Params) -> ();
    fn params_set_uint(ctx: Z3Context, params: Z3Params, name: Z3Symbol, value: c_uint) -> ();
    fn solver_set_params(ctx: Z3Context, solver: Z3Solver, params: Z3Params) -> ();
    fn solver_assert(ctx: Z3Context, solver: Z3Solver, assertion: Z3Ast) -> ();
    fn solver_check(ctx: Z3Context, solver: Z3Solver) -> Z3Lbool;
    fn solver_get_model(ctx: Z3Context, solver: Z3Solver) -> Z3Model;
    fn model_inc_ref(ctx: Z3Context, model: Z3Model) -> ();
    fn model_dec_ref(ctx: Z3Context, model: Z3Model) -> ();
    fn model_eval(
        ctx: Z3Context,
        model: Z3Model,
        term: Z3Ast,
        completion: bool,
        out: *mut Z3Ast
    ) -> bool;
    fn get_numeral_string(ctx: Z3Context, term: Z3Ast) -> *const c_char;
    fn ast_to_string(ctx: Z3Context, term: Z3Ast) -> *const c_char;
}

/// Platform library file name
fn library_names() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["libz3.dll", "z3.dll"]
    } else if cfg!(target_os = "macos") {
        &["libz3.dylib"]
    } else {
        &["libz3.so", "libz3.so.4"]
    }
}

/// Runtime identifier in the `<os>-<arch>` layout used for bundled solvers
fn runtime_identifier() -> String {
    let os = match std::env::consts::OS {
        "macos" => "osx",
        "windows" => "win",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{}-{}", os, arch)
}

/// Candidate paths in probe order: bundled beside the executable, the
/// runtimes layout, then the bare name for the system loader
fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()));

    for name in library_names() {
        if let Some(dir) = &exe_dir {
            candidates.push(dir.join(name));
            candidates.push(
                dir.join("runtimes")
                    .join(runtime_identifier())
                    .join("native")
                    .join(name),
            );
        }
        candidates.push(PathBuf::from(name));
    }
    candidates
}

fn try_load() -> Result<Z3Library, ProbeError> {
    let mut last_error = String::from("no candidates");
    for path in candidate_paths() {
        debug!(path = %path.display(), "probing for native solver");
        let lib = match unsafe { Library::new(&path) } {
            Ok(lib) => lib,
            Err(err) => {
                last_error = format!("{}: {}", path.display(), err);
                continue;
            }
        };
        let resolved = Z3Library::from_library(lib)?;
        resolved.smoke_test()?;
        info!(path = %path.display(), "native solver loaded");
        return Ok(resolved);
    }
    Err(ProbeError::NotFound { last_error })
}

impl Z3Library {
    /// Construct a throwaway context, build a trivial constant, dispose.
    /// A library that cannot survive this is treated as absent.
    fn smoke_test(&self) -> Result<(), ProbeError> {
        unsafe {
            let config = (self.mk_config)();
            let ctx = (self.mk_context)(config);
            (self.del_config)(config);
            if ctx.is_null() {
                return Err(ProbeError::SmokeTestFailed);
            }
            (self.set_error_handler)(ctx, None);
            let truth = (self.mk_true)(ctx);
            let ok = !truth.is_null() && (self.get_error_code)(ctx) == 0;
            (self.del_context)(ctx);
            if ok {
                Ok(())
            } else {
                Err(ProbeError::SmokeTestFailed)
            }
        }
    }
}

/// Process-wide availability of the native solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The probe has not run yet
    Unknown,
    Available,
    Unavailable,
}

static LIBRARY: OnceLock<Option<Z3Library>> = OnceLock::new();

/// The loaded library, probing on first use
pub fn global() -> Option<&'static Z3Library> {
    LIBRARY
        .get_or_init(|| match try_load() {
            Ok(lib) => Some(lib),
            Err(err) => {
                info!(error = %err, "native solver unavailable, falling back to heuristics");
                None
            }
        })
        .as_ref()
}

/// Availability without forcing the probe
pub fn availability() -> Availability {
    match LIBRARY.get() {
        None => Availability::Unknown,
        Some(Some(_)) => Availability::Available,
        Some(None) => Availability::Unavailable,
    }
}

/// Probe (once) and report whether the solver can be used
pub fn is_available() -> bool {
    global().is_some()
}
