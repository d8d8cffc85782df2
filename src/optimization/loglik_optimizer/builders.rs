//! loglik_optimizer::builders — L-BFGS construction from [`MLEOptions`].
//!
//! Purpose
//! -------
//! Turn the line-search choice, history length and stopping tolerances of
//! an estimation run into a ready argmin solver. Iteration and time
//! budgets are not set here; [`run_lbfgs`](super::run::run_lbfgs) applies
//! them to the executor.
//!
//! Conventions
//! -----------
//! - A `None` tolerance leaves argmin's default in place.
//! - Tolerance errors from argmin surface as [`OptError`](crate::optimization::errors::OptError)
//!   through `From<argmin::core::Error>`.
use argmin::solver::quasinewton::LBFGS;

use crate::optimization::{
    errors::OptResult,
    loglik_optimizer::{
        traits::MLEOptions,
        types::{
            Cost, DEFAULT_LBFGS_MEM, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente,
            MoreThuenteLS, Theta,
        },
    },
};

/// L-BFGS with the Hager–Zhang line search.
pub fn build_optimizer_hager_zhang(opts: &MLEOptions) -> OptResult<LbfgsHagerZhang> {
    configure_lbfgs(LBFGS::new(HagerZhangLS::new(), history(opts)), opts)
}

/// L-BFGS with the More–Thuente line search (the default for estimation).
pub fn build_optimizer_more_thuente(opts: &MLEOptions) -> OptResult<LbfgsMoreThuente> {
    configure_lbfgs(LBFGS::new(MoreThuenteLS::new(), history(opts)), opts)
}

/// Apply `tol_grad` / `tol_cost` to a solver with any line search `L`.
///
/// # Errors
/// Whatever argmin reports for a rejected tolerance.
pub fn configure_lbfgs<L>(
    solver: LBFGS<L, Theta, Grad, Cost>, opts: &MLEOptions,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    let solver = match opts.tols.tol_grad {
        Some(g) => solver.with_tolerance_grad(g)?,
        None => solver,
    };
    let solver = match opts.tols.tol_cost {
        Some(c) => solver.with_tolerance_cost(c)?,
        None => solver,
    };
    Ok(solver)
}

fn history(opts: &MLEOptions) -> usize {
    opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM)
}
