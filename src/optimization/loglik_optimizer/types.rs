//! loglik_optimizer::types — numeric aliases shared by the optimizer.
//!
//! `Theta` is the free, unconstrained coordinate vector the optimizer moves
//! in; its length is the number of non-fixed model parameters. `Grad` has
//! the same shape. `Hessian` is `dim × dim` and only appears in the
//! post-estimation covariance step. `Cost` is the negated simulated
//! log-likelihood that argmin minimises.
use argmin::solver::{
    linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
    quasinewton::LBFGS,
};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

pub type Theta = Array1<f64>;

pub type Grad = Array1<f64>;

pub type Hessian = Array2<f64>;

/// `c(θ) = -ℓ(θ)`.
pub type Cost = f64;

/// argmin's evaluation counters keyed by name (`"cost_count"`, ...).
pub type FnEvalMap = HashMap<String, u64>;

/// L-BFGS history length when `MLEOptions::lbfgs_mem` is unset.
pub const DEFAULT_LBFGS_MEM: usize = 7;

pub type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, Cost>;
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;

pub type LbfgsHagerZhang = LBFGS<HagerZhangLS, Theta, Grad, Cost>;
pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Theta, Grad, Cost>;
