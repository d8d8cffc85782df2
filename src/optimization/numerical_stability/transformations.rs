//! Numerical stability utilities.
//!
//! Provides safe implementations of common nonlinear transforms
//! that are prone to overflow/underflow in naïve form.
//! The functions here follow guarded strategies similar to those
//! in major ML libraries (e.g. PyTorch, TensorFlow), using explicit
//! cutoffs (`x > 20.0`) to keep `f64` arithmetic in a well-conditioned regime.
//!
//! # Provided items
//! - [`EXP_CLAMP`]: largest exponent handed to `f64::exp`.
//! - [`UTILITY_CAP`]: magnitude replacing infinite utilities.
//! - [`safe_softplus(x)`]: stable version of `ln(1 + exp(x))`,
//!   mapping ℝ → (0, ∞) without overflow.
//! - [`safe_softplus_inv(x)`]: inverse of softplus, mapping
//!   (0, ∞) → ℝ without catastrophic cancellation.
//! - [`safe_logistic(x)`] / [`safe_logit(p)`]: the logistic CDF and its
//!   clamped inverse.
//! - [`safe_exp(x)`]: exponential with a clamped argument.
//! - [`log_sum_exp`] / [`log_mean_exp`]: max-shifted reductions in log space.
//! - [`delta_method`]: covariance of a coordinate-wise reparameterization.
//!
//! # Rationale
//! These transforms are building blocks in optimization and
//! probabilistic modeling whenever parameters must be kept
//! strictly positive or constrained away from unstable boundaries.
use ndarray::{Array1, Array2};

/// Largest argument passed to `exp`; `exp(700) ≈ 1e304` stays finite.
pub const EXP_CLAMP: f64 = 700.0;

/// Utilities that evaluate to `±∞` are replaced by `±UTILITY_CAP`.
pub const UTILITY_CAP: f64 = 1e10;

/// Probabilities are kept inside `[LOGIT_EPS, 1 - LOGIT_EPS]` before a logit.
pub const LOGIT_EPS: f64 = 1e-12;

/// Eigenvalues at or below this value mark an information matrix as singular.
pub const EIGEN_EPS: f64 = 1e-10;

/// Minimum gap kept between a starting value and a finite bound when mapping
/// it into the unconstrained space.
pub const BOUND_EPS: f64 = 1e-8;

/// Numerically stable softplus: `softplus(x) = ln(1 + exp(x))`.
///
/// Computes softplus without overflow for large positive `x` and
/// with good precision for large negative `x`. This implementation
/// uses a simple piecewise guard:
///
/// - For sufficiently large `x`, `softplus(x) ≈ x + ln1p(exp(-x)) ≈ x`.
/// - Otherwise, it falls back to `ln1p(exp(x))`.
///
/// # Parameters
/// - `x`: real input
///
/// # Returns
/// - `softplus(x)` as `f64`.
pub fn safe_softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

/// Stable inverse of softplus on `(0, ∞)`: solves for `t` in
/// `softplus(t) = x`, returning `t = ln(exp(x) - 1)`.
///
/// - For sufficiently large `x`, `ln(exp(x) - 1) ≈ x`.
/// - Otherwise, it uses `ln(expm1(x))`.
///
/// # Parameters
/// - `x`: a positive real (the softplus output), must be finite and `> 0`.
///
/// # Returns
/// - `t` such that `softplus(t) = x`.
pub fn safe_softplus_inv(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp_m1().ln() }
}

/// Logistic CDF `σ(x) = 1 / (1 + exp(-x))` evaluated without overflow.
///
/// The branch on the sign of `x` keeps the exponent non-positive, so the
/// result is exact in both tails (`σ(-800) = 0`, `σ(800) = 1`).
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Inverse of [`safe_logistic`] with `p` clamped to `[LOGIT_EPS, 1 - LOGIT_EPS]`.
pub fn safe_logit(p: f64) -> f64 {
    let p = p.clamp(LOGIT_EPS, 1.0 - LOGIT_EPS);
    (p / (1.0 - p)).ln()
}

/// `exp(x)` with the argument clamped at [`EXP_CLAMP`].
pub fn safe_exp(x: f64) -> f64 {
    x.min(EXP_CLAMP).exp()
}

/// Max-shifted `ln Σ exp(x_i)`.
///
/// Returns `-∞` for an empty slice or when every entry is `-∞`; a `+∞`
/// entry propagates as `+∞`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Max-shifted `ln( (1/n) Σ exp(x_i) )`.
pub fn log_mean_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    log_sum_exp(values) - (values.len() as f64).ln()
}

/// delta_method — covariance of a coordinate-wise reparameterization.
///
/// Purpose
/// -------
/// Map a θ-space covariance `C` into model space for a transform
/// `β_i = g_i(θ_i)`, i.e. `Cov(β) = D C D` with `D = diag(g_i'(θ̂_i))`.
///
/// Parameters
/// ----------
/// - `cov_theta`: `&Array2<f64>`
///   `p × p` covariance in optimizer space.
/// - `jac_diag`: `&Array1<f64>`
///   Length-`p` diagonal of the Jacobian `∂β/∂θ` at `θ̂`.
///
/// Returns
/// -------
/// `Array2<f64>`
///   The `p × p` model-space covariance.
///
/// Panics
/// ------
/// - Panics if `jac_diag.len()` differs from the dimension of `cov_theta`.
pub fn delta_method(cov_theta: &Array2<f64>, jac_diag: &Array1<f64>) -> Array2<f64> {
    let mut out = cov_theta.clone();
    for ((i, j), v) in out.indexed_iter_mut() {
        *v *= jac_diag[i] * jac_diag[j];
    }
    out
}
