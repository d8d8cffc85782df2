//! Input and state checks shared by the optimizer layer.
//!
//! Configuration values (tolerances, timeout) are checked once when
//! [`Tolerances`](super::Tolerances) / [`MLEOptions`](super::MLEOptions) are
//! built; gradients, Hessians and final estimates are checked every time
//! they cross from a model or from argmin into our code.
use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{Grad, Theta, types::Hessian},
};

/// Why a configured positive quantity is rejected, if it is.
fn positivity_problem(x: f64) -> Option<&'static str> {
    if !x.is_finite() {
        Some("must be finite")
    } else if x <= 0.0 {
        Some("must be positive")
    } else {
        None
    }
}

/// Index and value of the first `NaN`/`±∞` entry.
fn first_non_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(usize, f64)> {
    values.into_iter().copied().enumerate().find(|(_, v)| !v.is_finite())
}

/// `None` or a finite, strictly positive gradient tolerance.
///
/// # Errors
/// [`OptError::InvalidTolGrad`].
pub fn verify_tol_grad(tol: Option<f64>) -> OptResult<()> {
    match tol.and_then(|t| positivity_problem(t).map(|reason| (t, reason))) {
        Some((tol, reason)) => Err(OptError::InvalidTolGrad { tol, reason }),
        None => Ok(()),
    }
}

/// `None` or a finite, strictly positive cost-change tolerance.
///
/// # Errors
/// [`OptError::InvalidTolCost`].
pub fn verify_tol_cost(tol: Option<f64>) -> OptResult<()> {
    match tol.and_then(|t| positivity_problem(t).map(|reason| (t, reason))) {
        Some((tol, reason)) => Err(OptError::InvalidTolCost { tol, reason }),
        None => Ok(()),
    }
}

/// Wall-clock budget in seconds: finite and strictly positive.
///
/// # Errors
/// [`OptError::InvalidTimeout`].
pub fn verify_timeout(seconds: f64) -> OptResult<()> {
    match positivity_problem(seconds) {
        Some(reason) => Err(OptError::InvalidTimeout { seconds, reason }),
        None => Ok(()),
    }
}

/// Gradient of length `dim` with finite entries.
///
/// # Errors
/// [`OptError::GradientDimMismatch`], or [`OptError::InvalidGradient`] for the
/// first bad entry.
pub fn validate_grad(grad: &Grad, dim: usize) -> OptResult<()> {
    if grad.len() != dim {
        return Err(OptError::GradientDimMismatch { expected: dim, found: grad.len() });
    }
    match first_non_finite(grad) {
        Some((index, value)) => {
            Err(OptError::InvalidGradient { index, value, reason: "entries must be finite" })
        }
        None => Ok(()),
    }
}

/// Unwrap the best parameter vector argmin kept; it must exist and be finite.
///
/// # Errors
/// [`OptError::MissingThetaHat`] or [`OptError::InvalidThetaHat`].
pub fn validate_theta_hat(theta_hat: Option<Theta>) -> OptResult<Theta> {
    let theta = theta_hat.ok_or(OptError::MissingThetaHat)?;
    match first_non_finite(&theta) {
        Some((index, value)) => Err(OptError::InvalidThetaHat {
            index,
            value,
            reason: "estimates must be finite",
        }),
        None => Ok(theta),
    }
}

/// A log-likelihood (or cost) value must be finite.
///
/// # Errors
/// [`OptError::NonFiniteCost`].
pub fn validate_value(value: f64) -> OptResult<()> {
    if value.is_finite() { Ok(()) } else { Err(OptError::NonFiniteCost { value }) }
}

/// `dim × dim` matrix with finite entries.
///
/// # Errors
/// [`OptError::HessianDimMismatch`], or [`OptError::InvalidHessian`] with the
/// position of the first bad entry in row-major order.
pub fn validate_hessian(hessian: &Hessian, dim: usize) -> OptResult<()> {
    if hessian.dim() != (dim, dim) {
        return Err(OptError::HessianDimMismatch { expected: dim, found: hessian.dim() });
    }
    match hessian.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, col), &value)) => Err(OptError::InvalidHessian { row, col, value }),
        None => Ok(()),
    }
}
