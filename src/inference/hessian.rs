//! inference::hessian — Hessian-based covariance and standard errors.
//!
//! Purpose
//! -------
//! Turn the analytic gradient of a summed log-likelihood into covariance
//! estimates for the free parameters at the optimum `θ̂`: classical
//! (inverse observed information), BHHH / OPG (inverse outer product of
//! individual scores), and the robust sandwich that combines the two.
//!
//! Key behaviors
//! -------------
//! - Call [`compute_hessian`] on the gradient of the *negative*
//!   log-likelihood to obtain the observed information `J(θ̂)`.
//! - Copy `ndarray` matrices into `nalgebra::DMatrix` for the symmetric
//!   eigendecomposition.
//! - Invert only matrices that are numerically positive definite: if any
//!   eigenvalue is at most [`EIGEN_EPS`] the inverse is reported as `None`
//!   instead of fabricating variances from a pseudoinverse.
//! - `B = Σ_n s_n s_nᵀ` from the per-individual score rows; the sandwich is
//!   `J⁻¹ B J⁻¹`.
//!
//! Conventions
//! -----------
//! - Everything here lives in the unconstrained optimizer space `θ`; the
//!   caller maps covariances to model space with the delta method.
//! - Hessians are on the summed log-likelihood scale, so the returned
//!   covariances need no further `1/n` scaling.
use crate::{
    inference::errors::{InferenceError, InferenceResult},
    optimization::{
        loglik_optimizer::finite_diff::compute_hessian,
        numerical_stability::transformations::EIGEN_EPS,
    },
};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

/// Covariance estimates of the free parameters in `θ`-space.
///
/// Each entry is `None` when the matrix it depends on is singular or not
/// positive definite at `θ̂`.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceSet {
    /// `J⁻¹` (observed information).
    pub classical: Option<Array2<f64>>,
    /// `B⁻¹` (outer product of scores).
    pub opg: Option<Array2<f64>>,
    /// `J⁻¹ B J⁻¹`.
    pub robust: Option<Array2<f64>>,
}

/// Build the covariance estimates at `theta_hat`.
///
/// - `neg_grad`: gradient of `−ℓ(θ)`.
/// - `scores`: `n × p` matrix of per-individual score rows `∂ℓ_n/∂θ`.
///
/// # Errors
/// - [`InferenceError::HessianFailed`] if the finite-difference Hessian is
///   not finite.
/// - [`InferenceError::DimensionMismatch`] if `scores` has the wrong width.
pub fn calc_covariance<F: Fn(&Array1<f64>) -> Array1<f64>>(
    neg_grad: &F, theta_hat: &Array1<f64>, scores: &Array2<f64>,
) -> InferenceResult<CovarianceSet> {
    let p = theta_hat.len();
    if scores.ncols() != p {
        return Err(InferenceError::DimensionMismatch { expected: p, found: scores.ncols() });
    }
    let obs_info = compute_hessian(neg_grad, theta_hat)?;
    let classical = invert_spd(&obs_info);
    let meat = outer_product_of_scores(scores);
    let opg = invert_spd(&meat);
    let robust = classical.as_ref().map(|j_inv| j_inv.dot(&meat).dot(j_inv));
    Ok(CovarianceSet { classical, opg, robust })
}

/// `Σ_n s_n s_nᵀ` for score rows `s_n`.
pub fn outer_product_of_scores(scores: &Array2<f64>) -> Array2<f64> {
    scores.t().dot(scores)
}

/// Inverse of a symmetric matrix through its eigendecomposition, or `None`
/// if any eigenvalue is at most [`EIGEN_EPS`] (or not finite).
pub fn invert_spd(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    let eigen = to_dmatrix(matrix).symmetric_eigen();
    if eigen.eigenvalues.iter().any(|&lambda| !lambda.is_finite() || lambda <= EIGEN_EPS) {
        return None;
    }
    let q = eigen.eigenvectors;
    let lambdas = eigen.eigenvalues;
    Some(Array2::from_shape_fn((n, n), |(i, j)| {
        (0..n).map(|k| q[(i, k)] * q[(j, k)] / lambdas[k]).sum()
    }))
}

/// Square roots of the diagonal of a covariance matrix.
pub fn standard_errors(cov: &Array2<f64>) -> Array1<f64> {
    cov.diag().mapv(|v| v.max(0.0).sqrt())
}

fn to_dmatrix(source: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(source.nrows(), source.ncols(), |i, j| source[[i, j]])
}
