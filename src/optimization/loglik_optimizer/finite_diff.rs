//! loglik_optimizer::finite_diff — numerical derivatives around `θ`.
//!
//! Three callers:
//! - the argmin adapter, for models without an analytic gradient
//!   ([`run_fd_diff`]);
//! - the inference layer, which differentiates the analytic gradient of the
//!   simulated log-likelihood to get the observed information
//!   ([`compute_hessian`]);
//! - the estimation driver's derivative check ([`gradient_discrepancy`]).
//!
//! Everything here works in the free, unconstrained coordinates. Results
//! pass [`validate_grad`] / [`validate_hessian`] before they are returned.
use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{
        Grad, Theta,
        types::Hessian,
        validation::{validate_grad, validate_hessian},
    },
};
use argmin::core::Error;
use finitediff::FiniteDiff;
use std::cell::RefCell;

/// Forward-difference gradient of `func` at `theta`.
///
/// `func` cannot return a `Result` through `finitediff`, so a failing
/// evaluation stores its error in `closure_err` and returns `NaN`. The cell
/// is cleared on entry and checked after differencing; a stored error wins
/// over the (meaningless) numerical result.
///
/// # Errors
/// - The error captured in `closure_err`, converted to [`OptError`].
/// - [`OptError::GradientDimMismatch`] / [`OptError::InvalidGradient`] from
///   [`validate_grad`].
pub fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> OptResult<Grad> {
    closure_err.replace(None);
    let grad = theta.forward_diff(func);
    if let Some(err) = closure_err.take() {
        return Err(err.into());
    }
    validate_grad(&grad, theta.len())?;
    Ok(grad)
}

/// Hessian of the scalar whose gradient is `f`, symmetrised.
///
/// Central differences first. If that matrix has the wrong shape or a
/// non-finite entry the forward scheme is tried, and only its validation
/// error is reported.
///
/// # Errors
/// [`OptError::HessianDimMismatch`] or [`OptError::InvalidHessian`] when the
/// forward fallback also fails.
///
/// # Example
/// ```
/// use ndarray::array;
/// use hybrid_choice::optimization::loglik_optimizer::{finite_diff::compute_hessian, Theta};
///
/// // ∇ of ½θ₀² + θ₀θ₁ + 2θ₁²
/// let grad = |t: &Theta| array![t[0] + t[1], t[0] + 4.0 * t[1]];
/// let h = compute_hessian(&grad, &array![0.3, -0.2]).expect("finite");
/// assert!((h[[0, 1]] - 1.0).abs() < 1e-6 && (h[[1, 1]] - 4.0).abs() < 1e-6);
/// ```
pub fn compute_hessian<F: Fn(&Theta) -> Grad>(f: &F, theta: &Theta) -> OptResult<Hessian> {
    let dim = theta.len();
    let mut hess = theta.central_hessian(f);
    if validate_hessian(&hess, dim).is_err() {
        hess = theta.forward_hessian(f);
        validate_hessian(&hess, dim)?;
    }
    symmetrize_hess(&mut hess);
    Ok(hess)
}

/// Worst coordinate-wise gap between `grad(θ)` and a central-difference
/// gradient of `value`, as `(index, |gap|)`.
///
/// A `NaN` gap always counts as the worst. An empty `theta` gives `(0, 0.0)`.
///
/// # Errors
/// [`OptError::GradientDimMismatch`] if `grad` returns the wrong length.
pub fn gradient_discrepancy<V, G>(value: &V, grad: &G, theta: &Theta) -> OptResult<(usize, f64)>
where
    V: Fn(&Theta) -> f64,
    G: Fn(&Theta) -> Grad,
{
    let analytic = grad(theta);
    if analytic.len() != theta.len() {
        return Err(OptError::GradientDimMismatch {
            expected: theta.len(),
            found: analytic.len(),
        });
    }
    let numeric = theta.central_diff(value);
    let mut worst = (0, 0.0_f64);
    for (i, (a, n)) in analytic.iter().zip(numeric.iter()).enumerate() {
        let gap = (a - n).abs();
        if gap.is_nan() || gap > worst.1 {
            worst = (i, gap);
        }
    }
    Ok(worst)
}

/// Replace `H` by `(H + Hᵀ) / 2`. `hess` must be square.
pub fn symmetrize_hess(hess: &mut Hessian) {
    let transposed = hess.t().to_owned();
    *hess += &transposed;
    hess.mapv_inplace(|v| 0.5 * v);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Forward-difference gradients of a binary logit log-likelihood, and
    //   the error side channel used by the adapter.
    // - Hessians from an analytic gradient, including the non-finite case.
    // - The derivative check used before estimation.
    //
    // Optimizer runs are covered in the adapter and integration tests.
    // -------------------------------------------------------------------------

    /// ℓ(a) for a binary logit with one constant and outcomes (1, 1, 0).
    fn constant_logit(theta: &Theta) -> f64 {
        let p = 1.0 / (1.0 + (-theta[0]).exp());
        2.0 * p.ln() + (1.0 - p).ln()
    }

    #[test]
    // Purpose
    // -------
    // The forward-difference gradient matches the closed form.
    //
    // Given
    // -----
    // - ℓ(a) = 2 ln p + ln(1 - p), p = σ(a), at a = 0.2.
    //
    // Expect
    // ------
    // - ∂ℓ/∂a ≈ 2 - 3p to forward-difference accuracy.
    fn forward_gradient_matches_logit_score() {
        // Arrange
        let theta = array![0.2];
        let closure_err = RefCell::new(None);
        let p = 1.0 / (1.0 + (-0.2_f64).exp());

        // Act
        let grad = run_fd_diff(&theta, &constant_logit, &closure_err).expect("finite gradient");

        // Assert
        assert_abs_diff_eq!(grad[0], 2.0 - 3.0 * p, epsilon = 1e-5);
    }

    #[test]
    // Purpose
    // -------
    // A model error stored by the objective is returned as that error.
    //
    // Given
    // -----
    // - An objective that records `OptError::DegenerateLikelihood` for
    //   individual 12 and returns NaN.
    //
    // Expect
    // ------
    // - `Err(OptError::DegenerateLikelihood { individual: 12 })`.
    fn stored_model_error_is_returned() {
        // Arrange
        let theta = array![0.0, 1.0];
        let closure_err: RefCell<Option<Error>> = RefCell::new(None);
        let f = |_: &Theta| {
            closure_err.replace(Some(OptError::DegenerateLikelihood { individual: 12 }.into()));
            f64::NAN
        };

        // Act
        let err = run_fd_diff(&theta, &f, &closure_err).expect_err("stored error wins");

        // Assert
        assert!(matches!(err, OptError::DegenerateLikelihood { individual: 12 }), "{err:?}");
    }

    #[test]
    // Purpose
    // -------
    // NaN values without a stored error are caught by validation.
    //
    // Given
    // -----
    // - An objective that always returns NaN.
    //
    // Expect
    // ------
    // - `Err(OptError::InvalidGradient { .. })`.
    fn nan_objective_is_invalid_gradient() {
        // Arrange
        let theta = array![0.0, 1.0];
        let closure_err = RefCell::new(None);

        // Act
        let err = run_fd_diff(&theta, &|_: &Theta| f64::NAN, &closure_err).expect_err("NaN");

        // Assert
        assert!(matches!(err, OptError::InvalidGradient { .. }), "{err:?}");
    }

    #[test]
    // Purpose
    // -------
    // The Hessian of the logit constant equals -n p (1 - p).
    //
    // Given
    // -----
    // - Analytic score 2 - 3σ(a) at a = -0.4.
    //
    // Expect
    // ------
    // - A 1×1 matrix close to -3 p (1 - p).
    fn hessian_of_logit_score_is_negative_information() {
        // Arrange
        let theta = array![-0.4];
        let score = |t: &Theta| array![2.0 - 3.0 / (1.0 + (-t[0]).exp())];
        let p = 1.0 / (1.0 + 0.4_f64.exp());

        // Act
        let h = compute_hessian(&score, &theta).expect("finite hessian");

        // Assert
        assert_eq!(h.shape(), &[1, 1]);
        assert_abs_diff_eq!(h[[0, 0]], -3.0 * p * (1.0 - p), epsilon = 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // A gradient that is NaN everywhere fails both difference schemes.
    //
    // Given
    // -----
    // - g(θ) = [NaN].
    //
    // Expect
    // ------
    // - `Err(OptError::InvalidHessian { .. })`.
    fn nan_gradient_is_invalid_hessian() {
        // Arrange
        let grad = |_: &Theta| array![f64::NAN];

        // Act
        let err = compute_hessian(&grad, &array![0.0]).expect_err("NaN hessian");

        // Assert
        assert!(matches!(err, OptError::InvalidHessian { .. }), "{err:?}");
    }

    #[test]
    // Purpose
    // -------
    // Symmetrisation averages off-diagonal pairs and keeps the diagonal.
    //
    // Given
    // -----
    // - [[1, 2], [0, 3]].
    //
    // Expect
    // ------
    // - [[1, 1], [1, 3]].
    fn symmetrize_averages_off_diagonal() {
        // Arrange
        let mut h: Hessian = array![[1.0, 2.0], [0.0, 3.0]];

        // Act
        symmetrize_hess(&mut h);

        // Assert
        assert_eq!(h, Array2::from_shape_vec((2, 2), vec![1.0, 1.0, 1.0, 3.0]).expect("2x2"));
    }

    #[test]
    // Purpose
    // -------
    // The derivative check is tiny for a correct gradient and names the
    // broken coordinate otherwise.
    //
    // Given
    // -----
    // - f(θ) = θ₀² + 3θ₁ with the correct gradient, and one whose second
    //   entry is off by one.
    //
    // Expect
    // ------
    // - Gap below 1e-6 for the correct gradient; index 1 and a gap near 1
    //   for the broken one.
    fn gradient_discrepancy_flags_wrong_coordinate() {
        // Arrange
        let theta = array![0.5, -1.0];
        let f = |x: &Theta| x[0] * x[0] + 3.0 * x[1];
        let good = |x: &Theta| array![2.0 * x[0], 3.0];
        let bad = |x: &Theta| array![2.0 * x[0], 4.0];

        // Act
        let (_, ok_gap) = gradient_discrepancy(&f, &good, &theta).expect("same dimension");
        let (idx, bad_gap) = gradient_discrepancy(&f, &bad, &theta).expect("same dimension");

        // Assert
        assert!(ok_gap < 1e-6);
        assert_eq!(idx, 1);
        assert_abs_diff_eq!(bad_gap, 1.0, epsilon = 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // A gradient of the wrong length is rejected before comparison.
    //
    // Given
    // -----
    // - θ ∈ ℝ² and a gradient closure returning one entry.
    //
    // Expect
    // ------
    // - `Err(OptError::GradientDimMismatch { expected: 2, found: 1 })`.
    fn gradient_discrepancy_rejects_wrong_length() {
        // Arrange
        let theta = array![0.0, 0.0];

        // Act
        let err = gradient_discrepancy(&|_: &Theta| 0.0, &|_: &Theta| array![0.0], &theta)
            .expect_err("length mismatch");

        // Assert
        assert!(matches!(err, OptError::GradientDimMismatch { expected: 2, found: 1 }));
    }
}
