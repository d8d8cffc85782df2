//! What a model implements ([`LogLikelihood`]) and what it passes to
//! [`maximize`](super::maximize) ([`MLEOptions`]), plus the result type
//! ([`OptimOutcome`]).
use crate::optimization::{
    errors::{OptError, OptResult},
    loglik_optimizer::{
        Cost, FnEvalMap, Grad, Theta,
        validation::{
            validate_theta_hat, validate_value, verify_timeout, verify_tol_cost, verify_tol_grad,
        },
    },
};
use argmin::core::{TerminationReason, TerminationStatus};
use argmin_math::ArgminL2Norm;
use std::{str::FromStr, time::Duration};

pub const DEFAULT_MAX_ITER: usize = 1000;

pub const DEFAULT_TOL_GRAD: f64 = 1e-6;

/// A log-likelihood `ℓ(θ)` over free parameters `θ` and fixed `Data`.
///
/// `value` and `grad` are in terms of `ℓ`, not the cost. Failures are
/// returned as [`OptError`] and abort the run. `check` is called once on
/// the start point. Without a `grad` override the adapter differentiates
/// `value` numerically.
pub trait LogLikelihood {
    type Data: 'static;

    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost>;

    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()>;

    /// `∇ℓ(θ)`.
    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> OptResult<Grad> {
        Err(OptError::GradientNotImplemented)
    }
}

/// Line search inside L-BFGS. Parses case-insensitively from
/// `"MoreThuente"` / `"HagerZhang"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("morethuente") {
            Ok(LineSearcher::MoreThuente)
        } else if s.eq_ignore_ascii_case("hagerzhang") {
            Ok(LineSearcher::HagerZhang)
        } else {
            Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "expected 'MoreThuente' or 'HagerZhang'",
            })
        }
    }
}

/// Settings for one call to [`maximize`](super::maximize).
///
/// `verbose` logs the start point and, with the `obs_slog` feature, every
/// iteration. `lbfgs_mem = None` means [`DEFAULT_LBFGS_MEM`](super::DEFAULT_LBFGS_MEM).
/// The default is `tol_grad = 1e-6`, 1000 iterations, More–Thuente, no
/// timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct MLEOptions {
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
    pub timeout: Option<Duration>,
}

impl MLEOptions {
    /// # Errors
    /// [`OptError::InvalidLBFGSMem`] for `Some(0)`.
    pub fn new(
        tols: Tolerances, line_searcher: LineSearcher, verbose: bool, lbfgs_mem: Option<usize>,
    ) -> OptResult<Self> {
        if lbfgs_mem == Some(0) {
            return Err(OptError::InvalidLBFGSMem { mem: 0, reason: "must be at least 1" });
        }
        Ok(Self { tols, line_searcher, verbose, lbfgs_mem, timeout: None })
    }

    /// Stop the run after `seconds` of wall-clock time.
    ///
    /// # Errors
    /// [`OptError::InvalidTimeout`] unless `seconds` is finite and positive.
    pub fn with_timeout(mut self, seconds: f64) -> OptResult<Self> {
        verify_timeout(seconds)?;
        self.timeout = Some(Duration::from_secs_f64(seconds));
        Ok(self)
    }
}

impl Default for MLEOptions {
    fn default() -> Self {
        Self {
            tols: Tolerances {
                tol_grad: Some(DEFAULT_TOL_GRAD),
                tol_cost: None,
                max_iter: Some(DEFAULT_MAX_ITER),
            },
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
            timeout: None,
        }
    }
}

/// Stopping rules. At least one must be set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Stop when `‖∇c‖` drops below this.
    pub tol_grad: Option<f64>,
    /// Stop when the change in cost drops below this.
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// # Errors
    /// - [`OptError::NoTolerancesProvided`] if all three are `None`.
    /// - [`OptError::InvalidTolGrad`] / [`OptError::InvalidTolCost`] for a
    ///   non-finite or non-positive tolerance.
    /// - [`OptError::InvalidMaxIter`] for `Some(0)`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(OptError::NoTolerancesProvided);
        }
        verify_tol_grad(tol_grad)?;
        verify_tol_cost(tol_cost)?;
        if max_iter == Some(0) {
            return Err(OptError::InvalidMaxIter { max_iter: 0, reason: "must be at least 1" });
        }
        Ok(Self { tol_grad, tol_cost, max_iter })
    }
}

/// Result of [`maximize`](super::maximize).
///
/// `value` is `ℓ(θ̂)`. `converged` is set only when a tolerance fired;
/// running out of iterations or time leaves it `false` and `status`
/// names the reason. `fn_evals` uses argmin's counter names
/// (`cost_count`, `gradient_count`).
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    /// `‖∇c‖` at the last iterate, when argmin kept a gradient.
    pub grad_norm: Option<f64>,
}

impl OptimOutcome {
    /// Validate and classify the final solver state.
    ///
    /// # Errors
    /// [`OptError::MissingThetaHat`], [`OptError::InvalidThetaHat`] or
    /// [`OptError::NonFiniteCost`].
    pub fn new(
        theta_hat: Option<Theta>, value: f64, termination: TerminationStatus, iterations: u64,
        fn_evals: FnEvalMap, grad: Option<Grad>,
    ) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(theta_hat)?;
        validate_value(value)?;
        let (converged, status) = classify_termination(&termination);
        Ok(Self {
            theta_hat,
            value,
            converged,
            status,
            iterations: iterations as usize,
            fn_evals,
            grad_norm: grad.map(|g| g.l2_norm()),
        })
    }
}

// ---- Helper Methods ----

/// Split an argmin termination status into a convergence flag and a label.
///
/// Only `SolverConverged` and `TargetCostReached` count as converged. Budget
/// exhaustion (`MaxItersReached`, `Timeout`), interrupts and solver exits are
/// reported as non-converged with argmin's own wording in the label.
fn classify_termination(termination: &TerminationStatus) -> (bool, String) {
    match termination {
        TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
        TerminationStatus::Terminated(reason) => {
            let converged = matches!(
                reason,
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            );
            (converged, format!("{reason:?}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::collections::HashMap;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Validation rules of `Tolerances::new` and `MLEOptions::new`.
    // - Case-insensitive parsing of `LineSearcher`.
    // - The wall-clock budget setter.
    // - Convergence classification inside `OptimOutcome::new`.
    //
    // They intentionally DO NOT cover:
    // - Running a solver; see the builder and integration tests.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Reject a tolerance set where nothing can stop the optimizer.
    //
    // Given
    // -----
    // - All three tolerance fields `None`.
    //
    // Expect
    // ------
    // - `OptError::NoTolerancesProvided`.
    fn tolerances_require_at_least_one_rule() {
        // Arrange / Act
        let result = Tolerances::new(None, None, None);

        // Assert
        assert_eq!(result, Err(OptError::NoTolerancesProvided));
    }

    #[test]
    // Purpose
    // -------
    // Reject non-positive numeric settings.
    //
    // Given
    // -----
    // - A negative gradient tolerance, a zero iteration cap, zero L-BFGS
    //   memory and a negative timeout.
    //
    // Expect
    // ------
    // - The matching `OptError` variant for each.
    fn invalid_numeric_settings_are_rejected() {
        // Arrange / Act / Assert
        assert!(matches!(
            Tolerances::new(Some(-1.0), None, None),
            Err(OptError::InvalidTolGrad { .. })
        ));
        assert!(matches!(
            Tolerances::new(Some(1e-6), None, Some(0)),
            Err(OptError::InvalidMaxIter { .. })
        ));
        let tols = Tolerances::new(Some(1e-6), None, Some(10)).expect("valid tolerances");
        assert!(matches!(
            MLEOptions::new(tols, LineSearcher::MoreThuente, false, Some(0)),
            Err(OptError::InvalidLBFGSMem { .. })
        ));
        assert!(matches!(
            MLEOptions::default().with_timeout(-5.0),
            Err(OptError::InvalidTimeout { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Confirm case-insensitive line-search parsing.
    //
    // Given
    // -----
    // - `"morethuente"`, `"HAGERZHANG"` and `"bfgs"`.
    //
    // Expect
    // ------
    // - The two known names parse; the unknown one fails.
    fn line_searcher_parses_case_insensitively() {
        // Arrange / Act / Assert
        assert_eq!("morethuente".parse::<LineSearcher>(), Ok(LineSearcher::MoreThuente));
        assert_eq!("HAGERZHANG".parse::<LineSearcher>(), Ok(LineSearcher::HagerZhang));
        assert!(matches!(
            "bfgs".parse::<LineSearcher>(),
            Err(OptError::InvalidLineSearch { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Check that exhausting the iteration budget is not reported as
    // convergence while a tolerance-based stop is.
    //
    // Given
    // -----
    // - Outcomes built with `MaxItersReached`, `Timeout` and `SolverConverged`.
    //
    // Expect
    // ------
    // - Only the `SolverConverged` outcome has `converged == true`.
    fn outcome_distinguishes_budget_exhaustion_from_convergence() {
        // Arrange
        let build = |reason: TerminationReason| {
            OptimOutcome::new(
                Some(array![0.5, -0.5]),
                -10.0,
                TerminationStatus::Terminated(reason),
                12,
                HashMap::new(),
                Some(array![3.0, 4.0]),
            )
            .expect("outcome should validate")
        };

        // Act
        let max_iters = build(TerminationReason::MaxItersReached);
        let timeout = build(TerminationReason::Timeout);
        let converged = build(TerminationReason::SolverConverged);

        // Assert
        assert!(!max_iters.converged);
        assert!(!timeout.converged);
        assert!(converged.converged);
        assert_eq!(converged.grad_norm, Some(5.0));
        assert_eq!(converged.iterations, 12);
    }

    #[test]
    // Purpose
    // -------
    // Ensure non-finite optimizer output is rejected.
    //
    // Given
    // -----
    // - A `theta_hat` containing NaN.
    //
    // Expect
    // ------
    // - `OptError::InvalidThetaHat`.
    fn outcome_rejects_non_finite_theta_hat() {
        // Arrange / Act
        let result = OptimOutcome::new(
            Some(array![f64::NAN]),
            -1.0,
            TerminationStatus::NotTerminated,
            0,
            HashMap::new(),
            None,
        );

        // Assert
        assert!(matches!(result, Err(OptError::InvalidThetaHat { .. })));
    }
}
