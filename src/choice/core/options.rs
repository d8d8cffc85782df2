//! Estimation options — configuration for one estimation run.
//!
//! Purpose
//! -------
//! Collect every knob of an estimation run in one immutable value that is
//! passed explicitly to the model: simulation settings (draw count, seed,
//! scheme), optimizer settings ([`MLEOptions`]), the worker-thread count,
//! and the policies for derivative checks, degenerate individuals,
//! non-convergence and covariance computation.
//!
//! Invariants & assumptions
//! ------------------------
//! - `likelihood_floor`, when set, lies strictly inside `(0, 1)`.
//! - `threads`, when set, is at least one; `None` uses the available
//!   parallelism.
//! - Components ([`SimulationOptions`], [`MLEOptions`]) are validated by
//!   their own builders.
use crate::{
    choice::{
        core::draws::SimulationOptions,
        errors::{ChoiceError, ChoiceResult},
    },
    optimization::loglik_optimizer::MLEOptions,
};

/// `EstimationOptions` — everything the estimation driver needs besides the
/// model and the data.
///
/// Fields
/// ------
/// - `simulation`: draws per individual, seed and scheme.
/// - `mle_opts`: tolerances, iteration / time budget and line search.
/// - `threads`: size of the dedicated worker pool (`None` = all cores).
/// - `check_derivatives`: compare the analytic gradient with finite
///   differences at the start values and log the worst coordinate.
/// - `likelihood_floor`: replace a zero simulated likelihood by this value
///   instead of failing.
/// - `require_convergence`: treat an exhausted budget as an error.
/// - `compute_covariance`: build classical / robust covariances after the
///   optimum is found.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationOptions {
    pub simulation: SimulationOptions,
    pub mle_opts: MLEOptions,
    pub threads: Option<usize>,
    pub check_derivatives: bool,
    pub likelihood_floor: Option<f64>,
    pub require_convergence: bool,
    pub compute_covariance: bool,
}

impl EstimationOptions {
    /// Options with the given simulation and optimizer settings and default
    /// policies.
    pub fn new(simulation: SimulationOptions, mle_opts: MLEOptions) -> Self {
        EstimationOptions { simulation, mle_opts, ..EstimationOptions::default() }
    }

    /// # Errors
    /// - [`ChoiceError::InvalidOption`] for `Some(0)`.
    pub fn with_threads(mut self, threads: Option<usize>) -> ChoiceResult<Self> {
        if threads == Some(0) {
            return Err(ChoiceError::InvalidOption {
                name: "threads",
                reason: "the thread count must be at least 1".to_string(),
            });
        }
        self.threads = threads;
        Ok(self)
    }

    /// # Errors
    /// - [`ChoiceError::InvalidOption`] unless `floor` lies in `(0, 1)`.
    pub fn with_likelihood_floor(mut self, floor: Option<f64>) -> ChoiceResult<Self> {
        if let Some(f) = floor {
            if !(f > 0.0 && f < 1.0) {
                return Err(ChoiceError::InvalidOption {
                    name: "likelihood_floor",
                    reason: format!("must lie in (0, 1), got {f}"),
                });
            }
        }
        self.likelihood_floor = floor;
        Ok(self)
    }
}

impl Default for EstimationOptions {
    fn default() -> Self {
        EstimationOptions {
            simulation: SimulationOptions::default(),
            mle_opts: MLEOptions::default(),
            threads: None,
            check_derivatives: false,
            likelihood_floor: None,
            require_convergence: true,
            compute_covariance: true,
        }
    }
}
