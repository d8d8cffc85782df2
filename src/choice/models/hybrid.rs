//! Hybrid choice model: simulated maximum likelihood estimation driver.
//!
//! This module wires a validated [`ModelSpec`] to the `LogLikelihood` trait
//! and runs the full estimation: draw generation, derivative check,
//! L-BFGS maximization, and covariance computation.
//!
//! Key ideas:
//! - The optimizer works on the free, unconstrained vector `θ`. Each
//!   evaluation maps `θ → β` with the bound transforms (fixed parameters
//!   stay at their declared values), evaluates the simulated log-likelihood
//!   with its sparse forward-mode gradient, and pulls the gradient back to
//!   `θ` with the chain rule.
//! - All parallel work runs inside a dedicated `rayon` pool sized by
//!   [`EstimationOptions::threads`]; results do not depend on its size.
//! - Standard errors are computed in `θ`-space from the observed
//!   information and individual scores, then mapped to model space with the
//!   delta method.
use crate::{
    choice::{
        core::{
            data::ChoiceData,
            draws::{DrawScheme, DrawTable},
            options::EstimationOptions,
            simulation::SimulatedLikelihood,
            spec::ModelSpec,
        },
        errors::{ChoiceError, ChoiceResult},
    },
    inference::{CovarianceSet, calc_covariance, standard_errors},
    optimization::{
        errors::{OptError, OptResult},
        loglik_optimizer::{
            Cost, Grad, LogLikelihood, Theta, finite_diff::gradient_discrepancy, maximize,
        },
        numerical_stability::transformations::delta_method,
    },
};
use ndarray::{Array1, Array2};

/// Gradient check tolerance on `max |analytic − numeric| / max(1, |analytic|)`.
pub const DERIVATIVE_CHECK_TOL: f64 = 1e-4;

/// Worst coordinate of an analytic vs central-difference gradient comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeCheck {
    pub parameter: String,
    pub gap: f64,
    /// `gap / max(1, |analytic|)` at that coordinate.
    pub relative_gap: f64,
}

impl DerivativeCheck {
    /// `false` for a NaN gap.
    pub fn passed(&self) -> bool {
        self.relative_gap <= DERIVATIVE_CHECK_TOL
    }
}

/// Sample prepared for estimation: validated data plus its fixed draw table.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationSample {
    pub data: ChoiceData,
    pub draws: DrawTable,
}

/// One row of the estimation table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    pub fixed: bool,
    pub std_err: Option<f64>,
    pub robust_std_err: Option<f64>,
}

impl ParameterEstimate {
    pub fn t_stat(&self) -> Option<f64> {
        self.std_err.filter(|&s| s > 0.0).map(|s| self.value / s)
    }

    pub fn robust_t_stat(&self) -> Option<f64> {
        self.robust_std_err.filter(|&s| s > 0.0).map(|s| self.value / s)
    }
}

/// Outcome of [`HybridChoiceModel::fit`].
///
/// Covariance matrices are in model space over the free parameters (in
/// declaration order) and are `None` when the matrix they come from is
/// singular or when covariance computation was disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResults {
    pub estimates: Vec<ParameterEstimate>,
    pub theta_hat: Theta,
    pub init_loglik: f64,
    pub final_loglik: f64,
    pub n_obs: usize,
    pub n_individuals: usize,
    pub n_draws: usize,
    pub draw_scheme: DrawScheme,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub covariance: Option<Array2<f64>>,
    pub robust_covariance: Option<Array2<f64>>,
    pub opg_covariance: Option<Array2<f64>>,
}

impl EstimationResults {
    pub fn n_free(&self) -> usize {
        self.theta_hat.len()
    }

    /// `2 (ℓ_final − ℓ_init)`.
    pub fn likelihood_ratio(&self) -> f64 {
        2.0 * (self.final_loglik - self.init_loglik)
    }

    /// `1 − ℓ_final / ℓ_init` (relative to the start values).
    pub fn rho_squared(&self) -> f64 {
        1.0 - self.final_loglik / self.init_loglik
    }

    pub fn get(&self, name: &str) -> Option<&ParameterEstimate> {
        self.estimates.iter().find(|e| e.name == name)
    }
}

/// Hybrid choice model estimated by simulated maximum likelihood.
///
/// Holds the validated model, the run options, and (after
/// [`HybridChoiceModel::fit`]) the estimation results.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridChoiceModel {
    pub spec: ModelSpec,
    pub options: EstimationOptions,
    pub results: Option<EstimationResults>,
}

impl HybridChoiceModel {
    pub fn new(spec: ModelSpec, options: EstimationOptions) -> Self {
        HybridChoiceModel { spec, options, results: None }
    }

    /// Generate the draw table for `data` and bundle both.
    ///
    /// # Errors
    /// - [`ChoiceError::ThreadPool`] if the worker pool cannot be built.
    /// - [`ChoiceError::InvalidOption`] for a zero draw count.
    pub fn prepare(&self, data: ChoiceData) -> ChoiceResult<EstimationSample> {
        let opts = &self.options.simulation;
        log::info!(
            "generating {} {:?} draws for {} individuals over {} dimension(s)",
            opts.n_draws,
            opts.scheme,
            data.n_individuals(),
            self.spec.draws.len()
        );
        let draws = self.with_pool(|| DrawTable::generate(data.n_individuals(), &self.spec.draws, opts))?;
        Ok(EstimationSample { data, draws })
    }

    /// Simulated log-likelihood at the declared starting values.
    pub fn start_loglik(&self, sample: &EstimationSample) -> ChoiceResult<f64> {
        let beta0 = self.spec.parameters.start_values();
        self.with_pool(|| self.simulated(sample)?.loglik(beta0.view()))
    }

    /// Compare the analytic gradient with central differences at the
    /// starting values.
    pub fn derivative_check(&self, sample: &EstimationSample) -> ChoiceResult<DerivativeCheck> {
        let theta0 = self.spec.parameters.theta0();
        self.with_pool(|| self.compare_gradients(&theta0, sample))
    }

    /// Estimate the model on `sample` and cache the results.
    ///
    /// ## Steps
    /// 1. Build the worker pool and evaluate `ℓ` at the start values.
    /// 2. Optionally compare the analytic gradient with finite differences.
    /// 3. Run L-BFGS per `options.mle_opts` from `θ₀`.
    /// 4. Reject a non-converged run when `require_convergence` is set,
    ///    returning the best point inside the error.
    /// 5. Build classical, OPG and robust covariances and map them to model
    ///    space.
    ///
    /// ## Errors
    /// - [`ChoiceError::DegenerateLikelihood`] naming the individual whose
    ///   simulated likelihood vanished (no floor configured).
    /// - [`ChoiceError::EstimationFailed`] for optimizer failures, non-finite
    ///   objectives or an exhausted budget under `require_convergence`.
    pub fn fit(&mut self, sample: &EstimationSample) -> ChoiceResult<&EstimationResults> {
        let results = self.with_pool(|| self.estimate(sample))?;
        Ok(&*self.results.insert(results))
    }

    fn with_pool<T: Send, F: FnOnce() -> ChoiceResult<T> + Send>(&self, op: F) -> ChoiceResult<T> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.unwrap_or(0))
            .build()
            .map_err(|e| ChoiceError::ThreadPool(e.to_string()))?;
        pool.install(op)
    }

    fn simulated<'a>(&'a self, sample: &'a EstimationSample) -> ChoiceResult<SimulatedLikelihood<'a>> {
        SimulatedLikelihood::new(&self.spec, &sample.data, &sample.draws, self.options.likelihood_floor)
    }

    fn estimate(&self, sample: &EstimationSample) -> ChoiceResult<EstimationResults> {
        let params = &self.spec.parameters;
        let data = &sample.data;
        log::info!(
            "estimating {} free of {} parameters on {} observations from {} individuals",
            params.n_free(),
            params.len(),
            data.n_obs(),
            data.n_individuals()
        );
        for name in self.spec.unused_parameters() {
            log::warn!("parameter '{name}' does not appear in any utility or measurement equation");
        }

        let theta0 = params.theta0();
        let init_loglik = self.simulated(sample)?.loglik(params.start_values().view())?;
        log::info!("initial log-likelihood: {init_loglik:.6}");

        if self.options.check_derivatives {
            let check = self.compare_gradients(&theta0, sample)?;
            if check.passed() {
                log::info!(
                    "derivative check passed: largest gap {:.3e} at '{}'",
                    check.gap,
                    check.parameter
                );
            } else {
                log::warn!(
                    "derivative check: analytic and numeric gradients differ by {:.3e} at '{}'",
                    check.gap,
                    check.parameter
                );
            }
        }

        let outcome =
            maximize(self, theta0, sample, &self.options.mle_opts).map_err(ChoiceError::from_optimizer)?;
        let beta_hat = params.to_model(outcome.theta_hat.view())?;
        log::info!(
            "final log-likelihood: {:.6} after {} iterations ({})",
            outcome.value,
            outcome.iterations,
            outcome.status
        );

        if !outcome.converged {
            if self.options.require_convergence {
                return Err(ChoiceError::EstimationFailed {
                    status: outcome.status,
                    best_loglik: Some(outcome.value),
                    best_values: Some(beta_hat.to_vec()),
                });
            }
            log::warn!("optimizer did not converge ({}); reporting the best point", outcome.status);
        }

        let CovarianceSet { classical: covariance, opg: opg_covariance, robust: robust_covariance } =
            if self.options.compute_covariance {
                self.covariances(&outcome.theta_hat, &beta_hat, sample)
            } else {
                CovarianceSet { classical: None, opg: None, robust: None }
            };
        let classical_se = covariance.as_ref().map(standard_errors);
        let robust_se = robust_covariance.as_ref().map(standard_errors);

        let mut free_pos = 0;
        let estimates = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (std_err, robust_std_err) = if p.fixed {
                    (None, None)
                } else {
                    let k = free_pos;
                    free_pos += 1;
                    (classical_se.as_ref().map(|s| s[k]), robust_se.as_ref().map(|s| s[k]))
                };
                ParameterEstimate {
                    name: p.name.clone(),
                    value: beta_hat[i],
                    fixed: p.fixed,
                    std_err,
                    robust_std_err,
                }
            })
            .collect();

        Ok(EstimationResults {
            estimates,
            theta_hat: outcome.theta_hat,
            init_loglik,
            final_loglik: outcome.value,
            n_obs: data.n_obs(),
            n_individuals: data.n_individuals(),
            n_draws: sample.draws.n_draws(),
            draw_scheme: self.options.simulation.scheme,
            converged: outcome.converged,
            status: outcome.status,
            iterations: outcome.iterations,
            covariance,
            robust_covariance,
            opg_covariance,
        })
    }

    /// Model-space covariances over the free parameters at the optimum.
    ///
    /// Failing scores or a failing Hessian leave all three matrices empty;
    /// the point estimates are still reported.
    fn covariances(
        &self, theta_hat: &Theta, beta_hat: &Array1<f64>, sample: &EstimationSample,
    ) -> CovarianceSet {
        self.try_covariances(theta_hat, beta_hat, sample).unwrap_or_else(|e| {
            log::warn!("standard errors unavailable: {e}");
            CovarianceSet { classical: None, opg: None, robust: None }
        })
    }

    fn try_covariances(
        &self, theta_hat: &Theta, beta_hat: &Array1<f64>, sample: &EstimationSample,
    ) -> ChoiceResult<CovarianceSet> {
        let params = &self.spec.parameters;
        let (_, full_scores) = self.simulated(sample)?.individual_scores(beta_hat.view())?;
        let mut scores = Array2::zeros((full_scores.nrows(), params.n_free()));
        for (mut row, full) in scores.outer_iter_mut().zip(full_scores.outer_iter()) {
            row.assign(&params.pull_back(full, theta_hat.view())?);
        }

        let neg_grad = |theta: &Array1<f64>| -> Array1<f64> {
            match self.grad(theta, sample) {
                Ok(g) => -g,
                Err(_) => Array1::from_elem(theta.len(), f64::NAN),
            }
        };
        let cov = calc_covariance(&neg_grad, theta_hat, &scores)?;
        if cov.classical.is_none() {
            log::warn!("information matrix is singular at the optimum; standard errors unavailable");
        }

        let jac = params.jacobian(theta_hat.view())?;
        let to_model = |c: Option<Array2<f64>>| c.map(|c| delta_method(&c, &jac));
        Ok(CovarianceSet {
            classical: to_model(cov.classical),
            opg: to_model(cov.opg),
            robust: to_model(cov.robust),
        })
    }

    fn compare_gradients(&self, theta0: &Theta, sample: &EstimationSample) -> ChoiceResult<DerivativeCheck> {
        let value = |theta: &Theta| self.value(theta, sample).unwrap_or(f64::NAN);
        let grad = |theta: &Theta| {
            self.grad(theta, sample).unwrap_or_else(|_| Array1::from_elem(theta.len(), f64::NAN))
        };
        let (k, gap) =
            gradient_discrepancy(&value, &grad, theta0).map_err(ChoiceError::from_optimizer)?;
        let params = &self.spec.parameters;
        let name = params.free_indices().get(k).map_or("-", |&i| params.parameter(i).name.as_str());
        let scale = grad(theta0).get(k).map_or(1.0, |g| g.abs().max(1.0));
        Ok(DerivativeCheck { parameter: name.to_string(), gap, relative_gap: gap / scale })
    }
}

impl LogLikelihood for HybridChoiceModel {
    type Data = EstimationSample;

    /// Simulated log-likelihood at `θ`.
    fn value(&self, theta: &Theta, sample: &EstimationSample) -> OptResult<Cost> {
        let beta = self.spec.parameters.to_model(theta.view())?;
        Ok(self.simulated(sample)?.loglik(beta.view())?)
    }

    /// Shape and finiteness of `θ` plus draw/sample consistency.
    fn check(&self, theta: &Theta, sample: &EstimationSample) -> OptResult<()> {
        if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(OptError::InvalidParameter {
                text: format!("theta[{index}] = {value} is not finite"),
            });
        }
        self.spec.parameters.to_model(theta.view())?;
        self.simulated(sample)?;
        Ok(())
    }

    /// Analytic gradient: forward-mode in `β`, chain rule to `θ`.
    fn grad(&self, theta: &Theta, sample: &EstimationSample) -> OptResult<Grad> {
        let beta = self.spec.parameters.to_model(theta.view())?;
        let (_, full) = self.simulated(sample)?.loglik_and_grad(beta.view())?;
        Ok(self.spec.parameters.pull_back(full.view(), theta.view())?)
    }
}
