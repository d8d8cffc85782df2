//! Simulated log-likelihood — Monte Carlo integration over the draw table.
//!
//! Purpose
//! -------
//! Integrate each individual's conditional panel likelihood over its
//! replicates and sum the results over individuals:
//!
//! `ℓ(β) = Σ_n ln( (1/R) Σ_r exp(ℓ_nr(β)) )`.
//!
//! Key behaviors
//! -------------
//! - The inner average is a max-shifted log-mean-exp of the per-replicate
//!   log-likelihoods.
//! - The gradient of an individual's term is the softmax-weighted average of
//!   the per-replicate gradients, `Σ_r w_r ∂ℓ_nr` with
//!   `w_r = exp(ℓ_nr − logsumexp_r ℓ_nr)`. Replicates at `−∞` have zero
//!   weight and are skipped.
//! - Individuals are evaluated in parallel on the current `rayon` pool,
//!   collected in order, then summed sequentially, so the total does not
//!   depend on the number of threads.
//!
//! Degenerate individuals
//! ----------------------
//! When every replicate of an individual is `−∞` the evaluation fails with
//! [`ChoiceError::DegenerateLikelihood`] naming the individual id, unless a
//! likelihood floor is configured. With a floor the term becomes
//! `ln(floor)` with a zero gradient and one warning per evaluation reports
//! how many individuals were floored.
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

use crate::{
    choice::{
        core::{
            data::ChoiceData,
            draws::DrawTable,
            panel::{replicate_loglik, replicate_loglik_dual},
            spec::ModelSpec,
        },
        errors::{ChoiceError, ChoiceResult},
    },
    optimization::numerical_stability::transformations::{log_mean_exp, log_sum_exp},
};

/// Simulated likelihood over a fixed sample and draw table.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedLikelihood<'a> {
    spec: &'a ModelSpec,
    data: &'a ChoiceData,
    draws: &'a DrawTable,
    floor: Option<f64>,
}

impl<'a> SimulatedLikelihood<'a> {
    /// # Errors
    /// - [`ChoiceError::InvalidOption`] if the draw table does not match the
    ///   sample (individual count) or the model (draw dimensions), or if
    ///   `floor` is outside `(0, 1)`.
    pub fn new(
        spec: &'a ModelSpec, data: &'a ChoiceData, draws: &'a DrawTable, floor: Option<f64>,
    ) -> ChoiceResult<Self> {
        if draws.n_individuals() != data.n_individuals() || draws.n_dims() != spec.draws.len() {
            return Err(ChoiceError::InvalidOption {
                name: "draws",
                reason: format!(
                    "draw table has shape ({}, {}, {}) but the sample has {} individuals and the \
                     model {} draw dimensions",
                    draws.n_individuals(),
                    draws.n_draws(),
                    draws.n_dims(),
                    data.n_individuals(),
                    spec.draws.len()
                ),
            });
        }
        if let Some(f) = floor {
            if !(f > 0.0 && f < 1.0) {
                return Err(ChoiceError::InvalidOption {
                    name: "likelihood_floor",
                    reason: format!("must lie in (0, 1), got {f}"),
                });
            }
        }
        Ok(SimulatedLikelihood { spec, data, draws, floor })
    }

    pub fn n_params(&self) -> usize {
        self.spec.parameters.len()
    }

    /// Per-individual simulated log-likelihood terms, in sample order.
    pub fn individual_logliks(&self, beta: ArrayView1<f64>) -> ChoiceResult<Vec<f64>> {
        let raw: Vec<f64> = (0..self.data.n_individuals())
            .into_par_iter()
            .map(|n| self.individual_value(n, beta))
            .collect::<ChoiceResult<Vec<f64>>>()?;
        let mut floored = 0;
        let out = raw
            .into_iter()
            .enumerate()
            .map(|(n, v)| self.resolve(n, v, &mut floored))
            .collect::<ChoiceResult<Vec<f64>>>()?;
        self.report_floor(floored);
        Ok(out)
    }

    /// Total simulated log-likelihood `ℓ(β)`.
    pub fn loglik(&self, beta: ArrayView1<f64>) -> ChoiceResult<f64> {
        Ok(self.individual_logliks(beta)?.iter().sum())
    }

    /// Per-individual terms with their gradients over the full parameter
    /// vector (rows are individuals).
    pub fn individual_scores(&self, beta: ArrayView1<f64>) -> ChoiceResult<(Vec<f64>, Array2<f64>)> {
        let raw: Vec<(f64, Array1<f64>)> = (0..self.data.n_individuals())
            .into_par_iter()
            .map(|n| self.individual_value_and_grad(n, beta))
            .collect::<ChoiceResult<Vec<_>>>()?;

        let p = self.n_params();
        let mut values = Vec::with_capacity(raw.len());
        let mut scores = Array2::zeros((raw.len(), p));
        let mut floored = 0;
        for (n, (v, g)) in raw.into_iter().enumerate() {
            let resolved = self.resolve(n, v, &mut floored)?;
            if v != f64::NEG_INFINITY {
                scores.row_mut(n).assign(&g);
            }
            values.push(resolved);
        }
        self.report_floor(floored);
        Ok((values, scores))
    }

    /// `ℓ(β)` and its gradient over the full parameter vector.
    pub fn loglik_and_grad(&self, beta: ArrayView1<f64>) -> ChoiceResult<(f64, Array1<f64>)> {
        let (values, scores) = self.individual_scores(beta)?;
        let mut grad = Array1::zeros(self.n_params());
        for row in scores.outer_iter() {
            grad += &row;
        }
        Ok((values.iter().sum(), grad))
    }

    fn individual_value(&self, n: usize, beta: ArrayView1<f64>) -> ChoiceResult<f64> {
        let individual = &self.data.individuals[n];
        let lls = (0..self.draws.n_draws())
            .map(|r| {
                replicate_loglik(self.spec, self.data, individual, beta, self.draws.replicate(n, r))
            })
            .collect::<ChoiceResult<Vec<f64>>>()?;
        Ok(log_mean_exp(&lls))
    }

    fn individual_value_and_grad(
        &self, n: usize, beta: ArrayView1<f64>,
    ) -> ChoiceResult<(f64, Array1<f64>)> {
        let individual = &self.data.individuals[n];
        let duals = (0..self.draws.n_draws())
            .map(|r| {
                replicate_loglik_dual(self.spec, self.data, individual, beta, self.draws.replicate(n, r))
            })
            .collect::<ChoiceResult<Vec<_>>>()?;

        let lls: Vec<f64> = duals.iter().map(|d| d.value).collect();
        let lse = log_sum_exp(&lls);
        let mut grad = Array1::zeros(self.n_params());
        if lse.is_finite() {
            for d in duals.iter().filter(|d| d.value > f64::NEG_INFINITY) {
                d.accumulate_into((d.value - lse).exp(), &mut grad);
            }
        }
        Ok((log_mean_exp(&lls), grad))
    }

    fn resolve(&self, n: usize, value: f64, floored: &mut usize) -> ChoiceResult<f64> {
        if value != f64::NEG_INFINITY {
            return Ok(value);
        }
        match self.floor {
            Some(f) => {
                *floored += 1;
                Ok(f.ln())
            }
            None => Err(ChoiceError::DegenerateLikelihood { individual: self.data.individuals[n].id }),
        }
    }

    fn report_floor(&self, floored: usize) {
        if floored > 0 {
            log::warn!("likelihood floor applied to {floored} individual(s) with zero simulated likelihood");
        }
    }
}
