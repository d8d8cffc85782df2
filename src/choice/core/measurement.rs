//! Measurement equations of a hybrid choice model.
//!
//! Each equation links an ordinal indicator column (an attitudinal item) to a
//! latent score through an ordered logit. Thresholds are parameterized as a
//! base value followed by non-negative increments, so `τ_1 = β_base` and
//! `τ_{k+1} = τ_k + β_{δ_k}`.
use ndarray::ArrayView1;

use crate::choice::core::{
    expr::{Dual, Evaluator, Expr},
    probability::{ordered_logit_probability, ordered_logit_probability_dual},
};

/// Responses within this distance of a declared category match it.
const CATEGORY_TOL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementEquation {
    pub name: String,
    /// Data column holding the recorded response.
    pub indicator: usize,
    /// Response values in increasing category order.
    pub categories: Vec<f64>,
    /// Latent score `s`.
    pub score: Expr,
    /// Loading `α` on the score.
    pub scale: Expr,
    /// Full-vector indices: base threshold, then the increments.
    pub thresholds: Vec<usize>,
}

impl MeasurementEquation {
    /// Category index of a recorded response, if it is a declared category.
    pub fn category_of(&self, value: f64) -> Option<usize> {
        self.categories.iter().position(|&c| (c - value).abs() <= CATEGORY_TOL)
    }

    /// Cumulative thresholds `τ_1..τ_{K−1}` at `beta`.
    pub fn threshold_values(&self, beta: ArrayView1<f64>) -> Vec<f64> {
        self.thresholds
            .iter()
            .scan(0.0, |tau, &i| {
                *tau += beta[i];
                Some(*tau)
            })
            .collect()
    }

    fn threshold_duals(&self, beta: ArrayView1<f64>) -> Vec<Dual> {
        let mut out: Vec<Dual> = Vec::with_capacity(self.thresholds.len());
        for &i in &self.thresholds {
            let step = Dual::variable(beta[i], i);
            let next = match out.last() {
                Some(prev) => prev.add(&step),
                None => step,
            };
            out.push(next);
        }
        out
    }

    /// Probability of response category `category` in the evaluator's context.
    pub fn probability(&self, ev: &mut Evaluator<'_>, beta: ArrayView1<f64>, category: usize) -> f64 {
        let tau = self.threshold_values(beta);
        let alpha = ev.value(&self.scale);
        let s = ev.value(&self.score);
        ordered_logit_probability(&tau, alpha, s, category)
    }

    /// Dual counterpart of [`MeasurementEquation::probability`].
    pub fn probability_dual(
        &self, ev: &mut Evaluator<'_>, beta: ArrayView1<f64>, category: usize,
    ) -> Dual {
        let tau = self.threshold_duals(beta);
        let alpha = ev.dual(&self.scale);
        let s = ev.dual(&self.score);
        ordered_logit_probability_dual(&tau, &alpha, &s, category)
    }
}
