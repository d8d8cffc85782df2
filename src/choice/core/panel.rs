//! Panel aggregation for one individual under one replicate.
//!
//! The conditional log-likelihood of individual `n` given replicate `r` is
//!
//! `ℓ_nr = Σ_t ln P(chosen_t) + Σ_m ln( (1/T) Σ_t P_m(response_tm) )`
//!
//! i.e. the product of MNL probabilities over the individual's choice
//! occasions, times, per measurement equation, the *average* over occasions
//! of the ordered-logit probability of the recorded response. A zero
//! average gives `−∞`, which the Monte Carlo layer handles.
use ndarray::ArrayView1;

use crate::choice::{
    core::{
        data::{ChoiceData, Individual},
        expr::{Dual, Evaluator},
        probability::{logit_log_probability, logit_log_probability_dual},
        spec::ModelSpec,
        utility::{utility_duals, utility_values},
    },
    errors::ChoiceResult,
};

/// `ℓ_nr` at model-space parameters `beta`.
///
/// # Errors
/// - [`crate::choice::errors::ChoiceError::NonFiniteUtility`] naming the
///   source row of a NaN utility.
pub fn replicate_loglik(
    spec: &ModelSpec, data: &ChoiceData, individual: &Individual, beta: ArrayView1<f64>,
    draws: ArrayView1<f64>,
) -> ChoiceResult<f64> {
    let rows = individual.rows.clone();
    let mut ev = Evaluator::new(beta.view(), draws.view(), data.row(rows.start), spec.definitions.len());
    let mut choice_ll = 0.0;
    let mut sums = vec![0.0; spec.measurements.len()];

    for r in rows.clone() {
        ev.set_row(data.row(r));
        let available = data.available.row(r);
        let u = utility_values(&spec.alternatives, available, &mut ev, data.source_rows[r])?;
        choice_ll += logit_log_probability(&u, available, data.chosen[r])?;
        for (m, eq) in spec.measurements.iter().enumerate() {
            sums[m] += eq.probability(&mut ev, beta, data.responses[[r, m]]);
        }
    }

    let t = rows.len() as f64;
    let meas_ll: f64 = sums.iter().map(|s| (s / t).ln()).sum();
    Ok(choice_ll + meas_ll)
}

/// `ℓ_nr` with its sparse gradient over the full parameter vector.
///
/// Returns `Dual { value: −∞, grad: [] }` when a measurement average is
/// zero; such replicates carry no weight in the simulated likelihood.
pub fn replicate_loglik_dual(
    spec: &ModelSpec, data: &ChoiceData, individual: &Individual, beta: ArrayView1<f64>,
    draws: ArrayView1<f64>,
) -> ChoiceResult<Dual> {
    let rows = individual.rows.clone();
    let mut ev = Evaluator::new(beta.view(), draws.view(), data.row(rows.start), spec.definitions.len());
    let mut total = Dual::constant(0.0);
    let mut sums = vec![Dual::constant(0.0); spec.measurements.len()];

    for r in rows.clone() {
        ev.set_row(data.row(r));
        let available = data.available.row(r);
        let u = utility_duals(&spec.alternatives, available, &mut ev, data.source_rows[r])?;
        total = total.add(&logit_log_probability_dual(&u, available, data.chosen[r])?);
        for (m, eq) in spec.measurements.iter().enumerate() {
            let p = eq.probability_dual(&mut ev, beta, data.responses[[r, m]]);
            sums[m] = sums[m].add(&p);
        }
    }

    let t = rows.len() as f64;
    for sum in &sums {
        if !(sum.value > 0.0) {
            return Ok(Dual { value: f64::NEG_INFINITY, grad: Vec::new() });
        }
        total = total.add(&sum.scale(1.0 / t).ln());
    }
    Ok(total)
}
