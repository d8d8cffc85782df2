//! Choice probabilities — multinomial logit and ordered logit.
//!
//! Purpose
//! -------
//! Turn utilities into log-probabilities of the chosen alternative, and a
//! latent score into ordered-logit probabilities of an observed response
//! category, each with a forward-mode gradient variant.
//!
//! Key behaviors
//! -------------
//! - MNL: `ln P(i) = u_i − logsumexp(u_available)`. The reduction subtracts
//!   the maximum first, so large utilities never overflow. Gradient:
//!   `∂ln P_i = ∂u_i − Σ_j P_j ∂u_j` over available `j`.
//! - Ordered logit with `K` categories and `K − 1` increasing thresholds
//!   `τ`: `z_k = τ_k − α s`, `P(c_0) = σ(z_1)`, `P(c_k) = σ(z_{k+1}) − σ(z_k)`,
//!   `P(c_{K−1}) = 1 − σ(z_{K−1})`. Upper tails use `σ(−z)` to keep precision.
//!   Probabilities below zero (only possible through rounding) clamp to 0.
//!
//! Invariants & assumptions
//! ------------------------
//! - Utilities are finite (capped upstream).
//! - Thresholds are non-decreasing; this holds by construction because
//!   increments are lower-bounded at zero.
use ndarray::ArrayView1;

use crate::{
    choice::{
        core::expr::{Dual, combine},
        errors::{ChoiceError, ChoiceResult},
    },
    optimization::numerical_stability::transformations::{log_sum_exp, safe_logistic},
};

fn available_utilities(utilities: &[f64], available: ArrayView1<bool>) -> Vec<f64> {
    utilities.iter().zip(available.iter()).filter(|&(_, &a)| a).map(|(&u, _)| u).collect()
}

fn check_choice(available: ArrayView1<bool>, chosen: usize) -> ChoiceResult<()> {
    if !available.iter().any(|&a| a) {
        return Err(ChoiceError::EmptyChoiceSet);
    }
    match available.get(chosen) {
        Some(&true) => Ok(()),
        _ => Err(ChoiceError::UnavailableAlternative { alternative: chosen }),
    }
}

/// `ln P(chosen)` under MNL.
///
/// # Errors
/// - [`ChoiceError::EmptyChoiceSet`] when nothing is available.
/// - [`ChoiceError::UnavailableAlternative`] when `chosen` is unavailable.
pub fn logit_log_probability(
    utilities: &[f64], available: ArrayView1<bool>, chosen: usize,
) -> ChoiceResult<f64> {
    check_choice(available, chosen)?;
    let lse = log_sum_exp(&available_utilities(utilities, available));
    Ok(utilities[chosen] - lse)
}

/// MNL probabilities of every alternative (0 for unavailable ones).
///
/// # Errors
/// - [`ChoiceError::EmptyChoiceSet`] when nothing is available.
pub fn logit_probabilities(utilities: &[f64], available: ArrayView1<bool>) -> ChoiceResult<Vec<f64>> {
    if !available.iter().any(|&a| a) {
        return Err(ChoiceError::EmptyChoiceSet);
    }
    let lse = log_sum_exp(&available_utilities(utilities, available));
    Ok(utilities
        .iter()
        .zip(available.iter())
        .map(|(&u, &a)| if a { (u - lse).exp() } else { 0.0 })
        .collect())
}

/// Dual counterpart of [`logit_log_probability`].
pub fn logit_log_probability_dual(
    utilities: &[Dual], available: ArrayView1<bool>, chosen: usize,
) -> ChoiceResult<Dual> {
    check_choice(available, chosen)?;
    let values: Vec<f64> = utilities.iter().map(|u| u.value).collect();
    let lse = log_sum_exp(&available_utilities(&values, available));

    let mut grad = utilities[chosen].grad.clone();
    for (u, &a) in utilities.iter().zip(available.iter()) {
        if a {
            let p = (u.value - lse).exp();
            grad = combine(&grad, 1.0, &u.grad, -p);
        }
    }
    Ok(Dual { value: values[chosen] - lse, grad })
}

/// Ordered-logit probabilities of all `thresholds.len() + 1` categories.
pub fn ordered_logit_probabilities(thresholds: &[f64], scale: f64, score: f64) -> Vec<f64> {
    (0..=thresholds.len()).map(|k| ordered_logit_probability(thresholds, scale, score, k)).collect()
}

/// Ordered-logit probability of one category.
///
/// # Panics
/// - If `category > thresholds.len()`; categories are validated when the
///   data are built.
pub fn ordered_logit_probability(thresholds: &[f64], scale: f64, score: f64, category: usize) -> f64 {
    let shift = scale * score;
    let last = thresholds.len();
    let p = if last == 0 {
        1.0
    } else if category == 0 {
        safe_logistic(thresholds[0] - shift)
    } else if category == last {
        safe_logistic(shift - thresholds[last - 1])
    } else {
        safe_logistic(thresholds[category] - shift) - safe_logistic(thresholds[category - 1] - shift)
    };
    // Rounding can push interior cells just below zero; NaN passes through.
    if p < 0.0 { 0.0 } else { p }
}

fn logistic_dual(z: &Dual) -> Dual {
    let s = safe_logistic(z.value);
    Dual { value: s, grad: z.grad.iter().map(|&(i, d)| (i, s * (1.0 - s) * d)).collect() }
}

/// Dual counterpart of [`ordered_logit_probability`].
///
/// # Panics
/// - If `category > thresholds.len()`.
pub fn ordered_logit_probability_dual(
    thresholds: &[Dual], scale: &Dual, score: &Dual, category: usize,
) -> Dual {
    let shift = scale.mul(score);
    let last = thresholds.len();
    let p = if last == 0 {
        Dual::constant(1.0)
    } else if category == 0 {
        logistic_dual(&thresholds[0].sub(&shift))
    } else if category == last {
        logistic_dual(&shift.sub(&thresholds[last - 1]))
    } else {
        logistic_dual(&thresholds[category].sub(&shift))
            .sub(&logistic_dual(&thresholds[category - 1].sub(&shift)))
    };
    if p.value < 0.0 { Dual::constant(0.0) } else { p }
}
