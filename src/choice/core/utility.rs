//! Utility evaluation for one observation under one replicate.
//!
//! Alternatives carry a utility expression and a data-only availability
//! rule. Evaluation skips unavailable alternatives (their slots hold `0.0`
//! and are never read by the probability layer), caps `±∞` at
//! [`UTILITY_CAP`], and rejects NaN with the offending data row.
use ndarray::ArrayView1;

use crate::{
    choice::{
        core::expr::{Dual, Evaluator, Expr},
        errors::{ChoiceError, ChoiceResult},
    },
    optimization::numerical_stability::transformations::UTILITY_CAP,
};

/// One alternative of the choice set.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    /// Value identifying the alternative in the choice column.
    pub id: i64,
    pub name: String,
    pub utility: Expr,
    /// Data-only rule; non-zero means available.
    pub availability: Expr,
}

/// Replace `±∞` by `±UTILITY_CAP`; `None` for NaN.
pub fn cap_utility(u: f64) -> Option<f64> {
    if u.is_nan() {
        None
    } else if u.is_infinite() {
        Some(UTILITY_CAP.copysign(u))
    } else {
        Some(u)
    }
}

/// Utilities of every alternative for the evaluator's current context.
///
/// # Errors
/// - [`ChoiceError::NonFiniteUtility`] if an available utility is NaN.
pub fn utility_values(
    alternatives: &[Alternative], available: ArrayView1<bool>, ev: &mut Evaluator<'_>, row: usize,
) -> ChoiceResult<Vec<f64>> {
    alternatives
        .iter()
        .zip(available.iter())
        .map(|(alt, &avail)| {
            if !avail {
                return Ok(0.0);
            }
            cap_utility(ev.value(&alt.utility))
                .ok_or(ChoiceError::NonFiniteUtility { row, alternative: alt.id })
        })
        .collect()
}

/// Dual counterpart of [`utility_values`].
///
/// A capped utility loses its gradient (the cap is flat).
pub fn utility_duals(
    alternatives: &[Alternative], available: ArrayView1<bool>, ev: &mut Evaluator<'_>, row: usize,
) -> ChoiceResult<Vec<Dual>> {
    alternatives
        .iter()
        .zip(available.iter())
        .map(|(alt, &avail)| {
            if !avail {
                return Ok(Dual::constant(0.0));
            }
            let d = ev.dual(&alt.utility);
            match cap_utility(d.value) {
                None => Err(ChoiceError::NonFiniteUtility { row, alternative: alt.id }),
                Some(v) if v != d.value => Ok(Dual::constant(v)),
                Some(_) => Ok(d),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choice::core::expr::{BinaryOp, UnaryOp};
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Capping of infinite utilities and rejection of NaN.
    // - Skipping unavailable alternatives.
    // - A random coefficient of the `-exp(mean + sd * draw)` form.
    // -------------------------------------------------------------------------

    fn alt(id: i64, utility: Expr) -> Alternative {
        Alternative { id, name: format!("alt{id}"), utility, availability: Expr::Const(1.0) }
    }

    #[test]
    // Purpose
    // -------
    // Verify the cap helper.
    //
    // Given
    // -----
    // - +∞, -∞, NaN and 1.5.
    //
    // Expect
    // ------
    // - ±UTILITY_CAP, None, 1.5.
    fn cap_utility_handles_non_finite() {
        // Arrange / Act / Assert
        assert_eq!(cap_utility(f64::INFINITY), Some(UTILITY_CAP));
        assert_eq!(cap_utility(f64::NEG_INFINITY), Some(-UTILITY_CAP));
        assert_eq!(cap_utility(f64::NAN), None);
        assert_eq!(cap_utility(1.5), Some(1.5));
    }

    #[test]
    // Purpose
    // -------
    // Check a cost coefficient `-exp(b + s * d)` times a price covariate, and
    // that an unavailable alternative is skipped even if its utility is NaN.
    //
    // Given
    // -----
    // - params b = 0, s = 0.5; draw d = 2; price = 3.
    // - Alternative 2 is unavailable with utility 0/0.
    //
    // Expect
    // ------
    // - u1 = -e · 3; u2 slot = 0; du1/db = u1, du1/ds = 2 · u1.
    fn random_cost_coefficient_and_skipped_alternative() {
        // Arrange
        let coef = Expr::unary(
            UnaryOp::Neg,
            Expr::unary(
                UnaryOp::Exp,
                Expr::binary(
                    BinaryOp::Add,
                    Expr::Param(0),
                    Expr::binary(BinaryOp::Mul, Expr::Param(1), Expr::Draw(0)),
                ),
            ),
        );
        let alts = vec![
            alt(1, Expr::binary(BinaryOp::Mul, coef, Expr::Covariate(0))),
            alt(2, Expr::binary(BinaryOp::Div, Expr::Const(0.0), Expr::Const(0.0))),
        ];
        let params = array![0.0, 0.5];
        let draws = array![2.0];
        let row = array![3.0];
        let available = array![true, false];
        let mut ev = Evaluator::new(params.view(), draws.view(), row.view(), 0);

        // Act
        let values = utility_values(&alts, available.view(), &mut ev, 1).expect("finite");
        let duals = utility_duals(&alts, available.view(), &mut ev, 1).expect("finite");

        // Assert
        let u1 = -3.0 * 1.0_f64.exp();
        assert_relative_eq!(values[0], u1, epsilon = 1e-12);
        assert_eq!(values[1], 0.0);
        assert_relative_eq!(duals[0].grad[0].1, u1, epsilon = 1e-12);
        assert_relative_eq!(duals[0].grad[1].1, 2.0 * u1, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a NaN utility on an available alternative is reported with its
    // row and alternative id.
    //
    // Given
    // -----
    // - Alternative 7 with utility log(-1), row 12.
    //
    // Expect
    // ------
    // - NonFiniteUtility { row: 12, alternative: 7 }.
    fn nan_utility_is_reported() {
        // Arrange
        let alts = vec![alt(7, Expr::unary(UnaryOp::Log, Expr::Const(-1.0)))];
        let empty: [f64; 0] = [];
        let available = array![true];
        let mut ev = Evaluator::new(ArrayView1::from(&empty), ArrayView1::from(&empty), ArrayView1::from(&empty), 0);

        // Act
        let err = utility_values(&alts, available.view(), &mut ev, 12).expect_err("NaN");

        // Assert
        assert!(matches!(err, ChoiceError::NonFiniteUtility { row: 12, alternative: 7 }));
    }
}
