//! Parameters — declarations, bound transforms, and θ ↔ model-space mapping.
//!
//! Purpose
//! -------
//! Hold the declared parameters of a choice model and map between the
//! optimizer's unconstrained vector θ (free parameters only) and the full
//! model-space vector β (all parameters, declaration order).
//!
//! Key behaviors
//! -------------
//! - [`BoundTransform`] maps one unconstrained coordinate into its bounds:
//!   identity when unbounded, `l + softplus(θ)` / `u - softplus(θ)` for
//!   one-sided bounds and `l + (u - l)·logistic(θ)` for intervals.
//! - [`ParameterSet`] validates declarations (unique names, consistent bounds,
//!   starting values inside bounds), assembles β from θ with fixed values in
//!   place, and pulls model-space gradients back to θ through the diagonal
//!   Jacobian of the transforms.
//!
//! Invariants & assumptions
//! ------------------------
//! - Any β produced by [`ParameterSet::to_model`] lies within the declared
//!   bounds of each parameter.
//! - Fixed parameters never enter θ and always keep their declared value.
//! - A starting value sitting exactly on a finite bound is nudged inside by
//!   [`BOUND_EPS`] before inversion, so θ₀ is finite.
//!
//! Conventions
//! -----------
//! - "Full" vectors have one entry per declared parameter; "free" vectors
//!   have one entry per estimated parameter, in declaration order.
use std::collections::HashMap;

use ndarray::{Array1, ArrayView1};

use crate::{
    choice::errors::{ChoiceError, ChoiceResult},
    optimization::{
        loglik_optimizer::{Grad, Theta},
        numerical_stability::transformations::{
            BOUND_EPS, safe_logistic, safe_logit, safe_softplus, safe_softplus_inv,
        },
    },
};

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// Starting value (or the held value when `fixed`).
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
    pub fixed: bool,
}

impl Parameter {
    /// Declare a parameter; missing bounds become infinite.
    pub fn new(
        name: impl Into<String>, value: f64, lower: Option<f64>, upper: Option<f64>, fixed: bool,
    ) -> Self {
        Parameter {
            name: name.into(),
            value,
            lower: lower.unwrap_or(f64::NEG_INFINITY),
            upper: upper.unwrap_or(f64::INFINITY),
            fixed,
        }
    }

    /// Free, unbounded parameter.
    pub fn free(name: impl Into<String>, value: f64) -> Self {
        Parameter::new(name, value, None, None, false)
    }

    /// Parameter held at `value`.
    pub fn fixed(name: impl Into<String>, value: f64) -> Self {
        Parameter::new(name, value, None, None, true)
    }
}

/// Map from one unconstrained coordinate into a bounded interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundTransform {
    Identity,
    Lower(f64),
    Upper(f64),
    Interval(f64, f64),
}

impl BoundTransform {
    pub fn from_bounds(lower: f64, upper: f64) -> Self {
        match (lower.is_finite(), upper.is_finite()) {
            (false, false) => BoundTransform::Identity,
            (true, false) => BoundTransform::Lower(lower),
            (false, true) => BoundTransform::Upper(upper),
            (true, true) => BoundTransform::Interval(lower, upper),
        }
    }

    /// θ → β.
    pub fn to_model(&self, theta: f64) -> f64 {
        match *self {
            BoundTransform::Identity => theta,
            BoundTransform::Lower(l) => l + safe_softplus(theta),
            BoundTransform::Upper(u) => u - safe_softplus(theta),
            BoundTransform::Interval(l, u) => l + (u - l) * safe_logistic(theta),
        }
    }

    /// β → θ. Values on a finite bound are moved `BOUND_EPS` inside first.
    pub fn to_unconstrained(&self, beta: f64) -> f64 {
        match *self {
            BoundTransform::Identity => beta,
            BoundTransform::Lower(l) => safe_softplus_inv((beta - l).max(BOUND_EPS)),
            BoundTransform::Upper(u) => safe_softplus_inv((u - beta).max(BOUND_EPS)),
            BoundTransform::Interval(l, u) => {
                let width = u - l;
                let p = ((beta - l) / width).clamp(BOUND_EPS, 1.0 - BOUND_EPS);
                safe_logit(p)
            }
        }
    }

    /// dβ/dθ.
    pub fn derivative(&self, theta: f64) -> f64 {
        match *self {
            BoundTransform::Identity => 1.0,
            BoundTransform::Lower(_) => safe_logistic(theta),
            BoundTransform::Upper(_) => -safe_logistic(theta),
            BoundTransform::Interval(l, u) => {
                let s = safe_logistic(theta);
                (u - l) * s * (1.0 - s)
            }
        }
    }
}

/// `ParameterSet` — validated parameter declarations plus the θ layout.
///
/// Fields
/// ------
/// - `params`: declarations in order.
/// - `transforms`: one [`BoundTransform`] per declaration.
/// - `free`: full-vector indices of the estimated parameters; θ coordinate
///   `k` maps to `params[free[k]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
    transforms: Vec<BoundTransform>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
}

impl ParameterSet {
    /// Validate declarations and build the θ layout.
    ///
    /// # Errors
    /// - [`ChoiceError::DuplicateName`] for repeated names.
    /// - [`ChoiceError::InvalidBounds`] if a bound is NaN or `lower >= upper`
    ///   on a free parameter (`lower > upper` on a fixed one).
    /// - [`ChoiceError::StartOutOfBounds`] if the value is non-finite or
    ///   outside the bounds.
    pub fn new(params: Vec<Parameter>) -> ChoiceResult<Self> {
        let mut index = HashMap::with_capacity(params.len());
        let mut transforms = Vec::with_capacity(params.len());
        let mut free = Vec::new();

        for (i, p) in params.iter().enumerate() {
            if index.insert(p.name.clone(), i).is_some() {
                return Err(ChoiceError::DuplicateName { name: p.name.clone() });
            }
            let empty = if p.fixed { p.lower > p.upper } else { p.lower >= p.upper };
            if p.lower.is_nan() || p.upper.is_nan() || empty {
                return Err(ChoiceError::InvalidBounds {
                    name: p.name.clone(),
                    lower: p.lower,
                    upper: p.upper,
                });
            }
            if !p.value.is_finite() || p.value < p.lower || p.value > p.upper {
                return Err(ChoiceError::StartOutOfBounds {
                    name: p.name.clone(),
                    value: p.value,
                    lower: p.lower,
                    upper: p.upper,
                });
            }
            transforms.push(BoundTransform::from_bounds(p.lower, p.upper));
            if !p.fixed {
                free.push(i);
            }
        }
        Ok(ParameterSet { params, transforms, free, index })
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn parameter(&self, i: usize) -> &Parameter {
        &self.params[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Declared values as a full vector.
    pub fn start_values(&self) -> Array1<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    /// θ₀ from the declared starting values.
    pub fn theta0(&self) -> Theta {
        self.free.iter().map(|&i| self.transforms[i].to_unconstrained(self.params[i].value)).collect()
    }

    /// Full β from θ, with fixed parameters at their declared values.
    ///
    /// # Errors
    /// - [`ChoiceError::InvalidOption`] if `theta` has the wrong length.
    pub fn to_model(&self, theta: ArrayView1<f64>) -> ChoiceResult<Array1<f64>> {
        self.check_theta(theta)?;
        let mut beta = self.start_values();
        for (k, &i) in self.free.iter().enumerate() {
            beta[i] = self.transforms[i].to_model(theta[k]);
        }
        Ok(beta)
    }

    /// Diagonal of dβ_free/dθ.
    pub fn jacobian(&self, theta: ArrayView1<f64>) -> ChoiceResult<Array1<f64>> {
        self.check_theta(theta)?;
        Ok(self.free.iter().enumerate().map(|(k, &i)| self.transforms[i].derivative(theta[k])).collect())
    }

    /// Chain rule: full model-space gradient → θ gradient.
    pub fn pull_back(&self, full_grad: ArrayView1<f64>, theta: ArrayView1<f64>) -> ChoiceResult<Grad> {
        let jac = self.jacobian(theta)?;
        Ok(self.free.iter().zip(jac.iter()).map(|(&i, &d)| full_grad[i] * d).collect())
    }

    fn check_theta(&self, theta: ArrayView1<f64>) -> ChoiceResult<()> {
        if theta.len() != self.free.len() {
            return Err(ChoiceError::InvalidOption {
                name: "theta",
                reason: format!("expected {} free coordinates, found {}", self.free.len(), theta.len()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Each bound transform: round trip, bound respect, derivative.
    // - ParameterSet validation and the θ layout with fixed parameters.
    // - Gradient pull-back through the Jacobian.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that every transform round-trips interior values and keeps
    // images within bounds for extreme θ.
    //
    // Given
    // -----
    // - Identity, Lower(0), Upper(1), Interval(-1, 2).
    //
    // Expect
    // ------
    // - to_model(to_unconstrained(β)) ≈ β; images of ±50 stay in bounds.
    fn transforms_round_trip_and_respect_bounds() {
        // Arrange
        let cases = [
            (BoundTransform::Identity, 0.3, f64::NEG_INFINITY, f64::INFINITY),
            (BoundTransform::Lower(0.0), 0.7, 0.0, f64::INFINITY),
            (BoundTransform::Upper(1.0), -2.0, f64::NEG_INFINITY, 1.0),
            (BoundTransform::Interval(-1.0, 2.0), 0.5, -1.0, 2.0),
        ];

        for (t, beta, lo, hi) in cases {
            // Act
            let back = t.to_model(t.to_unconstrained(beta));

            // Assert
            assert_relative_eq!(back, beta, epsilon = 1e-10);
            for theta in [-50.0, 50.0] {
                let b = t.to_model(theta);
                assert!(b >= lo && b <= hi, "{t:?} maps {theta} to {b}");
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // Check analytic transform derivatives against central differences.
    //
    // Given
    // -----
    // - The three bounded transforms at θ = 0.4.
    //
    // Expect
    // ------
    // - Agreement to 1e-6.
    fn transform_derivatives_match_finite_differences() {
        // Arrange
        let h = 1e-6;
        let theta = 0.4;
        for t in [BoundTransform::Lower(1.0), BoundTransform::Upper(1.0), BoundTransform::Interval(0.0, 3.0)] {
            // Act
            let fd = (t.to_model(theta + h) - t.to_model(theta - h)) / (2.0 * h);

            // Assert
            assert_relative_eq!(t.derivative(theta), fd, epsilon = 1e-6);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure fixed parameters stay out of θ and keep their value, and that a
    // start value exactly at a bound yields a finite θ₀.
    //
    // Given
    // -----
    // - a free (0.5), b fixed (1.0), c lower-bounded at 0 starting at 0.
    //
    // Expect
    // ------
    // - n_free = 2; β(θ₀) = (0.5, 1.0, ≈0); θ₀ finite.
    fn fixed_parameters_and_start_on_bound() {
        // Arrange
        let set = ParameterSet::new(vec![
            Parameter::free("a", 0.5),
            Parameter::fixed("b", 1.0),
            Parameter::new("c", 0.0, Some(0.0), None, false),
        ])
        .expect("valid declarations");

        // Act
        let theta0 = set.theta0();
        let beta = set.to_model(theta0.view()).expect("length matches");

        // Assert
        assert_eq!(set.n_free(), 2);
        assert!(theta0.iter().all(|v| v.is_finite()));
        assert_relative_eq!(beta[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(beta[1], 1.0);
        assert!(beta[2] >= 0.0 && beta[2] < 1e-6);
    }

    #[test]
    // Purpose
    // -------
    // Verify declaration errors.
    //
    // Given
    // -----
    // - A duplicate name, inverted bounds, and a start outside its bounds.
    //
    // Expect
    // ------
    // - DuplicateName, InvalidBounds, StartOutOfBounds.
    fn invalid_declarations_are_rejected() {
        // Arrange / Act
        let dup = ParameterSet::new(vec![Parameter::free("a", 0.0), Parameter::free("a", 1.0)]);
        let inverted = ParameterSet::new(vec![Parameter::new("a", 0.0, Some(1.0), Some(-1.0), false)]);
        let outside = ParameterSet::new(vec![Parameter::new("a", -0.5, Some(0.0), None, false)]);

        // Assert
        assert!(matches!(dup, Err(ChoiceError::DuplicateName { .. })));
        assert!(matches!(inverted, Err(ChoiceError::InvalidBounds { .. })));
        assert!(matches!(outside, Err(ChoiceError::StartOutOfBounds { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Check that pull-back multiplies the free entries by dβ/dθ.
    //
    // Given
    // -----
    // - a free unbounded, b fixed, c in (0, 2); full gradient (1, 9, 1).
    //
    // Expect
    // ------
    // - θ-gradient = (1, c'(θ_c)); the fixed entry is ignored.
    fn pull_back_applies_chain_rule() {
        // Arrange
        let set = ParameterSet::new(vec![
            Parameter::free("a", 0.0),
            Parameter::fixed("b", 3.0),
            Parameter::new("c", 1.0, Some(0.0), Some(2.0), false),
        ])
        .expect("valid declarations");
        let theta = array![0.2, 0.0];
        let full = array![1.0, 9.0, 1.0];

        // Act
        let g = set.pull_back(full.view(), theta.view()).expect("length matches");

        // Assert
        assert_eq!(g.len(), 2);
        assert_relative_eq!(g[0], 1.0);
        assert_relative_eq!(g[1], 0.5, epsilon = 1e-12);
    }
}
