//! [`ArgMinAdapter`]: a [`LogLikelihood`] seen by argmin as the cost
//! `c(θ) = -ℓ(θ)`.
use std::cell::RefCell;

use crate::optimization::{
    errors::OptError,
    loglik_optimizer::{
        finite_diff::run_fd_diff,
        traits::LogLikelihood,
        types::{Cost, Grad, Theta},
        validation::validate_grad,
    },
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// Borrowed model plus data. Cheap to build per run.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: LogLikelihood> {
    pub f: &'a F,
    pub data: &'a F::Data,
}

impl<'a, F: LogLikelihood> ArgMinAdapter<'a, F> {
    pub fn new(f: &'a F, data: &'a F::Data) -> Self {
        Self { f, data }
    }

    /// Cost as a plain `f64` closure value for `finitediff`; the first error
    /// is parked in `slot` and `NaN` returned in its place.
    fn cost_or_nan(&self, theta: &Theta, slot: &RefCell<Option<Error>>) -> f64 {
        self.cost(theta).unwrap_or_else(|e| {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                *slot = Some(e);
            }
            f64::NAN
        })
    }
}

impl<'a, F: LogLikelihood> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// `-ℓ(θ)`; a non-finite `ℓ` is an [`OptError::NonFiniteCost`].
    fn cost(&self, theta: &Theta) -> Result<Cost, Error> {
        let ll = self.f.value(theta, self.data)?;
        if !ll.is_finite() {
            return Err(OptError::NonFiniteCost { value: ll }.into());
        }
        Ok(-ll)
    }
}

impl<'a, F: LogLikelihood> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// `-∇ℓ(θ)` from the model, validated.
    ///
    /// Models without a gradient get central differences of the cost; if
    /// any evaluation failed or the result is not finite, forward
    /// differences are tried once and their outcome is final.
    fn gradient(&self, theta: &Theta) -> Result<Grad, Error> {
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, theta.len())?;
                Ok(-g)
            }
            Err(OptError::GradientNotImplemented) => {
                let slot = RefCell::new(None);
                let cost = |t: &Theta| self.cost_or_nan(t, &slot);
                let central = theta.central_diff(&cost);
                if slot.borrow().is_none() && validate_grad(&central, theta.len()).is_ok() {
                    return Ok(central);
                }
                Ok(run_fd_diff(theta, &cost, &slot)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}
