//! Model specification — the validated, resolved description of a model.
//!
//! Purpose
//! -------
//! Bundle parameters, draw dimensions, named definitions, alternatives and
//! measurement equations after every name has been resolved, and check the
//! structural rules that must hold before any likelihood evaluation.
//!
//! Key behaviors
//! -------------
//! - [`ModelSpec::new`] validates:
//!   - at least one alternative, with unique ids;
//!   - availability rules reference data only;
//!   - every measurement equation has at least two strictly increasing
//!     categories and one threshold parameter per category boundary;
//!   - every threshold increment has a lower bound ≥ 0 and a strictly
//!     positive starting value (so thresholds stay ordered);
//!   - parameter / draw indices used by expressions exist.
//! - [`ModelSpec::unused_parameters`] lists free parameters no expression
//!   references; the driver warns about them because they make the
//!   information matrix singular.
use std::sync::Arc;

use crate::choice::{
    core::{
        draws::DrawDimension, expr::{Definition, Expr}, measurement::MeasurementEquation,
        params::ParameterSet, utility::Alternative,
    },
    errors::{ChoiceError, ChoiceResult},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub parameters: ParameterSet,
    pub draws: Vec<DrawDimension>,
    pub definitions: Vec<Arc<Definition>>,
    pub alternatives: Vec<Alternative>,
    pub measurements: Vec<MeasurementEquation>,
}

impl ModelSpec {
    /// Validate and assemble a specification.
    ///
    /// # Errors
    /// - [`ChoiceError::MissingUtility`] when there are no alternatives
    ///   (reported for id 0).
    /// - [`ChoiceError::DuplicateName`] for repeated alternative ids.
    /// - [`ChoiceError::InvalidDataExpression`] for a model-dependent
    ///   availability rule.
    /// - [`ChoiceError::InvalidMeasurement`] for category / threshold shape
    ///   problems and [`ChoiceError::NonMonotoneThresholds`] for increments
    ///   that could make thresholds decrease.
    /// - [`ChoiceError::UnknownIdentifier`] for out-of-range indices.
    pub fn new(
        parameters: ParameterSet, draws: Vec<DrawDimension>, definitions: Vec<Arc<Definition>>,
        alternatives: Vec<Alternative>, measurements: Vec<MeasurementEquation>,
    ) -> ChoiceResult<Self> {
        let spec = ModelSpec { parameters, draws, definitions, alternatives, measurements };
        spec.validate_alternatives()?;
        spec.validate_measurements()?;
        spec.validate_indices()?;
        Ok(spec)
    }

    fn validate_alternatives(&self) -> ChoiceResult<()> {
        if self.alternatives.is_empty() {
            return Err(ChoiceError::MissingUtility { alternative: 0 });
        }
        for (i, alt) in self.alternatives.iter().enumerate() {
            if self.alternatives[..i].iter().any(|a| a.id == alt.id) {
                return Err(ChoiceError::DuplicateName { name: format!("alternative {}", alt.id) });
            }
            if alt.availability.is_model_dependent() {
                return Err(ChoiceError::InvalidDataExpression {
                    name: format!("availability of alternative {}", alt.id),
                    reason: "availability cannot use parameters or draws",
                });
            }
        }
        Ok(())
    }

    fn validate_measurements(&self) -> ChoiceResult<()> {
        for eq in &self.measurements {
            let k = eq.categories.len();
            if k < 2 {
                return Err(ChoiceError::InvalidMeasurement {
                    equation: eq.name.clone(),
                    reason: "at least two categories are required".to_string(),
                });
            }
            if eq.categories.windows(2).any(|w| !(w[0] < w[1])) {
                return Err(ChoiceError::InvalidMeasurement {
                    equation: eq.name.clone(),
                    reason: "categories must be strictly increasing".to_string(),
                });
            }
            if eq.thresholds.len() != k - 1 {
                return Err(ChoiceError::InvalidMeasurement {
                    equation: eq.name.clone(),
                    reason: format!(
                        "{k} categories need {} threshold parameters, found {}",
                        k - 1,
                        eq.thresholds.len()
                    ),
                });
            }
            for &i in eq.thresholds.iter().skip(1) {
                if i >= self.parameters.len() {
                    continue;
                }
                let p = self.parameters.parameter(i);
                if !(p.lower >= 0.0) {
                    return Err(ChoiceError::NonMonotoneThresholds {
                        equation: eq.name.clone(),
                        parameter: p.name.clone(),
                        reason: "threshold increments need a lower bound of at least 0",
                    });
                }
                if !(p.value > 0.0) {
                    return Err(ChoiceError::NonMonotoneThresholds {
                        equation: eq.name.clone(),
                        parameter: p.name.clone(),
                        reason: "threshold increments need a strictly positive starting value",
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_indices(&self) -> ChoiceResult<()> {
        let n_params = self.parameters.len();
        let n_draws = self.draws.len();
        let mut bad: Option<String> = None;
        let mut check = |leaf: &Expr| match leaf {
            Expr::Param(i) if *i >= n_params => bad = Some(format!("parameter #{i}")),
            Expr::Draw(i) if *i >= n_draws => bad = Some(format!("draw #{i}")),
            _ => {}
        };
        for expr in self.expressions() {
            expr.visit_leaves(&mut check);
        }
        for eq in &self.measurements {
            for &i in &eq.thresholds {
                if i >= n_params {
                    check(&Expr::Param(i));
                }
            }
        }
        match bad {
            Some(name) => Err(ChoiceError::UnknownIdentifier { name }),
            None => Ok(()),
        }
    }

    /// Every expression of the model: utilities, availability, measurement
    /// scores and scales.
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        self.alternatives
            .iter()
            .flat_map(|a| [&a.utility, &a.availability])
            .chain(self.measurements.iter().flat_map(|m| [&m.score, &m.scale]))
    }

    /// Free parameters that no expression or threshold references.
    pub fn unused_parameters(&self) -> Vec<&str> {
        let mut used = vec![false; self.parameters.len()];
        for expr in self.expressions() {
            for i in expr.parameters() {
                used[i] = true;
            }
        }
        for eq in &self.measurements {
            for &i in &eq.thresholds {
                used[i] = true;
            }
        }
        self.parameters
            .free_indices()
            .iter()
            .filter(|&&i| !used[i])
            .map(|&i| self.parameters.parameter(i).name.as_str())
            .collect()
    }

    /// Data columns read by any model expression (sorted, unique).
    pub fn covariates(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for expr in self.expressions() {
            expr.visit_leaves(&mut |leaf| {
                if let Expr::Covariate(i) = leaf {
                    out.push(*i);
                }
            });
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}
