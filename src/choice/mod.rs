//! choice — simulated maximum likelihood for panel mixed logit and hybrid
//! choice models.
//!
//! Purpose
//! -------
//! Estimate discrete choice models whose utilities and ordered-logit
//! measurement equations share random terms (random coefficients, latent
//! variables). The likelihood of each individual is integrated over the
//! random terms by Monte Carlo simulation and maximised with L-BFGS.
//!
//! Key behaviors
//! -------------
//! - [`core`] holds the expression language, parameters, data handling,
//!   draws and the simulated panel likelihood with analytic gradients.
//! - [`models`] drives estimation and builds covariance estimates.
//! - [`report`] renders fitted results as text.
//! - [`errors`] defines [`ChoiceError`], the single error surface.
//!
//! Conventions
//! -----------
//! - `β` denotes model-space parameter values in declaration order; `θ`
//!   the unconstrained free coordinates seen by the optimizer.
//! - Draw tables are indexed `[individual, replicate, dimension]`.

pub mod core;
pub mod errors;
pub mod models;
pub mod report;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::errors::{ChoiceError, ChoiceResult};
pub use self::models::{
    DERIVATIVE_CHECK_TOL, DerivativeCheck, EstimationResults, EstimationSample, HybridChoiceModel,
    ParameterEstimate,
};
