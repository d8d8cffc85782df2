//! inference — covariance and standard errors for fitted models.
//!
//! [`calc_covariance`] returns the classical, OPG and robust sandwich
//! estimates in the free `θ` coordinates at once; a singular or indefinite
//! matrix leaves its entry `None`. Score matrices have one row per
//! individual. Nothing here logs.

pub mod errors;
pub mod hessian;

pub use self::errors::{InferenceError, InferenceResult};
pub use self::hessian::{CovarianceSet, calc_covariance, standard_errors};
