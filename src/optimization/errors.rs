//! Error surface of the optimization layer.
//!
//! Model code, argmin and our own validation all report through
//! [`OptError`]. Errors raised inside cost or gradient closures are boxed by
//! argmin on the way out and unboxed again by `From<argmin::core::Error>`.
use argmin::core::{ArgminError, Error};

use crate::choice::errors::ChoiceError;

pub type OptResult<T> = Result<T, OptError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptError {
    // ---- Gradient ----
    /// The model has no analytic gradient; the adapter falls back to finite
    /// differences.
    #[error("analytic gradient not implemented")]
    GradientNotImplemented,

    #[error("gradient has length {found}, expected {expected}")]
    GradientDimMismatch { expected: usize, found: usize },

    #[error("gradient entry {index} is {value}: {reason}")]
    InvalidGradient { index: usize, value: f64, reason: &'static str },

    // ---- Options ----
    #[error("gradient tolerance {tol}: {reason}")]
    InvalidTolGrad { tol: f64, reason: &'static str },

    #[error("cost tolerance {tol}: {reason}")]
    InvalidTolCost { tol: f64, reason: &'static str },

    #[error("iteration cap {max_iter}: {reason}")]
    InvalidMaxIter { max_iter: usize, reason: &'static str },

    /// None of `tol_grad`, `tol_cost`, `max_iter` was given.
    #[error("no stopping rule configured")]
    NoTolerancesProvided,

    #[error("line search '{name}': {reason}")]
    InvalidLineSearch { name: String, reason: &'static str },

    #[error("L-BFGS history {mem}: {reason}")]
    InvalidLBFGSMem { mem: usize, reason: &'static str },

    #[error("timeout {seconds}s: {reason}")]
    InvalidTimeout { seconds: f64, reason: &'static str },

    // ---- Solver state ----
    #[error("objective value is not finite: {value}")]
    NonFiniteCost { value: f64 },

    #[error("estimate {index} is {value}: {reason}")]
    InvalidThetaHat { index: usize, value: f64, reason: &'static str },

    #[error("solver finished without a best parameter vector")]
    MissingThetaHat,

    #[error("Hessian is {found:?}, expected ({expected}, {expected})")]
    HessianDimMismatch { expected: usize, found: (usize, usize) },

    #[error("Hessian entry ({row}, {col}) is {value}")]
    InvalidHessian { row: usize, col: usize, value: f64 },

    // ---- argmin ----
    #[error("invalid parameter: {text}")]
    InvalidParameter { text: String },

    #[error("not implemented: {text}")]
    NotImplemented { text: String },

    #[error("condition violated: {text}")]
    ConditionViolated { text: String },

    /// Anything else argmin reports, by its message.
    #[error("solver error: {text}")]
    Backend { text: String },

    // ---- Choice model ----
    /// Every replicate of one individual has zero simulated likelihood.
    #[error("simulated likelihood of individual {individual} is zero for every draw")]
    DegenerateLikelihood { individual: i64 },

    #[error("model evaluation failed: {text}")]
    ModelEvaluation { text: String },
}

impl From<Error> for OptError {
    fn from(err: Error) -> Self {
        let err = match err.downcast::<OptError>() {
            Ok(ours) => return ours,
            Err(err) => err,
        };
        match err.downcast::<ArgminError>() {
            Ok(ArgminError::InvalidParameter { text }) => OptError::InvalidParameter { text },
            Ok(ArgminError::NotImplemented { text }) => OptError::NotImplemented { text },
            Ok(ArgminError::ConditionViolated { text }) => OptError::ConditionViolated { text },
            Ok(other) => OptError::Backend { text: other.to_string() },
            Err(err) => OptError::Backend { text: err.to_string() },
        }
    }
}

impl From<ChoiceError> for OptError {
    fn from(err: ChoiceError) -> Self {
        match err {
            ChoiceError::DegenerateLikelihood { individual } => {
                OptError::DegenerateLikelihood { individual }
            }
            other => OptError::ModelEvaluation { text: other.to_string() },
        }
    }
}
