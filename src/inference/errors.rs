//! Errors raised while building post-estimation covariances.
use crate::optimization::errors::OptError;

pub type InferenceResult<T> = Result<T, InferenceError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    /// The numerical Hessian of the log-likelihood is unusable.
    #[error("Hessian computation failed: {reason}")]
    HessianFailed { reason: String },

    /// Score rows are not as wide as `θ`.
    #[error("score matrix has {found} columns, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl From<OptError> for InferenceError {
    fn from(err: OptError) -> Self {
        InferenceError::HessianFailed { reason: err.to_string() }
    }
}
