//! Errors for choice models (configuration, data, simulation and estimation).
//!
//! [`ChoiceError`] is the single error type of the `choice` module. Variants
//! fall into four families:
//!
//! - **Configuration**: malformed model declarations (unknown identifiers,
//!   parse errors, missing utilities, bounds, thresholds, categories, bad
//!   options). These are raised while building a model, before any
//!   optimizer iteration runs. See [`ChoiceError::is_configuration`].
//! - **Data**: I/O, CSV and TOML failures, missing columns, invalid ids.
//! - **Simulation**: [`ChoiceError::DegenerateLikelihood`] and non-finite
//!   utilities met while evaluating the likelihood.
//! - **Estimation**: optimizer failure, budget exhaustion with
//!   `require_convergence`, and inference failures.
//!
//! Row numbers in messages are 1-based data rows of the input file (header
//! excluded), so they can be looked up directly in a spreadsheet.
use std::path::PathBuf;

use crate::{inference::errors::InferenceError, optimization::errors::OptError};

/// Result alias for choice-model operations.
pub type ChoiceResult<T> = Result<T, ChoiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ChoiceError {
    // ---- Configuration: expressions ----
    #[error("cannot parse expression '{expr}' at offset {position}: {message}")]
    Parse { expr: String, position: usize, message: String },

    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String },

    #[error("'{name}' is declared more than once")]
    DuplicateName { name: String },

    #[error("'{name}' may only reference data columns: {reason}")]
    InvalidDataExpression { name: String, reason: &'static str },

    // ---- Configuration: parameters ----
    #[error("parameter '{name}' has invalid bounds [{lower}, {upper}]")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    #[error("starting value {value} of parameter '{name}' is outside [{lower}, {upper}]")]
    StartOutOfBounds { name: String, value: f64, lower: f64, upper: f64 },

    #[error("thresholds of measurement '{equation}' are not monotone: {reason} ('{parameter}')")]
    NonMonotoneThresholds { equation: String, parameter: String, reason: &'static str },

    // ---- Configuration: model structure ----
    #[error("alternative {alternative} has no utility expression")]
    MissingUtility { alternative: i64 },

    #[error("measurement '{equation}': {reason}")]
    InvalidMeasurement { equation: String, reason: String },

    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: &'static str, reason: String },

    // ---- Configuration: data against model ----
    #[error("row {row}: chosen alternative {alternative} is not available")]
    UnavailableChosenAlternative { row: usize, alternative: i64 },

    #[error("row {row}: no alternative is available")]
    NoAvailableAlternative { row: usize },

    #[error("row {row}: choice value {value} does not match any alternative")]
    UnknownChoice { row: usize, value: f64 },

    #[error("row {row}: response {value} of measurement '{equation}' is not a declared category")]
    UnknownCategory { equation: String, row: usize, value: f64 },

    // ---- Probability evaluation ----
    #[error("probability requested for unavailable alternative index {alternative}")]
    UnavailableAlternative { alternative: usize },

    #[error("logit probability requested with an empty choice set")]
    EmptyChoiceSet,

    // ---- Data ----
    #[error("column '{name}' not found in data")]
    MissingColumn { name: String },

    #[error("row {row}: column '{column}' holds invalid value {value}: {reason}")]
    InvalidValue { row: usize, column: String, value: f64, reason: &'static str },

    #[error("row {row}: column '{column}' holds non-numeric text '{text}'")]
    NonNumericField { row: usize, column: String, text: String },

    #[error("data has no rows left after exclusion")]
    EmptySample,

    #[error("row {row} has {found} fields, header has {expected}")]
    RaggedRow { row: usize, expected: usize, found: usize },

    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    // ---- Simulation ----
    #[error("simulated likelihood of individual {individual} is zero for every draw")]
    DegenerateLikelihood { individual: i64 },

    #[error("row {row}: utility of alternative {alternative} is NaN")]
    NonFiniteUtility { row: usize, alternative: i64 },

    // ---- Estimation ----
    #[error("estimation failed: {status}")]
    EstimationFailed {
        status: String,
        /// Best log-likelihood reached before the failure, when one exists.
        best_loglik: Option<f64>,
        /// Model-space values at the best point, in declaration order.
        best_values: Option<Vec<f64>>,
    },

    #[error("cannot build worker pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ChoiceError {
    /// `true` for errors describing a malformed model or a model/data mismatch.
    ///
    /// All of these are raised before the first optimizer iteration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ChoiceError::Parse { .. }
                | ChoiceError::UnknownIdentifier { .. }
                | ChoiceError::DuplicateName { .. }
                | ChoiceError::InvalidDataExpression { .. }
                | ChoiceError::InvalidBounds { .. }
                | ChoiceError::StartOutOfBounds { .. }
                | ChoiceError::NonMonotoneThresholds { .. }
                | ChoiceError::MissingUtility { .. }
                | ChoiceError::InvalidMeasurement { .. }
                | ChoiceError::InvalidOption { .. }
                | ChoiceError::UnavailableChosenAlternative { .. }
                | ChoiceError::NoAvailableAlternative { .. }
                | ChoiceError::UnknownChoice { .. }
                | ChoiceError::UnknownCategory { .. }
                | ChoiceError::UnavailableAlternative { .. }
                | ChoiceError::EmptyChoiceSet
        )
    }

    /// Map an optimizer failure into the estimation family.
    ///
    /// Degenerate likelihoods keep their individual id; everything else
    /// becomes [`ChoiceError::EstimationFailed`] without a best point.
    pub fn from_optimizer(err: OptError) -> Self {
        match err {
            OptError::DegenerateLikelihood { individual } => {
                ChoiceError::DegenerateLikelihood { individual }
            }
            other => ChoiceError::EstimationFailed {
                status: other.to_string(),
                best_loglik: None,
                best_values: None,
            },
        }
    }
}
