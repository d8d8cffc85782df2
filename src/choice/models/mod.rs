//! choice::models — estimable models built on [`crate::choice::core`].

pub mod hybrid;

pub use self::hybrid::{
    DERIVATIVE_CHECK_TOL, DerivativeCheck, EstimationResults, EstimationSample, HybridChoiceModel,
    ParameterEstimate,
};
