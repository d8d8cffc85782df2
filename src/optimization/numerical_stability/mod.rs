//! numerical_stability — overflow-safe scalar transforms and log-space
//! reductions.
//!
//! Used by the bound transforms in `choice::core::params`, the logit and
//! Monte Carlo reductions in `choice::core::{probability, simulation}`,
//! and the delta method applied to estimated covariances. All functions are pure.

pub mod transformations;

pub use self::transformations::{
    BOUND_EPS, EIGEN_EPS, EXP_CLAMP, LOGIT_EPS, UTILITY_CAP, delta_method,
    log_mean_exp, log_sum_exp, safe_exp, safe_logistic, safe_logit, safe_softplus,
    safe_softplus_inv,
};

pub mod prelude {
    pub use super::transformations::{
        EIGEN_EPS, EXP_CLAMP, LOGIT_EPS, delta_method, log_mean_exp, log_sum_exp, safe_exp,
        safe_logistic, safe_softplus, safe_softplus_inv,
    };
}
