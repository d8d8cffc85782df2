//! optimization — maximum likelihood machinery independent of any model.
//!
//! - [`loglik_optimizer`]: the [`LogLikelihood`](loglik_optimizer::LogLikelihood)
//!   trait and [`maximize`](loglik_optimizer::maximize) on argmin's L-BFGS,
//!   plus numerical derivatives.
//! - [`numerical_stability`]: safe transforms, `log_sum_exp`, the delta
//!   method and the small tolerances they share.
//! - [`errors`]: [`OptError`](errors::OptError), which also carries
//!   choice-model failures out of argmin.
//!
//! Models maximise `ℓ(θ)`; argmin minimises `-ℓ(θ)` and every reported
//! value is converted back. Only the optimizer runner logs.

pub mod errors;
pub mod loglik_optimizer;
pub mod numerical_stability;

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::loglik_optimizer::prelude::*;
    pub use super::numerical_stability::prelude::*;
}
