//! loglik_optimizer — maximum likelihood on top of argmin's L-BFGS.
//!
//! A model implements [`LogLikelihood`] (value, optional gradient, a
//! one-off `check` of the start point) and calls [`maximize`]. Internally
//! the model is wrapped as the cost `c(θ) = -ℓ(θ)` by [`adapter`], a solver
//! is built by [`builders`] for the chosen [`LineSearcher`], and
//! [`run::run_lbfgs`] drives argmin and packs the final state into an
//! [`OptimOutcome`]. Values reported back (`OptimOutcome::value`) are
//! log-likelihoods, never costs.
//!
//! `θ` is always the free, unconstrained vector; bounds and fixed
//! parameters are mapped away by the choice model before it gets here.
//! Model failures travel through argmin as boxed [`OptError`]s and come
//! back out unchanged.
//!
//! [`OptError`]: crate::optimization::errors::OptError

pub mod adapter;
pub mod api;
pub mod builders;
pub mod finite_diff;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

pub use self::api::maximize;
pub use self::traits::{LineSearcher, LogLikelihood, MLEOptions, OptimOutcome, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta};

pub mod prelude {
    pub use super::api::maximize;
    pub use super::traits::{LineSearcher, LogLikelihood, MLEOptions, OptimOutcome, Tolerances};
    pub use super::types::{Cost, Grad, Theta};
}
