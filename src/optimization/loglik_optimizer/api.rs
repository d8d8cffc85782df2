//! Entry point: maximise a [`LogLikelihood`] with L-BFGS.
use crate::optimization::{
    errors::OptResult,
    loglik_optimizer::{
        OptimOutcome, Theta,
        adapter::ArgMinAdapter,
        builders::{build_optimizer_hager_zhang, build_optimizer_more_thuente},
        run::run_lbfgs,
        traits::{LineSearcher, LogLikelihood, MLEOptions},
    },
};

/// Maximise `ℓ(θ)` from `theta0`.
///
/// `f.check` runs once on `theta0`; the model is then handed to argmin as
/// the cost `-ℓ(θ)` and solved with L-BFGS using `opts.line_searcher`.
/// Exhausting the iteration or time budget is not an error: the outcome
/// carries the best point with `converged == false`.
///
/// # Errors
/// - Anything `f.check` rejects.
/// - Model errors raised during the run ([`OptError::DegenerateLikelihood`],
///   [`OptError::ModelEvaluation`], ...), recovered intact from argmin.
/// - Line-search and solver failures.
///
/// [`OptError::DegenerateLikelihood`]: crate::optimization::errors::OptError::DegenerateLikelihood
/// [`OptError::ModelEvaluation`]: crate::optimization::errors::OptError::ModelEvaluation
///
/// # Example
/// ```no_run
/// use ndarray::array;
/// use hybrid_choice::optimization::errors::OptResult;
/// use hybrid_choice::optimization::loglik_optimizer::{
///     maximize, Grad, LogLikelihood, MLEOptions, Theta,
/// };
///
/// /// Binary logit with a single constant: `y` holds 0/1 outcomes.
/// struct Constant;
/// impl LogLikelihood for Constant {
///     type Data = Vec<f64>;
///     fn value(&self, theta: &Theta, y: &Vec<f64>) -> OptResult<f64> {
///         let p = 1.0 / (1.0 + (-theta[0]).exp());
///         Ok(y.iter().map(|&yi| if yi > 0.5 { p.ln() } else { (1.0 - p).ln() }).sum())
///     }
///     fn check(&self, _: &Theta, _: &Vec<f64>) -> OptResult<()> {
///         Ok(())
///     }
///     fn grad(&self, theta: &Theta, y: &Vec<f64>) -> OptResult<Grad> {
///         let p = 1.0 / (1.0 + (-theta[0]).exp());
///         Ok(array![y.iter().map(|&yi| yi - p).sum::<f64>()])
///     }
/// }
///
/// let out = maximize(&Constant, array![0.0], &vec![1.0, 1.0, 0.0], &MLEOptions::default())?;
/// println!("asc = {:.4}", out.theta_hat[0]);
/// # Ok::<(), hybrid_choice::optimization::errors::OptError>(())
/// ```
pub fn maximize<F: LogLikelihood>(
    f: &F, theta0: Theta, data: &F::Data, opts: &MLEOptions,
) -> OptResult<OptimOutcome> {
    f.check(&theta0, data)?;
    let problem = ArgMinAdapter::new(f, data);
    match opts.line_searcher {
        LineSearcher::MoreThuente => {
            run_lbfgs(theta0, opts, problem, build_optimizer_more_thuente(opts)?)
        }
        LineSearcher::HagerZhang => {
            run_lbfgs(theta0, opts, problem, build_optimizer_hager_zhang(opts)?)
        }
    }
}
