//! Executor wiring shared by both line-search variants.
use crate::optimization::{
    errors::OptResult,
    loglik_optimizer::{
        Grad, LogLikelihood, MLEOptions, OptimOutcome, Theta, adapter::ArgMinAdapter,
    },
};
use argmin::core::{CostFunction, Executor, Gradient, IterState, Solver, State};
use argmin_math::ArgminL2Norm;

/// Run `solver` on `problem` from `theta0` and collect an [`OptimOutcome`].
///
/// Applies `opts.tols.max_iter` and `opts.timeout` to the executor. With
/// `opts.verbose` the starting log-likelihood and gradient norm are logged
/// at `info`, and under the `obs_slog` feature every iteration is traced.
///
/// The outcome reports `ℓ` (not the cost) at the best point argmin kept.
///
/// # Errors
/// argmin runtime errors, model errors raised inside cost/gradient calls,
/// and an invalid final state (see [`OptimOutcome::new`]).
pub fn run_lbfgs<'a, F, S>(
    theta0: Theta, opts: &MLEOptions, problem: ArgMinAdapter<'a, F>, solver: S,
) -> OptResult<OptimOutcome>
where
    F: LogLikelihood,
    S: Solver<ArgMinAdapter<'a, F>, IterState<Theta, Grad, (), (), (), f64>> + Send + 'static,
{
    if opts.verbose {
        log_start(&theta0, &problem)?;
    }

    let mut executor = Executor::new(problem, solver).configure(|state| {
        let state = state.param(theta0);
        match opts.tols.max_iter {
            Some(n) => state.max_iters(n as u64),
            None => state,
        }
    });
    if let Some(limit) = opts.timeout {
        executor = executor.timeout(limit);
    }
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        executor = executor.add_observer(
            argmin_observer_slog::SlogLogger::term_noblock(),
            argmin::core::observers::ObserverMode::Always,
        );
    }

    let mut state = executor.run()?.state().clone();
    let iterations = state.get_iter();
    let counts = state.get_func_counts().clone();
    let termination = state.get_termination_status().clone();
    let last_grad = state.take_gradient();
    OptimOutcome::new(
        state.take_best_param(),
        -state.get_best_cost(),
        termination,
        iterations,
        counts,
        last_grad,
    )
}

fn log_start<F: LogLikelihood>(theta0: &Theta, problem: &ArgMinAdapter<'_, F>) -> OptResult<()> {
    let ll0 = -problem.cost(theta0)?;
    match problem.gradient(theta0) {
        Ok(g) => log::info!("start: loglik = {ll0:.6}, |grad| = {:.6}", g.l2_norm()),
        Err(_) => log::info!("start: loglik = {ll0:.6}"),
    }
    Ok(())
}
