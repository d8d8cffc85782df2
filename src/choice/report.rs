//! Plain-text estimation report.
//!
//! Layout: a header with sample sizes, draws and likelihood statistics,
//! followed by one row per parameter with its value, standard error,
//! t-ratio, robust standard error and robust t-ratio. Missing quantities
//! (fixed parameters, singular information) print as `-`.
use std::fmt::Write;

use crate::choice::models::hybrid::EstimationResults;

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

/// Render `results` as a fixed-width text report.
pub fn render(title: &str, results: &EstimationResults) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_report(&mut out, title, results);
    out
}

fn write_report(out: &mut String, title: &str, r: &EstimationResults) -> std::fmt::Result {
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(title.chars().count().max(1)))?;
    writeln!(out, "Number of observations:       {}", r.n_obs)?;
    writeln!(out, "Number of individuals:        {}", r.n_individuals)?;
    writeln!(out, "Number of draws:              {} ({:?})", r.n_draws, r.draw_scheme)?;
    writeln!(out, "Number of estimated params:   {}", r.n_free())?;
    writeln!(out, "Init log likelihood:          {:.4}", r.init_loglik)?;
    writeln!(out, "Final log likelihood:         {:.4}", r.final_loglik)?;
    writeln!(out, "Likelihood ratio test:        {:.4}", r.likelihood_ratio())?;
    writeln!(out, "Rho-square:                   {:.4}", r.rho_squared())?;
    writeln!(
        out,
        "Convergence:                  {} ({} iterations, {})",
        if r.converged { "yes" } else { "no" },
        r.iterations,
        r.status
    )?;
    writeln!(out)?;

    let width = r.estimates.iter().map(|e| e.name.len()).max().unwrap_or(4).max(4);
    writeln!(
        out,
        "{:<width$} {:>12} {:>12} {:>10} {:>14} {:>12}",
        "Name", "Value", "Std err", "t-test", "Rob. std err", "Rob. t-test"
    )?;
    for e in &r.estimates {
        let value = if e.fixed { format!("{:.4}*", e.value) } else { format!("{:.4}", e.value) };
        writeln!(
            out,
            "{:<width$} {:>12} {:>12} {:>10} {:>14} {:>12}",
            e.name,
            value,
            cell(e.std_err),
            cell(e.t_stat()),
            cell(e.robust_std_err),
            cell(e.robust_t_stat())
        )?;
    }
    if r.estimates.iter().any(|e| e.fixed) {
        writeln!(out, "(* fixed at its declared value)")?;
    }
    Ok(())
}
