//! hybrid_choice — simulated maximum likelihood for panel mixed logit and
//! hybrid choice models.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and for the `hybrid-choice`
//! command-line tool. A model is declared with string expressions over
//! parameters, random draws, named definitions and data columns; the crate
//! validates it against a survey table, integrates each individual's panel
//! likelihood over the draws, maximises it with L-BFGS and reports
//! classical and robust standard errors.
//!
//! Key behaviors
//! -------------
//! - [`choice`] holds the model: expressions, parameters, data, draws, the
//!   simulated likelihood and the estimation driver.
//! - [`config`] reads TOML model files into a validated model and options.
//! - [`optimization`] wraps argmin's L-BFGS behind a log-likelihood trait.
//! - [`inference`] builds covariance matrices from the gradient and the
//!   per-individual scores.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every configuration error is raised before the first optimizer
//!   iteration.
//! - With a fixed seed and draw count, the log-likelihood and the estimates
//!   do not depend on the number of worker threads.
//!
//! Conventions
//! -----------
//! - Library code logs through the `log` facade and never initialises a
//!   logger; the binary installs `env_logger` (`RUST_LOG`).
//! - Fallible operations return [`choice::ChoiceResult`],
//!   [`optimization::errors::OptResult`] or
//!   [`inference::InferenceResult`]; nothing panics on bad input.
//!
//! Downstream usage
//! ----------------
//! ```no_run
//! use std::path::Path;
//! use hybrid_choice::{choice::HybridChoiceModel, config::ModelConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = ModelConfig::from_path(Path::new("model.toml"))?;
//! let (spec, data) = cfg.build(cfg.load_data(Path::new("survey.csv"))?)?;
//! let mut model = HybridChoiceModel::new(spec, cfg.estimation_options()?);
//! let sample = model.prepare(data)?;
//! let results = model.fit(&sample)?;
//! println!("{}", hybrid_choice::choice::report::render(&cfg.name, results));
//! # Ok(())
//! # }
//! ```
//!
//! Testing notes
//! -------------
//! - Unit tests live next to the code they cover.
//! - Integration tests under `tests/` simulate panels with known parameters
//!   and check recovery, thread-count independence and the config/CLI path.

pub mod choice;
pub mod config;
pub mod inference;
pub mod optimization;
