//! hybrid-choice CLI

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hybrid_choice::{
    choice::{EstimationSample, HybridChoiceModel, report},
    config::ModelConfig,
};

#[derive(Parser)]
#[command(name = "hybrid-choice")]
#[command(about = "Simulated maximum likelihood for mixed logit and hybrid choice models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate a model and print the report
    Estimate {
        /// Model file (TOML)
        #[arg(short, long)]
        model: PathBuf,

        /// Survey data (delimited text with a header row)
        #[arg(short, long)]
        data: PathBuf,

        /// Also write the report to this file
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Worker threads; overrides `[estimation] threads`
        #[arg(long)]
        threads: Option<usize>,

        /// Draws per individual; overrides `[estimation] draws`
        #[arg(long)]
        draws: Option<usize>,

        /// Random seed; overrides `[estimation] seed`
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Validate a model against the data and evaluate the start values
    Check {
        /// Model file (TOML)
        #[arg(short, long)]
        model: PathBuf,

        /// Survey data (delimited text with a header row)
        #[arg(short, long)]
        data: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Estimate { model, data, report, threads, draws, seed } => {
            cmd_estimate(&model, &data, report.as_ref(), threads, draws, seed)
        }
        Commands::Check { model, data } => cmd_check(&model, &data),
    }
}

fn load(model: &PathBuf, data: &PathBuf) -> Result<(ModelConfig, HybridChoiceModel, EstimationSample)> {
    let cfg = ModelConfig::from_path(model)
        .with_context(|| format!("loading model file {}", model.display()))?;
    load_with(cfg, model, data)
}

fn load_with(
    cfg: ModelConfig, model: &PathBuf, data: &PathBuf,
) -> Result<(ModelConfig, HybridChoiceModel, EstimationSample)> {
    let raw = cfg.load_data(data).with_context(|| format!("reading data {}", data.display()))?;
    let (spec, choice_data) =
        cfg.build(raw).with_context(|| format!("building model from {}", model.display()))?;
    let options = cfg.estimation_options().context("reading [estimation]")?;
    let hcm = HybridChoiceModel::new(spec, options);
    let sample = hcm.prepare(choice_data).context("generating draws")?;
    Ok((cfg, hcm, sample))
}

fn cmd_estimate(
    model: &PathBuf, data: &PathBuf, report_path: Option<&PathBuf>, threads: Option<usize>,
    draws: Option<usize>, seed: Option<u64>,
) -> Result<()> {
    let mut cfg = ModelConfig::from_path(model)
        .with_context(|| format!("loading model file {}", model.display()))?;
    if threads.is_some() {
        cfg.estimation.threads = threads;
    }
    if let Some(d) = draws {
        cfg.estimation.draws = d;
    }
    if let Some(s) = seed {
        cfg.estimation.seed = s;
    }

    let (cfg, mut hcm, sample) = load_with(cfg, model, data)?;
    let results = hcm.fit(&sample).context("estimation")?;
    let text = report::render(&cfg.name, results);
    print!("{text}");
    if let Some(path) = report_path {
        fs::write(path, &text).with_context(|| format!("writing report {}", path.display()))?;
    }
    Ok(())
}

fn cmd_check(model: &PathBuf, data: &PathBuf) -> Result<()> {
    let (cfg, hcm, sample) = load(model, data)?;
    let ll0 = hcm.start_loglik(&sample).context("evaluating the start values")?;
    println!("Model:                        {}", cfg.name);
    println!("Number of observations:       {}", sample.data.n_obs());
    println!("Number of individuals:        {}", sample.data.n_individuals());
    println!("Number of parameters:         {}", hcm.spec.parameters.len());
    println!("Number of free parameters:    {}", hcm.spec.parameters.n_free());
    println!("Number of draws:              {}", sample.draws.n_draws());
    println!("Start log likelihood:         {ll0:.4}");
    for name in hcm.spec.unused_parameters() {
        println!("warning: parameter '{name}' is not used by any expression");
    }
    Ok(())
}
