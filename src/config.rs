//! config — TOML model files.
//!
//! Purpose
//! -------
//! Read a model declaration from TOML and turn it into the validated pieces
//! the estimator consumes: a [`ModelSpec`], the grouped [`ChoiceData`] and
//! the [`EstimationOptions`].
//!
//! File layout
//! -----------
//! ```toml
//! name = "mixed logit"
//! exclude = "(income == 99999) + (age < 18) > 0"
//!
//! [estimation]          # every key optional
//! draws = 500
//! draw_scheme = "mlhs"  # or "pseudo"
//!
//! [data]
//! id = "ID"
//! choice = "Choice"
//!
//! [[derived]]           # data columns, evaluated in order
//! name = "high_income"
//! expr = "income > 4"
//!
//! [[parameter]]
//! name = "b_cost"
//! value = -0.5
//! upper = 0.0
//!
//! [[draw]]
//! name = "omega"        # distribution defaults to "normal"
//!
//! [[define]]            # named expressions, may use earlier definitions
//! name = "cost_coef"
//! expr = "b_cost + sd_cost * omega"
//!
//! [[alternative]]
//! id = 1
//! name = "car"
//! utility = "cost_coef * cost1"
//! availability = "1"
//!
//! [[measurement]]
//! name = "env1"
//! indicator = "Zenv1"
//! score = "lv"
//! scale = "alpha1"
//! thresholds = ["tau1", "delta1_2", "delta1_3"]
//! categories = [-3, -1, 1, 3]
//! ```
//!
//! Build order
//! -----------
//! Derived columns, then the exclusion rule, then parameters, draws,
//! definitions, alternatives and measurement equations. Names are resolved
//! against one scope: parameters, draws, definitions, then data columns.
use std::{fs, path::Path, sync::Arc};

use serde::Deserialize;

use crate::{
    choice::{
        core::{
            data::{ChoiceData, RawTable},
            draws::{DrawDimension, DrawDistribution, DrawScheme, SimulationOptions},
            exclusion::ExclusionRule,
            expr::Definition,
            measurement::MeasurementEquation,
            options::EstimationOptions,
            params::{Parameter, ParameterSet},
            parse::{Scope, parse_expr},
            spec::ModelSpec,
            utility::Alternative,
        },
        errors::{ChoiceError, ChoiceResult},
    },
    optimization::{
        errors::OptError,
        loglik_optimizer::{LineSearcher, MLEOptions, Tolerances},
    },
};

/// A parsed model file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub derived: Vec<NamedExpr>,
    #[serde(default, rename = "parameter")]
    pub parameters: Vec<ParameterConfig>,
    #[serde(default, rename = "draw")]
    pub draws: Vec<DrawConfig>,
    #[serde(default, rename = "define")]
    pub definitions: Vec<NamedExpr>,
    #[serde(default, rename = "alternative")]
    pub alternatives: Vec<AlternativeConfig>,
    #[serde(default, rename = "measurement")]
    pub measurements: Vec<MeasurementConfig>,
}

fn default_name() -> String {
    "choice model".to_string()
}

/// `[estimation]` — simulation, optimizer and policy settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimationConfig {
    pub seed: u64,
    pub draws: usize,
    pub draw_scheme: DrawScheme,
    pub threads: Option<usize>,
    pub max_iter: usize,
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub line_search: String,
    pub lbfgs_mem: Option<usize>,
    pub timeout_secs: Option<f64>,
    pub require_convergence: bool,
    pub check_derivatives: bool,
    pub likelihood_floor: Option<f64>,
    pub covariance: bool,
    pub verbose: bool,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        EstimationConfig {
            seed: 0,
            draws: 1000,
            draw_scheme: DrawScheme::Mlhs,
            threads: None,
            max_iter: 1000,
            tol_grad: Some(1e-6),
            tol_cost: None,
            line_search: "MoreThuente".to_string(),
            lbfgs_mem: None,
            timeout_secs: None,
            require_convergence: true,
            check_derivatives: false,
            likelihood_floor: None,
            covariance: true,
            verbose: false,
        }
    }
}

/// `[data]` — column roles and the field delimiter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub id: String,
    pub choice: String,
    pub delimiter: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig { id: "ID".to_string(), choice: "Choice".to_string(), delimiter: ",".to_string() }
    }
}

impl DataConfig {
    /// The delimiter as a single byte.
    ///
    /// # Errors
    /// - [`ChoiceError::InvalidOption`] unless it is exactly one ASCII character.
    pub fn delimiter_byte(&self) -> ChoiceResult<u8> {
        match self.delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(ChoiceError::InvalidOption {
                name: "delimiter",
                reason: format!("expected one ASCII character, got '{}'", self.delimiter),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedExpr {
    pub name: String,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterConfig {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    #[serde(default)]
    pub fixed: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrawConfig {
    pub name: String,
    #[serde(default)]
    pub distribution: DrawDistribution,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlternativeConfig {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub utility: Option<String>,
    #[serde(default = "always_available")]
    pub availability: String,
}

fn always_available() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeasurementConfig {
    pub name: String,
    pub indicator: String,
    pub score: String,
    pub scale: String,
    /// Base threshold parameter, then one increment parameter per extra cut.
    pub thresholds: Vec<String>,
    pub categories: Vec<f64>,
}

impl ModelConfig {
    /// # Errors
    /// - [`ChoiceError::Io`] if the file cannot be read.
    /// - [`ChoiceError::Toml`] for malformed TOML or unknown keys.
    pub fn from_path(path: &Path) -> ChoiceResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|source| ChoiceError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> ChoiceResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read the survey table named on the command line.
    pub fn load_data(&self, path: &Path) -> ChoiceResult<RawTable> {
        RawTable::from_path(path, self.data.delimiter_byte()?)
    }

    /// Validated [`EstimationOptions`] for the `[estimation]` section.
    ///
    /// # Errors
    /// - [`ChoiceError::InvalidOption`] for zero draws or threads, bad
    ///   tolerances, an unknown line search, a bad timeout or floor.
    pub fn estimation_options(&self) -> ChoiceResult<EstimationOptions> {
        let e = &self.estimation;
        let simulation = SimulationOptions::new(e.draws, e.seed, e.draw_scheme)?;
        let tols =
            Tolerances::new(e.tol_grad, e.tol_cost, Some(e.max_iter)).map_err(optimizer_option)?;
        let line_searcher = e.line_search.parse::<LineSearcher>().map_err(optimizer_option)?;
        let mut mle_opts =
            MLEOptions::new(tols, line_searcher, e.verbose, e.lbfgs_mem).map_err(optimizer_option)?;
        if let Some(seconds) = e.timeout_secs {
            mle_opts = mle_opts.with_timeout(seconds).map_err(optimizer_option)?;
        }
        let mut opts = EstimationOptions::new(simulation, mle_opts)
            .with_threads(e.threads)?
            .with_likelihood_floor(e.likelihood_floor)?;
        opts.check_derivatives = e.check_derivatives;
        opts.require_convergence = e.require_convergence;
        opts.compute_covariance = e.covariance;
        Ok(opts)
    }

    /// Apply derived columns and the exclusion rule to `raw`, then build the
    /// model and group the remaining rows into individuals.
    ///
    /// # Errors
    /// Any configuration error ([`ChoiceError::is_configuration`]), missing
    /// columns, or [`ChoiceError::EmptySample`] when exclusion drops every row.
    pub fn build(&self, mut raw: RawTable) -> ChoiceResult<(ModelSpec, ChoiceData)> {
        for d in &self.derived {
            let expr = parse_expr(&d.expr, &Scope::data_only(raw.headers()))?;
            raw.add_derived(&d.name, &expr)?;
        }

        if let Some(rule) = &self.exclude {
            let expr = parse_expr(rule, &Scope::data_only(raw.headers()))?;
            let before = raw.n_rows();
            raw = ExclusionRule::new(expr)?.apply(&raw);
            let dropped = before - raw.n_rows();
            if dropped > 0 {
                log::warn!("exclusion rule dropped {dropped} of {before} rows");
            } else {
                log::info!("exclusion rule kept all {before} rows");
            }
        }

        let parameters = ParameterSet::new(
            self.parameters
                .iter()
                .map(|p| Parameter::new(p.name.clone(), p.value, p.lower, p.upper, p.fixed))
                .collect(),
        )?;

        let mut scope = Scope::default();
        scope.set_covariates(raw.headers());
        for (i, p) in parameters.iter().enumerate() {
            scope.add_parameter(&p.name, i)?;
        }
        let draws: Vec<DrawDimension> = self
            .draws
            .iter()
            .map(|d| DrawDimension { name: d.name.clone(), distribution: d.distribution })
            .collect();
        for (i, d) in draws.iter().enumerate() {
            scope.add_draw(&d.name, i)?;
        }

        let mut definitions = Vec::with_capacity(self.definitions.len());
        for (slot, d) in self.definitions.iter().enumerate() {
            let def = Arc::new(Definition {
                name: d.name.clone(),
                slot,
                expr: parse_expr(&d.expr, &scope)?,
            });
            scope.add_definition(Arc::clone(&def))?;
            definitions.push(def);
        }

        let alternatives = self
            .alternatives
            .iter()
            .map(|a| {
                let utility =
                    a.utility.as_deref().ok_or(ChoiceError::MissingUtility { alternative: a.id })?;
                Ok(Alternative {
                    id: a.id,
                    name: a.name.clone().unwrap_or_else(|| format!("alt{}", a.id)),
                    utility: parse_expr(utility, &scope)?,
                    availability: parse_expr(&a.availability, &scope)?,
                })
            })
            .collect::<ChoiceResult<Vec<_>>>()?;

        let measurements = self
            .measurements
            .iter()
            .map(|m| {
                let thresholds = m
                    .thresholds
                    .iter()
                    .map(|name| {
                        scope
                            .parameter(name)
                            .ok_or_else(|| ChoiceError::UnknownIdentifier { name: name.clone() })
                    })
                    .collect::<ChoiceResult<Vec<_>>>()?;
                Ok(MeasurementEquation {
                    name: m.name.clone(),
                    indicator: raw.column(&m.indicator)?,
                    categories: m.categories.clone(),
                    score: parse_expr(&m.score, &scope)?,
                    scale: parse_expr(&m.scale, &scope)?,
                    thresholds,
                })
            })
            .collect::<ChoiceResult<Vec<_>>>()?;

        let spec = ModelSpec::new(parameters, draws, definitions, alternatives, measurements)?;
        let data = ChoiceData::build(&raw, &spec, &self.data.id, &self.data.choice)?;
        Ok((spec, data))
    }
}

fn optimizer_option(err: OptError) -> ChoiceError {
    ChoiceError::InvalidOption { name: "estimation", reason: err.to_string() }
}
