//! choice::core — building blocks of the simulated hybrid choice likelihood.
//!
//! Purpose
//! -------
//! Hold everything below the estimation driver: the expression language and
//! its parser, parameters and their bound transforms, data loading and
//! panel grouping, random draws, utility / probability evaluation, panel
//! aggregation and Monte Carlo integration.
//!
//! Layout
//! ------
//! - [`expr`], [`parse`]: expression tree, sparse duals, evaluator, parser.
//! - [`params`]: declared parameters, bounds, `θ ↔ β` transforms.
//! - [`data`], [`exclusion`]: survey tables, derived columns, row
//!   exclusion, [`ChoiceData`].
//! - [`draws`]: seeded per-individual draw tables.
//! - [`utility`], [`probability`], [`measurement`]: per-observation
//!   quantities.
//! - [`spec`]: the validated [`ModelSpec`].
//! - [`panel`], [`simulation`]: per-individual and total simulated
//!   log-likelihood with gradients.
//! - [`options`]: [`EstimationOptions`].

pub mod data;
pub mod draws;
pub mod exclusion;
pub mod expr;
pub mod measurement;
pub mod options;
pub mod panel;
pub mod params;
pub mod parse;
pub mod probability;
pub mod simulation;
pub mod spec;
pub mod utility;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::data::{ChoiceData, Individual, RawTable};
pub use self::draws::{DrawDimension, DrawDistribution, DrawScheme, DrawTable, SimulationOptions};
pub use self::exclusion::ExclusionRule;
pub use self::expr::{BinaryOp, Definition, Dual, Evaluator, Expr, UnaryOp};
pub use self::measurement::MeasurementEquation;
pub use self::options::EstimationOptions;
pub use self::params::{BoundTransform, Parameter, ParameterSet};
pub use self::parse::{Scope, parse_expr};
pub use self::probability::{
    logit_log_probability, logit_probabilities, ordered_logit_probabilities,
    ordered_logit_probability,
};
pub use self::simulation::SimulatedLikelihood;
pub use self::spec::ModelSpec;
pub use self::utility::Alternative;
