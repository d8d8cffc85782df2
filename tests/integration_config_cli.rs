//! Integration tests for model files and the `hybrid-choice` binary.
//!
//! Purpose
//! -------
//! - Validate that the bundled regional models load against a survey file
//!   that carries every column their exclusion rules, derived variables,
//!   utilities and measurement equations read.
//! - Exercise the command-line front end end to end: `check` and
//!   `estimate`, overrides, report files and error exit codes.
//!
//! Coverage
//! --------
//! - `config::ModelConfig::{from_path, load_data, build}` on
//!   `demos/hcm_northern_ireland.toml` and the three `demos/rpl_uc_*.toml`
//!   models.
//! - `HybridChoiceModel::derivative_check` on the hybrid demo.
//! - The `hybrid-choice` binary (`check`, `estimate --report --draws
//!   --seed --threads`).
//!
//! Exclusions
//! ----------
//! - Statistical properties of the estimator; see
//!   `integration_mixed_logit.rs` and `integration_hybrid_choice.rs`.
use std::{
    path::{Path, PathBuf},
    process::Command,
};

use hybrid_choice::{
    choice::{ChoiceError, DERIVATIVE_CHECK_TOL, HybridChoiceModel, core::DrawScheme},
    config::ModelConfig,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tempfile::TempDir;

/// Respondent-level survey columns, repeated on each of a respondent's rows.
const PERSON_COLUMNS: [&str; 24] = [
    "country", "Double_id", "too_short", "age", "female", "Block", "env1", "env2", "env3", "env4",
    "env5", "env6", "env7", "pay_elecbill", "marital_status", "num_children", "num_adults",
    "education", "economic_status", "distance_coast", "buy_green_energy", "ideo", "income",
    "ChoiceSum",
];

/// Attribute suffixes; each appears as `alt1…`, `alt2…` and `alt3…`.
const ATTRIBUTES: [&str; 7] =
    ["attr1hh2", "attr1hh3", "attr2coast2", "attr2coast3", "attr3cost", "attr4perk1", "attr4perk2"];

/// Columns every bundled model reads in its exclusion rule.
const EXCLUSION_COLUMNS: [&str; 22] = [
    "country", "Double_id", "too_short", "age", "Block", "env1", "env2", "env3", "env4", "env5",
    "env6", "env7", "pay_elecbill", "marital_status", "num_children", "num_adults", "education",
    "economic_status", "distance_coast", "buy_green_energy", "ideo", "ChoiceSum",
];

fn demo_model(file: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(file)
}

fn person_column(name: &str) -> usize {
    PERSON_COLUMNS.iter().position(|c| *c == name).unwrap_or_else(|| panic!("no column {name}"))
}

fn survey_header() -> Vec<String> {
    let mut header = vec!["ID".to_string(), "Choice".to_string()];
    header.extend(PERSON_COLUMNS.iter().map(|c| c.to_string()));
    for alt in 1..=3 {
        header.extend(ATTRIBUTES.iter().map(|a| format!("alt{alt}{a}")));
    }
    header
}

/// Valid answers for every respondent-level column.
fn respondent(rng: &mut StdRng, country: f64) -> Vec<f64> {
    let mut p = vec![0.0; PERSON_COLUMNS.len()];
    let mut set = |name: &str, v: f64| p[person_column(name)] = v;
    set("country", country);
    set("Double_id", 2.0);
    set("too_short", 20.0);
    set("age", f64::from(rng.gen_range(20..60u32)));
    set("female", f64::from(rng.gen_range(0..2u32)));
    set("Block", f64::from(rng.gen_range(1..11u32)));
    for k in 1..=7 {
        set(&format!("env{k}"), f64::from(rng.gen_range(1..5u32)));
    }
    set("pay_elecbill", f64::from(rng.gen_range(20..200u32)));
    set("marital_status", f64::from(rng.gen_range(1..6u32)));
    set("num_children", f64::from(rng.gen_range(0..4u32)));
    set("num_adults", f64::from(rng.gen_range(1..5u32)));
    set("education", f64::from(rng.gen_range(1..9u32)));
    set("economic_status", f64::from(rng.gen_range(1..8u32)));
    set("distance_coast", f64::from(rng.gen_range(1..100u32)));
    set("buy_green_energy", f64::from(rng.gen_range(1..4u32)));
    set("ideo", f64::from(rng.gen_range(1..11u32)));
    set("income", f64::from(rng.gen_range(1..7u32)));
    set("ChoiceSum", 12.0);
    p
}

/// Write `people` (id, respondent columns) with four choice occasions each.
fn write_survey(path: &Path, people: &[(u32, Vec<f64>)], rng: &mut StdRng) {
    let mut wtr = csv::Writer::from_path(path).expect("create survey file");
    wtr.write_record(survey_header()).expect("write header");
    for (id, person) in people {
        for _ in 0..4 {
            let mut row = vec![f64::from(*id), f64::from(rng.gen_range(1..4u32))];
            row.extend(person);
            for _ in 1..=3 {
                for a in ATTRIBUTES {
                    row.push(if a == "attr3cost" {
                        rng.gen_range(0.1..1.0)
                    } else {
                        f64::from(rng.gen_range(0..2u32))
                    });
                }
            }
            wtr.write_record(row.iter().map(|v| v.to_string())).expect("write row");
        }
    }
    wtr.flush().expect("flush survey file");
}

/// Purpose
/// -------
/// Write a survey covering the three regions: 36 respondents with four
/// occasions each, country `(id − 1) mod 3 + 1`.
///
/// Invariants
/// ----------
/// - One respondent per region fails a different exclusion clause:
///   id 1 (England) a missing electricity bill, id 5 (Northern Ireland) a
///   missing `env4`, id 9 (Scotland) `Double_id < 2`. Each regional model
///   therefore keeps 11 respondents and 44 occasions.
fn write_regional_survey(dir: &Path) -> PathBuf {
    let path = dir.join("survey.csv");
    let mut rng = StdRng::seed_from_u64(17);
    let people: Vec<(u32, Vec<f64>)> = (1..=36u32)
        .map(|id| {
            let mut p = respondent(&mut rng, f64::from((id - 1) % 3 + 1));
            match id {
                1 => p[person_column("pay_elecbill")] = 99999.0,
                5 => p[person_column("env4")] = 99999.0,
                9 => p[person_column("Double_id")] = 1.0,
                _ => {}
            }
            (id, p)
        })
        .collect();
    write_survey(&path, &people, &mut rng);
    path
}

fn binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hybrid-choice"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// A bundled model and what it should resolve to.
struct Demo {
    file: &'static str,
    country: f64,
    n_params: usize,
    n_draw_dims: usize,
    n_measurements: usize,
}

const DEMOS: [Demo; 4] = [
    Demo {
        file: "hcm_northern_ireland.toml",
        country: 2.0,
        n_params: 60,
        n_draw_dims: 8,
        n_measurements: 7,
    },
    Demo {
        file: "rpl_uc_england.toml",
        country: 1.0,
        n_params: 79,
        n_draw_dims: 7,
        n_measurements: 0,
    },
    Demo {
        file: "rpl_uc_northern_ireland.toml",
        country: 2.0,
        n_params: 79,
        n_draw_dims: 7,
        n_measurements: 0,
    },
    Demo {
        file: "rpl_uc_scotland.toml",
        country: 3.0,
        n_params: 79,
        n_draw_dims: 7,
        n_measurements: 0,
    },
];

#[test]
// Purpose
// -------
// Load every bundled regional model against one survey and evaluate it
// at its start values.
//
// Given
// -----
// - The four `demos/*.toml` models and the three-region synthetic survey.
// - 20 draws instead of the configured 2000.
//
// Expect
// ------
// - Each file keeps its simulation settings (2000 MLHS draws, seed 17)
//   and an exclusion rule over the full list of screening columns.
// - 11 respondents and 44 occasions of the model's own country survive.
// - Parameter, draw and measurement counts as declared; every parameter
//   is free and used.
// - A finite, negative start log-likelihood.
fn demo_models_load_and_evaluate() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let data_path = write_regional_survey(dir.path());

    for demo in &DEMOS {
        let mut cfg = ModelConfig::from_path(&demo_model(demo.file)).expect("demo model parses");
        let rule = cfg.exclude.clone().expect("exclusion rule present");
        let settings = (cfg.estimation.draws, cfg.estimation.seed, cfg.estimation.draw_scheme);
        cfg.estimation.draws = 20;

        // Act
        let raw = cfg.load_data(&data_path).expect("survey loads");
        let (spec, data) = cfg.build(raw).expect("model builds");
        let model = HybridChoiceModel::new(spec, cfg.estimation_options().expect("valid options"));
        let sample = model.prepare(data).expect("draws generated");
        let ll0 = model.start_loglik(&sample).expect("likelihood evaluates");

        // Assert
        assert_eq!(settings, (2000, 17, DrawScheme::Mlhs), "{}", demo.file);
        for column in EXCLUSION_COLUMNS {
            assert!(rule.contains(column), "{}: rule lacks {column}", demo.file);
        }
        assert_eq!(sample.data.n_individuals(), 11, "{}", demo.file);
        assert_eq!(sample.data.n_obs(), 44, "{}", demo.file);
        let country =
            sample.data.columns.iter().position(|c| c == "country").expect("country column");
        let countries = sample.data.covariates.column(country);
        assert!(countries.iter().all(|&c| c == demo.country), "{}", demo.file);
        let params = &model.spec.parameters;
        assert_eq!((params.len(), params.n_free()), (demo.n_params, demo.n_params), "{}", demo.file);
        assert_eq!(model.spec.draws.len(), demo.n_draw_dims, "{}", demo.file);
        assert_eq!(model.spec.measurements.len(), demo.n_measurements, "{}", demo.file);
        assert_eq!(model.spec.alternatives.len(), 3, "{}", demo.file);
        assert!(model.spec.unused_parameters().is_empty(), "{}", demo.file);
        assert!(ll0.is_finite() && ll0 < 0.0, "{}: ll0 = {ll0}", demo.file);
    }
}

#[test]
// Purpose
// -------
// The analytic gradient of the full hybrid demo model agrees with
// central differences at its start values.
//
// Given
// -----
// - `demos/hcm_northern_ireland.toml` on the Northern Ireland part of the
//   synthetic survey, with 20 draws.
//
// Expect
// ------
// - A finite gap whose relative size stays below `DERIVATIVE_CHECK_TOL`.
fn hcm_demo_gradient_matches_finite_differences() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let data_path = write_regional_survey(dir.path());
    let mut cfg =
        ModelConfig::from_path(&demo_model("hcm_northern_ireland.toml")).expect("demo model parses");
    cfg.estimation.draws = 20;
    let raw = cfg.load_data(&data_path).expect("survey loads");
    let (spec, data) = cfg.build(raw).expect("model builds");
    let model = HybridChoiceModel::new(spec, cfg.estimation_options().expect("valid options"));
    let sample = model.prepare(data).expect("draws generated");

    // Act
    let check = model.derivative_check(&sample).expect("check evaluates");

    // Assert
    assert!(check.gap.is_finite(), "{check:?}");
    assert!(check.relative_gap < DERIVATIVE_CHECK_TOL, "{check:?}");
    assert!(check.passed());
}

#[test]
// Purpose
// -------
// A response outside the declared categories is reported with its row.
//
// Given
// -----
// - The hybrid demo with the `env1 > 4` clause removed and a Northern
//   Ireland respondent answering `env1 = 9`.
//
// Expect
// ------
// - `ChoiceError::UnknownCategory` naming measurement `me1LVEnv` and row 1.
fn undeclared_category_is_reported_with_row() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let data_path = dir.path().join("survey.csv");
    let mut rng = StdRng::seed_from_u64(3);
    let mut person = respondent(&mut rng, 2.0);
    person[person_column("env1")] = 9.0;
    write_survey(&data_path, &[(1, person)], &mut rng);
    let text = std::fs::read_to_string(demo_model("hcm_northern_ireland.toml")).expect("read demo");
    let edited = text.replace("+ ( env1             > 4   )", "");
    assert_ne!(edited, text, "clause found");
    let mut cfg = ModelConfig::from_toml_str(&edited).expect("parses");
    cfg.estimation.draws = 10;

    // Act
    let raw = cfg.load_data(&data_path).expect("survey loads");
    let res = cfg.build(raw);

    // Assert
    match res {
        Err(ChoiceError::UnknownCategory { equation, row, value }) => {
            assert_eq!(equation, "me1LVEnv");
            assert_eq!(row, 1);
            // Zenv1 recodes an undeclared answer to 0.
            assert_eq!(value, 0.0);
        }
        Err(other) => panic!("expected UnknownCategory, got {other}"),
        Ok(_) => panic!("expected UnknownCategory, got a model"),
    }
}

#[test]
// Purpose
// -------
// `hybrid-choice check` validates a bundled model and prints sample sizes.
//
// Given
// -----
// - The hybrid demo and the three-region survey file.
//
// Expect
// ------
// - Exit status 0, the post-exclusion counts and the configured 2000
//   draws on stdout.
fn cli_check_reports_sample_sizes() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let data_path = write_regional_survey(dir.path());

    // Act
    let out = binary()
        .args(["check", "--model"])
        .arg(demo_model("hcm_northern_ireland.toml"))
        .arg("--data")
        .arg(&data_path)
        .output()
        .expect("binary runs");

    // Assert
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout.contains("Number of individuals:        11"), "{stdout}");
    assert!(stdout.contains("Number of observations:       44"), "{stdout}");
    assert!(stdout.contains("Number of free parameters:    60"), "{stdout}");
    assert!(stdout.contains("Number of draws:              2000"), "{stdout}");
    assert!(stdout.contains("Start log likelihood:"), "{stdout}");
}

/// Run `hybrid-choice estimate` on `model` / `data` with extra arguments
/// and return stdout, failing on a non-zero exit.
fn estimate(model: &Path, data: &Path, extra: &[&str]) -> String {
    let out = binary()
        .args(["estimate", "--model"])
        .arg(model)
        .arg("--data")
        .arg(data)
        .args(extra)
        .output()
        .expect("binary runs");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn report_line<'a>(report: &'a str, label: &str) -> &'a str {
    report
        .lines()
        .find(|l| l.starts_with(label))
        .unwrap_or_else(|| panic!("no '{label}' in {report}"))
}

#[test]
// Purpose
// -------
// `hybrid-choice estimate` applies the draw, seed and thread overrides
// and writes the report file.
//
// Given
// -----
// - A mixed logit model file with one `[[draw]]` (500 draws, seed 1 in
//   the file) and a survey written to a temp dir.
// - `--draws 30 --seed 4 --threads 2 --report <file>`, then the same with
//   `--threads 1`, then with `--seed 5`.
//
// Expect
// ------
// - The report file exists, matches stdout and states 30 draws.
// - Changing only the thread count reproduces the report exactly.
// - Changing the seed changes the simulated start log-likelihood.
fn cli_estimate_applies_overrides() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let model_path = dir.path().join("mixed.toml");
    std::fs::write(
        &model_path,
        r#"
        name = "mixed logit"

        [estimation]
        draws = 500
        seed = 1
        tol_cost = 1e-9
        require_convergence = false

        [[parameter]]
        name = "asc1"

        [[parameter]]
        name = "b_x"
        value = 0.5

        [[parameter]]
        name = "sd_x"
        value = 0.5
        lower = 0.0

        [[draw]]
        name = "omega"

        [[define]]
        name = "coef_x"
        expr = "b_x + sd_x * omega"

        [[alternative]]
        id = 1
        utility = "asc1 + coef_x * x"

        [[alternative]]
        id = 2
        utility = "0"
        "#,
    )
    .expect("write model");
    let data_path = dir.path().join("mixed.csv");
    let mut rng = StdRng::seed_from_u64(8);
    let mut wtr = csv::Writer::from_path(&data_path).expect("create data file");
    wtr.write_record(["ID", "Choice", "x"]).expect("write header");
    for id in 1..=200u32 {
        let x: f64 = rng.gen_range(-2.0..2.0);
        let p1 = 1.0 / (1.0 + (-(0.3 + 0.8 * x)).exp());
        let choice = if rng.gen::<f64>() < p1 { "1" } else { "2" };
        wtr.write_record([id.to_string(), choice.to_string(), x.to_string()]).expect("write row");
    }
    wtr.flush().expect("flush data file");
    let report_path = dir.path().join("report.txt");
    let report_arg = report_path.to_string_lossy().into_owned();

    // Act
    let first = estimate(
        &model_path,
        &data_path,
        &["--draws", "30", "--seed", "4", "--threads", "2", "--report", &report_arg],
    );
    let one_thread =
        estimate(&model_path, &data_path, &["--draws", "30", "--seed", "4", "--threads", "1"]);
    let other_seed =
        estimate(&model_path, &data_path, &["--draws", "30", "--seed", "5", "--threads", "2"]);

    // Assert
    let report = std::fs::read_to_string(&report_path).expect("report written");
    assert_eq!(report, first);
    assert!(report.starts_with("mixed logit"));
    assert!(report.contains("Number of individuals:        200"), "{report}");
    assert!(report.contains("Number of draws:              30 "), "{report}");
    assert!(report.lines().any(|l| l.starts_with("sd_x")));
    assert_eq!(one_thread, first);
    assert_ne!(
        report_line(&other_seed, "Init log likelihood:"),
        report_line(&first, "Init log likelihood:")
    );
}

#[test]
// Purpose
// -------
// Configuration errors make the binary exit non-zero with the cause.
//
// Given
// -----
// - A model whose utility references an undeclared name.
//
// Expect
// ------
// - Non-zero exit status; stderr names the unknown identifier.
fn cli_fails_on_unknown_identifier() {
    // Arrange
    let dir = TempDir::new().expect("temp dir");
    let model_path = dir.path().join("bad.toml");
    std::fs::write(
        &model_path,
        "[[parameter]]\nname = \"b\"\n\n[[alternative]]\nid = 1\nutility = \"b * price\"\n",
    )
    .expect("write model");
    let data_path = dir.path().join("data.csv");
    std::fs::write(&data_path, "ID,Choice,cost\n1,1,2.0\n").expect("write data");

    // Act
    let out = binary()
        .args(["estimate", "--model"])
        .arg(&model_path)
        .arg("--data")
        .arg(&data_path)
        .output()
        .expect("binary runs");

    // Assert
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown identifier 'price'"), "{stderr}");
}
