//! Choice data — raw survey tables, derived columns, and the panel layout.
//!
//! Purpose
//! -------
//! Load one-row-per-choice-occasion survey data, extend it with derived
//! covariates, and assemble the validated, individual-grouped container used
//! by the likelihood.
//!
//! Key behaviors
//! -------------
//! - [`RawTable`] holds a numeric table with named columns, read from CSV
//!   (`csv` crate) or built in memory. It remembers each row's 1-based
//!   position in the source so later errors can name the original row.
//! - [`RawTable::add_derived`] appends a column computed row by row from a
//!   data-only expression; derived columns are added in declaration order
//!   and may build on earlier ones.
//! - [`ChoiceData::build`] resolves the id and choice columns, evaluates
//!   availability, maps the chosen value to an alternative index and every
//!   indicator response to a category index, stable-sorts rows by individual
//!   id and records one [`Individual`] per contiguous run.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every cell is a finite or non-finite `f64`; sentinels such as `99999`
//!   are kept as-is and are expected to be removed by the exclusion rule.
//! - After `build`, each row's chosen alternative is available, at least one
//!   alternative is available, and each measurement response is a declared
//!   category. Violations are configuration errors naming the source row.
//! - Rows of one individual are contiguous and keep their file order.
//!
//! Conventions
//! -----------
//! - Column indices of [`ChoiceData::covariates`] equal the header indices of
//!   the table it was built from, so resolved [`Expr::Covariate`] leaves stay
//!   valid.
//! - Individual ids must be integral.
use std::{fs::File, io::Read, ops::Range, path::Path};

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::choice::{
    core::{
        expr::{Evaluator, Expr},
        spec::ModelSpec,
    },
    errors::{ChoiceError, ChoiceResult},
};

/// Numeric table with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    values: Array2<f64>,
    source_rows: Vec<usize>,
}

impl RawTable {
    /// Build a table in memory. Rows are numbered 1.. in the given order.
    ///
    /// # Errors
    /// - [`ChoiceError::RaggedRow`] if `headers` and `values` disagree on width.
    /// - [`ChoiceError::DuplicateName`] for repeated headers.
    pub fn new(headers: Vec<String>, values: Array2<f64>) -> ChoiceResult<Self> {
        if headers.len() != values.ncols() {
            return Err(ChoiceError::RaggedRow {
                row: 1,
                expected: headers.len(),
                found: values.ncols(),
            });
        }
        for (i, h) in headers.iter().enumerate() {
            if headers[..i].contains(h) {
                return Err(ChoiceError::DuplicateName { name: h.clone() });
            }
        }
        let source_rows = (1..=values.nrows()).collect();
        Ok(RawTable { headers, values, source_rows })
    }

    /// Read a delimited file with a header row.
    pub fn from_path(path: &Path, delimiter: u8) -> ChoiceResult<Self> {
        let file = File::open(path)
            .map_err(|source| ChoiceError::Io { path: path.to_path_buf(), source })?;
        RawTable::from_reader(file, delimiter)
    }

    /// Read delimited text with a header row. Fields are trimmed and parsed
    /// as `f64`.
    ///
    /// # Errors
    /// - [`ChoiceError::Csv`] for malformed records.
    /// - [`ChoiceError::RaggedRow`] / [`ChoiceError::NonNumericField`] for
    ///   width or parsing failures, with the 1-based data row.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> ChoiceResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let width = headers.len();

        let mut flat = Vec::new();
        let mut n_rows = 0;
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            let row = i + 1;
            if record.len() != width {
                return Err(ChoiceError::RaggedRow { row, expected: width, found: record.len() });
            }
            for (field, column) in record.iter().zip(&headers) {
                let value = field.parse::<f64>().map_err(|_| ChoiceError::NonNumericField {
                    row,
                    column: column.clone(),
                    text: field.to_string(),
                })?;
                flat.push(value);
            }
            n_rows += 1;
        }
        let values = Array2::from_shape_vec((n_rows, width), flat).map_err(|e| {
            ChoiceError::InvalidOption { name: "data", reason: e.to_string() }
        })?;
        RawTable::new(headers, values)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// 1-based source position of row `i`.
    pub fn source_row(&self, i: usize) -> usize {
        self.source_rows[i]
    }

    /// Index of a column by name.
    pub fn column(&self, name: &str) -> ChoiceResult<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ChoiceError::MissingColumn { name: name.to_string() })
    }

    /// Append a column computed from a data-only expression.
    ///
    /// # Errors
    /// - [`ChoiceError::DuplicateName`] if `name` is already a column.
    /// - [`ChoiceError::InvalidDataExpression`] if `expr` references
    ///   parameters or draws.
    pub fn add_derived(&mut self, name: &str, expr: &Expr) -> ChoiceResult<()> {
        if self.headers.iter().any(|h| h == name) {
            return Err(ChoiceError::DuplicateName { name: name.to_string() });
        }
        if expr.is_model_dependent() {
            return Err(ChoiceError::InvalidDataExpression {
                name: name.to_string(),
                reason: "derived columns cannot use parameters or draws",
            });
        }
        let column: Vec<f64> =
            self.values.outer_iter().map(|row| Evaluator::for_row(row).value(expr)).collect();
        let old = &self.values;
        let (n, m) = old.dim();
        let extended =
            Array2::from_shape_fn((n, m + 1), |(r, c)| if c < m { old[[r, c]] } else { column[r] });
        self.values = extended;
        self.headers.push(name.to_string());
        Ok(())
    }

    /// Keep only the listed rows (in the given order).
    pub fn select_rows(&self, rows: &[usize]) -> RawTable {
        RawTable {
            headers: self.headers.clone(),
            values: self.values.select(Axis(0), rows),
            source_rows: rows.iter().map(|&i| self.source_rows[i]).collect(),
        }
    }
}

/// One panel group: a contiguous run of rows sharing an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Individual {
    pub id: i64,
    pub rows: Range<usize>,
}

/// `ChoiceData` — validated, individual-grouped choice observations.
///
/// Fields
/// ------
/// - `covariates`: rows × columns, sorted by individual.
/// - `columns`: column names (same order as `covariates`).
/// - `chosen`: alternative index chosen on each row.
/// - `available`: rows × alternatives availability.
/// - `responses`: rows × measurement equations, category index per row.
/// - `source_rows`: 1-based row in the input file, for messages.
/// - `individuals`: panel groups in ascending id order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceData {
    pub covariates: Array2<f64>,
    pub columns: Vec<String>,
    pub chosen: Vec<usize>,
    pub available: Array2<bool>,
    pub responses: Array2<usize>,
    pub source_rows: Vec<usize>,
    pub individuals: Vec<Individual>,
}

impl ChoiceData {
    /// Validate `table` against `spec` and group it into individuals.
    ///
    /// # Errors
    /// - [`ChoiceError::EmptySample`] for a table without rows.
    /// - [`ChoiceError::MissingColumn`] for unknown id / choice columns.
    /// - [`ChoiceError::InvalidValue`] for non-integral ids and for
    ///   non-finite values in columns the model reads.
    /// - [`ChoiceError::UnknownChoice`], [`ChoiceError::NoAvailableAlternative`],
    ///   [`ChoiceError::UnavailableChosenAlternative`] and
    ///   [`ChoiceError::UnknownCategory`] naming the source row.
    pub fn build(
        table: &RawTable, spec: &ModelSpec, id_column: &str, choice_column: &str,
    ) -> ChoiceResult<Self> {
        if table.n_rows() == 0 {
            return Err(ChoiceError::EmptySample);
        }
        let id_col = table.column(id_column)?;
        let choice_col = table.column(choice_column)?;
        let values = table.values();
        let n_alts = spec.alternatives.len();
        let n_meas = spec.measurements.len();
        let inputs = spec.covariates();

        let mut ids = Vec::with_capacity(table.n_rows());
        for (i, row) in values.outer_iter().enumerate() {
            let raw = row[id_col];
            if !raw.is_finite() || raw.fract() != 0.0 {
                return Err(ChoiceError::InvalidValue {
                    row: table.source_row(i),
                    column: id_column.to_string(),
                    value: raw,
                    reason: "individual ids must be integers",
                });
            }
            ids.push(raw as i64);
        }

        let mut order: Vec<usize> = (0..table.n_rows()).collect();
        order.sort_by_key(|&i| ids[i]);

        let covariates = values.select(Axis(0), &order);
        let mut chosen = Vec::with_capacity(order.len());
        let mut available = Array2::from_elem((order.len(), n_alts), false);
        let mut responses = Array2::zeros((order.len(), n_meas));
        let mut source_rows = Vec::with_capacity(order.len());

        for (r, &i) in order.iter().enumerate() {
            let row = covariates.row(r);
            let source = table.source_row(i);
            source_rows.push(source);

            if let Some(&c) = inputs.iter().find(|&&c| !row[c].is_finite()) {
                return Err(ChoiceError::InvalidValue {
                    row: source,
                    column: table.headers()[c].clone(),
                    value: row[c],
                    reason: "model inputs must be finite",
                });
            }

            let mut ev = Evaluator::for_row(row);
            for (a, alt) in spec.alternatives.iter().enumerate() {
                available[[r, a]] = ev.value(&alt.availability) != 0.0;
            }
            if !available.row(r).iter().any(|&x| x) {
                return Err(ChoiceError::NoAvailableAlternative { row: source });
            }

            let choice = row[choice_col];
            let a = spec
                .alternatives
                .iter()
                .position(|alt| alt.id as f64 == choice)
                .ok_or(ChoiceError::UnknownChoice { row: source, value: choice })?;
            if !available[[r, a]] {
                return Err(ChoiceError::UnavailableChosenAlternative {
                    row: source,
                    alternative: spec.alternatives[a].id,
                });
            }
            chosen.push(a);

            for (m, eq) in spec.measurements.iter().enumerate() {
                let value = row[eq.indicator];
                responses[[r, m]] = eq.category_of(value).ok_or_else(|| {
                    ChoiceError::UnknownCategory { equation: eq.name.clone(), row: source, value }
                })?;
            }
        }

        let individuals = group_runs(order.iter().map(|&i| ids[i]));
        Ok(ChoiceData {
            covariates,
            columns: table.headers().to_vec(),
            chosen,
            available,
            responses,
            source_rows,
            individuals,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.chosen.len()
    }

    pub fn n_individuals(&self) -> usize {
        self.individuals.len()
    }

    pub fn row(&self, r: usize) -> ArrayView1<'_, f64> {
        self.covariates.row(r)
    }
}

fn group_runs<I: IntoIterator<Item = i64>>(sorted_ids: I) -> Vec<Individual> {
    let mut out: Vec<Individual> = Vec::new();
    for (r, id) in sorted_ids.into_iter().enumerate() {
        match out.last_mut() {
            Some(last) if last.id == id => last.rows.end = r + 1,
            _ => out.push(Individual { id, rows: r..r + 1 }),
        }
    }
    out
}
