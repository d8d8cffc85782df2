//! Expressions — typed AST, sparse dual numbers, and a caching evaluator.
//!
//! Purpose
//! -------
//! Represent utility functions, latent-variable scores, availability rules,
//! derived columns and exclusion rules as one small expression language, and
//! evaluate it either to plain `f64` values or to dual numbers carrying the
//! gradient with respect to the full (model-space) parameter vector.
//!
//! Key behaviors
//! -------------
//! - [`Expr`] is an immutable tree. Leaves are constants, parameters,
//!   covariates (data columns), draws and named definitions; inner nodes are
//!   unary / binary operators. Names are resolved to indices at parse time
//!   (see [`crate::choice::core::parse`]), so evaluation never hashes.
//! - [`Dual`] pairs a value with a *sparse* gradient stored as sorted
//!   `(parameter index, partial)` pairs. Utilities typically touch a handful
//!   of parameters out of many, so merges stay cheap.
//! - [`Evaluator`] walks the tree for one observation / replicate and caches
//!   named definitions (for example a latent variable shared by all
//!   utilities and measurement equations), so each definition is computed
//!   once per context.
//!
//! Invariants & assumptions
//! ------------------------
//! - Comparison and logical operators return `1.0` / `0.0` and are treated
//!   as piecewise constant: their gradient is empty.
//! - `exp` is evaluated through [`safe_exp`]; past the clamp the derivative is
//!   zero, matching the flat value.
//! - Sparse gradients are sorted by index with no duplicates.
//!
//! Conventions
//! -----------
//! - Parameter indices refer to the full declaration-order parameter vector
//!   (fixed parameters included); the mapping to free θ-coordinates happens
//!   in [`crate::choice::core::params`].
//! - No logging and no allocation beyond gradient vectors and the cache.
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};

use crate::optimization::numerical_stability::transformations::{EXP_CLAMP, safe_exp};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Exp,
    Log,
    Abs,
}

/// Binary operators, arithmetic first, then comparisons and logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// A named, reusable sub-expression (`[[define]]` entries).
///
/// `slot` is the definition's position in the model's definition list and
/// indexes the evaluator cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub slot: usize,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    /// Full-vector parameter index.
    Param(usize),
    /// Data column index.
    Covariate(usize),
    /// Draw dimension index.
    Draw(usize),
    Named(Arc<Definition>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        Expr::Unary(op, Box::new(arg))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Visit every leaf, descending into named definitions.
    pub fn visit_leaves<F: FnMut(&Expr)>(&self, f: &mut F) {
        match self {
            Expr::Unary(_, arg) => arg.visit_leaves(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.visit_leaves(f);
                rhs.visit_leaves(f);
            }
            Expr::Named(def) => def.expr.visit_leaves(f),
            leaf => f(leaf),
        }
    }

    /// Parameter indices referenced anywhere in the tree (sorted, unique).
    pub fn parameters(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.visit_leaves(&mut |leaf| {
            if let Expr::Param(i) = leaf {
                out.push(*i);
            }
        });
        out.sort_unstable();
        out.dedup();
        out
    }

    /// `true` if the expression depends on parameters or draws.
    pub fn is_model_dependent(&self) -> bool {
        let mut found = false;
        self.visit_leaves(&mut |leaf| {
            if matches!(leaf, Expr::Param(_) | Expr::Draw(_)) {
                found = true;
            }
        });
        found
    }
}

/// Sparse gradient: sorted `(index, partial)` pairs.
pub type SparseGrad = Vec<(usize, f64)>;

/// Forward-mode dual number over the full parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub grad: SparseGrad,
}

impl Dual {
    pub fn constant(value: f64) -> Self {
        Dual { value, grad: Vec::new() }
    }

    /// The parameter at `index` itself: unit partial in its own coordinate.
    pub fn variable(value: f64, index: usize) -> Self {
        Dual { value, grad: vec![(index, 1.0)] }
    }

    pub fn add(&self, other: &Dual) -> Dual {
        Dual { value: self.value + other.value, grad: combine(&self.grad, 1.0, &other.grad, 1.0) }
    }

    pub fn sub(&self, other: &Dual) -> Dual {
        Dual { value: self.value - other.value, grad: combine(&self.grad, 1.0, &other.grad, -1.0) }
    }

    pub fn mul(&self, other: &Dual) -> Dual {
        Dual {
            value: self.value * other.value,
            grad: combine(&self.grad, other.value, &other.grad, self.value),
        }
    }

    pub fn div(&self, other: &Dual) -> Dual {
        let value = self.value / other.value;
        Dual {
            value,
            grad: combine(&self.grad, 1.0 / other.value, &other.grad, -value / other.value),
        }
    }

    pub fn neg(&self) -> Dual {
        self.scale(-1.0)
    }

    /// Multiply value and gradient by a constant.
    pub fn scale(&self, c: f64) -> Dual {
        Dual { value: c * self.value, grad: scale(&self.grad, c) }
    }

    pub fn exp(&self) -> Dual {
        let value = safe_exp(self.value);
        let slope = if self.value > EXP_CLAMP { 0.0 } else { value };
        Dual { value, grad: scale(&self.grad, slope) }
    }

    pub fn ln(&self) -> Dual {
        Dual { value: self.value.ln(), grad: scale(&self.grad, 1.0 / self.value) }
    }

    pub fn abs(&self) -> Dual {
        let sign = if self.value < 0.0 { -1.0 } else { 1.0 };
        Dual { value: self.value.abs(), grad: scale(&self.grad, sign) }
    }

    /// Add `weight * grad` into a dense gradient.
    pub fn accumulate_into(&self, weight: f64, out: &mut Array1<f64>) {
        for &(i, d) in &self.grad {
            out[i] += weight * d;
        }
    }

    /// Dense gradient of length `n`.
    pub fn dense_grad(&self, n: usize) -> Array1<f64> {
        let mut out = Array1::zeros(n);
        self.accumulate_into(1.0, &mut out);
        out
    }
}

/// `ca * a + cb * b` on sorted sparse gradients.
pub fn combine(a: &[(usize, f64)], ca: f64, b: &[(usize, f64)], cb: f64) -> SparseGrad {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (ia, da) = a[i];
        let (ib, db) = b[j];
        if ia == ib {
            out.push((ia, ca * da + cb * db));
            i += 1;
            j += 1;
        } else if ia < ib {
            out.push((ia, ca * da));
            i += 1;
        } else {
            out.push((ib, cb * db));
            j += 1;
        }
    }
    out.extend(a[i..].iter().map(|&(k, d)| (k, ca * d)));
    out.extend(b[j..].iter().map(|&(k, d)| (k, cb * d)));
    out
}

fn scale(a: &[(usize, f64)], c: f64) -> SparseGrad {
    a.iter().map(|&(k, d)| (k, c * d)).collect()
}

fn truth(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn apply_unary(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Not => truth(x == 0.0),
        UnaryOp::Exp => safe_exp(x),
        UnaryOp::Log => x.ln(),
        UnaryOp::Abs => x.abs(),
    }
}

fn apply_binary(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Lt => truth(a < b),
        BinaryOp::Le => truth(a <= b),
        BinaryOp::Gt => truth(a > b),
        BinaryOp::Ge => truth(a >= b),
        BinaryOp::Eq => truth(a == b),
        BinaryOp::Ne => truth(a != b),
        BinaryOp::And => truth(a != 0.0 && b != 0.0),
        BinaryOp::Or => truth(a != 0.0 || b != 0.0),
    }
}

/// `Evaluator` — recursive visitor over [`Expr`] for one evaluation context.
///
/// Purpose
/// -------
/// Bind parameter values, one row of covariates and one replicate of draws,
/// then evaluate any number of expressions against them. Named definitions
/// are memoized separately for values and duals until the row changes.
///
/// Notes
/// -----
/// - Row-level rules (derived columns, exclusion) use [`Evaluator::for_row`],
///   which binds empty parameter and draw views; such expressions are
///   checked at build time never to reference either.
#[derive(Debug)]
pub struct Evaluator<'a> {
    params: ArrayView1<'a, f64>,
    draws: ArrayView1<'a, f64>,
    covariates: ArrayView1<'a, f64>,
    values: Vec<Option<f64>>,
    duals: Vec<Option<Dual>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        params: ArrayView1<'a, f64>, draws: ArrayView1<'a, f64>, covariates: ArrayView1<'a, f64>,
        n_definitions: usize,
    ) -> Self {
        Evaluator {
            params,
            draws,
            covariates,
            values: vec![None; n_definitions],
            duals: vec![None; n_definitions],
        }
    }

    /// Evaluator for data-only expressions on a single row.
    pub fn for_row(covariates: ArrayView1<'a, f64>) -> Self {
        let empty: &'a [f64] = &[];
        Evaluator::new(ArrayView1::from(empty), ArrayView1::from(empty), covariates, 0)
    }

    /// Rebind the covariate row and drop cached definitions.
    pub fn set_row(&mut self, covariates: ArrayView1<'a, f64>) {
        self.covariates = covariates;
        self.values.iter_mut().for_each(|v| *v = None);
        self.duals.iter_mut().for_each(|d| *d = None);
    }

    pub fn value(&mut self, expr: &Expr) -> f64 {
        match expr {
            Expr::Const(c) => *c,
            Expr::Param(i) => self.params[*i],
            Expr::Covariate(i) => self.covariates[*i],
            Expr::Draw(i) => self.draws[*i],
            Expr::Named(def) => match self.values.get(def.slot).copied().flatten() {
                Some(v) => v,
                None => {
                    let v = self.value(&def.expr);
                    if let Some(slot) = self.values.get_mut(def.slot) {
                        *slot = Some(v);
                    }
                    v
                }
            },
            Expr::Unary(op, arg) => {
                let x = self.value(arg);
                apply_unary(*op, x)
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.value(lhs);
                let b = self.value(rhs);
                apply_binary(*op, a, b)
            }
        }
    }

    pub fn dual(&mut self, expr: &Expr) -> Dual {
        match expr {
            Expr::Const(c) => Dual::constant(*c),
            Expr::Param(i) => Dual::variable(self.params[*i], *i),
            Expr::Covariate(i) => Dual::constant(self.covariates[*i]),
            Expr::Draw(i) => Dual::constant(self.draws[*i]),
            Expr::Named(def) => {
                if let Some(Some(d)) = self.duals.get(def.slot) {
                    return d.clone();
                }
                let d = self.dual(&def.expr);
                if let Some(slot) = self.duals.get_mut(def.slot) {
                    *slot = Some(d.clone());
                }
                d
            }
            Expr::Unary(op, arg) => {
                let x = self.dual(arg);
                match op {
                    UnaryOp::Neg => x.neg(),
                    UnaryOp::Exp => x.exp(),
                    UnaryOp::Log => x.ln(),
                    UnaryOp::Abs => x.abs(),
                    UnaryOp::Not => Dual::constant(apply_unary(*op, x.value)),
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.dual(lhs);
                let b = self.dual(rhs);
                match op {
                    BinaryOp::Add => a.add(&b),
                    BinaryOp::Sub => a.sub(&b),
                    BinaryOp::Mul => a.mul(&b),
                    BinaryOp::Div => a.div(&b),
                    _ => Dual::constant(apply_binary(*op, a.value, b.value)),
                }
            }
        }
    }
}
