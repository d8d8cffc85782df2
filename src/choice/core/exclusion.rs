//! Exclusion rule — drop survey rows before grouping.
//!
//! A row is dropped when the rule evaluates to a non-zero value (NaN counts
//! as non-zero). The rule is applied once, after derived columns are added
//! and before individuals are formed, so excluded rows never reach the
//! likelihood. Applying it twice is the same as applying it once.
use crate::choice::{
    core::{
        data::RawTable,
        expr::{Evaluator, Expr},
    },
    errors::{ChoiceError, ChoiceResult},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionRule {
    expr: Expr,
}

impl ExclusionRule {
    /// Wrap a data-only expression.
    ///
    /// # Errors
    /// - [`ChoiceError::InvalidDataExpression`] if it uses parameters or draws.
    pub fn new(expr: Expr) -> ChoiceResult<Self> {
        if expr.is_model_dependent() {
            return Err(ChoiceError::InvalidDataExpression {
                name: "exclude".to_string(),
                reason: "the exclusion rule cannot use parameters or draws",
            });
        }
        Ok(ExclusionRule { expr })
    }

    /// Indices of the rows that are kept.
    pub fn retained_rows(&self, table: &RawTable) -> Vec<usize> {
        table
            .values()
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| Evaluator::for_row(row.view()).value(&self.expr) == 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Table without the excluded rows.
    pub fn apply(&self, table: &RawTable) -> RawTable {
        table.select_rows(&self.retained_rows(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choice::core::{expr::BinaryOp, parse::{Scope, parse_expr}};
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Row filtering and source-row bookkeeping.
    // - Idempotence.
    // - Rejection of model-dependent rules.
    // -------------------------------------------------------------------------

    fn survey() -> RawTable {
        RawTable::new(
            vec!["env1".into(), "income".into()],
            array![[1.0, 20.0], [5.0, 30.0], [2.0, 99999.0], [4.0, 40.0]],
        )
        .expect("valid table")
    }

    #[test]
    // Purpose
    // -------
    // Check that rows matching a sum-of-comparisons rule are dropped and the
    // survivors keep their source row numbers; applying twice changes nothing.
    //
    // Given
    // -----
    // - Rule "(env1 > 4) + (income == 99999) > 0".
    //
    // Expect
    // ------
    // - Source rows 1 and 4 remain, and a second pass keeps both.
    fn rule_drops_rows_and_is_idempotent() {
        // Arrange
        let t = survey();
        let expr = parse_expr("(env1 > 4) + (income == 99999) > 0", &Scope::data_only(t.headers()))
            .expect("valid rule");
        let rule = ExclusionRule::new(expr).expect("data only");

        // Act
        let once = rule.apply(&t);
        let twice = rule.apply(&once);

        // Assert
        assert_eq!(once.n_rows(), 2);
        assert_eq!((once.source_row(0), once.source_row(1)), (1, 4));
        assert_eq!(twice, once);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a rule using a parameter is rejected.
    //
    // Given
    // -----
    // - Rule "p0 > 0" built by hand.
    //
    // Expect
    // ------
    // - InvalidDataExpression.
    fn model_dependent_rule_is_rejected() {
        // Arrange
        let expr = Expr::binary(BinaryOp::Gt, Expr::Param(0), Expr::Const(0.0));

        // Act
        let result = ExclusionRule::new(expr);

        // Assert
        assert!(matches!(result, Err(ChoiceError::InvalidDataExpression { .. })));
    }
}
