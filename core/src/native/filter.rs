//! Row filtering with a compiled predicate.

use std::sync::Arc;

use datafusion::arrow::array::BooleanArray;
use datafusion::arrow::compute::filter_record_batch;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::common::cast::as_boolean_array;
use datafusion::physical_expr::PhysicalExpr;
use nativesql_common::error::{CommonError, ErrorContext, Result};
use tracing::debug;

use super::physical::PhysicalExprBuilder;
use crate::compiler::ExpressionCompiler;
use crate::expression::Expr;
use crate::types::{DataType, Field};

/// A boolean predicate compiled once and applied to many batches.
///
/// Rows where the predicate is false or NULL are dropped.
#[derive(Debug, Clone)]
pub struct NativeFilter {
    predicate: Arc<dyn PhysicalExpr>,
    display: String,
}

impl NativeFilter {
    pub fn try_new(condition: &Expr, fields: Vec<Field>) -> Result<Self> {
        let compiler = ExpressionCompiler::new(PhysicalExprBuilder::new());
        let (predicate, data_type) = compiler.compile(condition, &fields)?;
        if data_type != DataType::Boolean {
            return Err(CommonError::unsupported_type_error(format!(
                "Filter condition {} returns {}, expected boolean",
                condition, data_type
            )));
        }
        debug!("Prepared native filter for {}", condition);
        Ok(Self {
            predicate,
            display: condition.to_string(),
        })
    }

    /// Evaluate the predicate, one slot per input row.
    pub fn evaluate(&self, batch: &RecordBatch) -> Result<BooleanArray> {
        let mask = self
            .predicate
            .evaluate(batch)
            .and_then(|value| value.into_array(batch.num_rows()))
            .with_native_context(|| format!("Failed to evaluate {}", self.display))?;
        let mask = as_boolean_array(mask.as_ref())
            .with_native_context(|| format!("{} did not produce booleans", self.display))?;
        Ok(mask.clone())
    }

    /// Keep the rows of `batch` that satisfy the predicate.
    pub fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mask = self.evaluate(batch)?;
        filter_record_batch(batch, &mask)
            .with_native_context(|| format!("Failed to apply {}", self.display))
    }
}
