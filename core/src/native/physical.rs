//! In-process backend that lowers native function nodes onto DataFusion
//! physical expressions.

use std::sync::Arc;

use datafusion::logical_expr::Operator;
use datafusion::physical_expr::PhysicalExpr;
use datafusion::physical_expr::expressions::{
    BinaryExpr, Column as ColumnExpr, IsNotNullExpr, IsNullExpr, Literal as LiteralExpr, NotExpr,
};
use nativesql_common::error::{CommonError, Result};

use super::TreeBuilder;
use super::functions;
use crate::expression::Literal;
use crate::types::{DataType, Field};

/// [`TreeBuilder`] whose nodes are executable DataFusion expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicalExprBuilder;

impl PhysicalExprBuilder {
    pub fn new() -> Self {
        Self
    }

    fn fold(
        &self,
        name: &str,
        op: Operator,
        children: Vec<Arc<dyn PhysicalExpr>>,
    ) -> Result<Arc<dyn PhysicalExpr>> {
        let mut children = children.into_iter();
        let first = children.next().ok_or_else(|| {
            CommonError::native_error(format!("{}() needs at least one operand", name))
        })?;
        Ok(children.fold(first, |acc, next| {
            Arc::new(BinaryExpr::new(acc, op, next)) as Arc<dyn PhysicalExpr>
        }))
    }
}

fn binary_operator(name: &str) -> Option<Operator> {
    let op = match name {
        functions::EQUAL => Operator::Eq,
        functions::LESS_THAN => Operator::Lt,
        functions::LESS_THAN_OR_EQUAL_TO => Operator::LtEq,
        functions::GREATER_THAN => Operator::Gt,
        functions::GREATER_THAN_OR_EQUAL_TO => Operator::GtEq,
        functions::ADD => Operator::Plus,
        functions::SUBTRACT => Operator::Minus,
        functions::MULTIPLY => Operator::Multiply,
        functions::DIVIDE => Operator::Divide,
        functions::MOD => Operator::Modulo,
        _ => return None,
    };
    Some(op)
}

fn arity_error(name: &str, expected: usize, actual: usize) -> CommonError {
    CommonError::native_error(format!(
        "Native function '{}' takes {} operands, got {}",
        name, expected, actual
    ))
}

impl TreeBuilder for PhysicalExprBuilder {
    type Node = Arc<dyn PhysicalExpr>;

    fn make_field(&self, index: usize, field: &Field) -> Result<Self::Node> {
        Ok(Arc::new(ColumnExpr::new(&field.name, index)))
    }

    fn make_literal(&self, literal: &Literal) -> Result<Self::Node> {
        Ok(Arc::new(LiteralExpr::new(literal.to_scalar_value()?)))
    }

    fn make_and(&self, children: Vec<Self::Node>) -> Result<Self::Node> {
        self.fold("and", Operator::And, children)
    }

    fn make_or(&self, children: Vec<Self::Node>) -> Result<Self::Node> {
        self.fold("or", Operator::Or, children)
    }

    fn make_function(
        &self,
        name: &str,
        children: Vec<Self::Node>,
        _return_type: &DataType,
    ) -> Result<Self::Node> {
        if let Some(op) = binary_operator(name) {
            let count = children.len();
            let [left, right]: [Self::Node; 2] = children
                .try_into()
                .map_err(|_| arity_error(name, 2, count))?;
            return Ok(Arc::new(BinaryExpr::new(left, op, right)));
        }

        let count = children.len();
        let [child]: [Self::Node; 1] = match name {
            functions::NOT | functions::IS_NULL | functions::IS_NOT_NULL => children
                .try_into()
                .map_err(|_| arity_error(name, 1, count))?,
            _ => {
                return Err(CommonError::native_error(format!(
                    "Unknown native function '{}'",
                    name
                )));
            }
        };
        let node: Self::Node = match name {
            functions::NOT => Arc::new(NotExpr::new(child)),
            functions::IS_NULL => Arc::new(IsNullExpr::new(child)),
            _ => Arc::new(IsNotNullExpr::new(child)),
        };
        Ok(node)
    }
}
