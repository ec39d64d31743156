//! Lowering of analysed expressions into native function trees.
//!
//! Compilation is a post-order walk: every operand is lowered before the node
//! that consumes it, so a builder only ever sees children it produced itself.
//! Which native construct an operator becomes is decided by a single dispatch
//! table, [`lower_binary`] / [`lower_unary`]; an operator without a row there
//! fails the whole compilation with `UnsupportedOperatorError`.

use nativesql_common::error::{CommonError, Result};
use tracing::{debug, trace};

use crate::expression::{BinaryOperator, Expr, UnaryOperator};
use crate::native::functions;
use crate::native::{ExpressionTree, TreeBuilder, TreeNodeBuilder};
use crate::types::{DataType, Field};

/// Result type recorded on an emitted function node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultType {
    Boolean,
    /// The operator's declared type, taken from its left operand.
    Declared,
}

/// How one operator is expressed natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lowering {
    Conjunction,
    Disjunction,
    Function {
        name: &'static str,
        result: ResultType,
    },
}

const fn predicate(name: &'static str) -> Lowering {
    Lowering::Function {
        name,
        result: ResultType::Boolean,
    }
}

const fn arithmetic(name: &'static str) -> Lowering {
    Lowering::Function {
        name,
        result: ResultType::Declared,
    }
}

fn lower_binary(op: BinaryOperator) -> Option<Lowering> {
    let lowering = match op {
        BinaryOperator::And => Lowering::Conjunction,
        BinaryOperator::Or => Lowering::Disjunction,
        // Null-safe equality shares the plain equality kernel, so two NULL
        // operands yield NULL rather than true.
        BinaryOperator::EqualTo | BinaryOperator::EqualNullSafe => predicate(functions::EQUAL),
        BinaryOperator::LessThan => predicate(functions::LESS_THAN),
        BinaryOperator::LessThanOrEqual => predicate(functions::LESS_THAN_OR_EQUAL_TO),
        BinaryOperator::GreaterThan => predicate(functions::GREATER_THAN),
        BinaryOperator::GreaterThanOrEqual => predicate(functions::GREATER_THAN_OR_EQUAL_TO),
        BinaryOperator::Add => arithmetic(functions::ADD),
        BinaryOperator::Subtract => arithmetic(functions::SUBTRACT),
        BinaryOperator::Multiply => arithmetic(functions::MULTIPLY),
        BinaryOperator::Divide => arithmetic(functions::DIVIDE),
        BinaryOperator::Remainder => arithmetic(functions::MOD),
        BinaryOperator::BitwiseAnd | BinaryOperator::BitwiseOr | BinaryOperator::BitwiseXor => {
            return None;
        }
    };
    Some(lowering)
}

fn lower_unary(op: UnaryOperator) -> Option<Lowering> {
    match op {
        UnaryOperator::Not => Some(predicate(functions::NOT)),
        UnaryOperator::IsNull => Some(predicate(functions::IS_NULL)),
        UnaryOperator::IsNotNull => Some(predicate(functions::IS_NOT_NULL)),
        UnaryOperator::BitwiseNot => None,
    }
}

/// Expressions that can be lowered through a [`TreeBuilder`].
pub trait ColumnarExpression {
    /// Lower `self` against the ordered input `fields`, returning the native
    /// node and its result type.
    fn compile<B: TreeBuilder>(&self, builder: &B, fields: &[Field])
    -> Result<(B::Node, DataType)>;
}

impl ColumnarExpression for Expr {
    fn compile<B: TreeBuilder>(
        &self,
        builder: &B,
        fields: &[Field],
    ) -> Result<(B::Node, DataType)> {
        match self {
            Expr::BoundReference {
                ordinal, data_type, ..
            } => {
                let field = fields.get(*ordinal).ok_or_else(|| {
                    CommonError::unresolved_reference_error(format!(
                        "{} is out of range for {} input fields",
                        self,
                        fields.len()
                    ))
                })?;
                let node = builder
                    .make_field(*ordinal, field)
                    .map_err(|e| e.with_context_prefix(self.to_string()))?;
                Ok((node, *data_type))
            }
            Expr::Column { name } => {
                let (index, field) = fields
                    .iter()
                    .enumerate()
                    .find(|(_, field)| field.name == *name)
                    .ok_or_else(|| {
                        CommonError::unresolved_reference_error(format!(
                            "column '{}' not found among [{}]",
                            name,
                            fields
                                .iter()
                                .map(|f| f.name.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))
                    })?;
                let node = builder
                    .make_field(index, field)
                    .map_err(|e| e.with_context_prefix(self.to_string()))?;
                Ok((node, field.data_type))
            }
            Expr::Literal(literal) => {
                let node = builder
                    .make_literal(literal)
                    .map_err(|e| e.with_context_prefix(self.to_string()))?;
                Ok((node, literal.data_type()))
            }
            Expr::Binary { op, left, right } => {
                let lowering = lower_binary(*op)
                    .ok_or_else(|| CommonError::unsupported_operator_error(self.to_string()))?;
                let (left, left_type) = left.compile(builder, fields)?;
                let (right, _) = right.compile(builder, fields)?;
                self.emit(builder, lowering, vec![left, right], left_type)
            }
            Expr::Unary { op, child } => {
                let lowering = lower_unary(*op)
                    .ok_or_else(|| CommonError::unsupported_operator_error(self.to_string()))?;
                let (child, child_type) = child.compile(builder, fields)?;
                self.emit(builder, lowering, vec![child], child_type)
            }
        }
    }
}

impl Expr {
    fn emit<B: TreeBuilder>(
        &self,
        builder: &B,
        lowering: Lowering,
        children: Vec<B::Node>,
        operand_type: DataType,
    ) -> Result<(B::Node, DataType)> {
        let (node, data_type) = match lowering {
            Lowering::Conjunction => (builder.make_and(children), DataType::Boolean),
            Lowering::Disjunction => (builder.make_or(children), DataType::Boolean),
            Lowering::Function { name, result } => {
                let data_type = match result {
                    ResultType::Boolean => DataType::Boolean,
                    ResultType::Declared => self.data_type().unwrap_or(operand_type),
                };
                (
                    builder.make_function(name, children, &data_type),
                    data_type,
                )
            }
        };
        trace!("Lowered {} as {:?} returning {}", self, lowering, data_type);
        let node = node.map_err(|e| e.with_context_prefix(self.to_string()))?;
        Ok((node, data_type))
    }
}

/// Compiles expressions with a fixed builder.
#[derive(Debug, Clone, Default)]
pub struct ExpressionCompiler<B> {
    builder: B,
}

impl<B: TreeBuilder> ExpressionCompiler<B> {
    pub fn new(builder: B) -> Self {
        Self { builder }
    }

    /// Lower `expr` against the ordered input `fields`.
    pub fn compile(&self, expr: &Expr, fields: &[Field]) -> Result<(B::Node, DataType)> {
        let (node, data_type) = expr.compile(&self.builder, fields)?;
        debug!("Compiled {} to a native tree returning {}", expr, data_type);
        Ok((node, data_type))
    }
}

impl ExpressionCompiler<TreeNodeBuilder> {
    /// Compile into a self-describing tree with a named result field.
    pub fn compile_tree(
        &self,
        expr: &Expr,
        fields: &[Field],
        result_name: &str,
    ) -> Result<ExpressionTree> {
        let (root, _) = self.compile(expr, fields)?;
        Ok(ExpressionTree::new(root, result_name))
    }
}
