//! Logical expression trees handed to the native compiler.
//!
//! Expressions arrive already analysed: references are typed and operand
//! types are compatible. Trees are immutable once built.

use std::fmt::{self, Display};

use datafusion::common::ScalarValue;
use nativesql_common::error::{CommonError, Result};
use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "camelCase")]
pub enum Literal {
    /// A NULL of the given type.
    Null(DataType),
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Decimal128 {
        value: i128,
        precision: u8,
        scale: i8,
    },
    Utf8(String),
    Binary(Vec<u8>),
    /// Days since the epoch.
    Date32(i32),
    /// Microseconds since the epoch.
    TimestampMicros(i64),
}

impl Literal {
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Null(data_type) => *data_type,
            Literal::Boolean(_) => DataType::Boolean,
            Literal::Int8(_) => DataType::Int8,
            Literal::Int16(_) => DataType::Int16,
            Literal::Int32(_) => DataType::Int32,
            Literal::Int64(_) => DataType::Int64,
            Literal::Float32(_) => DataType::Float32,
            Literal::Float64(_) => DataType::Float64,
            Literal::Decimal128 {
                precision, scale, ..
            } => DataType::Decimal128 {
                precision: *precision,
                scale: *scale,
            },
            Literal::Utf8(_) => DataType::Utf8,
            Literal::Binary(_) => DataType::Binary,
            Literal::Date32(_) => DataType::Date32,
            Literal::TimestampMicros(_) => DataType::TimestampMicros,
        }
    }

    /// Convert into a DataFusion scalar for evaluation.
    pub fn to_scalar_value(&self) -> Result<ScalarValue> {
        let value = match self {
            Literal::Null(data_type) => {
                ScalarValue::try_from(&data_type.to_arrow()).map_err(|e| {
                    CommonError::unsupported_type_error_with_source(
                        format!("Cannot build a NULL of type {}", data_type),
                        e,
                    )
                })?
            }
            Literal::Boolean(v) => ScalarValue::Boolean(Some(*v)),
            Literal::Int8(v) => ScalarValue::Int8(Some(*v)),
            Literal::Int16(v) => ScalarValue::Int16(Some(*v)),
            Literal::Int32(v) => ScalarValue::Int32(Some(*v)),
            Literal::Int64(v) => ScalarValue::Int64(Some(*v)),
            Literal::Float32(v) => ScalarValue::Float32(Some(*v)),
            Literal::Float64(v) => ScalarValue::Float64(Some(*v)),
            Literal::Decimal128 {
                value,
                precision,
                scale,
            } => ScalarValue::Decimal128(Some(*value), *precision, *scale),
            Literal::Utf8(v) => ScalarValue::Utf8(Some(v.clone())),
            Literal::Binary(v) => ScalarValue::Binary(Some(v.clone())),
            Literal::Date32(v) => ScalarValue::Date32(Some(*v)),
            Literal::TimestampMicros(v) => ScalarValue::TimestampMicrosecond(Some(*v), None),
        };
        Ok(value)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null(_) => write!(f, "NULL"),
            Literal::Boolean(v) => write!(f, "{}", v),
            Literal::Int8(v) => write!(f, "{}", v),
            Literal::Int16(v) => write!(f, "{}", v),
            Literal::Int32(v) => write!(f, "{}", v),
            Literal::Int64(v) => write!(f, "{}L", v),
            Literal::Float32(v) => write!(f, "{}F", v),
            Literal::Float64(v) => write!(f, "{}D", v),
            Literal::Decimal128 { value, scale, .. } => write!(f, "{}e-{}BD", value, scale),
            Literal::Utf8(v) => write!(f, "'{}'", v),
            Literal::Binary(v) => {
                write!(f, "X'")?;
                for byte in v {
                    write!(f, "{:02X}", byte)?;
                }
                write!(f, "'")
            }
            Literal::Date32(v) => write!(f, "DATE {}", v),
            Literal::TimestampMicros(v) => write!(f, "TIMESTAMP {}", v),
        }
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Boolean(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Int32(v)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int64(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float64(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Utf8(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Utf8(v)
    }
}

/// Operators with exactly two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    And,
    Or,
    EqualTo,
    /// `<=>`: equality that treats two NULLs as equal.
    EqualNullSafe,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
}

impl BinaryOperator {
    /// Whether the operator produces a boolean regardless of operand types.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::EqualTo
                | BinaryOperator::EqualNullSafe
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::EqualTo => "=",
            BinaryOperator::EqualNullSafe => "<=>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Remainder => "%",
            BinaryOperator::BitwiseAnd => "&",
            BinaryOperator::BitwiseOr => "|",
            BinaryOperator::BitwiseXor => "^",
        }
    }
}

/// Operators with exactly one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    IsNull,
    IsNotNull,
    BitwiseNot,
}

impl UnaryOperator {
    pub fn is_predicate(&self) -> bool {
        !matches!(self, UnaryOperator::BitwiseNot)
    }
}

/// An analysed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column addressed by its position in the input fields.
    BoundReference {
        ordinal: usize,
        data_type: DataType,
        nullable: bool,
    },
    /// A column addressed by name, resolved against the input fields.
    Column { name: String },
    Literal(Literal),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOperator, child: Box<Expr> },
}

impl Expr {
    /// The declared result type of this node.
    ///
    /// `Column` carries no type of its own; it reports `None` and takes the
    /// type of the field it resolves to at compile time.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Expr::BoundReference { data_type, .. } => Some(*data_type),
            Expr::Column { .. } => None,
            Expr::Literal(literal) => Some(literal.data_type()),
            Expr::Binary { op, left, .. } => {
                if op.is_predicate() {
                    Some(DataType::Boolean)
                } else {
                    left.data_type()
                }
            }
            Expr::Unary { op, child } => {
                if op.is_predicate() {
                    Some(DataType::Boolean)
                } else {
                    child.data_type()
                }
            }
        }
    }

    /// Direct operand subtrees, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::BoundReference { .. } | Expr::Column { .. } | Expr::Literal(_) => vec![],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Unary { child, .. } => vec![child.as_ref()],
        }
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, child: Expr) -> Self {
        Expr::Unary {
            op,
            child: Box::new(child),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BoundReference { ordinal, .. } => write!(f, "input[{}]", ordinal),
            Expr::Column { name } => write!(f, "{}", name),
            Expr::Literal(literal) => write!(f, "{}", literal),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op, child } => match op {
                UnaryOperator::Not => write!(f, "(NOT {})", child),
                UnaryOperator::IsNull => write!(f, "isnull({})", child),
                UnaryOperator::IsNotNull => write!(f, "isnotnull({})", child),
                UnaryOperator::BitwiseNot => write!(f, "~{}", child),
            },
        }
    }
}

/// Reference a column by name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column { name: name.into() }
}

/// Reference a column by position.
pub fn bound(ordinal: usize, data_type: DataType, nullable: bool) -> Expr {
    Expr::BoundReference {
        ordinal,
        data_type,
        nullable,
    }
}

pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal(value.into())
}

pub fn and(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::And, left, right)
}

pub fn or(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::Or, left, right)
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::EqualTo, left, right)
}

pub fn eq_null_safe(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::EqualNullSafe, left, right)
}

pub fn lt(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::LessThan, left, right)
}

pub fn lt_eq(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::LessThanOrEqual, left, right)
}

pub fn gt(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::GreaterThan, left, right)
}

pub fn gt_eq(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOperator::GreaterThanOrEqual, left, right)
}

pub fn not(child: Expr) -> Expr {
    Expr::unary(UnaryOperator::Not, child)
}

pub fn is_null(child: Expr) -> Expr {
    Expr::unary(UnaryOperator::IsNull, child)
}

pub fn is_not_null(child: Expr) -> Expr {
    Expr::unary(UnaryOperator::IsNotNull, child)
}
