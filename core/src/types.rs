//! Data types carried by expressions and native tree nodes.
//!
//! This is the subset of the Arrow type system the native engine accepts.
//! Every node of a compiled tree records one of these as its result type.

use std::fmt::{self, Display};
use std::sync::Arc;

use datafusion::arrow::datatypes::{
    DataType as ArrowDataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef, TimeUnit,
};
use nativesql_common::error::{CommonError, Result};
use serde::{Deserialize, Serialize};

/// Semantic result type of an expression or native node.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal128 { precision: u8, scale: i8 },
    Utf8,
    Binary,
    Date32,
    /// Microseconds since the epoch, no time zone.
    TimestampMicros,
}

impl DataType {
    pub fn to_arrow(&self) -> ArrowDataType {
        match self {
            DataType::Null => ArrowDataType::Null,
            DataType::Boolean => ArrowDataType::Boolean,
            DataType::Int8 => ArrowDataType::Int8,
            DataType::Int16 => ArrowDataType::Int16,
            DataType::Int32 => ArrowDataType::Int32,
            DataType::Int64 => ArrowDataType::Int64,
            DataType::Float32 => ArrowDataType::Float32,
            DataType::Float64 => ArrowDataType::Float64,
            DataType::Decimal128 { precision, scale } => {
                ArrowDataType::Decimal128(*precision, *scale)
            }
            DataType::Utf8 => ArrowDataType::Utf8,
            DataType::Binary => ArrowDataType::Binary,
            DataType::Date32 => ArrowDataType::Date32,
            DataType::TimestampMicros => ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }

    /// Map an Arrow type into the supported subset.
    pub fn try_from_arrow(data_type: &ArrowDataType) -> Result<Self> {
        let data_type = match data_type {
            ArrowDataType::Null => DataType::Null,
            ArrowDataType::Boolean => DataType::Boolean,
            ArrowDataType::Int8 => DataType::Int8,
            ArrowDataType::Int16 => DataType::Int16,
            ArrowDataType::Int32 => DataType::Int32,
            ArrowDataType::Int64 => DataType::Int64,
            ArrowDataType::Float32 => DataType::Float32,
            ArrowDataType::Float64 => DataType::Float64,
            ArrowDataType::Decimal128(precision, scale) => DataType::Decimal128 {
                precision: *precision,
                scale: *scale,
            },
            ArrowDataType::Utf8 => DataType::Utf8,
            ArrowDataType::Binary => DataType::Binary,
            ArrowDataType::Date32 => DataType::Date32,
            ArrowDataType::Timestamp(TimeUnit::Microsecond, None) => DataType::TimestampMicros,
            other => {
                return Err(CommonError::unsupported_type_error(format!(
                    "{} has no native representation",
                    other
                )));
            }
        };
        Ok(data_type)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Int8 => write!(f, "tinyint"),
            DataType::Int16 => write!(f, "smallint"),
            DataType::Int32 => write!(f, "int"),
            DataType::Int64 => write!(f, "bigint"),
            DataType::Float32 => write!(f, "float"),
            DataType::Float64 => write!(f, "double"),
            DataType::Decimal128 { precision, scale } => {
                write!(f, "decimal({},{})", precision, scale)
            }
            DataType::Utf8 => write!(f, "string"),
            DataType::Binary => write!(f, "binary"),
            DataType::Date32 => write!(f, "date"),
            DataType::TimestampMicros => write!(f, "timestamp"),
        }
    }
}

/// A field-type descriptor: one column of the input schema.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn to_arrow(&self) -> ArrowField {
        ArrowField::new(&self.name, self.data_type.to_arrow(), self.nullable)
    }

    pub fn try_from_arrow(field: &ArrowField) -> Result<Self> {
        Ok(Self {
            name: field.name().clone(),
            data_type: DataType::try_from_arrow(field.data_type())?,
            nullable: field.is_nullable(),
        })
    }
}

/// Convert an ordered field list into an Arrow schema.
pub fn to_arrow_schema(fields: &[Field]) -> SchemaRef {
    Arc::new(ArrowSchema::new(
        fields.iter().map(Field::to_arrow).collect::<Vec<_>>(),
    ))
}

/// Convert an Arrow schema into an ordered field list.
pub fn fields_from_arrow(schema: &ArrowSchema) -> Result<Vec<Field>> {
    schema
        .fields()
        .iter()
        .map(|field| Field::try_from_arrow(field))
        .collect()
}
