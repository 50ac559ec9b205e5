//! Runtime values and their declared types.
//!
//! Comparison helpers follow SQL three-valued NULL semantics: NULL is equal
//! to NULL, and ordered comparisons involving NULL never hold.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::entity::SharedInstance;

/// A runtime value read from or written to an entity.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Timestamp (microseconds since Unix epoch).
    Timestamp(i64),
    /// An in-memory reference to a related entity instance.
    ///
    /// Never crosses the storage port directly; it binds as the related
    /// instance's primary-key value.
    Entity(SharedInstance),
}

/// Declared value type of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ValueType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// Fixed-precision decimal.
    Decimal,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Timestamp.
    Timestamp,
    /// A related entity type.
    Entity,
}

/// SQL column types produced by the fixed type map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// BOOLEAN column.
    Boolean,
    /// INT column.
    Int,
    /// BIGINT column.
    Bigint,
    /// DECIMAL column.
    Decimal,
    /// VARCHAR column.
    Varchar,
    /// BLOB column.
    Blob,
    /// TIMESTAMP column.
    Timestamp,
}

impl ValueType {
    /// Map a declared type onto its SQL column type.
    ///
    /// Entity-typed keys have no direct mapping; their column takes the type
    /// of the referenced table's primary key and is resolved by the
    /// metamodel builder.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            ValueType::Bool => Some(SqlType::Boolean),
            ValueType::Int32 => Some(SqlType::Int),
            ValueType::Int64 => Some(SqlType::Bigint),
            ValueType::Float64 | ValueType::Decimal => Some(SqlType::Decimal),
            ValueType::String => Some(SqlType::Varchar),
            ValueType::Bytes => Some(SqlType::Blob),
            ValueType::Timestamp => Some(SqlType::Timestamp),
            ValueType::Entity => None,
        }
    }

    /// Check if the type accepts text operators.
    pub fn is_text(&self) -> bool {
        matches!(self, ValueType::String)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::Int => "INT",
            SqlType::Bigint => "BIGINT",
            SqlType::Decimal => "DECIMAL",
            SqlType::Varchar => "VARCHAR",
            SqlType::Blob => "BLOB",
            SqlType::Timestamp => "TIMESTAMP",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Check for the NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The declared type this runtime value conforms to, if any.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int32(_) => Some(ValueType::Int32),
            Value::Int64(_) => Some(ValueType::Int64),
            Value::Float64(_) => Some(ValueType::Float64),
            Value::String(_) => Some(ValueType::String),
            Value::Bytes(_) => Some(ValueType::Bytes),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
            Value::Entity(_) => Some(ValueType::Entity),
        }
    }

    /// Flatten the value for parameter binding.
    ///
    /// Entity references bind as the related instance's primary-key value;
    /// everything else binds as-is.
    pub fn bind(&self) -> Value {
        match self {
            Value::Entity(instance) => instance.borrow().primary_key_value(),
            other => other.clone(),
        }
    }

    /// Hash the value as an identity-map key component.
    ///
    /// Only scalar values participate; floats hash by bit pattern.
    pub(crate) fn identity_hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(v) => v.hash(state),
            Value::Int32(v) => i64::from(*v).hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float64(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
            Value::Entity(instance) => instance.borrow().primary_key_value().identity_hash(state),
        }
    }
}

/// Check if two values are equal.
///
/// NULL equals NULL; cross-width numeric comparisons coerce.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int32(a), Value::Int32(b)) => a == b,
        (Value::Int64(a), Value::Int64(b)) => a == b,
        (Value::Int32(a), Value::Int64(b)) => i64::from(*a) == *b,
        (Value::Int64(a), Value::Int32(b)) => *a == i64::from(*b),
        (Value::Float64(a), Value::Float64(b)) => a == b,
        (Value::Int32(a), Value::Float64(b)) => f64::from(*a) == *b,
        (Value::Float64(a), Value::Int32(b)) => *a == f64::from(*b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
        (Value::Entity(a), Value::Entity(b)) => {
            std::rc::Rc::ptr_eq(a, b)
                || values_equal(
                    &a.borrow().primary_key_value(),
                    &b.borrow().primary_key_value(),
                )
        }
        (Value::Entity(a), b) => values_equal(&a.borrow().primary_key_value(), b),
        (a, Value::Entity(b)) => values_equal(a, &b.borrow().primary_key_value()),
        _ => false,
    }
}

/// Compare two values, returning their ordering if comparable.
///
/// NULL is never comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
        (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
        (Value::Int32(a), Value::Int64(b)) => Some(i64::from(*a).cmp(b)),
        (Value::Int64(a), Value::Int32(b)) => Some(a.cmp(&i64::from(*b))),
        (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
        (Value::Int32(a), Value::Float64(b)) => f64::from(*a).partial_cmp(b),
        (Value::Float64(a), Value::Int32(b)) => a.partial_cmp(&f64::from(*b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Bytes(v) => write!(f, "bytes[{}]", v.len()),
            Value::Timestamp(v) => write!(f, "ts({v})"),
            Value::Entity(instance) => {
                let inner = instance.borrow();
                write!(
                    f,
                    "{}[{}]",
                    inner.table().name(),
                    inner.primary_key_value()
                )
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
