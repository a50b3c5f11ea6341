//! Values exchanged with the store, bind type hints and result rows.

use std::collections::HashMap;
use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

use crate::error::{MapperError, Result};

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

/// Explicit bind type, used when the runtime kind of a value is not the
/// type the placeholder should receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Null,
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Bind type inferred from the runtime kind of the value.
    pub fn param_type(&self) -> ParamType {
        match self {
            Value::Null => ParamType::Null,
            Value::Integer(_) => ParamType::Integer,
            Value::Real(_) => ParamType::Real,
            Value::Text(_) => ParamType::Text,
            Value::Blob(_) => ParamType::Blob,
            Value::Boolean(_) => ParamType::Boolean,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// SQLite has no boolean storage class, so integers read back from a
    /// boolean column are accepted as well.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Convert the value to the given bind type.
    ///
    /// Null stays null whatever the hint; a `Null` hint always yields null.
    pub fn coerce(self, target: ParamType) -> Result<Value> {
        if self.is_null() || target == ParamType::Null {
            return Ok(Value::Null);
        }
        if self.param_type() == target {
            return Ok(self);
        }

        let converted = match (target, &self) {
            (ParamType::Integer, Value::Boolean(b)) => Some(Value::Integer(i64::from(*b))),
            // i64::MAX is not representable as f64; 2^63 is the first value out of range.
            (ParamType::Integer, Value::Real(f))
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(Value::Integer(*f as i64))
            }
            (ParamType::Integer, Value::Text(s)) => s.trim().parse().ok().map(Value::Integer),

            (ParamType::Real, Value::Integer(i)) => Some(Value::Real(*i as f64)),
            (ParamType::Real, Value::Boolean(b)) => Some(Value::Real(if *b { 1.0 } else { 0.0 })),
            (ParamType::Real, Value::Text(s)) => s.trim().parse().ok().map(Value::Real),

            (ParamType::Text, Value::Integer(i)) => Some(Value::Text(i.to_string())),
            (ParamType::Text, Value::Real(f)) => Some(Value::Text(f.to_string())),
            (ParamType::Text, Value::Boolean(b)) => {
                Some(Value::Text(if *b { "1" } else { "0" }.to_string()))
            }
            (ParamType::Text, Value::Blob(bytes)) => {
                String::from_utf8(bytes.clone()).ok().map(Value::Text)
            }

            (ParamType::Blob, Value::Text(s)) => Some(Value::Blob(s.as_bytes().to_vec())),

            (ParamType::Boolean, Value::Integer(i)) => Some(Value::Boolean(*i != 0)),
            (ParamType::Boolean, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Some(Value::Boolean(true)),
                "0" | "false" => Some(Value::Boolean(false)),
                _ => None,
            },

            _ => None,
        };

        converted.ok_or_else(|| {
            MapperError::Bind(format!("cannot bind {self} as {target:?}"))
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a stored [`Value`] into a Rust field type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;

    /// Value to use when the column is absent from the row, e.g. when a
    /// select named only some of the fields.
    fn from_missing() -> Option<Self> {
        None
    }
}

fn mismatch<T>(value: &Value, expected: &str) -> Result<T> {
    Err(MapperError::Conversion(format!(
        "expected {expected}, found {value}"
    )))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }

    fn from_missing() -> Option<Self> {
        Some(Value::Null)
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().map_or_else(|| mismatch(value, "integer"), Ok)
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide)
            .map_err(|_| MapperError::Conversion(format!("{wide} does not fit in i32")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().map_or_else(|| mismatch(value, "real"), Ok)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().map_or_else(|| mismatch(value, "boolean"), Ok)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => mismatch(other, "text"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            other => mismatch(other, "blob"),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn from_missing() -> Option<Self> {
        Some(None)
    }
}

/// One result row: column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Typed access by exact column name.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        match self.values.get(column) {
            Some(value) => T::from_value(value).map_err(|err| match err {
                MapperError::Conversion(msg) => {
                    MapperError::Conversion(format!("column `{column}`: {msg}"))
                }
                other => other,
            }),
            None => T::from_missing().ok_or_else(|| {
                MapperError::Conversion(format!("column `{column}` is not in the result"))
            }),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.values
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
