//! Cell value representations.
//!
//! Two layers meet here:
//!
//! - [`SqlValue`]: the driver-native form a session reads from a cursor or
//!   binds into a statement.
//! - [`Value`]: the canonical form written to and read from catalog entries.
//!   It carries no vendor type, only whether the payload is text or bytes.
//!
//! The access layer (`crate::access`) moves values between the two.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type hint for NULL values so drivers can bind a typed NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// Driver-native value.
///
/// `Cow` payloads let drivers lend buffers while a row is being converted;
/// use [`SqlValue::into_owned`] before the value outlives its source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with type hint for correct parameter binding.
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
    Uuid(Uuid),
    Decimal(Decimal),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null(t) => SqlValue::Null(t),
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I16(v) => SqlValue::I16(v),
            SqlValue::I32(v) => SqlValue::I32(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::F32(v) => SqlValue::F32(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            SqlValue::Uuid(v) => SqlValue::Uuid(v),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::DateTimeOffset(v) => SqlValue::DateTimeOffset(v),
            SqlValue::Date(v) => SqlValue::Date(v),
            SqlValue::Time(v) => SqlValue::Time(v),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Text rendering used by metadata readers; `None` for NULL.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        Some(match self {
            SqlValue::Null(_) => return None,
            SqlValue::Text(v) => Cow::Borrowed(v.as_ref()),
            SqlValue::Bytes(v) => String::from_utf8_lossy(v),
            SqlValue::Bool(v) => Cow::Owned(v.to_string()),
            SqlValue::I16(v) => Cow::Owned(v.to_string()),
            SqlValue::I32(v) => Cow::Owned(v.to_string()),
            SqlValue::I64(v) => Cow::Owned(v.to_string()),
            SqlValue::F32(v) => Cow::Owned(v.to_string()),
            SqlValue::F64(v) => Cow::Owned(v.to_string()),
            SqlValue::Uuid(v) => Cow::Owned(v.to_string()),
            SqlValue::Decimal(v) => Cow::Owned(v.to_string()),
            SqlValue::DateTime(v) => Cow::Owned(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            SqlValue::DateTimeOffset(v) => {
                Cow::Owned(v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string())
            }
            SqlValue::Date(v) => Cow::Owned(v.format("%Y-%m-%d").to_string()),
            SqlValue::Time(v) => Cow::Owned(v.format("%H:%M:%S%.f").to_string()),
        })
    }

    /// Integer view of numeric and numeric-text values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Bool(v) => Some(i64::from(*v)),
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Decimal(v) => v.trunc().to_string().parse().ok(),
            SqlValue::F32(v) => Some(*v as i64),
            SqlValue::F64(v) => Some(*v as i64),
            SqlValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue<'static> {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue<'static> {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue<'static> {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl From<Vec<u8>> for SqlValue<'static> {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(Cow::Owned(v))
    }
}

/// Declared payload variant of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    String,
    Binary,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Binary => "binary",
        }
    }

    /// Parse a variant alias; absent or unknown aliases fall back to STRING.
    pub fn from_alias(alias: Option<&str>) -> Self {
        match alias.map(str::to_ascii_lowercase).as_deref() {
            Some("binary") => ValueType::Binary,
            _ => ValueType::String,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical decoded cell.
///
/// Numeric and temporal cells travel as their canonical text rendering; the
/// access layer parses them back using the target column's type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    String(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Value::Binary(value.into())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(ValueType::String),
            Value::Binary(_) => Some(ValueType::Binary),
        }
    }

    /// Text view; binary payloads are decoded as UTF-8 when possible.
    pub fn as_str(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s)),
            Value::Binary(b) => Some(String::from_utf8_lossy(b)),
        }
    }

    /// Byte view; string payloads are returned as their UTF-8 bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.as_bytes()),
            Value::Binary(b) => Some(b),
        }
    }
}
