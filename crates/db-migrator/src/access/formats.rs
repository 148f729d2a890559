//! Built-in value formats, one per JDBC type family.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{AccessOptions, ValueFormat};
use crate::core::types::{type_codes, JdbcTypeDesc};
use crate::core::value::{SqlNullType, SqlValue, Value, ValueType};
use crate::error::{MigrateError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn text(value: &Value) -> Option<Cow<'_, str>> {
    value.as_str()
}

fn parse_failure(desc: &JdbcTypeDesc, input: &str, err: impl std::fmt::Display) -> MigrateError {
    MigrateError::access(desc, format!("cannot parse {:?}: {}", input, err))
}

/// Any driver value rendered as its text form.
fn text_value(value: &SqlValue<'_>) -> Value {
    match value {
        SqlValue::Bytes(b) => Value::Binary(b.to_vec()),
        other => other
            .as_text()
            .map(|s| Value::String(s.into_owned()))
            .unwrap_or(Value::Null),
    }
}

/// Fallback format: everything travels as text.
pub struct StringFormat;

impl ValueFormat for StringFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(text_value(value))
    }

    fn set_value(&self, value: &Value, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        Ok(match text(value) {
            Some(s) => SqlValue::Text(Cow::Owned(s.into_owned())),
            None => SqlValue::Null(SqlNullType::String),
        })
    }
}

pub struct BooleanFormat;

impl ValueFormat for BooleanFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(match value {
            SqlValue::Bool(b) => Value::string(b.to_string()),
            SqlValue::Bytes(b) => Value::string((b.iter().any(|byte| *byte != 0)).to_string()),
            other => match other.as_i64() {
                Some(n) => Value::string((n != 0).to_string()),
                None => text_value(other),
            },
        })
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::Bool));
        };
        match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "y" | "yes" => Ok(SqlValue::Bool(true)),
            "false" | "f" | "0" | "n" | "no" => Ok(SqlValue::Bool(false)),
            other => Err(parse_failure(desc, other, "not a boolean")),
        }
    }
}

pub struct IntegerFormat;

impl ValueFormat for IntegerFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(text_value(value))
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let null_type = match desc.type_code {
            type_codes::TINYINT | type_codes::SMALLINT => SqlNullType::I16,
            type_codes::INTEGER => SqlNullType::I32,
            _ => SqlNullType::I64,
        };
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(null_type));
        };
        let s = s.trim();
        let n: i64 = s.parse().map_err(|e| parse_failure(desc, s, e))?;
        Ok(match null_type {
            SqlNullType::I16 => SqlValue::I16(i16::try_from(n).map_err(|e| parse_failure(desc, s, e))?),
            SqlNullType::I32 => SqlValue::I32(i32::try_from(n).map_err(|e| parse_failure(desc, s, e))?),
            _ => SqlValue::I64(n),
        })
    }
}

pub struct FloatFormat;

impl ValueFormat for FloatFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(text_value(value))
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let real = desc.type_code == type_codes::REAL;
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(if real { SqlNullType::F32 } else { SqlNullType::F64 }));
        };
        let s = s.trim();
        if real {
            s.parse::<f32>().map(SqlValue::F32).map_err(|e| parse_failure(desc, s, e))
        } else {
            s.parse::<f64>().map(SqlValue::F64).map_err(|e| parse_failure(desc, s, e))
        }
    }
}

pub struct DecimalFormat;

impl ValueFormat for DecimalFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(text_value(value))
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::Decimal));
        };
        let s = s.trim();
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map(SqlValue::Decimal)
            .map_err(|e| parse_failure(desc, s, e))
    }
}

pub struct BinaryFormat;

impl ValueFormat for BinaryFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::Binary
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(match value {
            SqlValue::Null(_) => Value::Null,
            SqlValue::Bytes(b) => Value::Binary(b.to_vec()),
            SqlValue::Uuid(u) => Value::Binary(u.as_bytes().to_vec()),
            other => other
                .as_text()
                .map(|s| Value::Binary(s.as_bytes().to_vec()))
                .unwrap_or(Value::Null),
        })
    }

    fn set_value(&self, value: &Value, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        Ok(match value.as_bytes() {
            Some(b) => SqlValue::Bytes(Cow::Owned(b.to_vec())),
            None => SqlValue::Null(SqlNullType::Bytes),
        })
    }
}

pub struct DateFormat;

impl ValueFormat for DateFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(match value {
            SqlValue::DateTime(dt) => Value::string(dt.date().format(DATE_FORMAT).to_string()),
            other => text_value(other),
        })
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::Date));
        };
        let s = s.trim();
        let date_part = s.get(..10).unwrap_or(s);
        NaiveDate::parse_from_str(date_part, DATE_FORMAT)
            .map(SqlValue::Date)
            .map_err(|e| parse_failure(desc, s, e))
    }
}

pub struct TimeFormat;

impl ValueFormat for TimeFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(match value {
            SqlValue::DateTime(dt) => Value::string(dt.time().format(TIME_FORMAT).to_string()),
            other => text_value(other),
        })
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::Time));
        };
        let s = s.trim();
        NaiveTime::parse_from_str(s, TIME_FORMAT)
            .map(SqlValue::Time)
            .map_err(|e| parse_failure(desc, s, e))
    }
}

/// Parse a timestamp in either `YYYY-MM-DD HH:MM:SS[.f]` or ISO `T` form.
fn parse_timestamp(s: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|e| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map(|d| d.and_time(NaiveTime::MIN))
                .map_err(|_| e)
        })
}

pub struct TimestampFormat;

impl ValueFormat for TimestampFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, options: &AccessOptions) -> Result<Value> {
        Ok(match (value, options.time_zone) {
            (SqlValue::DateTimeOffset(dt), Some(tz)) => Value::string(
                dt.with_timezone(&tz).naive_local().format(TIMESTAMP_FORMAT).to_string(),
            ),
            (SqlValue::DateTimeOffset(dt), None) => {
                Value::string(dt.naive_local().format(TIMESTAMP_FORMAT).to_string())
            }
            (SqlValue::Date(d), _) => {
                Value::string(d.and_time(NaiveTime::MIN).format(TIMESTAMP_FORMAT).to_string())
            }
            (other, _) => text_value(other),
        })
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::DateTime));
        };
        let s = s.trim();
        parse_timestamp(s)
            .map(SqlValue::DateTime)
            .map_err(|e| parse_failure(desc, s, e))
    }
}

pub struct TimestampTzFormat;

impl ValueFormat for TimestampTzFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, options: &AccessOptions) -> Result<Value> {
        Ok(match (value, options.time_zone) {
            (SqlValue::DateTimeOffset(dt), Some(tz)) => {
                Value::string(dt.with_timezone(&tz).format(TIMESTAMP_TZ_FORMAT).to_string())
            }
            (SqlValue::DateTime(dt), Some(tz)) => Value::string(
                dt.and_utc()
                    .with_timezone(&tz)
                    .format(TIMESTAMP_TZ_FORMAT)
                    .to_string(),
            ),
            (other, _) => text_value(other),
        })
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::DateTimeOffset));
        };
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_str(s, TIMESTAMP_TZ_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(s))
        {
            return Ok(SqlValue::DateTimeOffset(dt));
        }
        // Offset-less text is read in the configured zone, UTC otherwise.
        let naive = parse_timestamp(s).map_err(|e| parse_failure(desc, s, e))?;
        let tz = options.time_zone.unwrap_or_else(super::utc);
        naive
            .and_local_timezone(tz)
            .single()
            .map(SqlValue::DateTimeOffset)
            .ok_or_else(|| parse_failure(desc, s, "ambiguous local time"))
    }
}

pub struct UuidFormat;

impl ValueFormat for UuidFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        match value {
            SqlValue::Bytes(b) => Uuid::from_slice(b)
                .map(|u| Value::string(u.to_string()))
                .map_err(|e| MigrateError::access(desc, e.to_string())),
            other => Ok(text_value(other)),
        }
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::Uuid));
        };
        let s = s.trim();
        Uuid::parse_str(s)
            .map(SqlValue::Uuid)
            .map_err(|e| parse_failure(desc, s, e))
    }
}

/// JSON documents travel as text but are validated before binding.
pub struct JsonFormat;

impl ValueFormat for JsonFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn get_value(&self, value: &SqlValue<'_>, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        Ok(text_value(value))
    }

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        let Some(s) = text(value) else {
            return Ok(SqlValue::Null(SqlNullType::String));
        };
        serde_json::from_str::<serde_json::Value>(&s).map_err(|e| parse_failure(desc, &s, e))?;
        Ok(SqlValue::Text(Cow::Owned(s.into_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn opts() -> AccessOptions {
        AccessOptions::default()
    }

    #[test]
    fn test_integer_narrowing() {
        let desc = JdbcTypeDesc::code(type_codes::SMALLINT);
        assert_eq!(
            IntegerFormat.set_value(&Value::string("12"), &desc, &opts()).unwrap(),
            SqlValue::I16(12)
        );
        assert!(IntegerFormat
            .set_value(&Value::string("70000"), &desc, &opts())
            .is_err());
        assert_eq!(
            IntegerFormat.set_value(&Value::Null, &desc, &opts()).unwrap(),
            SqlValue::Null(SqlNullType::I16)
        );
    }

    #[test]
    fn test_boolean_from_numbers() {
        let desc = JdbcTypeDesc::code(type_codes::BIT);
        assert_eq!(
            BooleanFormat.get_value(&SqlValue::I16(1), &desc, &opts()).unwrap(),
            Value::string("true")
        );
        assert_eq!(
            BooleanFormat.set_value(&Value::string("0"), &desc, &opts()).unwrap(),
            SqlValue::Bool(false)
        );
    }

    #[test]
    fn test_decimal_accepts_scientific() {
        let desc = JdbcTypeDesc::code(type_codes::DECIMAL);
        let v = DecimalFormat.set_value(&Value::string("1.5e2"), &desc, &opts()).unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::from(150)));
    }

    #[test]
    fn test_timestamp_tz_renders_in_configured_zone() {
        let desc = JdbcTypeDesc::code(type_codes::TIMESTAMP_WITH_TIMEZONE);
        let dt = DateTime::parse_from_rfc3339("2024-01-01T12:00:00+00:00").unwrap();
        let options = AccessOptions {
            time_zone: FixedOffset::east_opt(2 * 3600),
        };
        let v = TimestampTzFormat
            .get_value(&SqlValue::DateTimeOffset(dt), &desc, &options)
            .unwrap();
        assert_eq!(v, Value::string("2024-01-01 14:00:00+02:00"));
        let back = TimestampTzFormat.set_value(&v, &desc, &options).unwrap();
        assert_eq!(back, SqlValue::DateTimeOffset(dt.with_timezone(&FixedOffset::east_opt(7200).unwrap())));
    }

    #[test]
    fn test_timestamp_parses_iso_form() {
        let desc = JdbcTypeDesc::code(type_codes::TIMESTAMP);
        let v = TimestampFormat
            .set_value(&Value::string("2024-03-01T10:20:30.5"), &desc, &opts())
            .unwrap();
        match v {
            SqlValue::DateTime(dt) => assert_eq!(dt.to_string(), "2024-03-01 10:20:30.500"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_binary_keeps_bytes() {
        let desc = JdbcTypeDesc::code(type_codes::VARBINARY);
        let raw = SqlValue::Bytes(Cow::Owned(vec![0, b'<', b'&']));
        let v = BinaryFormat.get_value(&raw, &desc, &opts()).unwrap();
        assert_eq!(v, Value::binary(vec![0, b'<', b'&']));
        assert_eq!(BinaryFormat.set_value(&v, &desc, &opts()).unwrap(), raw);
    }

    #[test]
    fn test_json_is_validated() {
        let desc = JdbcTypeDesc::new(type_codes::OTHER, "JSON");
        assert!(JsonFormat.set_value(&Value::string("{\"a\":1}"), &desc, &opts()).is_ok());
        assert!(JsonFormat.set_value(&Value::string("{oops"), &desc, &opts()).is_err());
    }
}
