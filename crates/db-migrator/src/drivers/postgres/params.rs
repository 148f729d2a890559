//! Binding [`SqlValue`]s to PostgreSQL parameters and reading result cells.
//!
//! Parameters are encoded for the type the server inferred when the
//! statement was prepared, so a text value bound to an `int4` placeholder is
//! parsed here rather than rejected by the server.

use std::borrow::Cow;
use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

use crate::core::types::JdbcTypeDesc;
use crate::core::value::{SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

type BoxError = Box<dyn Error + Sync + Send>;

/// A bound parameter.
#[derive(Debug)]
pub(super) struct PgParam<'a>(pub &'a SqlValue<'static>);

fn mismatch(value: &SqlValue<'_>, ty: &Type) -> BoxError {
    format!("cannot bind {:?} as {}", value, ty.name()).into()
}

fn parse<T: FromStr>(text: &str, value: &SqlValue<'_>, ty: &Type) -> std::result::Result<T, BoxError> {
    text.trim().parse().map_err(|_| mismatch(value, ty))
}

fn as_bool(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<bool, BoxError> {
    match value {
        SqlValue::Bool(b) => Ok(*b),
        SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "1" => Ok(true),
            "f" | "false" | "n" | "no" | "0" => Ok(false),
            _ => Err(mismatch(value, ty)),
        },
        other => other.as_i64().map(|v| v != 0).ok_or_else(|| mismatch(value, ty)),
    }
}

fn as_i64(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<i64, BoxError> {
    value.as_i64().ok_or_else(|| mismatch(value, ty))
}

fn as_f64(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<f64, BoxError> {
    match value {
        SqlValue::F32(v) => Ok(f64::from(*v)),
        SqlValue::F64(v) => Ok(*v),
        SqlValue::Decimal(d) => parse(&d.to_string(), value, ty),
        SqlValue::Text(s) => parse(s, value, ty),
        other => other.as_i64().map(|v| v as f64).ok_or_else(|| mismatch(value, ty)),
    }
}

fn as_decimal(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<Decimal, BoxError> {
    match value {
        SqlValue::Decimal(d) => Ok(*d),
        SqlValue::F32(v) => Decimal::try_from(*v).map_err(|_| mismatch(value, ty)),
        SqlValue::F64(v) => Decimal::try_from(*v).map_err(|_| mismatch(value, ty)),
        SqlValue::Text(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .map_err(|_| mismatch(value, ty)),
        other => other.as_i64().map(Decimal::from).ok_or_else(|| mismatch(value, ty)),
    }
}

fn as_datetime(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<NaiveDateTime, BoxError> {
    match value {
        SqlValue::DateTime(v) => Ok(*v),
        SqlValue::DateTimeOffset(v) => Ok(v.naive_local()),
        SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
        SqlValue::Text(s) => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s.trim(), f).ok())
            .ok_or_else(|| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

fn as_datetime_offset(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<DateTime<FixedOffset>, BoxError> {
    match value {
        SqlValue::DateTimeOffset(v) => Ok(*v),
        SqlValue::DateTime(v) => Ok(Utc.from_utc_datetime(v).fixed_offset()),
        SqlValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .or_else(|_| DateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f%:z"))
            .map_err(|_| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

fn as_date(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<NaiveDate, BoxError> {
    match value {
        SqlValue::Date(d) => Ok(*d),
        SqlValue::DateTime(v) => Ok(v.date()),
        SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

fn as_time(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<NaiveTime, BoxError> {
    match value {
        SqlValue::Time(t) => Ok(*t),
        SqlValue::DateTime(v) => Ok(v.time()),
        SqlValue::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").map_err(|_| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

fn as_uuid(value: &SqlValue<'_>, ty: &Type) -> std::result::Result<Uuid, BoxError> {
    match value {
        SqlValue::Uuid(u) => Ok(*u),
        SqlValue::Bytes(b) => Uuid::from_slice(b).map_err(|_| mismatch(value, ty)),
        SqlValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| mismatch(value, ty)),
        _ => Err(mismatch(value, ty)),
    }
}

/// Types whose binary wire form is their UTF-8 text.
fn is_textual(ty: &Type) -> bool {
    <String as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_))
}

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }
        match *ty {
            Type::BOOL => as_bool(value, ty)?.to_sql(ty, out),
            Type::CHAR => i8::try_from(as_i64(value, ty)?)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(as_i64(value, ty)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(as_i64(value, ty)?)?.to_sql(ty, out),
            Type::INT8 => as_i64(value, ty)?.to_sql(ty, out),
            Type::OID => u32::try_from(as_i64(value, ty)?)?.to_sql(ty, out),
            Type::FLOAT4 => (as_f64(value, ty)? as f32).to_sql(ty, out),
            Type::FLOAT8 => as_f64(value, ty)?.to_sql(ty, out),
            Type::NUMERIC => as_decimal(value, ty)?.to_sql(ty, out),
            Type::TIMESTAMP => as_datetime(value, ty)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => as_datetime_offset(value, ty)?.to_sql(ty, out),
            Type::DATE => as_date(value, ty)?.to_sql(ty, out),
            Type::TIME => as_time(value, ty)?.to_sql(ty, out),
            Type::UUID => as_uuid(value, ty)?.to_sql(ty, out),
            Type::BYTEA => match value {
                SqlValue::Bytes(b) => {
                    let bytes: &[u8] = b;
                    bytes.to_sql(ty, out)
                }
                SqlValue::Text(s) => s.as_bytes().to_sql(ty, out),
                other => Err(mismatch(other, ty)),
            },
            Type::JSON | Type::JSONB => {
                let text = value.as_text().ok_or_else(|| mismatch(value, ty))?;
                serde_json::from_str::<serde_json::Value>(&text)?.to_sql(ty, out)
            }
            _ if is_textual(ty) => {
                let text = value.as_text().ok_or_else(|| mismatch(value, ty))?;
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            _ => Err(mismatch(value, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Text of a textual column, including enums.
struct RawText(String);

impl<'a> FromSql<'a> for RawText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(RawText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        is_textual(ty)
    }
}

/// Descriptor reported for a result column of type `ty`.
pub(super) fn type_desc(ty: &Type) -> JdbcTypeDesc {
    if matches!(ty.kind(), Kind::Enum(_)) {
        return JdbcTypeDesc::from_type_name("varchar");
    }
    JdbcTypeDesc::from_type_name(ty.name())
}

fn null_type(ty: &Type) -> SqlNullType {
    match *ty {
        Type::BOOL => SqlNullType::Bool,
        Type::INT2 => SqlNullType::I16,
        Type::INT4 => SqlNullType::I32,
        Type::INT8 | Type::OID => SqlNullType::I64,
        Type::FLOAT4 => SqlNullType::F32,
        Type::FLOAT8 => SqlNullType::F64,
        Type::NUMERIC => SqlNullType::Decimal,
        Type::TIMESTAMP => SqlNullType::DateTime,
        Type::TIMESTAMPTZ => SqlNullType::DateTimeOffset,
        Type::DATE => SqlNullType::Date,
        Type::TIME => SqlNullType::Time,
        Type::UUID => SqlNullType::Uuid,
        Type::BYTEA => SqlNullType::Bytes,
        _ => SqlNullType::String,
    }
}

fn cell<'a, T, F>(row: &'a tokio_postgres::Row, idx: usize, ty: &Type, wrap: F) -> Result<SqlValue<'static>>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue<'static>,
{
    let value = row
        .try_get::<_, Option<T>>(idx)
        .map_err(|e| MigrateError::access(&type_desc(ty), e.to_string()))?;
    Ok(value.map(wrap).unwrap_or(SqlValue::Null(null_type(ty))))
}

/// Read cell `idx` of `row` as a driver-native value.
pub(super) fn read_cell(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<SqlValue<'static>> {
    match *ty {
        Type::BOOL => cell(row, idx, ty, SqlValue::Bool),
        Type::CHAR => cell(row, idx, ty, |v: i8| SqlValue::Text(Cow::Owned(char::from(v as u8).to_string()))),
        Type::INT2 => cell(row, idx, ty, SqlValue::I16),
        Type::INT4 => cell(row, idx, ty, SqlValue::I32),
        Type::INT8 => cell(row, idx, ty, SqlValue::I64),
        Type::OID => cell(row, idx, ty, |v: u32| SqlValue::I64(i64::from(v))),
        Type::FLOAT4 => cell(row, idx, ty, SqlValue::F32),
        Type::FLOAT8 => cell(row, idx, ty, SqlValue::F64),
        Type::NUMERIC => cell(row, idx, ty, SqlValue::Decimal),
        Type::TIMESTAMP => cell(row, idx, ty, SqlValue::DateTime),
        Type::TIMESTAMPTZ => cell(row, idx, ty, |v: DateTime<FixedOffset>| SqlValue::DateTimeOffset(v)),
        Type::DATE => cell(row, idx, ty, SqlValue::Date),
        Type::TIME => cell(row, idx, ty, SqlValue::Time),
        Type::UUID => cell(row, idx, ty, SqlValue::Uuid),
        Type::BYTEA => cell(row, idx, ty, |v: Vec<u8>| SqlValue::Bytes(Cow::Owned(v))),
        Type::JSON | Type::JSONB => cell(row, idx, ty, |v: serde_json::Value| {
            SqlValue::Text(Cow::Owned(v.to_string()))
        }),
        _ if is_textual(ty) => cell(row, idx, ty, |v: RawText| SqlValue::Text(Cow::Owned(v.0))),
        _ => Err(MigrateError::access(
            &type_desc(ty),
            "PostgreSQL type has no driver mapping; cast it to text in the query",
        )),
    }
}
