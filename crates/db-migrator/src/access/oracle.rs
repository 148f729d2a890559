//! Oracle `ANYDATA` support.
//!
//! An `ANYDATA` cell is dumped as the name of the type it embeds. Only
//! drivers that can report that name (`any_type_introspection`) are usable;
//! the check runs once when the accessor is built.

use std::borrow::Cow;

use super::{AccessOptions, ValueFormat};
use crate::core::session::DriverCapabilities;
use crate::core::types::{type_codes, JdbcTypeDesc};
use crate::core::value::{SqlNullType, SqlValue, Value, ValueType};
use crate::error::{MigrateError, Result};

pub const ANY_TYPE_NAME: &str = "ANYDATA";

pub fn any_type_desc() -> JdbcTypeDesc {
    JdbcTypeDesc::new(type_codes::OTHER, ANY_TYPE_NAME)
}

pub struct OracleAnyTypeFormat;

impl ValueFormat for OracleAnyTypeFormat {
    fn value_type(&self, _desc: &JdbcTypeDesc) -> ValueType {
        ValueType::String
    }

    fn negotiate(&self, desc: &JdbcTypeDesc, capabilities: &DriverCapabilities) -> Result<()> {
        if capabilities.any_type_introspection {
            Ok(())
        } else {
            Err(MigrateError::access(desc, "unsupported driver"))
        }
    }

    fn get_value(&self, value: &SqlValue<'_>, desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<Value> {
        match value {
            SqlValue::Null(_) => Ok(Value::Null),
            SqlValue::Text(name) => Ok(Value::string(name.as_ref())),
            other => Err(MigrateError::access(
                desc,
                format!("driver returned {:?} instead of a type name", other),
            )),
        }
    }

    fn set_value(&self, value: &Value, _desc: &JdbcTypeDesc, _options: &AccessOptions) -> Result<SqlValue<'static>> {
        Ok(match value.as_str() {
            Some(s) if !s.is_empty() => SqlValue::Text(Cow::Owned(s.into_owned())),
            _ => SqlValue::Null(SqlNullType::String),
        })
    }
}
