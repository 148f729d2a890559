//! Type value access layer.
//!
//! Moves cell values between the driver-native [`SqlValue`] and the canonical
//! [`Value`] written to catalogs. A [`ValueFormat`] handles one type family;
//! the [`ValueFormatRegistry`] picks the format for a `(code, name)`
//! descriptor, trying an exact match, then the code alone, then the default.
//!
//! Accessors are built once per column by [`ValueAccessProvider`], which is
//! also where driver capability probes run. [`RowReader`] and [`RowBinder`]
//! convert whole rows and never return a partially converted row.

pub mod formats;
pub mod oracle;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};

use crate::core::session::{DriverCapabilities, Field, Row};
use crate::core::types::{type_codes, JdbcTypeDesc};
use crate::core::value::{SqlValue, Value, ValueType};
use crate::error::{MigrateError, Result};

use formats::*;

pub(crate) fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parse a time zone option: `UTC`, `GMT`, `Z`, `+HH:MM`, `-HHMM` or `UTC+HH:MM`.
pub fn parse_time_zone(text: &str) -> Result<FixedOffset> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    let offset = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    if offset.is_empty() || offset == "Z" {
        return Ok(utc());
    }

    let invalid = || MigrateError::Config(format!("Invalid time zone '{}'", trimmed));
    let (sign, digits) = match offset.as_bytes()[0] {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Options shared by every accessor of one dump or load.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessOptions {
    /// Zone temporal values with offsets are rendered in.
    pub time_zone: Option<FixedOffset>,
}

/// Conversion between driver values and canonical values for one type family.
pub trait ValueFormat: Send + Sync {
    /// Payload variant written to catalogs for columns of this type.
    fn value_type(&self, desc: &JdbcTypeDesc) -> ValueType;

    /// Check that the session's driver can serve this format.
    fn negotiate(&self, _desc: &JdbcTypeDesc, _capabilities: &DriverCapabilities) -> Result<()> {
        Ok(())
    }

    fn get_value(&self, value: &SqlValue<'_>, desc: &JdbcTypeDesc, options: &AccessOptions) -> Result<Value>;

    fn set_value(&self, value: &Value, desc: &JdbcTypeDesc, options: &AccessOptions) -> Result<SqlValue<'static>>;
}

/// Formats keyed by type descriptor.
#[derive(Clone, Default)]
pub struct ValueFormatRegistry {
    formats: HashMap<JdbcTypeDesc, Arc<dyn ValueFormat>>,
    default_format: Option<Arc<dyn ValueFormat>>,
}

impl fmt::Debug for ValueFormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFormatRegistry")
            .field("formats", &self.formats.len())
            .field("has_default", &self.default_format.is_some())
            .finish()
    }
}

impl ValueFormatRegistry {
    /// Registry with no formats and no default.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in format and [`StringFormat`] as default.
    pub fn builtin() -> Self {
        use type_codes::*;

        let mut registry = Self::empty();
        let boolean: Arc<dyn ValueFormat> = Arc::new(BooleanFormat);
        let integer: Arc<dyn ValueFormat> = Arc::new(IntegerFormat);
        let float: Arc<dyn ValueFormat> = Arc::new(FloatFormat);
        let decimal: Arc<dyn ValueFormat> = Arc::new(DecimalFormat);
        let binary: Arc<dyn ValueFormat> = Arc::new(BinaryFormat);
        let string: Arc<dyn ValueFormat> = Arc::new(StringFormat);
        let uuid: Arc<dyn ValueFormat> = Arc::new(UuidFormat);
        let json: Arc<dyn ValueFormat> = Arc::new(JsonFormat);

        for code in [BIT, BOOLEAN] {
            registry.register_code(code, Arc::clone(&boolean));
        }
        for code in [TINYINT, SMALLINT, INTEGER, BIGINT] {
            registry.register_code(code, Arc::clone(&integer));
        }
        for code in [FLOAT, REAL, DOUBLE] {
            registry.register_code(code, Arc::clone(&float));
        }
        for code in [NUMERIC, DECIMAL] {
            registry.register_code(code, Arc::clone(&decimal));
        }
        for code in [CHAR, VARCHAR, LONGVARCHAR, CLOB, NCHAR, NVARCHAR, LONGNVARCHAR, NCLOB, SQLXML] {
            registry.register_code(code, Arc::clone(&string));
        }
        for code in [BINARY, VARBINARY, LONGVARBINARY, BLOB] {
            registry.register_code(code, Arc::clone(&binary));
        }
        registry.register_code(DATE, Arc::new(DateFormat));
        registry.register_code(TIME, Arc::new(TimeFormat));
        registry.register_code(TIME_WITH_TIMEZONE, Arc::new(TimeFormat));
        registry.register_code(TIMESTAMP, Arc::new(TimestampFormat));
        registry.register_code(TIMESTAMP_WITH_TIMEZONE, Arc::new(TimestampTzFormat));

        registry.register(oracle::any_type_desc(), Arc::new(oracle::OracleAnyTypeFormat));
        registry.register(JdbcTypeDesc::new(OTHER, "UUID"), Arc::clone(&uuid));
        registry.register(JdbcTypeDesc::new(OTHER, "UNIQUEIDENTIFIER"), Arc::clone(&uuid));
        registry.register(JdbcTypeDesc::new(BINARY, "UNIQUEIDENTIFIER"), uuid);
        registry.register(JdbcTypeDesc::new(OTHER, "JSON"), Arc::clone(&json));
        registry.register(JdbcTypeDesc::new(OTHER, "JSONB"), json);

        registry.set_default(string);
        registry
    }

    pub fn register(&mut self, desc: JdbcTypeDesc, format: Arc<dyn ValueFormat>) {
        self.formats.insert(desc, format);
    }

    pub fn register_code(&mut self, type_code: i32, format: Arc<dyn ValueFormat>) {
        self.register(JdbcTypeDesc::code(type_code), format);
    }

    pub fn set_default(&mut self, format: Arc<dyn ValueFormat>) {
        self.default_format = Some(format);
    }

    /// Format for `desc`: exact match, then code only, then the default.
    pub fn resolve(&self, desc: &JdbcTypeDesc) -> Result<Arc<dyn ValueFormat>> {
        self.formats
            .get(desc)
            .or_else(|| self.formats.get(&desc.without_name()))
            .or(self.default_format.as_ref())
            .cloned()
            .ok_or_else(|| MigrateError::access(desc, "no value format registered"))
    }
}

/// Getter and setter for one column type, bound to one session's driver.
#[derive(Clone)]
pub struct ValueAccessor {
    desc: JdbcTypeDesc,
    format: Arc<dyn ValueFormat>,
    options: AccessOptions,
}

impl ValueAccessor {
    pub fn type_desc(&self) -> &JdbcTypeDesc {
        &self.desc
    }

    pub fn value_type(&self) -> ValueType {
        self.format.value_type(&self.desc)
    }

    pub fn get(&self, value: &SqlValue<'_>) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        self.format.get_value(value, &self.desc, &self.options)
    }

    pub fn set(&self, value: &Value) -> Result<SqlValue<'static>> {
        self.format.set_value(value, &self.desc, &self.options)
    }
}

/// Builds accessors for one session.
#[derive(Clone)]
pub struct ValueAccessProvider {
    registry: Arc<ValueFormatRegistry>,
    capabilities: DriverCapabilities,
    options: AccessOptions,
}

impl ValueAccessProvider {
    pub fn new(
        registry: Arc<ValueFormatRegistry>,
        capabilities: DriverCapabilities,
        options: AccessOptions,
    ) -> Self {
        Self {
            registry,
            capabilities,
            options,
        }
    }

    /// Resolve the format for `desc` and run its capability probe.
    pub fn accessor(&self, desc: &JdbcTypeDesc) -> Result<ValueAccessor> {
        let format = self.registry.resolve(desc)?;
        format.negotiate(desc, &self.capabilities)?;
        Ok(ValueAccessor {
            desc: desc.clone(),
            format,
            options: self.options,
        })
    }

    pub fn row_reader(&self, fields: &[Field]) -> Result<RowReader> {
        let accessors = fields
            .iter()
            .map(|f| self.accessor(&f.type_desc))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowReader { accessors })
    }

    pub fn row_binder<'a>(&self, types: impl IntoIterator<Item = &'a JdbcTypeDesc>) -> Result<RowBinder> {
        let accessors = types
            .into_iter()
            .map(|d| self.accessor(d))
            .collect::<Result<Vec<_>>>()?;
        Ok(RowBinder { accessors })
    }
}

/// Converts cursor rows to canonical values.
pub struct RowReader {
    accessors: Vec<ValueAccessor>,
}

impl RowReader {
    pub fn value_types(&self) -> Vec<ValueType> {
        self.accessors.iter().map(ValueAccessor::value_type).collect()
    }

    pub fn read(&self, row: &Row) -> Result<Vec<Value>> {
        if row.len() != self.accessors.len() {
            return Err(MigrateError::Format {
                entry: String::new(),
                message: format!(
                    "row has {} values, expected {}",
                    row.len(),
                    self.accessors.len()
                ),
            });
        }
        self.accessors
            .iter()
            .zip(row.values())
            .map(|(accessor, value)| accessor.get(value))
            .collect()
    }
}

/// Converts canonical values to statement parameters.
pub struct RowBinder {
    accessors: Vec<ValueAccessor>,
}

impl RowBinder {
    pub fn bind(&self, values: &[Value]) -> Result<Vec<SqlValue<'static>>> {
        if values.len() != self.accessors.len() {
            return Err(MigrateError::Format {
                entry: String::new(),
                message: format!(
                    "row has {} values, expected {}",
                    values.len(),
                    self.accessors.len()
                ),
            });
        }
        self.accessors
            .iter()
            .zip(values)
            .map(|(accessor, value)| accessor.set(value))
            .collect()
    }
}
