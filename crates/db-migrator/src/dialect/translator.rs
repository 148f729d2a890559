//! Column default translators.
//!
//! Defaults are copied from the source catalog as SQL text. Before they are
//! rendered for another product they pass through a chain of
//! [`Translator`]s; the first translator that accepts a default rewrites it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{products, Dialect};
use crate::core::session::{DatabaseInfo, Session};
use crate::core::types::type_codes::*;
use crate::error::{MigrateError, Result};
use crate::metadata::Column;

/// Session state key holding the MySQL `SQL_MODE` flags.
pub const SQL_MODE: &str = "SQL_MODE";

const SQL_MODE_QUERY: &str = "SELECT @@GLOBAL.SQL_MODE";
const STRICT_ALL_TABLES: &str = "STRICT_ALL_TABLES";
const STRICT_TRANS_TABLES: &str = "STRICT_TRANS_TABLES";

/// Values read from a source session and cached for its lifetime.
/// Persisted beside the schema document of a dump catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState {
    values: HashMap<String, Vec<String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.values.insert(key.into(), values);
    }

    /// `SQL_MODE` of a MySQL session, read once unless `refresh` is set.
    pub async fn sql_mode(&mut self, session: &mut dyn Session, refresh: bool) -> Result<&[String]> {
        if refresh || !self.values.contains_key(SQL_MODE) {
            let rows = session
                .query_all(SQL_MODE_QUERY, &[])
                .await
                .map_err(|e| MigrateError::Translator(format!("Can't read SQL mode: {}", e)))?;
            let modes = rows
                .iter()
                .filter_map(|row| row.get(0).and_then(|v| v.as_text()))
                .flat_map(|text| {
                    text.split(',')
                        .map(|m| m.trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect::<Vec<_>>()
                })
                .collect();
            debug!("SQL mode: {:?}", modes);
            self.values.insert(SQL_MODE.to_string(), modes);
        }
        Ok(self.get(SQL_MODE).unwrap_or_default())
    }
}

/// A default expression together with the product it came from.
#[derive(Debug, Clone, Copy)]
pub struct Script<'a> {
    pub value: Option<&'a str>,
    pub source: &'a DatabaseInfo,
}

/// Target side of a translation.
#[derive(Clone, Copy)]
pub struct TranslationContext<'a> {
    pub target: &'a dyn Dialect,
    pub state: &'a SessionState,
}

/// One step of the translation chain.
pub trait Translator: Send + Sync + fmt::Debug {
    /// Product whose scripts this translator rewrites; `None` for any.
    fn source_product(&self) -> Option<&'static str>;

    fn can_translate(
        &self,
        script: &Script<'_>,
        column: &Column,
        context: &TranslationContext<'_>,
    ) -> Result<bool>;

    /// Rewritten default, or `None` to drop it.
    fn translate(
        &self,
        script: &Script<'_>,
        column: &Column,
        context: &TranslationContext<'_>,
    ) -> Result<Option<String>>;
}

/// Ordered translator chain.
#[derive(Debug, Clone)]
pub struct TranslationManager {
    translators: Vec<Arc<dyn Translator>>,
}

impl Default for TranslationManager {
    fn default() -> Self {
        let mut manager = Self::empty();
        manager.register(Arc::new(MySqlBitLiteralTranslator));
        manager.register(Arc::new(MySqlImplicitDefaultsTranslator::default()));
        manager.register(Arc::new(CurrentTimestampTranslator));
        manager
    }
}

impl TranslationManager {
    pub fn empty() -> Self {
        Self {
            translators: Vec::new(),
        }
    }

    pub fn register(&mut self, translator: Arc<dyn Translator>) {
        self.translators.push(translator);
    }

    /// Run the chain; an untouched default is returned as is.
    pub fn translate(
        &self,
        script: &Script<'_>,
        column: &Column,
        context: &TranslationContext<'_>,
    ) -> Result<Option<String>> {
        for translator in &self.translators {
            let applies = translator
                .source_product()
                .map_or(true, |product| script.source.is(product));
            if applies && translator.can_translate(script, column, context)? {
                return translator.translate(script, column, context);
            }
        }
        Ok(script.value.map(str::to_string))
    }
}

/// Binary digits of a MySQL bit literal such as `b'0101'`.
fn bit_literal_digits(text: &str) -> Option<&str> {
    let text = text.trim();
    let body = text.strip_prefix('b').or_else(|| text.strip_prefix('B'))?;
    let digits = body.strip_prefix('\'')?.strip_suffix('\'')?;
    digits
        .chars()
        .all(|c| c == '0' || c == '1')
        .then_some(digits)
}

/// Rewrites MySQL `b'...'` defaults of BIT columns.
///
/// `0` becomes `FALSE`, `1` becomes `TRUE` and wider values become a decimal
/// literal.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlBitLiteralTranslator;

impl Translator for MySqlBitLiteralTranslator {
    fn source_product(&self) -> Option<&'static str> {
        Some(products::MYSQL)
    }

    fn can_translate(&self, script: &Script<'_>, column: &Column, _: &TranslationContext<'_>) -> Result<bool> {
        Ok(column.type_desc.type_code == BIT
            && script.value.and_then(bit_literal_digits).is_some())
    }

    fn translate(&self, script: &Script<'_>, _: &Column, _: &TranslationContext<'_>) -> Result<Option<String>> {
        let Some(digits) = script.value.and_then(bit_literal_digits) else {
            return Ok(None);
        };
        if digits.is_empty() {
            return Ok(Some("FALSE".to_string()));
        }
        let value = u128::from_str_radix(digits, 2)
            .map_err(|e| MigrateError::Translator(format!("bit literal {}: {}", digits, e)))?;
        Ok(Some(
            match value {
                0 => "FALSE".to_string(),
                1 => "TRUE".to_string(),
                other => other.to_string(),
            },
        ))
    }
}

/// Materializes the implicit defaults MySQL applies to NOT NULL columns
/// declared without one: `0` for numbers, the first value for enums and the
/// empty string for other character and binary columns.
///
/// MySQL only applies implicit defaults outside strict SQL mode. With
/// `check_strict_mode` set, the session's `SQL_MODE` must already be cached
/// in the [`SessionState`].
#[derive(Debug, Clone)]
pub struct MySqlImplicitDefaultsTranslator {
    pub check_strict_mode: bool,
    pub implicit_defaults: bool,
}

impl Default for MySqlImplicitDefaultsTranslator {
    fn default() -> Self {
        Self {
            check_strict_mode: false,
            implicit_defaults: true,
        }
    }
}

impl MySqlImplicitDefaultsTranslator {
    fn enabled(&self, context: &TranslationContext<'_>) -> Result<bool> {
        if !self.check_strict_mode {
            return Ok(self.implicit_defaults);
        }
        let modes = context
            .state
            .get(SQL_MODE)
            .ok_or_else(|| MigrateError::Translator("SQL mode of the source session is unknown".to_string()))?;
        let strict = modes
            .iter()
            .any(|m| m == STRICT_ALL_TABLES || m == STRICT_TRANS_TABLES);
        Ok(!strict)
    }
}

impl Translator for MySqlImplicitDefaultsTranslator {
    fn source_product(&self) -> Option<&'static str> {
        Some(products::MYSQL)
    }

    fn can_translate(&self, script: &Script<'_>, column: &Column, context: &TranslationContext<'_>) -> Result<bool> {
        if script.value.is_some() || column.nullable || column.auto_increment {
            return Ok(false);
        }
        self.enabled(context)
    }

    fn translate(&self, script: &Script<'_>, column: &Column, _: &TranslationContext<'_>) -> Result<Option<String>> {
        let value = match column.type_desc.type_code {
            TINYINT | SMALLINT | INTEGER | BIGINT | FLOAT | REAL | DOUBLE | NUMERIC | DECIMAL => {
                Some("0".to_string())
            }
            CHAR | VARCHAR | BINARY | VARBINARY | BLOB | CLOB => Some(
                column
                    .enum_values
                    .first()
                    .cloned()
                    .unwrap_or_default(),
            ),
            _ => script.value.map(str::to_string),
        };
        Ok(value)
    }
}

const CURRENT_TIMESTAMP_FORMS: &[&str] = &[
    "CURRENT_TIMESTAMP",
    "CURRENT_TIMESTAMP()",
    "NOW()",
    "GETDATE()",
    "SYSDATE",
    "SYSDATETIME()",
    "SYSTIMESTAMP",
    "LOCALTIMESTAMP",
    "LOCALTIMESTAMP()",
];

/// Strip the redundant parentheses SQL Server wraps defaults in.
pub(crate) fn unwrap_parens(text: &str) -> &str {
    let mut text = text.trim();
    while text.len() >= 2 && text.starts_with('(') && text.ends_with(')') {
        let inner = &text[1..text.len() - 1];
        // `(a) + (b)` is not a wrapped expression.
        let mut depth = 0i32;
        let balanced = inner.chars().all(|c| {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            depth >= 0
        });
        if !balanced || depth != 0 {
            break;
        }
        text = inner.trim();
    }
    text
}

fn is_current_timestamp(text: &str) -> bool {
    let upper = unwrap_parens(text).to_ascii_uppercase();
    CURRENT_TIMESTAMP_FORMS.contains(&upper.as_str())
        || (upper.starts_with("CURRENT_TIMESTAMP(") && upper.ends_with(')'))
}

/// Normalizes the vendor spellings of "now" to the target's function.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentTimestampTranslator;

impl Translator for CurrentTimestampTranslator {
    fn source_product(&self) -> Option<&'static str> {
        None
    }

    fn can_translate(&self, script: &Script<'_>, _: &Column, _: &TranslationContext<'_>) -> Result<bool> {
        Ok(script.value.map_or(false, is_current_timestamp))
    }

    fn translate(&self, _: &Script<'_>, _: &Column, context: &TranslationContext<'_>) -> Result<Option<String>> {
        Ok(Some(context.target.current_timestamp().to_string()))
    }
}
