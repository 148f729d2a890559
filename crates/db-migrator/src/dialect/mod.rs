//! SQL dialects.
//!
//! A [`Dialect`] describes what a target database accepts: identifier
//! quoting, parameter placeholders, DDL capability flags, type names and the
//! literal translations applied to column defaults. Dialects are resolved
//! once per session from the product name reported by the driver.

mod translator;
mod typemap;
mod vendors;

use std::fmt;
use std::sync::Arc;

pub use translator::{
    CurrentTimestampTranslator, MySqlBitLiteralTranslator, MySqlImplicitDefaultsTranslator,
    Script, SessionState, TranslationContext, TranslationManager, Translator, SQL_MODE,
};
pub(crate) use translator::unwrap_parens;
pub use typemap::{TypeNameMap, TypeRule};
pub use vendors::{
    MssqlDialect, MySqlDialect, NuoDbDialect, OracleDialect, PostgresDialect, SimpleDialect,
};

use crate::core::session::{DatabaseInfo, IsolationLevel};
use crate::error::{MigrateError, Result};
use crate::metadata::{Column, Deferrability, ReferentialAction};

/// Product names as reported by the drivers.
pub mod products {
    pub const MYSQL: &str = "MySQL";
    pub const POSTGRESQL: &str = "PostgreSQL";
    pub const MSSQL: &str = "Microsoft SQL Server";
    pub const ORACLE: &str = "Oracle";
    pub const NUODB: &str = "NuoDB";
}

/// Vendor-specific SQL rendering rules and capability flags.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short configuration name (`mysql`, `postgres`, ...).
    fn name(&self) -> &'static str;

    /// Product name this dialect renders for.
    fn product_name(&self) -> &'static str;

    /// Quote an identifier, doubling embedded quote characters.
    fn quote(&self, name: &str) -> Result<String>;

    /// Placeholder for the 1-based parameter `index`.
    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Placeholder for a parameter compared against catalog text columns.
    fn text_param_placeholder(&self, index: usize) -> String {
        self.param_placeholder(index)
    }

    /// `DROP INDEX name ON table` form.
    fn supports_drop_index_on_table(&self) -> bool {
        false
    }

    fn supports_drop_index_if_exists(&self) -> bool {
        false
    }

    fn supports_drop_table_if_exists(&self) -> bool {
        false
    }

    fn supports_drop_sequence_if_exists(&self) -> bool {
        false
    }

    /// Unique constraints over nullable columns are accepted.
    fn supports_not_null_unique(&self) -> bool {
        true
    }

    fn supports_sequences(&self) -> bool {
        false
    }

    fn supports_catalogs(&self) -> bool {
        false
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    /// `ALTER TABLE ... DROP CONSTRAINT` is available.
    fn supports_drop_constraints(&self) -> bool {
        true
    }

    /// `DROP TABLE ... CASCADE` is available.
    fn supports_cascade_drop(&self) -> bool {
        false
    }

    fn cascade_clause(&self) -> &'static str {
        "CASCADE"
    }

    /// `REPLACE INTO` style upserts.
    fn supports_replace(&self) -> bool {
        false
    }

    fn supports_transaction_isolation(&self, _level: IsolationLevel) -> bool {
        true
    }

    /// Keyword dropping a foreign key in `ALTER TABLE`.
    fn drop_foreign_key_keyword(&self) -> &'static str {
        "DROP CONSTRAINT"
    }

    /// `ALTER TABLE` action dropping the primary key named `name` (quoted).
    fn drop_primary_key(&self, name: &str) -> String {
        format!("DROP CONSTRAINT {}", name)
    }

    /// Indexes with a `WHERE` predicate.
    fn supports_partial_indexes(&self) -> bool {
        false
    }

    /// Rendering of a foreign key `ON UPDATE` / `ON DELETE` action, or `None`
    /// when the clause is left out and the server default applies.
    fn referential_action(&self, action: ReferentialAction, _on_update: bool) -> Option<&'static str> {
        match action {
            ReferentialAction::NoAction => None,
            action => Some(action.sql()),
        }
    }

    /// Trailing clause for a deferrable foreign key.
    fn deferrability_clause(&self, _deferrability: Deferrability) -> Option<&'static str> {
        None
    }

    /// Restrict `sql` to its first `limit` rows.
    fn limit_query(&self, sql: &str, limit: u64) -> String {
        format!("{} LIMIT {}", sql, limit)
    }

    fn type_names(&self) -> &TypeNameMap;

    /// Target type for `column`, or `None` when it cannot be expressed.
    fn type_name(&self, column: &Column) -> Option<String> {
        self.type_names().type_name(column)
    }

    /// Clause appended to an auto-increment column definition.
    fn identity_clause(&self, _column: &Column) -> Option<String> {
        None
    }

    /// Rows per round trip when streaming a dump query.
    fn streaming_fetch_size(&self) -> usize {
        1000
    }

    /// Function returning the current timestamp.
    fn current_timestamp(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }
}

/// Maps product names and configuration aliases to dialects.
#[derive(Debug, Clone)]
pub struct DialectResolver {
    dialects: Vec<(Vec<&'static str>, Arc<dyn Dialect>)>,
    fallback: Arc<dyn Dialect>,
}

impl Default for DialectResolver {
    fn default() -> Self {
        Self {
            dialects: vec![
                (
                    vec![products::MYSQL, "mysql", "mariadb"],
                    Arc::new(MySqlDialect::new()) as Arc<dyn Dialect>,
                ),
                (
                    vec![products::POSTGRESQL, "postgres", "postgresql", "pg"],
                    Arc::new(PostgresDialect::new()),
                ),
                (
                    vec![products::MSSQL, "mssql", "sqlserver"],
                    Arc::new(MssqlDialect::new()),
                ),
                (vec![products::ORACLE, "oracle"], Arc::new(OracleDialect::new())),
                (vec![products::NUODB, "nuodb"], Arc::new(NuoDbDialect::new())),
                (vec!["simple", "ansi"], Arc::new(SimpleDialect::new())),
            ],
            fallback: Arc::new(SimpleDialect::new()),
        }
    }
}

impl DialectResolver {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Dialect>> {
        self.dialects
            .iter()
            .find(|(names, _)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
            .map(|(_, d)| Arc::clone(d))
    }

    /// Dialect for a live session; unknown products get the ANSI dialect.
    pub fn resolve(&self, info: &DatabaseInfo) -> Arc<dyn Dialect> {
        self.lookup(&info.product_name)
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Dialect for a configuration name such as `postgres` or `nuodb`.
    pub fn by_name(&self, name: &str) -> Result<Arc<dyn Dialect>> {
        self.lookup(name)
            .ok_or_else(|| MigrateError::Config(format!("unknown dialect: {}", name)))
    }
}
