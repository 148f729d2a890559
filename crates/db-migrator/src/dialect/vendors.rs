//! Vendor dialects.

use super::typemap::{TypeNameMap, TypeRule};
use super::{products, Dialect};
use crate::core::identifier::{quote_ansi, quote_mssql, quote_mysql};
use crate::core::session::IsolationLevel;
use crate::core::types::type_codes::*;
use crate::error::Result;
use crate::metadata::{Column, Deferrability, ReferentialAction};

const ANSI_TYPES: &[TypeRule] = &[
    TypeRule::code(BIT, "BOOLEAN"),
    TypeRule::code(BOOLEAN, "BOOLEAN"),
    TypeRule::code(TINYINT, "SMALLINT"),
    TypeRule::code(SMALLINT, "SMALLINT"),
    TypeRule::code(INTEGER, "INTEGER"),
    TypeRule::code(BIGINT, "BIGINT"),
    TypeRule::code(REAL, "REAL"),
    TypeRule::code(FLOAT, "DOUBLE PRECISION"),
    TypeRule::code(DOUBLE, "DOUBLE PRECISION"),
    TypeRule::code(NUMERIC, "NUMERIC({P},{S})"),
    TypeRule::code(DECIMAL, "DECIMAL({P},{S})"),
    TypeRule::code(CHAR, "CHAR({N})"),
    TypeRule::code(NCHAR, "NCHAR({N})"),
    TypeRule::code(VARCHAR, "VARCHAR({N})"),
    TypeRule::code(NVARCHAR, "VARCHAR({N})"),
    TypeRule::code(LONGVARCHAR, "CLOB"),
    TypeRule::code(LONGNVARCHAR, "NCLOB"),
    TypeRule::code(CLOB, "CLOB"),
    TypeRule::code(NCLOB, "NCLOB"),
    TypeRule::code(DATE, "DATE"),
    TypeRule::code(TIME, "TIME"),
    TypeRule::code(TIME_WITH_TIMEZONE, "TIME WITH TIME ZONE"),
    TypeRule::code(TIMESTAMP, "TIMESTAMP"),
    TypeRule::code(TIMESTAMP_WITH_TIMEZONE, "TIMESTAMP WITH TIME ZONE"),
    TypeRule::code(BINARY, "BINARY({N})"),
    TypeRule::code(VARBINARY, "VARBINARY({N})"),
    TypeRule::code(LONGVARBINARY, "BLOB"),
    TypeRule::code(BLOB, "BLOB"),
    TypeRule::code(SQLXML, "CLOB"),
];

fn with_ansi(overrides: &[TypeRule]) -> TypeNameMap {
    TypeNameMap::new(&[overrides, ANSI_TYPES].concat())
}

/// ANSI SQL, used for products without a dedicated dialect.
#[derive(Debug, Clone)]
pub struct SimpleDialect {
    types: TypeNameMap,
}

impl SimpleDialect {
    pub fn new() -> Self {
        Self {
            types: TypeNameMap::new(ANSI_TYPES),
        }
    }
}

impl Default for SimpleDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for SimpleDialect {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn product_name(&self) -> &'static str {
        "ANSI SQL"
    }

    fn quote(&self, name: &str) -> Result<String> {
        quote_ansi(name)
    }

    fn type_names(&self) -> &TypeNameMap {
        &self.types
    }
}

/// MySQL and MariaDB.
#[derive(Debug, Clone)]
pub struct MySqlDialect {
    types: TypeNameMap,
}

impl MySqlDialect {
    pub fn new() -> Self {
        Self {
            types: with_ansi(&[
                TypeRule::code(BIT, "BIT({N})"),
                TypeRule::code(INTEGER, "INT"),
                TypeRule::code(TINYINT, "TINYINT"),
                TypeRule::code(REAL, "FLOAT"),
                TypeRule::code(FLOAT, "DOUBLE"),
                TypeRule::code(DOUBLE, "DOUBLE"),
                TypeRule::code(NUMERIC, "DECIMAL({P},{S})"),
                TypeRule::up_to(CHAR, 255, "CHAR({N})"),
                TypeRule::code(CHAR, "LONGTEXT"),
                TypeRule::up_to(NCHAR, 255, "CHAR({N})"),
                TypeRule::code(NCHAR, "LONGTEXT"),
                TypeRule::up_to(VARCHAR, 16_383, "VARCHAR({N})"),
                TypeRule::up_to(VARCHAR, 16_777_215, "MEDIUMTEXT"),
                TypeRule::code(VARCHAR, "LONGTEXT"),
                TypeRule::up_to(NVARCHAR, 16_383, "VARCHAR({N})"),
                TypeRule::code(NVARCHAR, "LONGTEXT"),
                TypeRule::code(LONGVARCHAR, "LONGTEXT"),
                TypeRule::code(LONGNVARCHAR, "LONGTEXT"),
                TypeRule::code(CLOB, "LONGTEXT"),
                TypeRule::code(NCLOB, "LONGTEXT"),
                TypeRule::code(TIME_WITH_TIMEZONE, "TIME"),
                TypeRule::code(TIMESTAMP, "DATETIME(6)"),
                TypeRule::code(TIMESTAMP_WITH_TIMEZONE, "DATETIME(6)"),
                TypeRule::up_to(BINARY, 255, "BINARY({N})"),
                TypeRule::code(BINARY, "LONGBLOB"),
                TypeRule::up_to(VARBINARY, 65_535, "VARBINARY({N})"),
                TypeRule::code(VARBINARY, "LONGBLOB"),
                TypeRule::code(LONGVARBINARY, "LONGBLOB"),
                TypeRule::code(BLOB, "LONGBLOB"),
                TypeRule::code(SQLXML, "LONGTEXT"),
                TypeRule::named(OTHER, "UUID", "CHAR(36)"),
                TypeRule::named(OTHER, "UNIQUEIDENTIFIER", "CHAR(36)"),
                TypeRule::named(OTHER, "JSON", "JSON"),
                TypeRule::named(OTHER, "JSONB", "JSON"),
            ]),
        }
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn product_name(&self) -> &'static str {
        products::MYSQL
    }

    fn quote(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn supports_drop_index_on_table(&self) -> bool {
        true
    }

    fn supports_drop_table_if_exists(&self) -> bool {
        true
    }

    fn supports_catalogs(&self) -> bool {
        true
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn supports_replace(&self) -> bool {
        true
    }

    fn drop_foreign_key_keyword(&self) -> &'static str {
        "DROP FOREIGN KEY"
    }

    fn drop_primary_key(&self, _name: &str) -> String {
        "DROP PRIMARY KEY".to_string()
    }

    // InnoDB rejects SET DEFAULT.
    fn referential_action(&self, action: ReferentialAction, _on_update: bool) -> Option<&'static str> {
        match action {
            ReferentialAction::NoAction | ReferentialAction::SetDefault => None,
            action => Some(action.sql()),
        }
    }

    fn type_names(&self) -> &TypeNameMap {
        &self.types
    }

    fn identity_clause(&self, _column: &Column) -> Option<String> {
        Some("AUTO_INCREMENT".to_string())
    }
}

/// PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    types: TypeNameMap,
}

impl PostgresDialect {
    pub fn new() -> Self {
        Self {
            types: with_ansi(&[
                TypeRule::up_to(CHAR, 10_485_760, "CHAR({N})"),
                TypeRule::code(CHAR, "TEXT"),
                TypeRule::up_to(NCHAR, 10_485_760, "CHAR({N})"),
                TypeRule::code(NCHAR, "TEXT"),
                TypeRule::up_to(VARCHAR, 10_485_760, "VARCHAR({N})"),
                TypeRule::code(VARCHAR, "TEXT"),
                TypeRule::up_to(NVARCHAR, 10_485_760, "VARCHAR({N})"),
                TypeRule::code(NVARCHAR, "TEXT"),
                TypeRule::code(LONGVARCHAR, "TEXT"),
                TypeRule::code(LONGNVARCHAR, "TEXT"),
                TypeRule::code(CLOB, "TEXT"),
                TypeRule::code(NCLOB, "TEXT"),
                TypeRule::code(BINARY, "BYTEA"),
                TypeRule::code(VARBINARY, "BYTEA"),
                TypeRule::code(LONGVARBINARY, "BYTEA"),
                TypeRule::code(BLOB, "BYTEA"),
                TypeRule::code(SQLXML, "XML"),
                TypeRule::named(OTHER, "UNIQUEIDENTIFIER", "UUID"),
            ]),
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn product_name(&self) -> &'static str {
        products::POSTGRESQL
    }

    fn quote(&self, name: &str) -> Result<String> {
        quote_ansi(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    // information_schema columns are domains the driver cannot bind to.
    fn text_param_placeholder(&self, index: usize) -> String {
        format!("CAST(${} AS TEXT)", index)
    }

    fn supports_drop_table_if_exists(&self) -> bool {
        true
    }

    fn supports_drop_sequence_if_exists(&self) -> bool {
        true
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_cascade_drop(&self) -> bool {
        true
    }

    fn supports_partial_indexes(&self) -> bool {
        true
    }

    fn deferrability_clause(&self, deferrability: Deferrability) -> Option<&'static str> {
        match deferrability {
            Deferrability::InitiallyDeferred => Some("DEFERRABLE INITIALLY DEFERRED"),
            Deferrability::InitiallyImmediate => Some("DEFERRABLE INITIALLY IMMEDIATE"),
            Deferrability::NotDeferrable => None,
        }
    }

    fn type_names(&self) -> &TypeNameMap {
        &self.types
    }

    fn identity_clause(&self, _column: &Column) -> Option<String> {
        Some("GENERATED BY DEFAULT AS IDENTITY".to_string())
    }
}

/// Microsoft SQL Server.
#[derive(Debug, Clone)]
pub struct MssqlDialect {
    types: TypeNameMap,
}

impl MssqlDialect {
    pub fn new() -> Self {
        Self {
            types: with_ansi(&[
                TypeRule::code(BIT, "BIT"),
                TypeRule::code(BOOLEAN, "BIT"),
                TypeRule::code(TINYINT, "TINYINT"),
                TypeRule::code(INTEGER, "INT"),
                TypeRule::code(FLOAT, "FLOAT"),
                TypeRule::code(DOUBLE, "FLOAT"),
                TypeRule::code(NUMERIC, "DECIMAL({P},{S})"),
                TypeRule::up_to(CHAR, 8000, "CHAR({N})"),
                TypeRule::code(CHAR, "VARCHAR(MAX)"),
                TypeRule::up_to(NCHAR, 4000, "NCHAR({N})"),
                TypeRule::code(NCHAR, "NVARCHAR(MAX)"),
                TypeRule::up_to(VARCHAR, 8000, "VARCHAR({N})"),
                TypeRule::code(VARCHAR, "VARCHAR(MAX)"),
                TypeRule::up_to(NVARCHAR, 4000, "NVARCHAR({N})"),
                TypeRule::code(NVARCHAR, "NVARCHAR(MAX)"),
                TypeRule::code(LONGVARCHAR, "VARCHAR(MAX)"),
                TypeRule::code(CLOB, "VARCHAR(MAX)"),
                TypeRule::code(LONGNVARCHAR, "NVARCHAR(MAX)"),
                TypeRule::code(NCLOB, "NVARCHAR(MAX)"),
                TypeRule::code(TIME_WITH_TIMEZONE, "TIME"),
                TypeRule::code(TIMESTAMP, "DATETIME2"),
                TypeRule::code(TIMESTAMP_WITH_TIMEZONE, "DATETIMEOFFSET"),
                TypeRule::up_to(BINARY, 8000, "BINARY({N})"),
                TypeRule::code(BINARY, "VARBINARY(MAX)"),
                TypeRule::up_to(VARBINARY, 8000, "VARBINARY({N})"),
                TypeRule::code(VARBINARY, "VARBINARY(MAX)"),
                TypeRule::code(LONGVARBINARY, "VARBINARY(MAX)"),
                TypeRule::code(BLOB, "VARBINARY(MAX)"),
                TypeRule::code(SQLXML, "XML"),
                TypeRule::named(OTHER, "UUID", "UNIQUEIDENTIFIER"),
                TypeRule::named(OTHER, "JSON", "NVARCHAR(MAX)"),
                TypeRule::named(OTHER, "JSONB", "NVARCHAR(MAX)"),
            ]),
        }
    }
}

impl Default for MssqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn product_name(&self) -> &'static str {
        products::MSSQL
    }

    fn quote(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn supports_drop_index_on_table(&self) -> bool {
        true
    }

    fn supports_drop_table_if_exists(&self) -> bool {
        true
    }

    fn supports_drop_sequence_if_exists(&self) -> bool {
        true
    }

    // A unique constraint admits a single NULL.
    fn supports_not_null_unique(&self) -> bool {
        false
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_catalogs(&self) -> bool {
        true
    }

    fn limit_query(&self, sql: &str, limit: u64) -> String {
        format!("SELECT TOP {} * FROM ({}) AS limited", limit, sql)
    }

    fn supports_partial_indexes(&self) -> bool {
        true
    }

    fn referential_action(&self, action: ReferentialAction, _on_update: bool) -> Option<&'static str> {
        match action {
            ReferentialAction::NoAction | ReferentialAction::Restrict => None,
            action => Some(action.sql()),
        }
    }

    fn type_names(&self) -> &TypeNameMap {
        &self.types
    }

    fn identity_clause(&self, column: &Column) -> Option<String> {
        let sequence = column.sequence.as_ref();
        let start = sequence.and_then(|s| s.start_with).unwrap_or_default();
        let increment = sequence.and_then(|s| s.increment_by).unwrap_or_default();
        if start.is_zero() && increment.is_zero() {
            return Some("IDENTITY".to_string());
        }
        let increment = if increment.is_zero() {
            1.into()
        } else {
            increment
        };
        Some(format!("IDENTITY({}, {})", start, increment))
    }
}

/// Oracle Database.
#[derive(Debug, Clone)]
pub struct OracleDialect {
    types: TypeNameMap,
}

impl OracleDialect {
    pub fn new() -> Self {
        Self {
            types: with_ansi(&[
                TypeRule::code(BIT, "NUMBER(1)"),
                TypeRule::code(BOOLEAN, "NUMBER(1)"),
                TypeRule::code(TINYINT, "NUMBER(3)"),
                TypeRule::code(SMALLINT, "NUMBER(5)"),
                TypeRule::code(INTEGER, "NUMBER(10)"),
                TypeRule::code(BIGINT, "NUMBER(19)"),
                TypeRule::code(REAL, "BINARY_FLOAT"),
                TypeRule::code(FLOAT, "BINARY_DOUBLE"),
                TypeRule::code(DOUBLE, "BINARY_DOUBLE"),
                TypeRule::code(NUMERIC, "NUMBER({P},{S})"),
                TypeRule::code(DECIMAL, "NUMBER({P},{S})"),
                TypeRule::up_to(CHAR, 2000, "CHAR({N})"),
                TypeRule::code(CHAR, "CLOB"),
                TypeRule::up_to(NCHAR, 1000, "NCHAR({N})"),
                TypeRule::code(NCHAR, "NCLOB"),
                TypeRule::up_to(VARCHAR, 4000, "VARCHAR2({N})"),
                TypeRule::code(VARCHAR, "CLOB"),
                TypeRule::up_to(NVARCHAR, 2000, "NVARCHAR2({N})"),
                TypeRule::code(NVARCHAR, "NCLOB"),
                TypeRule::code(TIME, "TIMESTAMP"),
                TypeRule::code(TIME_WITH_TIMEZONE, "TIMESTAMP WITH TIME ZONE"),
                TypeRule::up_to(BINARY, 2000, "RAW({N})"),
                TypeRule::code(BINARY, "BLOB"),
                TypeRule::up_to(VARBINARY, 2000, "RAW({N})"),
                TypeRule::code(VARBINARY, "BLOB"),
                TypeRule::code(SQLXML, "XMLTYPE"),
                TypeRule::named(OTHER, "UUID", "VARCHAR2(36)"),
                TypeRule::named(OTHER, "UNIQUEIDENTIFIER", "VARCHAR2(36)"),
                TypeRule::named(OTHER, "JSON", "CLOB"),
                TypeRule::named(OTHER, "JSONB", "CLOB"),
            ]),
        }
    }
}

impl Default for OracleDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn product_name(&self) -> &'static str {
        products::ORACLE
    }

    fn quote(&self, name: &str) -> Result<String> {
        quote_ansi(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_cascade_drop(&self) -> bool {
        true
    }

    fn cascade_clause(&self) -> &'static str {
        "CASCADE CONSTRAINTS"
    }

    // No ON UPDATE clause; ON DELETE takes CASCADE or SET NULL only.
    fn referential_action(&self, action: ReferentialAction, on_update: bool) -> Option<&'static str> {
        match action {
            ReferentialAction::Cascade | ReferentialAction::SetNull if !on_update => Some(action.sql()),
            _ => None,
        }
    }

    fn deferrability_clause(&self, deferrability: Deferrability) -> Option<&'static str> {
        match deferrability {
            Deferrability::InitiallyDeferred => Some("DEFERRABLE INITIALLY DEFERRED"),
            Deferrability::InitiallyImmediate => Some("DEFERRABLE INITIALLY IMMEDIATE"),
            Deferrability::NotDeferrable => None,
        }
    }

    fn supports_transaction_isolation(&self, level: IsolationLevel) -> bool {
        matches!(
            level,
            IsolationLevel::ReadCommitted | IsolationLevel::Serializable
        )
    }

    fn limit_query(&self, sql: &str, limit: u64) -> String {
        format!("SELECT * FROM ({}) WHERE ROWNUM <= {}", sql, limit)
    }

    fn type_names(&self) -> &TypeNameMap {
        &self.types
    }

    fn identity_clause(&self, _column: &Column) -> Option<String> {
        Some("GENERATED BY DEFAULT AS IDENTITY".to_string())
    }
}

/// NuoDB.
#[derive(Debug, Clone)]
pub struct NuoDbDialect {
    types: TypeNameMap,
}

impl NuoDbDialect {
    pub fn new() -> Self {
        Self {
            types: with_ansi(&[
                TypeRule::code(REAL, "DOUBLE"),
                TypeRule::code(FLOAT, "DOUBLE"),
                TypeRule::code(DOUBLE, "DOUBLE"),
                TypeRule::code(VARCHAR, "VARCHAR({N})"),
                TypeRule::code(TIME_WITH_TIMEZONE, "TIME"),
                TypeRule::code(TIMESTAMP_WITH_TIMEZONE, "TIMESTAMP"),
                TypeRule::named(OTHER, "UUID", "CHAR(36)"),
                TypeRule::named(OTHER, "UNIQUEIDENTIFIER", "CHAR(36)"),
                TypeRule::named(OTHER, "JSON", "CLOB"),
                TypeRule::named(OTHER, "JSONB", "CLOB"),
            ]),
        }
    }
}

impl Default for NuoDbDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for NuoDbDialect {
    fn name(&self) -> &'static str {
        "nuodb"
    }

    fn product_name(&self) -> &'static str {
        products::NUODB
    }

    fn quote(&self, name: &str) -> Result<String> {
        quote_ansi(name)
    }

    fn supports_drop_index_if_exists(&self) -> bool {
        true
    }

    fn supports_drop_table_if_exists(&self) -> bool {
        true
    }

    fn supports_drop_sequence_if_exists(&self) -> bool {
        true
    }

    fn supports_not_null_unique(&self) -> bool {
        false
    }

    fn supports_sequences(&self) -> bool {
        true
    }

    fn supports_cascade_drop(&self) -> bool {
        true
    }

    fn type_names(&self) -> &TypeNameMap {
        &self.types
    }

    fn identity_clause(&self, _column: &Column) -> Option<String> {
        Some("GENERATED BY DEFAULT AS IDENTITY".to_string())
    }
}
