//! The connection contract every driver implements.
//!
//! A [`Session`] is one live database connection. It is owned by exactly one
//! task at a time; the inspection engine, dump writer and load writer all work
//! against `&mut dyn Session` and never share a session across workers.
//!
//! Result sets are consumed through a forward-only [`Cursor`] that borrows the
//! session, so a cursor must be dropped before the next statement runs.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::types::JdbcTypeDesc;
use crate::core::value::SqlValue;
use crate::error::Result;

/// Handle of a statement prepared on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId(pub u64);

/// Transaction isolation levels, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Keyword form used in `SET TRANSACTION ISOLATION LEVEL`.
    pub fn sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// Product identification reported by a connected database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Product name as used for inspector and dialect lookup
    /// ("MySQL", "PostgreSQL", "Microsoft SQL Server", ...).
    pub product_name: String,
    #[serde(default)]
    pub product_version: String,
    #[serde(default)]
    pub major_version: i32,
    #[serde(default)]
    pub minor_version: i32,
}

impl DatabaseInfo {
    pub fn new(product_name: impl Into<String>, product_version: impl Into<String>) -> Self {
        let product_version = product_version.into();
        let mut parts = product_version
            .split(|c: char| !c.is_ascii_digit())
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<i32>().unwrap_or(0));
        let major_version = parts.next().unwrap_or(0);
        let minor_version = parts.next().unwrap_or(0);
        Self {
            product_name: product_name.into(),
            product_version,
            major_version,
            minor_version,
        }
    }

    /// True when the product name matches `name` ignoring case.
    pub fn is(&self, name: &str) -> bool {
        self.product_name.eq_ignore_ascii_case(name)
    }
}

/// What a driver can do beyond the basic contract.
///
/// Negotiated once per session and consulted by the access layer when it
/// builds accessors, never per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverCapabilities {
    /// Isolation levels the driver accepts; empty means "ask the server".
    pub isolation_levels: Vec<IsolationLevel>,
    /// The driver streams rows from the server instead of buffering them.
    pub server_side_cursors: bool,
    /// The driver can report the embedded type name of self-describing
    /// values (Oracle `ANYDATA`).
    pub any_type_introspection: bool,
}

/// A result set column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub type_desc: JdbcTypeDesc,
}

impl Field {
    pub fn new(name: impl Into<String>, type_desc: JdbcTypeDesc) -> Self {
        Self {
            name: name.into(),
            type_desc,
        }
    }
}

/// One row read from a cursor.
#[derive(Debug, Clone)]
pub struct Row {
    fields: Arc<[Field]>,
    values: Vec<SqlValue<'static>>,
}

impl Row {
    pub fn new(fields: Arc<[Field]>, values: Vec<SqlValue<'static>>) -> Self {
        Self { fields, values }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn values(&self) -> &[SqlValue<'static>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue<'static>> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue<'static>> {
        self.values.get(index)
    }

    /// Column index by name, ignoring case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue<'static>> {
        self.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Text value of a named column; `None` for NULL or a missing column.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get_by_name(name)
            .and_then(|v| v.as_text())
            .map(|s| s.into_owned())
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get_by_name(name).and_then(SqlValue::as_i64)
    }

    /// Boolean view accepting booleans, numbers and `YES`/`NO`/`Y`/`N`/`true` text.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get_by_name(name)? {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "YES" | "Y" | "TRUE" | "T" | "1" => Some(true),
                "NO" | "N" | "FALSE" | "F" | "0" => Some(false),
                _ => None,
            },
            other => other.as_i64().map(|v| v != 0),
        }
    }
}

/// Options for opening a cursor.
#[derive(Debug, Clone, Copy)]
pub struct CursorOptions {
    /// Rows fetched per round trip; 0 lets the driver decide. PostgreSQL
    /// honours it inside a transaction through a declared cursor; the MySQL
    /// and SQL Server drivers always stream rows off the wire.
    pub fetch_size: usize,
    pub forward_only: bool,
    pub read_only: bool,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            fetch_size: 0,
            forward_only: true,
            read_only: true,
        }
    }
}

impl CursorOptions {
    /// Options for streaming a large result without client-side buffering.
    pub fn streaming(fetch_size: usize) -> Self {
        Self {
            fetch_size,
            ..Self::default()
        }
    }
}

/// Forward-only result stream.
#[async_trait]
pub trait Cursor: Send {
    fn fields(&self) -> &[Field];

    /// Next row, or `None` once the result is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Drain the remaining rows into a vector.
    async fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// A live database connection.
#[async_trait]
pub trait Session: Send {
    fn database_info(&self) -> &DatabaseInfo;

    fn capabilities(&self) -> &DriverCapabilities;

    /// Run a statement that returns no rows; returns the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64>;

    /// Run a query and stream its rows.
    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [SqlValue<'static>],
        options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>>;

    async fn prepare(&mut self, sql: &str) -> Result<StatementId>;

    async fn query_prepared<'a>(
        &'a mut self,
        id: StatementId,
        params: &'a [SqlValue<'static>],
        options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>>;

    async fn execute_prepared(
        &mut self,
        id: StatementId,
        params: &[SqlValue<'static>],
    ) -> Result<u64>;

    async fn close_statement(&mut self, id: StatementId) -> Result<()>;

    /// Set the isolation level for subsequent transactions.
    ///
    /// Fails when the driver or server rejects the level.
    async fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()>;

    async fn begin(&mut self, read_only: bool) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Run a query and collect every row.
    async fn query_all(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<Vec<Row>> {
        let mut cursor = self.query(sql, params, CursorOptions::default()).await?;
        cursor.collect_rows().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::type_codes;

    fn sample_row() -> Row {
        let fields: Arc<[Field]> = vec![
            Field::new("NAME", JdbcTypeDesc::code(type_codes::VARCHAR)),
            Field::new("IS_NULLABLE", JdbcTypeDesc::code(type_codes::VARCHAR)),
            Field::new("KEY_SEQ", JdbcTypeDesc::code(type_codes::SMALLINT)),
        ]
        .into();
        Row::new(
            fields,
            vec![SqlValue::from("orders"), SqlValue::from("YES"), SqlValue::I16(2)],
        )
    }

    #[test]
    fn test_row_lookup_ignores_case() {
        let row = sample_row();
        assert_eq!(row.get_string("name").as_deref(), Some("orders"));
        assert_eq!(row.get_i64("key_seq"), Some(2));
        assert_eq!(row.get_bool("is_nullable"), Some(true));
        assert_eq!(row.get_string("missing"), None);
    }

    #[test]
    fn test_database_info_versions() {
        let info = DatabaseInfo::new("PostgreSQL", "15.4 (Debian 15.4-1)");
        assert_eq!(info.major_version, 15);
        assert_eq!(info.minor_version, 4);
        assert!(info.is("postgresql"));
    }

    #[test]
    fn test_isolation_order() {
        assert!(IsolationLevel::Serializable > IsolationLevel::RepeatableRead);
        assert_eq!(IsolationLevel::RepeatableRead.sql(), "REPEATABLE READ");
    }
}
