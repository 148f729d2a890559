//! MySQL/MariaDB session over a single sqlx connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::stream::BoxStream;
use futures::StreamExt;
use rust_decimal::Decimal;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlColumn, MySqlConnectOptions, MySqlConnection, MySqlRow,
    MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column as _, ConnectOptions, Executor, Row as _, Statement as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::session::{
    Cursor, CursorOptions, DatabaseInfo, DriverCapabilities, Field, IsolationLevel, Row, Session,
    StatementId,
};
use crate::core::types::JdbcTypeDesc;
use crate::core::value::{SqlNullType, SqlValue};
use crate::dialect::products;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disable => MySqlSslMode::Disabled,
        SslMode::Require => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
    }
}

/// One MySQL connection.
pub struct MySqlSession {
    conn: MySqlConnection,
    info: DatabaseInfo,
    capabilities: DriverCapabilities,
    // sqlx keeps its own per-connection statement cache keyed by SQL text.
    statements: HashMap<StatementId, String>,
    next_statement: u64,
}

impl MySqlSession {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode(config.ssl_mode));

        let mut conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::database(e, format!("connecting to {}", config.display_url())))?;

        let version: String = sqlx::query_scalar("SELECT VERSION()")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| MigrateError::database(e, "reading server version"))?;
        info!("Connected to MySQL {} at {}", version, config.display_url());

        Ok(Self {
            conn,
            info: DatabaseInfo::new(products::MYSQL, version),
            capabilities: DriverCapabilities {
                isolation_levels: vec![
                    IsolationLevel::ReadUncommitted,
                    IsolationLevel::ReadCommitted,
                    IsolationLevel::RepeatableRead,
                    IsolationLevel::Serializable,
                ],
                server_side_cursors: true,
                any_type_introspection: false,
            },
            statements: HashMap::new(),
            next_statement: 0,
        })
    }

    fn statement_sql(&self, id: StatementId) -> Result<String> {
        self.statements
            .get(&id)
            .cloned()
            .ok_or_else(|| MigrateError::database("unknown prepared statement", id.0.to_string()))
    }

    async fn run(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64> {
        if params.is_empty() {
            // Text protocol: transaction control and DDL are not all preparable.
            let done = Executor::execute(&mut self.conn, sqlx::raw_sql(sql))
                .await
                .map_err(|e| MigrateError::database(e, sql))?;
            return Ok(done.rows_affected());
        }
        let done = bind_all(sql, params)
            .execute(&mut self.conn)
            .await
            .map_err(|e| MigrateError::database(e, sql))?;
        Ok(done.rows_affected())
    }
}

/// Result columns of `sql`, read from the prepared statement so an empty
/// result still reports its fields.
async fn describe(conn: &mut MySqlConnection, sql: &str) -> Result<Arc<[Field]>> {
    let statement = Executor::prepare(conn, sql)
        .await
        .map_err(|e| MigrateError::database(e, sql))?;
    Ok(statement.columns().iter().map(field).collect::<Vec<_>>().into())
}

async fn open<'a>(
    conn: &'a mut MySqlConnection,
    sql: &'a str,
    params: &'a [SqlValue<'static>],
) -> Result<Box<dyn Cursor + 'a>> {
    let fields = describe(&mut *conn, sql).await?;
    let stream = bind_all(sql, params).fetch(conn);
    Ok(Box::new(MySqlCursor { stream, fields }))
}

fn field(column: &MySqlColumn) -> Field {
    Field::new(
        column.name(),
        JdbcTypeDesc::from_type_name(column.type_info().name()),
    )
}

fn bind_all<'q>(sql: &'q str, params: &'q [SqlValue<'static>]) -> Query<'q, MySql, MySqlArguments> {
    params.iter().fold(sqlx::query(sql), bind)
}

fn bind<'q>(query: Query<'q, MySql, MySqlArguments>, value: &'q SqlValue<'static>) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bool => query.bind(None::<bool>),
            SqlNullType::I16 => query.bind(None::<i16>),
            SqlNullType::I32 => query.bind(None::<i32>),
            SqlNullType::I64 => query.bind(None::<i64>),
            SqlNullType::F32 => query.bind(None::<f32>),
            SqlNullType::F64 => query.bind(None::<f64>),
            SqlNullType::Bytes => query.bind(None::<Vec<u8>>),
            SqlNullType::Decimal => query.bind(None::<Decimal>),
            SqlNullType::DateTime | SqlNullType::DateTimeOffset => query.bind(None::<NaiveDateTime>),
            SqlNullType::Date => query.bind(None::<NaiveDate>),
            SqlNullType::Time => query.bind(None::<NaiveTime>),
            SqlNullType::String | SqlNullType::Uuid => query.bind(None::<String>),
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(v) => {
            let text: &str = v;
            query.bind(text)
        }
        SqlValue::Bytes(v) => {
            let bytes: &[u8] = v;
            query.bind(bytes)
        }
        // Stored as CHAR(36) on MySQL; binding the 16 raw bytes would not match.
        SqlValue::Uuid(v) => query.bind(v.to_string()),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeOffset(v) => query.bind(v.naive_utc()),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
    }
}

fn null_type(type_name: &str) -> SqlNullType {
    match type_name {
        "BOOLEAN" => SqlNullType::Bool,
        "TINYINT" | "TINYINT UNSIGNED" | "SMALLINT" => SqlNullType::I16,
        "SMALLINT UNSIGNED" | "MEDIUMINT" | "INT" | "YEAR" => SqlNullType::I32,
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "BIGINT" => SqlNullType::I64,
        "BIGINT UNSIGNED" | "DECIMAL" => SqlNullType::Decimal,
        "FLOAT" => SqlNullType::F32,
        "DOUBLE" => SqlNullType::F64,
        "DATE" => SqlNullType::Date,
        "TIME" => SqlNullType::Time,
        "DATETIME" | "TIMESTAMP" => SqlNullType::DateTime,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => SqlNullType::Bytes,
        _ => SqlNullType::String,
    }
}

fn decode_err(e: sqlx::Error, column: &MySqlColumn) -> MigrateError {
    MigrateError::access(
        &JdbcTypeDesc::from_type_name(column.type_info().name()),
        format!("column {}: {}", column.name(), e),
    )
}

fn read_cell(row: &MySqlRow, idx: usize) -> Result<SqlValue<'static>> {
    let column = &row.columns()[idx];
    let type_name = column.type_info().name().to_ascii_uppercase();

    let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
    if is_null {
        return Ok(SqlValue::Null(null_type(&type_name)));
    }

    let err = |e| decode_err(e, column);
    let value = match type_name.as_str() {
        "BOOLEAN" => SqlValue::Bool(row.try_get::<bool, _>(idx).map_err(err)?),
        "TINYINT" => SqlValue::I16(row.try_get::<i8, _>(idx).map_err(err)? as i16),
        "TINYINT UNSIGNED" => SqlValue::I16(row.try_get::<u8, _>(idx).map_err(err)? as i16),
        "SMALLINT" => SqlValue::I16(row.try_get::<i16, _>(idx).map_err(err)?),
        "SMALLINT UNSIGNED" => SqlValue::I32(row.try_get::<u16, _>(idx).map_err(err)? as i32),
        "MEDIUMINT" | "INT" => SqlValue::I32(row.try_get::<i32, _>(idx).map_err(err)?),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => {
            SqlValue::I64(row.try_get::<u32, _>(idx).map_err(err)? as i64)
        }
        "BIGINT" => SqlValue::I64(row.try_get::<i64, _>(idx).map_err(err)?),
        "BIGINT UNSIGNED" => SqlValue::Decimal(Decimal::from(row.try_get::<u64, _>(idx).map_err(err)?)),
        "YEAR" => SqlValue::I32(row.try_get_unchecked::<u16, _>(idx).map_err(err)? as i32),
        "FLOAT" => SqlValue::F32(row.try_get::<f32, _>(idx).map_err(err)?),
        "DOUBLE" => SqlValue::F64(row.try_get::<f64, _>(idx).map_err(err)?),
        "DECIMAL" => SqlValue::Decimal(row.try_get::<Decimal, _>(idx).map_err(err)?),
        "DATE" => SqlValue::Date(row.try_get::<NaiveDate, _>(idx).map_err(err)?),
        "TIME" => SqlValue::Time(row.try_get::<NaiveTime, _>(idx).map_err(err)?),
        "DATETIME" | "TIMESTAMP" => SqlValue::DateTime(row.try_get::<NaiveDateTime, _>(idx).map_err(err)?),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx).map_err(err)?.into()),
        // CHAR, VARCHAR, TEXT, ENUM, SET, JSON and anything newer travel as text.
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx).map_err(err)?.into()),
    };
    Ok(value)
}

struct MySqlCursor<'c> {
    stream: BoxStream<'c, std::result::Result<MySqlRow, sqlx::Error>>,
    fields: Arc<[Field]>,
}

#[async_trait]
impl Cursor for MySqlCursor<'_> {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.stream.next().await else {
            return Ok(None);
        };
        let row = row.map_err(|e| MigrateError::database(e, "fetching row"))?;
        let values = (0..row.columns().len())
            .map(|i| read_cell(&row, i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Row::new(Arc::clone(&self.fields), values)))
    }
}

#[async_trait]
impl Session for MySqlSession {
    fn database_info(&self) -> &DatabaseInfo {
        &self.info
    }

    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64> {
        self.run(sql, params).await
    }

    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [SqlValue<'static>],
        _options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        open(&mut self.conn, sql, params).await
    }

    async fn prepare(&mut self, sql: &str) -> Result<StatementId> {
        // Validates the statement and warms the connection's statement cache.
        Executor::prepare(&mut self.conn, sql)
            .await
            .map_err(|e| MigrateError::database(e, sql))?;
        let id = StatementId(self.next_statement);
        self.next_statement += 1;
        self.statements.insert(id, sql.to_string());
        Ok(id)
    }

    async fn query_prepared<'a>(
        &'a mut self,
        id: StatementId,
        params: &'a [SqlValue<'static>],
        _options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let Self { conn, statements, .. } = self;
        let sql = statements
            .get(&id)
            .ok_or_else(|| MigrateError::database("unknown prepared statement", id.0.to_string()))?;
        open(conn, sql, params).await
    }

    async fn execute_prepared(&mut self, id: StatementId, params: &[SqlValue<'static>]) -> Result<u64> {
        let sql = self.statement_sql(id)?;
        let done = bind_all(&sql, params)
            .execute(&mut self.conn)
            .await
            .map_err(|e| MigrateError::database(e, sql.as_str()))?;
        Ok(done.rows_affected())
    }

    async fn close_statement(&mut self, id: StatementId) -> Result<()> {
        if self.statements.remove(&id).is_none() {
            debug!("Statement {} was already closed", id.0);
        }
        Ok(())
    }

    async fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        let sql = format!("SET SESSION TRANSACTION ISOLATION LEVEL {}", level.sql());
        self.run(&sql, &[]).await.map(|_| ())
    }

    async fn begin(&mut self, read_only: bool) -> Result<()> {
        let sql = if read_only {
            "START TRANSACTION READ ONLY"
        } else {
            "START TRANSACTION"
        };
        self.run(sql, &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.run("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run("ROLLBACK", &[]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(ssl_mode(SslMode::Disable), MySqlSslMode::Disabled));
        assert!(matches!(ssl_mode(SslMode::VerifyFull), MySqlSslMode::VerifyIdentity));
    }

    #[test]
    fn test_null_types() {
        assert_eq!(null_type("BIGINT UNSIGNED"), SqlNullType::Decimal);
        assert_eq!(null_type("INT UNSIGNED"), SqlNullType::I64);
        assert_eq!(null_type("LONGBLOB"), SqlNullType::Bytes);
        assert_eq!(null_type("ENUM"), SqlNullType::String);
        assert_eq!(null_type("TIMESTAMP"), SqlNullType::DateTime);
    }
}
