//! PostgreSQL session over tokio-postgres.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls, RowStream, Statement};
use tracing::{debug, info, warn};

use super::params::{read_cell, type_desc, PgParam};
use crate::config::ConnectionConfig;
use crate::core::session::{
    Cursor, CursorOptions, DatabaseInfo, DriverCapabilities, Field, IsolationLevel, Row, Session,
    StatementId,
};
use crate::core::value::SqlValue;
use crate::dialect::products;
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};

fn pg_error(e: tokio_postgres::Error, context: &str) -> MigrateError {
    match e.as_db_error() {
        Some(db) => MigrateError::database(format!("{}: {}", db.code().code(), db.message()), context),
        None => MigrateError::database(e, context),
    }
}

/// One PostgreSQL connection.
pub struct PostgresSession {
    client: Client,
    connection: JoinHandle<()>,
    info: DatabaseInfo,
    capabilities: DriverCapabilities,
    statements: HashMap<StatementId, Statement>,
    next_statement: u64,
    in_transaction: bool,
    next_cursor: u64,
}

impl PostgresSession {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("db-migrator");

        let context = format!("connecting to {}", config.display_url());
        let (client, connection) = match TlsBuilder::new(config.ssl_mode).build()? {
            Some(tls) => {
                let (client, connection) = pg_config.connect(tls).await.map_err(|e| pg_error(e, &context))?;
                (client, tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("PostgreSQL connection closed: {}", e);
                    }
                }))
            }
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| pg_error(e, &context))?;
                (client, tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("PostgreSQL connection closed: {}", e);
                    }
                }))
            }
        };

        let version: String = client
            .query_one("SHOW server_version", &[])
            .await
            .and_then(|row| row.try_get(0))
            .map_err(|e| pg_error(e, "reading server version"))?;
        info!("Connected to PostgreSQL {} at {}", version, config.display_url());

        Ok(Self {
            client,
            connection,
            info: DatabaseInfo::new(products::POSTGRESQL, version),
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
            in_transaction: false,
            next_cursor: 0,
        })
    }

    fn statement(&self, id: StatementId) -> Result<&Statement> {
        self.statements
            .get(&id)
            .ok_or_else(|| MigrateError::database("unknown prepared statement", id.0.to_string()))
    }

    async fn open(&self, statement: &Statement, params: &[SqlValue<'static>]) -> Result<Box<dyn Cursor + 'static>> {
        let wrapped: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let stream = self
            .client
            .query_raw(statement, refs)
            .await
            .map_err(|e| pg_error(e, "opening cursor"))?;
        Ok(Box::new(PostgresCursor {
            stream: Box::pin(stream),
            fields: statement_fields(statement),
            types: statement.columns().iter().map(|c| c.type_().clone()).collect(),
        }))
    }

    /// Declare a server-side cursor over `sql` and fetch it `fetch_size`
    /// rows at a time. The cursor lives until the enclosing transaction ends.
    async fn open_fetching(&mut self, statement: &Statement, sql: &str, fetch_size: usize) -> Result<Box<dyn Cursor + '_>> {
        let name = format!("db_migrator_cursor_{}", self.next_cursor);
        self.next_cursor += 1;
        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", name, sql.trim().trim_end_matches(';'));
        self.client
            .batch_execute(&declare)
            .await
            .map_err(|e| pg_error(e, sql))?;
        debug!("Declared {} fetching {} rows per round trip", name, fetch_size);
        Ok(Box::new(PostgresFetchCursor {
            client: &self.client,
            fetch: format!("FETCH FORWARD {} FROM {}", fetch_size, name),
            fetch_size,
            buffer: VecDeque::new(),
            exhausted: false,
            fields: statement_fields(statement),
            types: statement.columns().iter().map(|c| c.type_().clone()).collect(),
        }))
    }

    async fn run(&self, statement: &Statement, params: &[SqlValue<'static>]) -> Result<u64> {
        let wrapped: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.client
            .execute(statement, &refs)
            .await
            .map_err(|e| pg_error(e, "executing statement"))
    }

    async fn prepare_statement(&self, sql: &str) -> Result<Statement> {
        self.client.prepare(sql).await.map_err(|e| pg_error(e, sql))
    }
}

fn statement_fields(statement: &Statement) -> Arc<[Field]> {
    statement
        .columns()
        .iter()
        .map(|c| Field::new(c.name(), type_desc(c.type_())))
        .collect::<Vec<_>>()
        .into()
}

fn decode_row(fields: &Arc<[Field]>, types: &[tokio_postgres::types::Type], row: &tokio_postgres::Row) -> Result<Row> {
    let values = types
        .iter()
        .enumerate()
        .map(|(i, ty)| read_cell(row, i, ty))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(Arc::clone(fields), values))
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

/// Rows are decoded as the server sends them; nothing is buffered beyond
/// the socket.
struct PostgresCursor {
    stream: Pin<Box<RowStream>>,
    fields: Arc<[Field]>,
    types: Vec<tokio_postgres::types::Type>,
}

#[async_trait]
impl Cursor for PostgresCursor {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.stream.next().await else {
            return Ok(None);
        };
        let row = row.map_err(|e| pg_error(e, "fetching row"))?;
        decode_row(&self.fields, &self.types, &row).map(Some)
    }
}

/// Server-side cursor read in `FETCH FORWARD` batches, so at most
/// `fetch_size` rows sit in memory.
struct PostgresFetchCursor<'a> {
    client: &'a Client,
    fetch: String,
    fetch_size: usize,
    buffer: VecDeque<tokio_postgres::Row>,
    exhausted: bool,
    fields: Arc<[Field]>,
    types: Vec<tokio_postgres::types::Type>,
}

#[async_trait]
impl Cursor for PostgresFetchCursor<'_> {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.buffer.is_empty() && !self.exhausted {
            let rows = self
                .client
                .query(self.fetch.as_str(), &[])
                .await
                .map_err(|e| pg_error(e, &self.fetch))?;
            self.exhausted = rows.len() < self.fetch_size;
            self.buffer.extend(rows);
        }
        match self.buffer.pop_front() {
            Some(row) => decode_row(&self.fields, &self.types, &row).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Session for PostgresSession {
    fn database_info(&self) -> &DatabaseInfo {
        &self.info
    }

    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64> {
        if params.is_empty() {
            // Simple protocol so scripts with several statements run as one.
            self.client
                .batch_execute(sql)
                .await
                .map_err(|e| pg_error(e, sql))?;
            return Ok(0);
        }
        let statement = self.prepare_statement(sql).await?;
        self.run(&statement, params).await
    }

    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [SqlValue<'static>],
        options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let statement = self.prepare_statement(sql).await?;
        if options.fetch_size > 0 && params.is_empty() && self.in_transaction {
            return self.open_fetching(&statement, sql, options.fetch_size).await;
        }
        self.open(&statement, params).await
    }

    async fn prepare(&mut self, sql: &str) -> Result<StatementId> {
        let statement = self.prepare_statement(sql).await?;
        let id = StatementId(self.next_statement);
        self.next_statement += 1;
        self.statements.insert(id, statement);
        Ok(id)
    }

    async fn query_prepared<'a>(
        &'a mut self,
        id: StatementId,
        params: &'a [SqlValue<'static>],
        _options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let statement = self.statement(id)?.clone();
        self.open(&statement, params).await
    }

    async fn execute_prepared(&mut self, id: StatementId, params: &[SqlValue<'static>]) -> Result<u64> {
        let statement = self.statement(id)?.clone();
        self.run(&statement, params).await
    }

    async fn close_statement(&mut self, id: StatementId) -> Result<()> {
        // Dropping the last handle closes the statement on the server.
        if self.statements.remove(&id).is_none() {
            debug!("Statement {} was already closed", id.0);
        }
        Ok(())
    }

    async fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        let sql = format!("SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {}", level.sql());
        self.client.batch_execute(&sql).await.map_err(|e| pg_error(e, &sql))
    }

    async fn begin(&mut self, read_only: bool) -> Result<()> {
        let sql = if read_only { "BEGIN READ ONLY" } else { "BEGIN" };
        self.client.batch_execute(sql).await.map_err(|e| pg_error(e, sql))?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.client.batch_execute("COMMIT").await.map_err(|e| pg_error(e, "COMMIT"))
    }

    async fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.client.batch_execute("ROLLBACK").await.map_err(|e| pg_error(e, "ROLLBACK"))
    }
}
