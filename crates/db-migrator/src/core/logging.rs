//! Statement logging decorator.
//!
//! [`LoggingSession`] wraps any [`Session`] and forwards every call, logging
//! statements at `debug` and bound parameters at `trace`. Enabled per
//! connection with `log_statements: true`.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::core::session::{
    Cursor, CursorOptions, DatabaseInfo, DriverCapabilities, IsolationLevel, Session, StatementId,
};
use crate::core::value::SqlValue;
use crate::error::Result;

pub struct LoggingSession {
    inner: Box<dyn Session>,
    prepared: HashMap<StatementId, String>,
}

impl LoggingSession {
    pub fn new(inner: Box<dyn Session>) -> Self {
        Self {
            inner,
            prepared: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> Box<dyn Session> {
        self.inner
    }

    fn log_params(params: &[SqlValue<'static>]) {
        for (i, value) in params.iter().enumerate() {
            trace!(index = i + 1, value = ?value, "bind");
        }
    }

    fn statement_sql(&self, id: StatementId) -> &str {
        self.prepared.get(&id).map(String::as_str).unwrap_or("<unknown>")
    }
}

#[async_trait]
impl Session for LoggingSession {
    fn database_info(&self) -> &DatabaseInfo {
        self.inner.database_info()
    }

    fn capabilities(&self) -> &DriverCapabilities {
        self.inner.capabilities()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64> {
        debug!(sql, "execute");
        Self::log_params(params);
        let affected = self.inner.execute(sql, params).await?;
        trace!(affected, "execute finished");
        Ok(affected)
    }

    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [SqlValue<'static>],
        options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        debug!(sql, fetch_size = options.fetch_size, "query");
        Self::log_params(params);
        self.inner.query(sql, params, options).await
    }

    async fn prepare(&mut self, sql: &str) -> Result<StatementId> {
        let id = self.inner.prepare(sql).await?;
        debug!(sql, statement = id.0, "prepare");
        self.prepared.insert(id, sql.to_string());
        Ok(id)
    }

    async fn query_prepared<'a>(
        &'a mut self,
        id: StatementId,
        params: &'a [SqlValue<'static>],
        options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        debug!(sql = self.statement_sql(id), statement = id.0, "query prepared");
        Self::log_params(params);
        self.inner.query_prepared(id, params, options).await
    }

    async fn execute_prepared(
        &mut self,
        id: StatementId,
        params: &[SqlValue<'static>],
    ) -> Result<u64> {
        debug!(sql = self.statement_sql(id), statement = id.0, "execute prepared");
        Self::log_params(params);
        self.inner.execute_prepared(id, params).await
    }

    async fn close_statement(&mut self, id: StatementId) -> Result<()> {
        debug!(statement = id.0, "close statement");
        self.prepared.remove(&id);
        self.inner.close_statement(id).await
    }

    async fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        debug!(%level, "set transaction isolation");
        self.inner.set_transaction_isolation(level).await
    }

    async fn begin(&mut self, read_only: bool) -> Result<()> {
        debug!(read_only, "begin");
        self.inner.begin(read_only).await
    }

    async fn commit(&mut self) -> Result<()> {
        debug!("commit");
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        debug!("rollback");
        self.inner.rollback().await
    }
}
