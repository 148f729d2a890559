//! In-memory [`Session`] used by unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::session::{
    Cursor, CursorOptions, DatabaseInfo, DriverCapabilities, Field, IsolationLevel, Row, Session,
    StatementId,
};
use crate::core::types::{type_codes, JdbcTypeDesc};
use crate::core::value::SqlValue;
use crate::drivers::SessionFactory;
use crate::error::{MigrateError, Result};

/// Calls observed by a [`MockSession`].
#[derive(Debug, Default)]
pub struct MockStats {
    pub prepared: usize,
    pub closed: usize,
    pub open_statements: HashSet<u64>,
    pub queries: Vec<String>,
    /// `CursorOptions::fetch_size` of each ad-hoc query.
    pub fetch_sizes: Vec<usize>,
    pub executed: Vec<String>,
    pub params: Vec<Vec<SqlValue<'static>>>,
    pub isolation: Option<IsolationLevel>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub rows_fetched: usize,
}

#[derive(Clone)]
struct CannedResult {
    fragment: String,
    fields: Arc<[Field]>,
    rows: Vec<Vec<SqlValue<'static>>>,
}

pub struct MockSession {
    info: DatabaseInfo,
    capabilities: DriverCapabilities,
    results: Vec<CannedResult>,
    failures: Vec<(String, String)>,
    rejected_isolation: HashSet<IsolationLevel>,
    statements: Vec<String>,
    cancel_after: Option<(usize, CancellationToken)>,
    stats: Arc<Mutex<MockStats>>,
}

/// Type descriptor guessed from a sample value.
fn desc_for(value: Option<&SqlValue<'static>>) -> JdbcTypeDesc {
    let code = match value {
        Some(SqlValue::Bool(_)) => type_codes::BOOLEAN,
        Some(SqlValue::I16(_)) => type_codes::SMALLINT,
        Some(SqlValue::I32(_)) => type_codes::INTEGER,
        Some(SqlValue::I64(_)) => type_codes::BIGINT,
        Some(SqlValue::F32(_)) => type_codes::REAL,
        Some(SqlValue::F64(_)) => type_codes::DOUBLE,
        Some(SqlValue::Decimal(_)) => type_codes::DECIMAL,
        Some(SqlValue::Bytes(_)) => type_codes::VARBINARY,
        Some(SqlValue::Date(_)) => type_codes::DATE,
        Some(SqlValue::Time(_)) => type_codes::TIME,
        Some(SqlValue::DateTime(_)) => type_codes::TIMESTAMP,
        Some(SqlValue::DateTimeOffset(_)) => type_codes::TIMESTAMP_WITH_TIMEZONE,
        _ => type_codes::VARCHAR,
    };
    JdbcTypeDesc::code(code)
}

impl MockSession {
    pub fn new(product_name: &str) -> Self {
        Self {
            info: DatabaseInfo::new(product_name, "1.0"),
            capabilities: DriverCapabilities {
                server_side_cursors: true,
                ..DriverCapabilities::default()
            },
            results: Vec::new(),
            failures: Vec::new(),
            rejected_isolation: HashSet::new(),
            statements: Vec::new(),
            cancel_after: None,
            stats: Arc::new(Mutex::new(MockStats::default())),
        }
    }

    /// Rows returned by any query whose SQL contains `fragment`.
    /// Field types are guessed from the first row.
    pub fn with_result(
        self,
        fragment: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Self {
        let fields = columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let sample = rows.iter().map(|r| &r[i]).find(|v| !v.is_null());
                Field::new(*name, desc_for(sample))
            })
            .collect();
        self.with_fields(fragment, fields, rows)
    }

    pub fn with_fields(
        mut self,
        fragment: &str,
        fields: Vec<Field>,
        rows: Vec<Vec<SqlValue<'static>>>,
    ) -> Self {
        self.results.push(CannedResult {
            fragment: fragment.to_string(),
            fields: fields.into(),
            rows,
        });
        self
    }

    /// Fail statements whose SQL contains `fragment`.
    pub fn with_failure(mut self, fragment: &str, message: &str) -> Self {
        self.failures
            .push((fragment.to_string(), message.to_string()));
        self
    }

    pub fn rejecting_isolation(mut self, level: IsolationLevel) -> Self {
        self.rejected_isolation.insert(level);
        self
    }

    pub fn with_capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Cancel `token` once `rows` rows have been fetched.
    pub fn cancel_after(mut self, rows: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((rows, token));
        self
    }

    pub fn stats(&self) -> Arc<Mutex<MockStats>> {
        Arc::clone(&self.stats)
    }

    /// Record into `stats`, shared with other sessions.
    pub fn with_stats(mut self, stats: Arc<Mutex<MockStats>>) -> Self {
        self.stats = stats;
        self
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        match self.failures.iter().find(|(f, _)| sql.contains(f.as_str())) {
            Some((_, message)) => Err(MigrateError::database(message, sql)),
            None => Ok(()),
        }
    }

    fn open(&self, sql: &str, params: &[SqlValue<'static>]) -> Result<Box<dyn Cursor + '_>> {
        self.check_failure(sql)?;
        {
            let mut stats = self.stats.lock().unwrap();
            stats.queries.push(sql.to_string());
            stats.params.push(params.to_vec());
        }
        let canned = self
            .results
            .iter()
            .find(|r| sql.contains(r.fragment.as_str()));
        let (fields, rows) = match canned {
            Some(r) => (Arc::clone(&r.fields), r.rows.clone().into()),
            None => (Arc::from(Vec::new()), VecDeque::new()),
        };
        Ok(Box::new(MockCursor {
            fields,
            rows,
            stats: Arc::clone(&self.stats),
            cancel_after: self.cancel_after.clone(),
        }))
    }

    fn statement(&self, id: StatementId) -> Result<String> {
        self.statements
            .get(id.0 as usize)
            .cloned()
            .ok_or_else(|| MigrateError::database("unknown statement", id.0.to_string()))
    }
}

struct MockCursor {
    fields: Arc<[Field]>,
    rows: VecDeque<Vec<SqlValue<'static>>>,
    stats: Arc<Mutex<MockStats>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[async_trait]
impl Cursor for MockCursor {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(values) = self.rows.pop_front() else {
            return Ok(None);
        };
        let fetched = {
            let mut stats = self.stats.lock().unwrap();
            stats.rows_fetched += 1;
            stats.rows_fetched
        };
        if let Some((limit, token)) = &self.cancel_after {
            if fetched >= *limit {
                token.cancel();
            }
        }
        Ok(Some(Row::new(Arc::clone(&self.fields), values)))
    }
}

#[async_trait]
impl Session for MockSession {
    fn database_info(&self) -> &DatabaseInfo {
        &self.info
    }

    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64> {
        self.check_failure(sql)?;
        let mut stats = self.stats.lock().unwrap();
        stats.executed.push(sql.to_string());
        stats.params.push(params.to_vec());
        Ok(1)
    }

    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [SqlValue<'static>],
        options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let cursor = self.open(sql, params)?;
        self.stats.lock().unwrap().fetch_sizes.push(options.fetch_size);
        Ok(cursor)
    }

    async fn prepare(&mut self, sql: &str) -> Result<StatementId> {
        self.check_failure(sql)?;
        let id = StatementId(self.statements.len() as u64);
        self.statements.push(sql.to_string());
        let mut stats = self.stats.lock().unwrap();
        stats.prepared += 1;
        stats.open_statements.insert(id.0);
        Ok(id)
    }

    async fn query_prepared<'a>(
        &'a mut self,
        id: StatementId,
        params: &'a [SqlValue<'static>],
        _options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let sql = self.statement(id)?;
        self.open(&sql, params)
    }

    async fn execute_prepared(
        &mut self,
        id: StatementId,
        params: &[SqlValue<'static>],
    ) -> Result<u64> {
        let sql = self.statement(id)?;
        self.execute(&sql, params).await
    }

    async fn close_statement(&mut self, id: StatementId) -> Result<()> {
        let mut stats = self.stats.lock().unwrap();
        stats.closed += 1;
        stats.open_statements.remove(&id.0);
        Ok(())
    }

    async fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        if self.rejected_isolation.contains(&level) {
            return Err(MigrateError::database(
                format!("isolation level {} not supported", level),
                "set_transaction_isolation",
            ));
        }
        self.stats.lock().unwrap().isolation = Some(level);
        Ok(())
    }

    async fn begin(&mut self, _read_only: bool) -> Result<()> {
        self.stats.lock().unwrap().begins += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.stats.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.stats.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

/// [`SessionFactory`] building a fresh [`MockSession`] per call.
pub struct MockFactory {
    build: Box<dyn Fn() -> MockSession + Send + Sync>,
    opened: AtomicUsize,
}

impl MockFactory {
    pub fn new<F>(build: F) -> Arc<Self>
    where
        F: Fn() -> MockSession + Send + Sync + 'static,
    {
        Arc::new(Self {
            build: Box::new(build),
            opened: AtomicUsize::new(0),
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn open(&self) -> Result<Box<dyn Session>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new((self.build)()))
    }
}
