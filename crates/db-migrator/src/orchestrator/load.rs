//! Load job: catalog entries into a target database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pool::BlockingWorkerPool;
use super::query::{InsertQuery, SelectQuery};
use super::schema::{apply, script_context};
use super::{rows_per_second, EntryResult, EntryStatus, Totals};
use crate::access::{
    parse_time_zone, AccessOptions, RowBinder, ValueAccessProvider, ValueFormatRegistry,
};
use crate::catalog::{CatalogEntry, CatalogManager, EntryType};
use crate::config::{Config, InsertType, LoadConfig, MigrationMode, SchemaConfig, TableSpec};
use crate::core::identifier::Identifier;
use crate::core::session::{CursorOptions, Session, StatementId};
use crate::dialect::{Dialect, DialectResolver};
use crate::drivers::SessionFactory;
use crate::error::{MigrateError, Result};
use crate::format::InputFormat;
use crate::metadata::QualifiedName;
use crate::script::ScriptGeneratorManager;

/// Summary of a load run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    /// `completed`, `failed` or `cancelled`.
    pub status: String,
    pub input_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// DDL statements run from `schema.json`.
    pub schema_statements: usize,
    pub entries_total: usize,
    pub entries_success: usize,
    pub entries_failed: usize,
    pub rows_loaded: u64,
    pub rows_per_second: u64,
    pub failed_entries: Vec<String>,
    pub entries: Vec<EntryResult>,
}

/// How a batch ended.
enum BatchEnd {
    Full,
    Exhausted,
    Cancelled,
}

/// Loads a catalog into a target database.
pub struct LoadJob {
    config: LoadConfig,
    schema: SchemaConfig,
    factory: Arc<dyn SessionFactory>,
    registry: Arc<ValueFormatRegistry>,
    options: AccessOptions,
    cancel: CancellationToken,
}

impl LoadJob {
    /// Job for `config.load` writing to `config.target` through `factory`.
    pub fn new(config: &Config, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        config.target()?;
        let time_zone = config
            .load
            .time_zone
            .as_deref()
            .map(parse_time_zone)
            .transpose()?;
        Ok(Self {
            config: config.load.clone(),
            schema: config.schema.clone(),
            factory,
            registry: Arc::new(ValueFormatRegistry::builtin()),
            options: AccessOptions { time_zone },
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn run(&self) -> Result<LoadResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Loading from {}", self.config.input_dir.display());

        let catalog = Arc::new(CatalogManager::open(&self.config.input_dir)?);
        let manifest = catalog.read_catalog().await?;

        let schema_statements = if self.config.has_mode(MigrationMode::Schema) {
            self.apply_schema(&catalog).await?
        } else {
            0
        };

        let entries = if self.config.has_mode(MigrationMode::Data) {
            self.load_entries(&catalog, manifest.entries).await?
        } else {
            Vec::new()
        };

        let totals = Totals::of(&entries);
        let elapsed = start.elapsed();
        let result = LoadResult {
            status: totals.status().to_string(),
            input_dir: self.config.input_dir.clone(),
            started_at,
            completed_at: Utc::now(),
            duration_seconds: elapsed.as_secs_f64(),
            schema_statements,
            entries_total: entries.len(),
            entries_success: totals.success,
            entries_failed: totals.failed,
            rows_loaded: totals.rows,
            rows_per_second: rows_per_second(totals.rows, elapsed),
            failed_entries: totals.failed_entries,
            entries,
        };
        info!(
            "Load {}: {} entries, {} rows in {:.1}s ({} rows/sec)",
            result.status,
            result.entries_total,
            result.rows_loaded,
            result.duration_seconds,
            result.rows_per_second
        );
        Ok(result)
    }

    /// Run the DDL for `schema.json`, if the catalog has one.
    async fn apply_schema(&self, catalog: &CatalogManager) -> Result<usize> {
        let Some(database) = catalog.read_schema()? else {
            warn!("{} holds no schema document, skipping DDL", catalog.dir().display());
            return Ok(0);
        };
        let mut session = self.factory.open().await?;
        let dialect = match &self.schema.dialect {
            Some(name) => DialectResolver::default().by_name(name)?,
            None => DialectResolver::default().resolve(session.database_info()),
        };
        let state = catalog.read_session_state()?;
        let context = script_context(&self.schema, dialect, database.info.clone(), state);
        let scripts = ScriptGeneratorManager::new().database_scripts(&database, &context)?;
        info!("Applying {} schema statements", scripts.len());
        apply(session.as_mut(), &scripts).await
    }

    async fn load_entries(
        &self,
        catalog: &Arc<CatalogManager>,
        entries: Vec<CatalogEntry>,
    ) -> Result<Vec<EntryResult>> {
        let pool = BlockingWorkerPool::new(self.config.threads, self.config.queue_size);
        let worker = Arc::new(EntryLoader {
            factory: Arc::clone(&self.factory),
            catalog: Arc::clone(catalog),
            registry: Arc::clone(&self.registry),
            options: self.options,
            cancel: self.cancel.clone(),
            batch_size: self.config.batch_size.max(1),
            target_catalog: self.schema.target_catalog.clone(),
            target_schema: self.schema.target_schema.clone(),
        });

        let mut handles = Vec::new();
        let mut results = Vec::new();
        for entry in entries {
            if entry.entry_type == EntryType::Query {
                info!("{}: query entry has no target table, skipping", entry.name);
                continue;
            }
            let name = entry.name.clone();
            if self.cancel.is_cancelled() {
                results.push(EntryResult::skipped(name));
                continue;
            }
            let insert_type = self.config.insert_type_for(&name);
            let worker = Arc::clone(&worker);
            match pool.submit(async move { worker.load(entry, insert_type).await }).await {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    error!("{}: not scheduled - {}", name, e);
                    results.push(EntryResult::failed(name, e));
                }
            }
        }

        for (name, handle) in handles {
            match handle.join().await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("{}: task failed - {}", name, e);
                    results.push(EntryResult::failed(name, e));
                }
            }
        }
        pool.await_termination().await;
        Ok(results)
    }
}

/// State shared by load workers.
struct EntryLoader {
    factory: Arc<dyn SessionFactory>,
    catalog: Arc<CatalogManager>,
    registry: Arc<ValueFormatRegistry>,
    options: AccessOptions,
    cancel: CancellationToken,
    batch_size: usize,
    target_catalog: Option<String>,
    target_schema: Option<String>,
}

impl EntryLoader {
    async fn load(&self, entry: CatalogEntry, insert_type: InsertType) -> EntryResult {
        let name = entry.name.clone();
        if self.cancel.is_cancelled() {
            return EntryResult::skipped(name);
        }

        let start = Instant::now();
        info!("{}: loading", name);
        let outcome = self.load_entry(&entry, insert_type).await;
        let duration_seconds = start.elapsed().as_secs_f64();

        match outcome {
            Ok((rows, cancelled)) => {
                let status = if cancelled {
                    warn!("{}: cancelled after {} rows", name, rows);
                    EntryStatus::Cancelled
                } else {
                    info!("{}: completed ({} rows, {:.1}s)", name, rows, duration_seconds);
                    EntryStatus::Completed
                };
                EntryResult {
                    name,
                    status,
                    rows,
                    duration_seconds,
                    isolation: None,
                    error: None,
                }
            }
            Err(e) => {
                error!("{}: failed - {}", name, e);
                EntryResult {
                    duration_seconds,
                    ..EntryResult::failed(name, e)
                }
            }
        }
    }

    /// Table an entry loads into, after target catalog/schema overrides.
    fn target_table(&self, entry: &CatalogEntry) -> Result<QualifiedName> {
        let source = entry.source.as_deref().unwrap_or(&entry.name);
        let spec = TableSpec::parse(source)?;
        let (catalog, schema, name) = spec.name_parts();
        Ok(QualifiedName::new(
            self.target_catalog.as_deref().or(catalog),
            self.target_schema.as_deref().or(schema),
            name,
        ))
    }

    async fn load_entry(&self, entry: &CatalogEntry, insert_type: InsertType) -> Result<(u64, bool)> {
        let mut input = self.catalog.open_input(entry)?;
        let header = input.read_header()?;
        let columns: Vec<Identifier> = header.iter().map(|c| Identifier::parse(&c.name)).collect();
        let table = self.target_table(entry)?;

        let mut session = self.factory.open().await?;
        let dialect = DialectResolver::default().resolve(session.database_info());
        let binder = self
            .binder(session.as_mut(), &dialect, &table, &columns)
            .await?;

        let sql = InsertQuery::new(table, columns, insert_type).to_sql(&dialect)?;
        if insert_type == InsertType::Replace && !dialect.supports_replace() {
            warn!("{}: {} has no REPLACE, using INSERT", entry.name, dialect.name());
        }
        debug!("{}: {}", entry.name, sql);

        let statement = session.prepare(&sql).await?;
        let outcome = self
            .copy_rows(session.as_mut(), statement, input.as_mut(), &binder, &entry.name)
            .await;
        if let Err(e) = session.close_statement(statement).await {
            warn!("{}: closing statement failed - {}", entry.name, e);
        }
        outcome
    }

    /// Binder for the target's column types, read from an empty probe query.
    async fn binder(
        &self,
        session: &mut dyn Session,
        dialect: &Arc<dyn Dialect>,
        table: &QualifiedName,
        columns: &[Identifier],
    ) -> Result<RowBinder> {
        let probe = SelectQuery {
            columns: columns.to_vec(),
            filter: Some("1 = 0".to_string()),
            ..SelectQuery::new(table.clone())
        }
        .to_sql(dialect)?;
        let provider = ValueAccessProvider::new(
            Arc::clone(&self.registry),
            session.capabilities().clone(),
            self.options,
        );
        let cursor = session.query(&probe, &[], CursorOptions::default()).await?;
        let fields = cursor.fields();
        if fields.len() != columns.len() {
            return Err(MigrateError::transfer(
                table.to_string(),
                format!(
                    "target has {} of the {} catalog columns",
                    fields.len(),
                    columns.len()
                ),
            ));
        }
        provider.row_binder(fields.iter().map(|f| &f.type_desc))
    }

    /// Insert rows in batches, one transaction per batch.
    async fn copy_rows(
        &self,
        session: &mut dyn Session,
        statement: StatementId,
        input: &mut dyn InputFormat,
        binder: &RowBinder,
        entry: &str,
    ) -> Result<(u64, bool)> {
        let mut rows = 0u64;
        loop {
            session.begin(false).await?;
            match self.insert_batch(session, statement, input, binder, entry).await {
                Ok((count, end)) => {
                    session.commit().await?;
                    rows += count;
                    debug!("{}: committed {} rows", entry, rows);
                    match end {
                        BatchEnd::Full => continue,
                        BatchEnd::Exhausted => return Ok((rows, false)),
                        BatchEnd::Cancelled => return Ok((rows, true)),
                    }
                }
                Err(e) => {
                    if let Err(rollback) = session.rollback().await {
                        warn!("{}: rollback failed - {}", entry, rollback);
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn insert_batch(
        &self,
        session: &mut dyn Session,
        statement: StatementId,
        input: &mut dyn InputFormat,
        binder: &RowBinder,
        entry: &str,
    ) -> Result<(u64, BatchEnd)> {
        let mut count = 0u64;
        while count < self.batch_size as u64 {
            if self.cancel.is_cancelled() {
                return Ok((count, BatchEnd::Cancelled));
            }
            let Some(values) = input.read_row()? else {
                return Ok((count, BatchEnd::Exhausted));
            };
            let params = binder.bind(&values).map_err(|e| match e {
                MigrateError::Format { message, .. } => MigrateError::format(entry, message),
                other => other,
            })?;
            session.execute_prepared(statement, &params).await?;
            count += 1;
        }
        Ok((count, BatchEnd::Full))
    }
}
