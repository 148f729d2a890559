//! Dump job: source tables and queries into a catalog directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pool::BlockingWorkerPool;
use super::query::{DumpQuery, NativeQuery, SelectQuery};
use super::schema::source_state;
use super::{negotiate_isolation, rows_per_second, EntryResult, EntryStatus, Totals};
use crate::access::{parse_time_zone, AccessOptions, ValueAccessProvider, ValueFormatRegistry};
use crate::catalog::{CatalogEntry, CatalogManager};
use crate::config::{Config, DumpConfig, MigrationMode};
use crate::core::session::{CursorOptions, IsolationLevel, Session};
use crate::dialect::{Dialect, DialectResolver};
use crate::drivers::SessionFactory;
use crate::error::{MigrateError, Result};
use crate::format::{FormatColumn, FormatType};
use crate::inspector::{InspectionManager, InspectionScope};
use crate::metadata::{Database, MetaDataType};

/// Summary of a dump run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpResult {
    /// `completed`, `failed` or `cancelled`.
    pub status: String,
    pub output_dir: PathBuf,
    pub format: FormatType,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// `schema.json` was written.
    pub schema_written: bool,
    pub entries_total: usize,
    pub entries_success: usize,
    pub entries_failed: usize,
    pub rows_dumped: u64,
    pub rows_per_second: u64,
    pub failed_entries: Vec<String>,
    pub entries: Vec<EntryResult>,
}

/// A catalog entry and the SQL that fills it.
struct PlannedEntry {
    entry: CatalogEntry,
    sql: String,
}

/// Dumps a source database into a catalog.
pub struct DumpJob {
    config: DumpConfig,
    scope: InspectionScope,
    meta_data_types: Vec<MetaDataType>,
    factory: Arc<dyn SessionFactory>,
    registry: Arc<ValueFormatRegistry>,
    options: AccessOptions,
    cancel: CancellationToken,
}

impl DumpJob {
    /// Job for `config.dump` reading from `config.source` through `factory`.
    pub fn new(config: &Config, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        let source = config.source()?;
        let time_zone = config
            .dump
            .time_zone
            .as_deref()
            .map(parse_time_zone)
            .transpose()?;
        Ok(Self {
            config: config.dump.clone(),
            scope: source.scope(&config.dump.table_types),
            meta_data_types: config.schema.meta_data_types.clone(),
            factory,
            registry: Arc::new(ValueFormatRegistry::builtin()),
            options: AccessOptions { time_zone },
            cancel: CancellationToken::new(),
        })
    }

    /// Stop cooperatively when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_registry(mut self, registry: ValueFormatRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub async fn run(&self) -> Result<DumpResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(
            "Dumping to {} as {}",
            self.config.output_dir.display(),
            self.config.format
        );

        let catalog = Arc::new(CatalogManager::create(&self.config.output_dir)?);
        let (planned, schema_written) = self.plan(&catalog).await?;
        info!("Planned {} entries", planned.len());

        let entries = if self.config.has_mode(MigrationMode::Data) {
            self.dump_entries(&catalog, planned).await?
        } else {
            Vec::new()
        };
        catalog.write_catalog().await?;

        let totals = Totals::of(&entries);
        let elapsed = start.elapsed();
        let result = DumpResult {
            status: totals.status().to_string(),
            output_dir: self.config.output_dir.clone(),
            format: self.config.format,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: elapsed.as_secs_f64(),
            schema_written,
            entries_total: entries.len(),
            entries_success: totals.success,
            entries_failed: totals.failed,
            rows_dumped: totals.rows,
            rows_per_second: rows_per_second(totals.rows, elapsed),
            failed_entries: totals.failed_entries,
            entries,
        };
        info!(
            "Dump {}: {} entries, {} rows in {:.1}s ({} rows/sec)",
            result.status,
            result.entries_total,
            result.rows_dumped,
            result.duration_seconds,
            result.rows_per_second
        );
        Ok(result)
    }

    /// Inspect the source when needed and build one query per entry.
    async fn plan(&self, catalog: &CatalogManager) -> Result<(Vec<PlannedEntry>, bool)> {
        let mut session = self.factory.open().await?;
        let dialect = DialectResolver::default().resolve(session.database_info());

        let schema_mode = self.config.has_mode(MigrationMode::Schema);
        let data_mode = self.config.has_mode(MigrationMode::Data);
        let dump_all = self.config.tables.is_empty() && self.config.queries.is_empty();

        let mut database = None;
        if schema_mode || (data_mode && dump_all) {
            let mut types = if schema_mode {
                self.meta_data_types.clone()
            } else {
                Vec::new()
            };
            types.extend([MetaDataType::Table, MetaDataType::Column]);
            let results = InspectionManager::new()
                .inspect(session.as_mut(), &self.scope, &types)
                .await?;
            let inspected = results
                .into_database()
                .unwrap_or_else(|| Database::new(session.database_info().clone()));
            if schema_mode {
                catalog.write_schema(&inspected)?;
                info!("Wrote {}", catalog.schema_path().display());
                if let Some(state) = source_state(session.as_mut()).await {
                    catalog.write_session_state(&state)?;
                }
            }
            database = Some(inspected);
        }

        let mut planned = Vec::new();
        if !data_mode {
            return Ok((planned, schema_mode));
        }

        let format = self.config.format;
        let limit = self.config.query_limit;
        if dump_all {
            let tables = database
                .iter()
                .flat_map(|d| d.tables())
                .filter(|t| self.scope.accepts_table_type(&t.table_type));
            for table in tables {
                let query = DumpQuery::Select(SelectQuery::for_table(table).with_limit(limit));
                let name = catalog
                    .reserve_entry_name(&table.qualified_name().to_string())
                    .await;
                planned.push(PlannedEntry {
                    sql: query.to_sql(&dialect)?,
                    entry: query.entry(name, format),
                });
            }
        }
        for spec in &self.config.tables {
            let query = DumpQuery::Select(SelectQuery::for_spec(spec).with_limit(limit));
            let name = catalog.reserve_entry_name(&spec.name).await;
            planned.push(PlannedEntry {
                sql: query.to_sql(&dialect)?,
                entry: query.entry(name, format),
            });
        }
        for sql in &self.config.queries {
            let query = DumpQuery::Native(NativeQuery::new(sql.as_str()).with_limit(limit));
            let name = catalog.reserve_query_name(Local::now().time()).await;
            planned.push(PlannedEntry {
                sql: query.to_sql(&dialect)?,
                entry: query.entry(name, format),
            });
        }
        Ok((planned, schema_mode))
    }

    async fn dump_entries(
        &self,
        catalog: &Arc<CatalogManager>,
        planned: Vec<PlannedEntry>,
    ) -> Result<Vec<EntryResult>> {
        let pool = BlockingWorkerPool::new(self.config.threads, self.config.queue_size);
        let worker = Arc::new(EntryDumper {
            factory: Arc::clone(&self.factory),
            catalog: Arc::clone(catalog),
            registry: Arc::clone(&self.registry),
            options: self.options,
            cancel: self.cancel.clone(),
        });

        let mut handles = Vec::with_capacity(planned.len());
        let mut results = Vec::new();
        for item in planned {
            let name = item.entry.name.clone();
            if self.cancel.is_cancelled() {
                results.push(EntryResult::skipped(name));
                continue;
            }
            let worker = Arc::clone(&worker);
            match pool.submit(async move { worker.dump(item).await }).await {
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

/// State shared by dump workers.
struct EntryDumper {
    factory: Arc<dyn SessionFactory>,
    catalog: Arc<CatalogManager>,
    registry: Arc<ValueFormatRegistry>,
    options: AccessOptions,
    cancel: CancellationToken,
}

impl EntryDumper {
    async fn dump(&self, planned: PlannedEntry) -> EntryResult {
        let PlannedEntry { mut entry, sql } = planned;
        let name = entry.name.clone();
        if self.cancel.is_cancelled() {
            return EntryResult::skipped(name);
        }

        let start = Instant::now();
        info!("{}: dumping", name);
        let outcome = self.dump_entry(&mut entry, &sql).await;
        let duration_seconds = start.elapsed().as_secs_f64();

        match outcome {
            Ok((rows, isolation, cancelled)) => {
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
                    isolation,
                    error: None,
                }
            }
            Err(e) => {
                error!("{}: failed - {}", name, e);
                let path = self.catalog.entry_path(&entry);
                if path.exists() {
                    if let Err(remove) = std::fs::remove_file(&path) {
                        warn!("Could not remove {}: {}", path.display(), remove);
                    }
                }
                EntryResult {
                    duration_seconds,
                    ..EntryResult::failed(name, e)
                }
            }
        }
    }

    /// Stream one entry inside a read-only transaction.
    async fn dump_entry(
        &self,
        entry: &mut CatalogEntry,
        sql: &str,
    ) -> Result<(u64, Option<IsolationLevel>, bool)> {
        let mut session = self.factory.open().await?;
        let dialect = DialectResolver::default().resolve(session.database_info());
        let isolation = negotiate_isolation(session.as_mut(), dialect.as_ref()).await;

        session.begin(true).await?;
        match self.stream(session.as_mut(), dialect.as_ref(), entry, sql).await {
            Ok((rows, cancelled)) => {
                session.commit().await?;
                Ok((rows, isolation, cancelled))
            }
            Err(e) => {
                if let Err(rollback) = session.rollback().await {
                    warn!("{}: rollback failed - {}", entry.name, rollback);
                }
                Err(e)
            }
        }
    }

    /// Copy rows from the cursor into the entry's output.
    ///
    /// The cancellation token is checked before every row. A cancelled
    /// entry is still terminated and registered with the rows written.
    async fn stream(
        &self,
        session: &mut dyn Session,
        dialect: &dyn Dialect,
        entry: &mut CatalogEntry,
        sql: &str,
    ) -> Result<(u64, bool)> {
        let provider = ValueAccessProvider::new(
            Arc::clone(&self.registry),
            session.capabilities().clone(),
            self.options,
        );
        debug!("{}: {}", entry.name, sql);
        let mut cursor = session
            .query(sql, &[], CursorOptions::streaming(dialect.streaming_fetch_size()))
            .await?;
        let reader = provider.row_reader(cursor.fields())?;
        entry.columns = cursor
            .fields()
            .iter()
            .zip(reader.value_types())
            .map(|(field, value_type)| FormatColumn::new(field.name.clone(), value_type))
            .collect();

        let mut output = self.catalog.open_output(entry)?;
        output.write_start(&entry.columns)?;
        let mut rows = 0u64;
        let mut cancelled = false;
        loop {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let Some(row) = cursor.next_row().await? else {
                break;
            };
            let values = reader.read(&row).map_err(|e| match e {
                MigrateError::Format { message, .. } => MigrateError::format(&entry.name, message),
                other => other,
            })?;
            output.write_row(&values)?;
            rows += 1;
        }
        output.write_end()?;

        entry.rows = Some(rows);
        self.catalog.add_entry(entry.clone()).await;
        Ok((rows, cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntryType;
    use crate::config::{ConnectionConfig, DatabaseType, TableSpec};
    use crate::core::value::{SqlNullType, SqlValue, Value};
    use crate::dialect::PostgresDialect;
    use crate::format;
    use crate::testing::{MockFactory, MockSession, MockStats};
    use std::sync::Mutex;

    fn config(dir: &std::path::Path, tables: &[&str]) -> Config {
        let mut config = Config {
            source: Some(ConnectionConfig::new(DatabaseType::Postgres, "localhost", "shop", "app")),
            ..Config::default()
        };
        config.dump.output_dir = dir.to_path_buf();
        config.dump.format = FormatType::Csv;
        config.dump.threads = 2;
        config.dump.migration_modes = vec![MigrationMode::Data];
        config.dump.tables = tables.iter().map(|t| TableSpec::parse(t).unwrap()).collect();
        config
    }

    fn orders() -> Vec<Vec<SqlValue<'static>>> {
        vec![
            vec![SqlValue::I32(1), SqlValue::from("apple")],
            vec![SqlValue::I32(2), SqlValue::Null(SqlNullType::String)],
            vec![SqlValue::I32(3), SqlValue::from("pear")],
        ]
    }

    async fn read_entry(dir: &std::path::Path, name: &str) -> Vec<Vec<Value>> {
        let manager = CatalogManager::open(dir).unwrap();
        let catalog = manager.read_catalog().await.unwrap();
        let entry = catalog.entry(name).unwrap().clone();
        let mut input = manager.open_input(&entry).unwrap();
        input.read_header().unwrap();
        format::rows(input.as_mut()).collect::<Result<Vec<_>>>().unwrap()
    }

    #[tokio::test]
    async fn test_dump_table_spec() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(Mutex::new(MockStats::default()));
        let shared = Arc::clone(&stats);
        let factory = MockFactory::new(move || {
            MockSession::new("PostgreSQL")
                .with_result("FROM \"public\".\"orders\"", &["id", "fruit"], orders())
                .with_stats(Arc::clone(&shared))
        });

        let job = DumpJob::new(&config(dir.path(), &["public.orders"]), factory.clone()).unwrap();
        let result = job.run().await.unwrap();
        // One session plans, one dumps the entry.
        assert_eq!(factory.opened(), 2);

        assert_eq!(result.status, "completed");
        assert_eq!(result.entries_success, 1);
        assert_eq!(result.rows_dumped, 3);
        assert!(!result.schema_written);
        assert_eq!(result.entries[0].isolation, Some(IsolationLevel::Serializable));

        let rows = read_entry(dir.path(), "public.orders").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![Value::string("1"), Value::string("apple")]);
        assert_eq!(rows[1][1], Value::Null);

        let stats = stats.lock().unwrap();
        assert_eq!(stats.begins, 1);
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.queries, vec!["SELECT * FROM \"public\".\"orders\"".to_string()]);
        // Streamed with the dialect's fetch size.
        assert_eq!(stats.fetch_sizes, vec![PostgresDialect::new().streaming_fetch_size()]);
    }

    #[tokio::test]
    async fn test_filtered_specs_on_one_table_get_separate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockFactory::new(|| {
            MockSession::new("PostgreSQL")
                .with_result("id < 2", &["id", "fruit"], orders()[..1].to_vec())
                .with_result("id >= 2", &["id", "fruit"], orders()[1..].to_vec())
        });
        let mut config = config(dir.path(), &["public.orders@id < 2", "public.orders@id >= 2"]);
        config.dump.threads = 1;

        let result = DumpJob::new(&config, factory).unwrap().run().await.unwrap();
        assert_eq!(result.status, "completed");
        assert_eq!(result.rows_dumped, 3);

        let manager = CatalogManager::open(dir.path()).unwrap();
        let catalog = manager.read_catalog().await.unwrap();
        assert_eq!(catalog.entries.len(), 2);
        // Both load back into the same table.
        assert!(catalog.entries.iter().all(|e| e.source.as_deref() == Some("public.orders")));
        let rows: u64 = catalog.entries.iter().filter_map(|e| e.rows).sum();
        assert_eq!(rows, result.rows_dumped);

        let first = read_entry(dir.path(), "public.orders").await;
        assert_eq!(first, vec![vec![Value::string("1"), Value::string("apple")]]);
        let second = read_entry(dir.path(), "public.orders-2").await;
        assert_eq!(second.len(), 2);
        assert_eq!(second[1][1], Value::string("pear"));
    }

    #[tokio::test]
    async fn test_failed_duplicate_spec_keeps_other_file() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockFactory::new(|| {
            MockSession::new("PostgreSQL")
                .with_failure("id >= 2", "canceling statement due to statement timeout")
                .with_result("\"orders\"", &["id", "fruit"], orders())
        });
        let mut config = config(dir.path(), &["public.orders@id < 9", "public.orders@id >= 2"]);
        config.dump.threads = 1;

        let result = DumpJob::new(&config, factory).unwrap().run().await.unwrap();
        assert_eq!(result.status, "failed");
        assert_eq!(result.failed_entries, vec!["public.orders-2".to_string()]);
        assert_eq!(read_entry(dir.path(), "public.orders").await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_abort_others() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockFactory::new(|| {
            MockSession::new("PostgreSQL")
                .with_result("\"orders\"", &["id", "fruit"], orders())
                .with_failure("\"missing\"", "relation \"missing\" does not exist")
        });

        let config = config(dir.path(), &["public.orders", "public.missing"]);
        let result = DumpJob::new(&config, factory).unwrap().run().await.unwrap();

        assert_eq!(result.status, "failed");
        assert_eq!(result.entries_success, 1);
        assert_eq!(result.entries_failed, 1);
        assert_eq!(result.failed_entries, vec!["public.missing".to_string()]);

        let manager = CatalogManager::open(dir.path()).unwrap();
        let catalog = manager.read_catalog().await.unwrap();
        assert!(catalog.entry("public.orders").is_some());
        assert!(catalog.entry("public.missing").is_none());
    }

    #[tokio::test]
    async fn test_cancellation_closes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let session_token = token.clone();
        let factory = MockFactory::new(move || {
            MockSession::new("PostgreSQL")
                .with_result("\"orders\"", &["id", "fruit"], orders())
                .cancel_after(1, session_token.clone())
        });

        let config = config(dir.path(), &["public.orders"]);
        let job = DumpJob::new(&config, factory).unwrap().with_cancellation(token);
        let result = job.run().await.unwrap();

        assert_eq!(result.status, "cancelled");
        assert_eq!(result.entries[0].status, EntryStatus::Cancelled);
        assert_eq!(result.rows_dumped, 1);
        assert_eq!(read_entry(dir.path(), "public.orders").await.len(), 1);
    }

    #[tokio::test]
    async fn test_native_query_entry() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockFactory::new(|| {
            MockSession::new("PostgreSQL").with_result("count(*)", &["n"], vec![vec![SqlValue::I64(42)]])
        });
        let mut config = config(dir.path(), &[]);
        config.dump.queries = vec!["SELECT count(*) AS n FROM orders;".into()];

        let result = DumpJob::new(&config, factory).unwrap().run().await.unwrap();
        assert_eq!(result.entries_success, 1);

        let manager = CatalogManager::open(dir.path()).unwrap();
        let catalog = manager.read_catalog().await.unwrap();
        let entry = &catalog.entries[0];
        assert_eq!(entry.entry_type, EntryType::Query);
        assert!(entry.name.starts_with("query-"));
        assert_eq!(entry.rows, Some(1));
    }

    #[tokio::test]
    async fn test_query_limit_and_isolation_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(Mutex::new(MockStats::default()));
        let shared = Arc::clone(&stats);
        let factory = MockFactory::new(move || {
            MockSession::new("PostgreSQL")
                .rejecting_isolation(IsolationLevel::Serializable)
                .with_stats(Arc::clone(&shared))
        });
        let mut config = config(dir.path(), &["public.orders:id"]);
        config.dump.query_limit = Some(10);

        let result = DumpJob::new(&config, factory).unwrap().run().await.unwrap();
        assert_eq!(result.entries[0].isolation, Some(IsolationLevel::RepeatableRead));
        let stats = stats.lock().unwrap();
        assert!(stats.queries[0].starts_with("SELECT \"id\" FROM \"public\".\"orders\""));
        assert!(stats.queries[0].contains("10"));
    }

    #[tokio::test]
    async fn test_schema_mode_writes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockFactory::new(|| MockSession::new("PostgreSQL"));
        let mut config = config(dir.path(), &[]);
        config.dump.migration_modes = vec![MigrationMode::Schema];

        let result = DumpJob::new(&config, factory).unwrap().run().await.unwrap();
        assert!(result.schema_written);
        assert_eq!(result.entries_total, 0);

        let manager = CatalogManager::open(dir.path()).unwrap();
        let database = manager.read_schema().unwrap().unwrap();
        assert_eq!(database.info.product_name, "PostgreSQL");
    }

    #[tokio::test]
    async fn test_schema_mode_records_mysql_sql_mode() {
        let dir = tempfile::tempdir().unwrap();
        let factory = MockFactory::new(|| {
            MockSession::new("MySQL").with_result(
                "SQL_MODE",
                &["mode"],
                vec![vec![SqlValue::from("STRICT_ALL_TABLES")]],
            )
        });
        let mut config = config(dir.path(), &[]);
        config.dump.migration_modes = vec![MigrationMode::Schema];
        DumpJob::new(&config, factory).unwrap().run().await.unwrap();

        let manager = CatalogManager::open(dir.path()).unwrap();
        let state = manager.read_session_state().unwrap().unwrap();
        assert_eq!(
            state.get(crate::dialect::SQL_MODE).unwrap(),
            ["STRICT_ALL_TABLES".to_string()]
        );
    }

    #[test]
    fn test_requires_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), &[]);
        config.source = None;
        let factory = MockFactory::new(|| MockSession::new("PostgreSQL"));
        assert!(matches!(DumpJob::new(&config, factory), Err(MigrateError::Config(_))));
    }
}
