//! Schema job: DDL for a target dialect from an inspected source or a catalog.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::CatalogManager;
use crate::config::{Config, SchemaConfig};
use crate::core::session::{DatabaseInfo, Session};
use crate::dialect::{
    products, CurrentTimestampTranslator, Dialect, DialectResolver, MySqlBitLiteralTranslator,
    MySqlImplicitDefaultsTranslator, SessionState, TranslationManager,
};
use crate::drivers::SessionFactory;
use crate::error::{MigrateError, Result};
use crate::inspector::{InspectionManager, InspectionScope};
use crate::metadata::Database;
use crate::script::{
    ScriptExporter, ScriptGeneratorContext, ScriptGeneratorManager, SessionScriptExporter,
    WriterScriptExporter,
};

/// Dialect used when neither the configuration nor a target names one.
pub const DEFAULT_DIALECT: &str = "nuodb";

/// Where the schema comes from.
pub enum SchemaInput {
    /// Inspect a live source.
    Inspect {
        factory: Arc<dyn SessionFactory>,
        scope: InspectionScope,
    },
    /// Read `schema.json` from a dump catalog.
    Catalog(PathBuf),
}

/// Where the scripts go.
pub enum SchemaOutput {
    Stdout,
    File(PathBuf),
    /// Execute on a live target.
    Target(Arc<dyn SessionFactory>),
}

impl SchemaOutput {
    fn describe(&self) -> String {
        match self {
            SchemaOutput::Stdout => "stdout".to_string(),
            SchemaOutput::File(path) => path.display().to_string(),
            SchemaOutput::Target(_) => "target".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaResult {
    pub status: String,
    pub source_product: String,
    pub dialect: String,
    pub output: String,
    pub scripts: usize,
    /// Statements run on the target; zero for file output.
    pub executed: usize,
    pub duration_seconds: f64,
}

/// Generates (and optionally applies) DDL.
pub struct SchemaJob {
    config: SchemaConfig,
    input: SchemaInput,
    output: SchemaOutput,
}

impl SchemaJob {
    pub fn new(config: SchemaConfig, input: SchemaInput, output: SchemaOutput) -> Self {
        Self {
            config,
            input,
            output,
        }
    }

    /// Job inspecting `config.source` and writing to `config.schema.output`
    /// or stdout.
    pub fn from_config(config: &Config, source: Arc<dyn SessionFactory>) -> Result<Self> {
        let scope = config.source()?.scope(&config.dump.table_types);
        let output = match &config.schema.output {
            Some(path) => SchemaOutput::File(path.clone()),
            None => SchemaOutput::Stdout,
        };
        Ok(Self::new(
            config.schema.clone(),
            SchemaInput::Inspect {
                factory: source,
                scope,
            },
            output,
        ))
    }

    pub async fn run(&self) -> Result<SchemaResult> {
        let start = Instant::now();
        let (database, state) = self.read_schema().await?;

        let mut target = match &self.output {
            SchemaOutput::Target(factory) => Some(factory.open().await?),
            _ => None,
        };
        let dialect = match (&self.config.dialect, &target) {
            (Some(name), _) => DialectResolver::default().by_name(name)?,
            (None, Some(session)) => DialectResolver::default().resolve(session.database_info()),
            (None, None) => DialectResolver::default().by_name(DEFAULT_DIALECT)?,
        };
        info!(
            "Generating {} DDL from {} schema",
            dialect.name(),
            database.info.product_name
        );

        let context = script_context(&self.config, Arc::clone(&dialect), database.info.clone(), state);
        let scripts = ScriptGeneratorManager::new().database_scripts(&database, &context)?;

        let executed = match (&self.output, target.as_mut()) {
            (SchemaOutput::Target(_), Some(session)) => apply(session.as_mut(), &scripts).await?,
            (SchemaOutput::File(path), _) => {
                export(&mut WriterScriptExporter::create(path)?, &scripts).await?;
                0
            }
            _ => {
                export(&mut WriterScriptExporter::stdout(), &scripts).await?;
                0
            }
        };

        let result = SchemaResult {
            status: "completed".to_string(),
            source_product: database.info.product_name.clone(),
            dialect: dialect.name().to_string(),
            output: self.output.describe(),
            scripts: scripts.len(),
            executed,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        info!("Generated {} scripts to {}", result.scripts, result.output);
        Ok(result)
    }

    /// The schema plus, for a MySQL source, its cached `SQL_MODE`.
    async fn read_schema(&self) -> Result<(Database, Option<SessionState>)> {
        match &self.input {
            SchemaInput::Catalog(dir) => {
                let catalog = CatalogManager::open(dir)?;
                let database = catalog.read_schema()?.ok_or_else(|| {
                    MigrateError::Catalog(format!("{} holds no schema document", dir.display()))
                })?;
                Ok((database, catalog.read_session_state()?))
            }
            SchemaInput::Inspect { factory, scope } => {
                let mut session = factory.open().await?;
                let state = source_state(session.as_mut()).await;
                let database = InspectionManager::new()
                    .inspect(session.as_mut(), scope, &self.config.meta_data_types)
                    .await?
                    .into_database()
                    .unwrap_or_else(|| Database::new(session.database_info().clone()));
                Ok((database, state))
            }
        }
    }
}

/// Session state the translators need, read from a MySQL source.
pub(super) async fn source_state(session: &mut dyn Session) -> Option<SessionState> {
    if !session.database_info().is(products::MYSQL) {
        return None;
    }
    let mut state = SessionState::new();
    match state.sql_mode(session, false).await {
        Ok(_) => Some(state),
        Err(e) => {
            warn!("{}; implicit defaults are assumed", e);
            None
        }
    }
}

/// Generator context for `config`. Strict-mode checks are on only when the
/// source's session state is known.
pub(super) fn script_context(
    config: &SchemaConfig,
    dialect: Arc<dyn Dialect>,
    source: DatabaseInfo,
    state: Option<SessionState>,
) -> ScriptGeneratorContext {
    let mut translations = TranslationManager::empty();
    translations.register(Arc::new(MySqlBitLiteralTranslator));
    translations.register(Arc::new(MySqlImplicitDefaultsTranslator {
        check_strict_mode: state.is_some(),
        implicit_defaults: true,
    }));
    translations.register(Arc::new(CurrentTimestampTranslator));

    let context = ScriptGeneratorContext::new(dialect)
        .with_target_catalog(config.target_catalog.as_deref())
        .with_target_schema(config.target_schema.as_deref())
        .with_script_types(config.script_types.iter().copied())
        .with_meta_data_types(config.meta_data_types.iter().copied())
        .with_normalizer(config.identifier_normalizer)
        .with_translations(translations)
        .with_source(source);
    match state {
        Some(state) => context.with_session_state(state),
        None => context,
    }
}

async fn export(exporter: &mut dyn ScriptExporter, scripts: &[String]) -> Result<()> {
    exporter.open().await?;
    let exported = exporter.export_scripts(scripts).await;
    let closed = exporter.close().await;
    exported.and(closed)
}

/// Execute scripts on `session`; returns the statements that ran.
pub(super) async fn apply(session: &mut dyn Session, scripts: &[String]) -> Result<usize> {
    let mut exporter = SessionScriptExporter::new(session);
    export(&mut exporter, scripts).await?;
    Ok(exporter.executed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::Identifier;
    use crate::core::types::{type_codes, JdbcTypeDesc};
    use crate::core::value::SqlValue;
    use crate::metadata::{Catalog, MetaDataType, PrimaryKey, Schema, Table};
    use crate::script::ScriptType;
    use crate::testing::{MockFactory, MockSession, MockStats};
    use std::sync::Mutex;

    fn database() -> Database {
        let mut table = Table::new(None, Some(Identifier::new("shop")), Identifier::new("orders"));
        let id = table.add_column(Identifier::new("id"));
        id.type_desc = JdbcTypeDesc::code(type_codes::INTEGER);
        id.nullable = false;
        table.primary_key = Some(PrimaryKey {
            name: None,
            columns: vec![Identifier::new("id")],
        });
        let mut database = Database::new(DatabaseInfo::new("PostgreSQL", "16.2"));
        database.catalogs.push(Catalog {
            name: None,
            schemas: vec![Schema {
                catalog: None,
                name: Some(Identifier::new("shop")),
                tables: vec![table],
                sequences: Vec::new(),
            }],
        });
        database
    }

    async fn catalog_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        manager.write_schema(&database()).unwrap();
        manager.write_catalog().await.unwrap();
        dir
    }

    #[tokio::test]
    async fn test_catalog_to_file() {
        let dir = catalog_dir().await;
        let out = dir.path().join("schema.sql");
        let config = SchemaConfig {
            dialect: Some("mysql".into()),
            script_types: vec![ScriptType::Create],
            ..SchemaConfig::default()
        };
        let job = SchemaJob::new(
            config,
            SchemaInput::Catalog(dir.path().to_path_buf()),
            SchemaOutput::File(out.clone()),
        );
        let result = job.run().await.unwrap();

        assert_eq!(result.dialect, "mysql");
        assert_eq!(result.source_product, "PostgreSQL");
        assert_eq!(result.executed, 0);
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("CREATE TABLE"), "{}", text);
        assert!(text.trim_end().ends_with(';'));
    }

    async fn mysql_catalog_dir(sql_mode: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        let mut database = database();
        database.info = DatabaseInfo::new("MySQL", "8.0.36");
        manager.write_schema(&database).unwrap();
        if let Some(mode) = sql_mode {
            let mut state = SessionState::new();
            state.put(crate::dialect::SQL_MODE, vec![mode.to_string()]);
            manager.write_session_state(&state).unwrap();
        }
        manager.write_catalog().await.unwrap();
        dir
    }

    async fn catalog_ddl(dir: &tempfile::TempDir) -> String {
        let out = dir.path().join("schema.sql");
        let config = SchemaConfig {
            dialect: Some("mysql".into()),
            script_types: vec![ScriptType::Create],
            ..SchemaConfig::default()
        };
        SchemaJob::new(
            config,
            SchemaInput::Catalog(dir.path().to_path_buf()),
            SchemaOutput::File(out.clone()),
        )
        .run()
        .await
        .unwrap();
        std::fs::read_to_string(out).unwrap()
    }

    #[tokio::test]
    async fn test_catalog_sql_mode_drives_implicit_defaults() {
        let strict = catalog_ddl(&mysql_catalog_dir(Some("STRICT_TRANS_TABLES")).await).await;
        assert!(!strict.contains("DEFAULT 0"), "{}", strict);

        let lenient = catalog_ddl(&mysql_catalog_dir(Some("NO_ZERO_DATE")).await).await;
        assert!(lenient.contains("`id` INT DEFAULT 0 NOT NULL"), "{}", lenient);

        // No recorded state: implicit defaults are assumed.
        let unknown = catalog_ddl(&mysql_catalog_dir(None).await).await;
        assert!(unknown.contains("DEFAULT 0"), "{}", unknown);
    }

    #[tokio::test]
    async fn test_missing_schema_document() {
        let dir = tempfile::tempdir().unwrap();
        CatalogManager::create(dir.path()).unwrap().write_catalog().await.unwrap();
        let job = SchemaJob::new(
            SchemaConfig::default(),
            SchemaInput::Catalog(dir.path().to_path_buf()),
            SchemaOutput::Stdout,
        );
        assert!(matches!(job.run().await, Err(MigrateError::Catalog(_))));
    }

    #[tokio::test]
    async fn test_apply_to_target_uses_target_dialect() {
        let dir = catalog_dir().await;
        let stats = Arc::new(Mutex::new(MockStats::default()));
        let shared = Arc::clone(&stats);
        let target = MockFactory::new(move || {
            MockSession::new("Microsoft SQL Server").with_stats(Arc::clone(&shared))
        });
        let config = SchemaConfig {
            script_types: vec![ScriptType::Create],
            ..SchemaConfig::default()
        };
        let job = SchemaJob::new(
            config,
            SchemaInput::Catalog(dir.path().to_path_buf()),
            SchemaOutput::Target(target),
        );
        let result = job.run().await.unwrap();

        assert_eq!(result.dialect, "mssql");
        assert_eq!(result.executed, result.scripts);
        let stats = stats.lock().unwrap();
        assert!(stats.executed.iter().any(|s| s.starts_with("CREATE TABLE [shop].[orders]")));
    }

    #[tokio::test]
    async fn test_mysql_source_caches_sql_mode() {
        let mut session = MockSession::new("MySQL").with_result(
            "SQL_MODE",
            &["mode"],
            vec![vec![SqlValue::from("STRICT_TRANS_TABLES,NO_ZERO_DATE")]],
        );
        let state = source_state(&mut session).await.unwrap();
        assert_eq!(
            state.get(crate::dialect::SQL_MODE).unwrap(),
            ["STRICT_TRANS_TABLES".to_string(), "NO_ZERO_DATE".to_string()]
        );

        let mut postgres = MockSession::new("PostgreSQL");
        assert!(source_state(&mut postgres).await.is_none());
    }

    #[test]
    fn test_context_follows_config() {
        let config = SchemaConfig {
            target_schema: Some("archive".into()),
            meta_data_types: vec![MetaDataType::Table],
            ..SchemaConfig::default()
        };
        let dialect = DialectResolver::default().by_name("postgres").unwrap();
        let context = script_context(&config, dialect, DatabaseInfo::new("MySQL", "8.0"), None);
        assert!(context.generates(MetaDataType::Table));
        assert!(!context.generates(MetaDataType::Index));
        assert!(context.source().is("MySQL"));
    }
}
