//! Configuration type definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::drivers::SslMode;
use crate::error::{MigrateError, Result};
use crate::format::FormatType;
use crate::inspector::InspectionScope;
use crate::metadata::MetaDataType;
use crate::script::{IdentifierNormalizer, ScriptType};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database to dump from or inspect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ConnectionConfig>,

    /// Database to load into or apply DDL to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ConnectionConfig>,

    #[serde(default)]
    pub dump: DumpConfig,

    #[serde(default)]
    pub load: LoadConfig,

    #[serde(default)]
    pub schema: SchemaConfig,
}

impl Config {
    pub fn source(&self) -> Result<&ConnectionConfig> {
        self.source
            .as_ref()
            .ok_or_else(|| MigrateError::Config("source connection is required".into()))
    }

    pub fn target(&self) -> Result<&ConnectionConfig> {
        self.target
            .as_ref()
            .ok_or_else(|| MigrateError::Config("target connection is required".into()))
    }
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[serde(alias = "sqlserver")]
    Mssql,
}

impl DatabaseType {
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mssql => "mssql",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::Mysql => 3306,
            DatabaseType::Postgres => 5432,
            DatabaseType::Mssql => 1433,
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One database connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub r#type: DatabaseType,

    pub host: String,

    /// Port; the engine's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    pub database: String,

    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Catalog to inspect or dump; defaults to the connected database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,

    /// Schema to inspect or dump; every schema when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Accept any server certificate (SQL Server `TrustServerCertificate`).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Log every statement and its parameters.
    #[serde(default)]
    pub log_statements: bool,
}

impl ConnectionConfig {
    pub fn new(r#type: DatabaseType, host: &str, database: &str, user: &str) -> Self {
        Self {
            r#type,
            host: host.to_string(),
            port: None,
            database: database.to_string(),
            user: user.to_string(),
            password: String::new(),
            catalog: None,
            schema: None,
            ssl_mode: SslMode::default(),
            trust_server_cert: false,
            log_statements: false,
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.r#type.default_port())
    }

    /// Inspection scope covering this connection's catalog and schema.
    pub fn scope(&self, table_types: &[String]) -> InspectionScope {
        InspectionScope {
            catalog: self.catalog.clone(),
            schema: self.schema.clone(),
            table: None,
            table_types: table_types.to_vec(),
        }
    }

    /// `type://user@host:port/database`, without the password.
    pub fn display_url(&self) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            self.r#type,
            self.user,
            self.host,
            self.port(),
            self.database
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("log_statements", &self.log_statements)
            .finish()
    }
}

/// What a dump or load transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    Data,
    Schema,
}

impl MigrationMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "data" => Some(MigrationMode::Data),
            "schema" => Some(MigrationMode::Schema),
            _ => None,
        }
    }
}

fn default_modes() -> Vec<MigrationMode> {
    vec![MigrationMode::Data, MigrationMode::Schema]
}

/// Statement used to load rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertType {
    #[default]
    Insert,
    /// `REPLACE INTO`; falls back to INSERT where the dialect lacks it.
    Replace,
}

impl InsertType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "insert" => Some(InsertType::Insert),
            "replace" => Some(InsertType::Replace),
            _ => None,
        }
    }
}

/// A table to dump, optionally restricted to some columns and rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// `table`, `schema.table` or `catalog.schema.table`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    /// SQL condition appended as `WHERE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            filter: None,
        }
    }

    /// Parse the command line form `NAME[:COL,COL][@FILTER]`.
    pub fn parse(text: &str) -> Result<Self> {
        let (head, filter) = match text.split_once('@') {
            Some((head, filter)) => (head, Some(filter.trim().to_string())),
            None => (text, None),
        };
        let (name, columns) = match head.split_once(':') {
            Some((name, columns)) => (
                name,
                columns
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => (head, Vec::new()),
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(MigrateError::Config(format!("table spec '{}' has no table name", text)));
        }
        Ok(Self {
            name: name.to_string(),
            columns,
            filter: filter.filter(|f| !f.is_empty()),
        })
    }

    /// Name split into optional catalog, optional schema and table.
    pub fn name_parts(&self) -> (Option<&str>, Option<&str>, &str) {
        let parts: Vec<&str> = self.name.split('.').collect();
        match parts.as_slice() {
            [catalog, schema, table] => (Some(catalog), Some(schema), table),
            [schema, table] => (None, Some(schema), table),
            _ => (None, None, self.name.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub format: FormatType,

    /// Tables to dump; every inspected table when empty and no queries are given.
    #[serde(default)]
    pub tables: Vec<TableSpec>,

    /// Native queries dumped verbatim.
    #[serde(default)]
    pub queries: Vec<String>,

    #[serde(default = "default_table_types")]
    pub table_types: Vec<String>,

    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Worker pool queue size; the pool size when smaller.
    #[serde(default)]
    pub queue_size: usize,

    /// Row limit applied to every dump query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_limit: Option<u64>,

    /// Zone temporal values are rendered in (`UTC`, `+02:00`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    #[serde(default = "default_modes")]
    pub migration_modes: Vec<MigrationMode>,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: FormatType::default(),
            tables: Vec::new(),
            queries: Vec::new(),
            table_types: default_table_types(),
            threads: default_threads(),
            queue_size: 0,
            query_limit: None,
            time_zone: None,
            migration_modes: default_modes(),
        }
    }
}

impl DumpConfig {
    pub fn has_mode(&self, mode: MigrationMode) -> bool {
        self.migration_modes.contains(&mode)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_output_dir")]
    pub input_dir: PathBuf,

    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default)]
    pub queue_size: usize,

    /// Rows per INSERT batch and transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub insert_type: InsertType,

    /// Per-table insert type overrides keyed by entry name.
    #[serde(default)]
    pub table_insert_types: HashMap<String, InsertType>,

    #[serde(default = "default_modes")]
    pub migration_modes: Vec<MigrationMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            input_dir: default_output_dir(),
            threads: default_threads(),
            queue_size: 0,
            batch_size: default_batch_size(),
            insert_type: InsertType::default(),
            table_insert_types: HashMap::new(),
            migration_modes: default_modes(),
            time_zone: None,
        }
    }
}

impl LoadConfig {
    pub fn has_mode(&self, mode: MigrationMode) -> bool {
        self.migration_modes.contains(&mode)
    }

    /// Insert type for an entry, honouring per-table overrides.
    pub fn insert_type_for(&self, entry: &str) -> InsertType {
        self.table_insert_types
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(entry))
            .map(|(_, t)| *t)
            .unwrap_or(self.insert_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Target dialect; taken from the target connection when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_catalog: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,

    #[serde(default = "default_script_types")]
    pub script_types: Vec<ScriptType>,

    #[serde(default = "default_meta_data_types")]
    pub meta_data_types: Vec<MetaDataType>,

    /// Script file; stdout when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub identifier_normalizer: IdentifierNormalizer,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            dialect: None,
            target_catalog: None,
            target_schema: None,
            script_types: default_script_types(),
            meta_data_types: default_meta_data_types(),
            output: None,
            identifier_normalizer: IdentifierNormalizer::default(),
        }
    }
}

// Default value functions for serde
fn default_output_dir() -> PathBuf {
    PathBuf::from("dump")
}

fn default_table_types() -> Vec<String> {
    vec!["TABLE".to_string()]
}

fn default_threads() -> usize {
    4
}

fn default_batch_size() -> usize {
    1000
}

fn default_script_types() -> Vec<ScriptType> {
    vec![ScriptType::Drop, ScriptType::Create]
}

fn default_meta_data_types() -> Vec<MetaDataType> {
    MetaDataType::ALL.to_vec()
}
