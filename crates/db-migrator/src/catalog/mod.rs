//! On-disk catalog of dump entries.
//!
//! A catalog is a directory holding:
//!
//! - `catalog.xml`: the manifest listing every entry with its format, kind
//!   and declared columns,
//! - one data file per entry, `<entry>.<format extension>`,
//! - `schema.json` when the dump ran in schema mode,
//! - `session.json` next to it when the source had session state the DDL
//!   translators depend on (the MySQL `SQL_MODE`).
//!
//! The manifest is rewritten atomically, so a reader never sees a partial
//! list. Entries are independent: a load can open them in any order.

mod manifest;

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::dialect::SessionState;
use crate::error::{MigrateError, Result};
use crate::format::{FormatColumn, FormatType, InputFormat, OutputFormat};
use crate::metadata::Database;

pub const MANIFEST_FILE: &str = "catalog.xml";
pub const SCHEMA_FILE: &str = "schema.json";
pub const SESSION_FILE: &str = "session.json";
pub const CATALOG_VERSION: &str = "1";

/// What produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Table,
    Query,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Table => "table",
            EntryType::Query => "query",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "table" => Some(EntryType::Table),
            "query" => Some(EntryType::Query),
            _ => None,
        }
    }
}

/// One dumped table or query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub format: FormatType,
    pub entry_type: EntryType,
    /// Qualified table name or the verbatim query text.
    pub source: Option<String>,
    /// Rows written, once the entry is complete.
    pub rows: Option<u64>,
    pub columns: Vec<FormatColumn>,
}

impl CatalogEntry {
    pub fn table(name: impl Into<String>, format: FormatType) -> Self {
        Self {
            name: name.into(),
            format,
            entry_type: EntryType::Table,
            source: None,
            rows: None,
            columns: Vec::new(),
        }
    }

    pub fn query(name: impl Into<String>, format: FormatType, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format,
            entry_type: EntryType::Query,
            source: Some(sql.into()),
            rows: None,
            columns: Vec::new(),
        }
    }

    /// Data file name inside the catalog directory.
    pub fn file_name(&self) -> String {
        format!("{}.{}", file_stem(&self.name), self.format.extension())
    }
}

/// The manifest contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub version: String,
    pub created: DateTime<Utc>,
    pub entries: Vec<CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            version: CATALOG_VERSION.to_string(),
            created: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Add an entry, replacing one with the same name.
    pub fn add_entry(&mut self, entry: CatalogEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    catalog: Catalog,
    reserved: HashSet<String>,
    /// Data file stems in use, so two names never share a file.
    stems: HashSet<String>,
}

impl ManagerState {
    fn with_catalog(catalog: Catalog) -> Self {
        let mut state = Self {
            catalog,
            ..Self::default()
        };
        state.reserve_existing();
        state
    }

    fn reserve_existing(&mut self) {
        for entry in &self.catalog.entries {
            self.reserved.insert(entry.name.clone());
            self.stems.insert(stem_key(&entry.name));
        }
    }

    fn is_free(&self, name: &str) -> bool {
        !self.reserved.contains(name) && !self.stems.contains(&stem_key(name))
    }

    /// `base`, or `base-2`, `base-3`, ... whichever is free first.
    fn reserve(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 1;
        while !self.is_free(&name) {
            n += 1;
            name = format!("{}-{}", base, n);
        }
        self.stems.insert(stem_key(&name));
        self.reserved.insert(name.clone());
        name
    }
}

/// Owns a catalog directory during a dump or load.
///
/// Shared between dump workers; entry registration and query name
/// reservation go through an internal lock, data files do not.
#[derive(Debug)]
pub struct CatalogManager {
    dir: PathBuf,
    state: Mutex<ManagerState>,
}

impl CatalogManager {
    /// Start a new catalog in `dir`, creating the directory if needed.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!("Writing catalog to {}", dir.display());
        Ok(Self {
            dir,
            state: Mutex::new(ManagerState::default()),
        })
    }

    /// Open an existing catalog and read its manifest.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let catalog = read_catalog_file(&dir.join(MANIFEST_FILE))?;
        debug!("Opened catalog {} with {} entries", dir.display(), catalog.entries.len());
        Ok(Self {
            dir,
            state: Mutex::new(ManagerState::with_catalog(catalog)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, entry: &CatalogEntry) -> PathBuf {
        self.dir.join(entry.file_name())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.dir.join(SCHEMA_FILE)
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// Snapshot of the catalog as registered so far.
    pub async fn catalog(&self) -> Catalog {
        self.state.lock().await.catalog.clone()
    }

    /// Reserve a name for an ad-hoc query entry: `query-HH-MM-SS`, suffixed
    /// `-2`, `-3`, ... when taken.
    pub async fn reserve_query_name(&self, time: NaiveTime) -> String {
        let base = format!("query-{}", time.format("%H-%M-%S"));
        self.state.lock().await.reserve(&base)
    }

    /// Reserve an entry name for a table dump. Several specs may name the
    /// same table, and distinct names may map to the same data file; later
    /// ones get a `-2`, `-3`, ... suffix.
    pub async fn reserve_entry_name(&self, base: &str) -> String {
        let name = self.state.lock().await.reserve(base);
        if name != base {
            debug!("Entry {} renamed to {} to keep its data file apart", base, name);
        }
        name
    }

    /// Register an entry in the manifest (not yet flushed).
    pub async fn add_entry(&self, entry: CatalogEntry) {
        let mut state = self.state.lock().await;
        state.reserved.insert(entry.name.clone());
        state.stems.insert(stem_key(&entry.name));
        state.catalog.add_entry(entry);
    }

    /// Create the data file of `entry` and an encoder over it.
    pub fn open_output(&self, entry: &CatalogEntry) -> Result<Box<dyn OutputFormat>> {
        let path = self.entry_path(entry);
        let file = File::create(&path).map_err(|e| {
            MigrateError::format(&entry.name, format!("cannot create {}: {}", path.display(), e))
        })?;
        debug!("Opened {} for entry {}", path.display(), entry.name);
        Ok(entry.format.output(&entry.name, BufWriter::new(file)))
    }

    /// Open the data file of `entry` for decoding.
    pub fn open_input(&self, entry: &CatalogEntry) -> Result<Box<dyn InputFormat>> {
        let path = self.entry_path(entry);
        let file = File::open(&path).map_err(|e| {
            MigrateError::format(&entry.name, format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(entry.format.input(&entry.name, BufReader::new(file), &entry.columns))
    }

    /// Flush the manifest to disk.
    pub async fn write_catalog(&self) -> Result<()> {
        let catalog = self.catalog().await;
        let path = self.manifest_path();
        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("xml.tmp");
        {
            let file = File::create(&temp_path)?;
            manifest::write_manifest(&catalog, BufWriter::new(file))?;
        }
        std::fs::rename(&temp_path, &path)?;
        info!("Catalog manifest written with {} entries", catalog.entries.len());
        Ok(())
    }

    /// Re-read the manifest from disk, replacing the in-memory copy.
    pub async fn read_catalog(&self) -> Result<Catalog> {
        let catalog = read_catalog_file(&self.manifest_path())?;
        let mut state = self.state.lock().await;
        state.catalog = catalog.clone();
        state.reserve_existing();
        Ok(catalog)
    }

    /// Persist the inspected schema next to the data.
    pub fn write_schema(&self, database: &Database) -> Result<()> {
        let path = self.schema_path();
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(database)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &path)?;
        info!("Schema written to {}", path.display());
        Ok(())
    }

    /// Persist the source session state used to translate the schema.
    pub fn write_session_state(&self, state: &SessionState) -> Result<()> {
        let path = self.session_path();
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, serde_json::to_string_pretty(state)?)?;
        std::fs::rename(&temp_path, &path)?;
        debug!("Session state written to {}", path.display());
        Ok(())
    }

    /// The persisted source session state, if any.
    pub fn read_session_state(&self) -> Result<Option<SessionState>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// The persisted schema, if the dump ran in schema mode.
    pub fn read_schema(&self) -> Result<Option<Database>> {
        let path = self.schema_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Entry name with characters unsafe in file names replaced by `_`.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Key under which a stem is reserved; case-folded for case-insensitive
/// file systems.
fn stem_key(name: &str) -> String {
    file_stem(name).to_lowercase()
}

fn read_catalog_file(path: &Path) -> Result<Catalog> {
    let file = File::open(path)
        .map_err(|e| MigrateError::Catalog(format!("cannot open manifest {}: {}", path.display(), e)))?;
    manifest::read_manifest(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::DatabaseInfo;
    use crate::core::value::{Value, ValueType};
    use crate::format::rows;

    #[tokio::test]
    async fn test_catalog_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path().join("dump")).unwrap();

        let formats = [FormatType::Csv, FormatType::Xml, FormatType::Bson, FormatType::Bin];
        for (i, format) in formats.into_iter().enumerate() {
            let mut entry = CatalogEntry::table(format!("shop.t{}", i), format);
            entry.columns = vec![FormatColumn::string("id"), FormatColumn::new("data", ValueType::Binary)];
            let mut output = manager.open_output(&entry).unwrap();
            output.write_start(&entry.columns).unwrap();
            output.write_row(&[Value::string(i.to_string()), Value::binary(vec![0u8, b'<'])]).unwrap();
            output.write_end().unwrap();
            entry.rows = Some(1);
            manager.add_entry(entry).await;
        }
        manager.write_catalog().await.unwrap();

        let reopened = CatalogManager::open(dir.path().join("dump")).unwrap();
        let catalog = reopened.catalog().await;
        assert_eq!(catalog, manager.catalog().await);
        // Entries open independently of dump order.
        for entry in catalog.entries.iter().rev() {
            let mut input = reopened.open_input(entry).unwrap();
            assert_eq!(input.read_header().unwrap(), entry.columns);
            let decoded: Vec<Vec<Value>> = rows(input.as_mut()).collect::<Result<_>>().unwrap();
            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0][1], Value::binary(vec![0u8, b'<']));
        }
    }

    #[tokio::test]
    async fn test_query_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        let time = NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(manager.reserve_query_name(time).await, "query-09-05-07");
        assert_eq!(manager.reserve_query_name(time).await, "query-09-05-07-2");
        assert_eq!(manager.reserve_query_name(time).await, "query-09-05-07-3");
    }

    #[tokio::test]
    async fn test_entry_names_keep_files_apart() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        assert_eq!(manager.reserve_entry_name("public.orders").await, "public.orders");
        assert_eq!(manager.reserve_entry_name("public.orders").await, "public.orders-2");
        // "a b" and "a_b" would both land in a_b.csv.
        assert_eq!(manager.reserve_entry_name("a b").await, "a b");
        assert_eq!(manager.reserve_entry_name("a_b").await, "a_b-2");
        assert_eq!(manager.reserve_entry_name("A_B").await, "A_B-3");

        let stems: HashSet<String> = ["public.orders", "public.orders-2", "a b", "a_b-2", "A_B-3"]
            .iter()
            .map(|n| CatalogEntry::table(*n, FormatType::Csv).file_name().to_lowercase())
            .collect();
        assert_eq!(stems.len(), 5);
    }

    #[tokio::test]
    async fn test_reopened_catalog_keeps_names_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        manager.add_entry(CatalogEntry::table("shop.orders", FormatType::Csv)).await;
        manager.write_catalog().await.unwrap();

        let reopened = CatalogManager::open(dir.path()).unwrap();
        assert_eq!(reopened.reserve_entry_name("shop.orders").await, "shop.orders-2");
    }

    #[tokio::test]
    async fn test_missing_entry_file_names_entry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        let entry = CatalogEntry::table("missing", FormatType::Csv);
        match manager.open_input(&entry) {
            Err(MigrateError::Format { entry, .. }) => assert_eq!(entry, "missing"),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_schema_document() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        assert!(manager.read_schema().unwrap().is_none());
        manager.write_schema(&Database::new(DatabaseInfo::new("MySQL", "8.0.36"))).unwrap();
        let database = manager.read_schema().unwrap().unwrap();
        assert_eq!(database.info.product_name, "MySQL");
    }

    #[test]
    fn test_session_state_document() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CatalogManager::create(dir.path()).unwrap();
        assert!(manager.read_session_state().unwrap().is_none());

        let mut state = SessionState::new();
        state.put(crate::dialect::SQL_MODE, vec!["STRICT_TRANS_TABLES".to_string()]);
        manager.write_session_state(&state).unwrap();
        assert_eq!(manager.read_session_state().unwrap(), Some(state));
        let text = std::fs::read_to_string(manager.session_path()).unwrap();
        assert!(text.contains("\"SQL_MODE\""), "{}", text);
    }

    #[test]
    fn test_entry_file_names() {
        assert_eq!(CatalogEntry::table("shop.orders", FormatType::Bson).file_name(), "shop.orders.bson");
        assert_eq!(CatalogEntry::table("\"my table\"", FormatType::Csv).file_name(), "_my_table_.csv");
    }

    #[tokio::test]
    async fn test_open_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(CatalogManager::open(dir.path()), Err(MigrateError::Catalog(_))));
    }
}
