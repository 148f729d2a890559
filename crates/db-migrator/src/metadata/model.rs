//! Schema object model.
//!
//! Ownership runs strictly downward: a [`Database`] owns catalogs, a catalog
//! owns schemas, a schema owns tables and sequences, a table owns its
//! columns and constraints. Parents are referenced by name, never by pointer:
//! every table carries the catalog and schema identifiers of the schema that
//! owns it, and [`QualifiedName`] is the identity used to look objects up.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::identifier::Identifier;
use crate::core::session::DatabaseInfo;
use crate::core::types::JdbcTypeDesc;

/// Kind tag of a schema object.
///
/// Declaration order is dependency order: an inspector for a kind may rely on
/// every earlier kind having been inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaDataType {
    Database,
    Catalog,
    Schema,
    Table,
    Column,
    PrimaryKey,
    ForeignKey,
    Index,
    Check,
    Sequence,
    AutoIncrement,
}

const TYPE_NAMES: &[(MetaDataType, &str)] = &[
    (MetaDataType::Database, "database"),
    (MetaDataType::Catalog, "catalog"),
    (MetaDataType::Schema, "schema"),
    (MetaDataType::Table, "table"),
    (MetaDataType::Column, "column"),
    (MetaDataType::PrimaryKey, "primary_key"),
    (MetaDataType::ForeignKey, "foreign_key"),
    (MetaDataType::Index, "index"),
    (MetaDataType::Check, "check"),
    (MetaDataType::Sequence, "sequence"),
    (MetaDataType::AutoIncrement, "auto_increment"),
];

impl MetaDataType {
    pub const ALL: [MetaDataType; 11] = [
        MetaDataType::Database,
        MetaDataType::Catalog,
        MetaDataType::Schema,
        MetaDataType::Table,
        MetaDataType::Column,
        MetaDataType::PrimaryKey,
        MetaDataType::ForeignKey,
        MetaDataType::Index,
        MetaDataType::Check,
        MetaDataType::Sequence,
        MetaDataType::AutoIncrement,
    ];

    pub fn name(&self) -> &'static str {
        TYPE_NAMES
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }

    /// Lookup by name; case and `-`/`.`/`_` separators are ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .map(|c| match c {
                '-' | '.' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == normalized)
            .map(|(t, _)| *t)
    }
}

impl fmt::Display for MetaDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common view over every schema object.
pub trait MetaData {
    fn object_type(&self) -> MetaDataType;

    fn identifier(&self) -> Option<&Identifier>;

    /// Catalog and schema of the owning container, for objects that live in one.
    fn container(&self) -> (Option<&Identifier>, Option<&Identifier>) {
        (None, None)
    }
}

/// Catalog + schema + name identity of a schema-level object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Identifier>,
    pub name: Identifier,
}

impl QualifiedName {
    pub fn new(catalog: Option<&str>, schema: Option<&str>, name: &str) -> Self {
        Self {
            catalog: Identifier::from_option(catalog),
            schema: Identifier::from_option(schema),
            name: Identifier::new(name),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in [&self.catalog, &self.schema].into_iter().flatten() {
            write!(f, "{}.", part)?;
        }
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    pub info: DatabaseInfo,
    #[serde(default)]
    pub catalogs: Vec<Catalog>,
}

impl Database {
    pub fn new(info: DatabaseInfo) -> Self {
        Self {
            info,
            catalogs: Vec::new(),
        }
    }

    pub fn catalog(&self, name: Option<&Identifier>) -> Option<&Catalog> {
        self.catalogs.iter().find(|c| c.name.as_ref() == name)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.catalogs.iter().flat_map(|c| c.schemas.iter())
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.schemas().flat_map(|s| s.tables.iter())
    }

    pub fn sequences(&self) -> impl Iterator<Item = &Sequence> {
        self.schemas().flat_map(|s| s.sequences.iter())
    }

    /// Find a table by identity. A missing catalog or schema in `name`
    /// matches any container.
    pub fn find_table(&self, name: &QualifiedName) -> Option<&Table> {
        self.tables().find(|t| {
            t.name == name.name
                && name.catalog.as_ref().map_or(true, |c| t.catalog.as_ref() == Some(c))
                && name.schema.as_ref().map_or(true, |s| t.schema.as_ref() == Some(s))
        })
    }
}

impl MetaData for Database {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Database
    }

    fn identifier(&self) -> Option<&Identifier> {
        None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Identifier>,
    #[serde(default)]
    pub schemas: Vec<Schema>,
}

impl Catalog {
    pub fn schema(&self, name: Option<&Identifier>) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name.as_ref() == name)
    }
}

impl MetaData for Catalog {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Catalog
    }

    fn identifier(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Identifier>,
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

impl Schema {
    pub fn table(&self, name: &Identifier) -> Option<&Table> {
        self.tables.iter().find(|t| &t.name == name)
    }

    pub fn table_mut(&mut self, name: &Identifier) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| &t.name == name)
    }

    pub fn sequence(&self, name: &Identifier) -> Option<&Sequence> {
        self.sequences.iter().find(|s| &s.name == name)
    }
}

impl MetaData for Schema {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Schema
    }

    fn identifier(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }

    fn container(&self) -> (Option<&Identifier>, Option<&Identifier>) {
        (self.catalog.as_ref(), None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Identifier>,
    pub name: Identifier,
    #[serde(default = "default_table_type")]
    pub table_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

fn default_table_type() -> String {
    "TABLE".to_string()
}

impl Table {
    pub fn new(catalog: Option<Identifier>, schema: Option<Identifier>, name: Identifier) -> Self {
        Self {
            catalog,
            schema,
            name,
            table_type: default_table_type(),
            comment: None,
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName {
            catalog: self.catalog.clone(),
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }

    pub fn column(&self, name: &Identifier) -> Option<&Column> {
        self.columns.iter().find(|c| &c.name == name)
    }

    pub fn column_mut(&mut self, name: &Identifier) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| &c.name == name)
    }

    /// Get-or-create a column; new columns take the next ordinal position.
    pub fn add_column(&mut self, name: Identifier) -> &mut Column {
        let index = match self.columns.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                let position = self.columns.len() as i32 + 1;
                self.columns.push(Column::new(name, position));
                self.columns.len() - 1
            }
        };
        &mut self.columns[index]
    }

    /// Get-or-create an index by name.
    pub fn add_index(&mut self, name: Identifier) -> &mut Index {
        let index = match self
            .indexes
            .iter()
            .position(|i| i.name.as_ref() == Some(&name))
        {
            Some(index) => index,
            None => {
                self.indexes.push(Index {
                    name: Some(name),
                    ..Index::default()
                });
                self.indexes.len() - 1
            }
        };
        &mut self.indexes[index]
    }

    pub fn is_view(&self) -> bool {
        self.table_type.eq_ignore_ascii_case("VIEW")
    }
}

impl MetaData for Table {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Table
    }

    fn identifier(&self) -> Option<&Identifier> {
        Some(&self.name)
    }

    fn container(&self) -> (Option<&Identifier>, Option<&Identifier>) {
        (self.catalog.as_ref(), self.schema.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: Identifier,
    pub type_desc: JdbcTypeDesc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<i32>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default expression exactly as the source reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub auto_increment: bool,
    pub position: i32,
    /// Allowed values of enum-like types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Sequence backing an auto-increment column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Sequence>,
}

fn default_true() -> bool {
    true
}

impl Column {
    pub fn new(name: Identifier, position: i32) -> Self {
        Self {
            name,
            type_desc: JdbcTypeDesc::code(crate::core::types::type_codes::VARCHAR),
            size: None,
            precision: None,
            scale: None,
            nullable: true,
            default_value: None,
            auto_increment: false,
            position,
            enum_values: Vec::new(),
            comment: None,
            sequence: None,
        }
    }
}

impl MetaData for Column {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Column
    }

    fn identifier(&self) -> Option<&Identifier> {
        Some(&self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Identifier>,
    pub columns: Vec<Identifier>,
}

impl MetaData for PrimaryKey {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::PrimaryKey
    }

    fn identifier(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Identifier>,
    #[serde(default)]
    pub unique: bool,
    /// Key columns in key order.
    pub columns: Vec<Identifier>,
    /// Partial index predicate, when the source supports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl MetaData for Index {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Index
    }

    fn identifier(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }
}

/// ON UPDATE / ON DELETE behaviour of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    Cascade,
    Restrict,
    SetNull,
    #[default]
    NoAction,
    SetDefault,
}

impl ReferentialAction {
    /// Decode a JDBC `importedKey*` rule code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ReferentialAction::Cascade),
            1 => Some(ReferentialAction::Restrict),
            2 => Some(ReferentialAction::SetNull),
            3 => Some(ReferentialAction::NoAction),
            4 => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }

    /// Decode a rule keyword (`CASCADE`, `SET NULL`, `NO_ACTION`, ...).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "CASCADE" => Some(ReferentialAction::Cascade),
            "RESTRICT" => Some(ReferentialAction::Restrict),
            "SET NULL" => Some(ReferentialAction::SetNull),
            "NO ACTION" => Some(ReferentialAction::NoAction),
            "SET DEFAULT" => Some(ReferentialAction::SetDefault),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deferrability {
    InitiallyDeferred,
    InitiallyImmediate,
    #[default]
    NotDeferrable,
}

impl Deferrability {
    /// Decode a JDBC `importedKey*` deferrability code (5, 6, 7).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            5 => Some(Deferrability::InitiallyDeferred),
            6 => Some(Deferrability::InitiallyImmediate),
            7 => Some(Deferrability::NotDeferrable),
            _ => None,
        }
    }
}

/// One column pair of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    pub position: i32,
    /// Column of the referenced table.
    pub primary_column: Identifier,
    /// Column of the referencing table.
    pub foreign_column: Identifier,
}

/// A foreign key owned by the referencing (`foreign`) table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Identifier>,
    /// The referenced table.
    pub primary_table: QualifiedName,
    /// The referencing table.
    pub foreign_table: QualifiedName,
    pub references: Vec<ColumnReference>,
    #[serde(default)]
    pub update_action: ReferentialAction,
    #[serde(default)]
    pub delete_action: ReferentialAction,
    #[serde(default)]
    pub deferrability: Deferrability,
}

impl ForeignKey {
    pub fn new(primary_table: QualifiedName, foreign_table: QualifiedName) -> Self {
        Self {
            name: None,
            primary_table,
            foreign_table,
            references: Vec::new(),
            update_action: ReferentialAction::default(),
            delete_action: ReferentialAction::default(),
            deferrability: Deferrability::default(),
        }
    }

    /// Insert a column pair at its key position, keeping pairs ordered.
    pub fn add_reference(&mut self, position: i32, primary_column: Identifier, foreign_column: Identifier) {
        let at = self
            .references
            .iter()
            .position(|r| r.position > position)
            .unwrap_or(self.references.len());
        self.references.insert(
            at,
            ColumnReference {
                position,
                primary_column,
                foreign_column,
            },
        );
    }

    pub fn primary_columns(&self) -> impl Iterator<Item = &Identifier> {
        self.references.iter().map(|r| &r.primary_column)
    }

    pub fn foreign_columns(&self) -> impl Iterator<Item = &Identifier> {
        self.references.iter().map(|r| &r.foreign_column)
    }
}

impl MetaData for ForeignKey {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::ForeignKey
    }

    fn identifier(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }

    fn container(&self) -> (Option<&Identifier>, Option<&Identifier>) {
        (self.foreign_table.catalog.as_ref(), self.foreign_table.schema.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Identifier>,
    pub clause: String,
}

impl MetaData for Check {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Check
    }

    fn identifier(&self) -> Option<&Identifier> {
        self.name.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Identifier>,
    pub name: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_with: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment_by: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<Decimal>,
    #[serde(default)]
    pub cycle: bool,
    #[serde(default)]
    pub order: bool,
    #[serde(default)]
    pub temporary: bool,
}

impl Sequence {
    pub fn new(catalog: Option<Identifier>, schema: Option<Identifier>, name: Identifier) -> Self {
        Self {
            catalog,
            schema,
            name,
            ..Self::default()
        }
    }
}

impl MetaData for Sequence {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Sequence
    }

    fn identifier(&self) -> Option<&Identifier> {
        Some(&self.name)
    }

    fn container(&self) -> (Option<&Identifier>, Option<&Identifier>) {
        (self.catalog.as_ref(), self.schema.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for t in MetaDataType::ALL {
            assert_eq!(MetaDataType::from_name(t.name()), Some(t));
        }
        assert_eq!(MetaDataType::from_name("Foreign-Key"), Some(MetaDataType::ForeignKey));
        assert_eq!(MetaDataType::from_name("primary.key"), Some(MetaDataType::PrimaryKey));
        assert_eq!(MetaDataType::from_name("trigger"), None);
    }

    #[test]
    fn test_dependency_order() {
        let mut types = vec![MetaDataType::Index, MetaDataType::Table, MetaDataType::Column];
        types.sort();
        assert_eq!(
            types,
            vec![MetaDataType::Table, MetaDataType::Column, MetaDataType::Index]
        );
    }

    #[test]
    fn test_referential_action_decoding() {
        assert_eq!(ReferentialAction::from_code(0), Some(ReferentialAction::Cascade));
        assert_eq!(ReferentialAction::from_code(4), Some(ReferentialAction::SetDefault));
        assert_eq!(ReferentialAction::from_code(9), None);
        assert_eq!(
            ReferentialAction::from_keyword("set_null"),
            Some(ReferentialAction::SetNull)
        );
        assert_eq!(Deferrability::from_code(5), Some(Deferrability::InitiallyDeferred));
    }

    #[test]
    fn test_foreign_key_keeps_position_order() {
        let mut fk = ForeignKey::new(
            QualifiedName::new(None, Some("s"), "parent"),
            QualifiedName::new(None, Some("s"), "child"),
        );
        fk.add_reference(2, "b".into(), "y".into());
        fk.add_reference(1, "a".into(), "x".into());
        let primary: Vec<&str> = fk.primary_columns().map(Identifier::value).collect();
        assert_eq!(primary, vec!["a", "b"]);
    }

    #[test]
    fn test_add_column_is_get_or_create() {
        let mut table = Table::new(None, None, "t".into());
        table.add_column("id".into()).nullable = false;
        table.add_column("ID".into()).auto_increment = true;
        table.add_column("name".into());
        assert_eq!(table.columns.len(), 2);
        assert!(!table.columns[0].nullable && table.columns[0].auto_increment);
        assert_eq!(table.columns[1].position, 2);
    }

    #[test]
    fn test_database_serializes() {
        let mut db = Database::new(DatabaseInfo::new("MySQL", "8.0.36"));
        db.catalogs.push(Catalog {
            name: Some("shop".into()),
            schemas: vec![Schema {
                catalog: Some("shop".into()),
                name: None,
                tables: vec![Table::new(Some("shop".into()), None, "orders".into())],
                sequences: Vec::new(),
            }],
        });
        let json = serde_json::to_string(&db).unwrap();
        let back: Database = serde_json::from_str(&json).unwrap();
        let table = back
            .find_table(&QualifiedName::new(Some("SHOP"), None, "ORDERS"))
            .unwrap();
        assert_eq!(table.table_type, "TABLE");
    }
}
