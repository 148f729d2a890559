//! Queries a dump runs, one per catalog entry.

use std::sync::Arc;

use crate::catalog::{CatalogEntry, EntryType};
use crate::config::{InsertType, TableSpec};
use crate::core::identifier::Identifier;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::format::FormatType;
use crate::metadata::{QualifiedName, Table};
use crate::script::ScriptGeneratorContext;

/// `SELECT` over one table, optionally narrowed to columns and a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: QualifiedName,
    /// Empty selects every column.
    pub columns: Vec<Identifier>,
    /// Verbatim `WHERE` condition.
    pub filter: Option<String>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    pub fn new(table: QualifiedName) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filter: None,
            limit: None,
        }
    }

    /// Every column of an inspected table, in ordinal order.
    pub fn for_table(table: &Table) -> Self {
        let mut columns: Vec<_> = table.columns.iter().collect();
        columns.sort_by_key(|c| c.position);
        Self {
            columns: columns.into_iter().map(|c| c.name.clone()).collect(),
            ..Self::new(table.qualified_name())
        }
    }

    /// Query for a `NAME[:COL,COL][@FILTER]` table spec.
    pub fn for_spec(spec: &TableSpec) -> Self {
        let (catalog, schema, name) = spec.name_parts();
        Self {
            columns: spec.columns.iter().map(|c| Identifier::parse(c)).collect(),
            filter: spec.filter.clone(),
            ..Self::new(QualifiedName::new(catalog, schema, name))
        }
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn to_sql(&self, dialect: &Arc<dyn Dialect>) -> Result<String> {
        let names = ScriptGeneratorContext::new(Arc::clone(dialect));
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| names.name(c, true))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, table_sql(&names, &self.table)?);
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        Ok(match self.limit {
            Some(limit) => dialect.limit_query(&sql, limit),
            None => sql,
        })
    }
}

/// Parameterized single-row `INSERT` (or `REPLACE`) for a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertQuery {
    pub table: QualifiedName,
    pub columns: Vec<Identifier>,
    pub insert_type: InsertType,
}

impl InsertQuery {
    pub fn new(table: QualifiedName, columns: Vec<Identifier>, insert_type: InsertType) -> Self {
        Self {
            table,
            columns,
            insert_type,
        }
    }

    /// `REPLACE` only where the dialect has it; `INSERT` otherwise.
    pub fn to_sql(&self, dialect: &Arc<dyn Dialect>) -> Result<String> {
        let names = ScriptGeneratorContext::new(Arc::clone(dialect));
        let columns = self
            .columns
            .iter()
            .map(|c| names.name(c, true))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let placeholders = (1..=self.columns.len())
            .map(|i| dialect.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        let verb = match self.insert_type {
            InsertType::Replace if dialect.supports_replace() => "REPLACE",
            _ => "INSERT",
        };
        Ok(format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            table_sql(&names, &self.table)?,
            columns,
            placeholders
        ))
    }
}

/// Quoted table name; `db.table` on a product without schemas names a catalog.
fn table_sql(names: &ScriptGeneratorContext, table: &QualifiedName) -> Result<String> {
    let mut table = table.clone();
    if !names.dialect().supports_schemas() && table.catalog.is_none() {
        table.catalog = table.schema.take();
    }
    names.qualified_name(&table, true)
}

/// User SQL run as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeQuery {
    pub sql: String,
    pub limit: Option<u64>,
}

impl NativeQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn to_sql(&self, dialect: &dyn Dialect) -> String {
        let sql = self.sql.trim().trim_end_matches(';').trim_end();
        match self.limit {
            Some(limit) => dialect.limit_query(sql, limit),
            None => sql.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpQuery {
    Select(SelectQuery),
    Native(NativeQuery),
}

impl DumpQuery {
    pub fn to_sql(&self, dialect: &Arc<dyn Dialect>) -> Result<String> {
        match self {
            DumpQuery::Select(q) => q.to_sql(dialect),
            DumpQuery::Native(q) => Ok(q.to_sql(dialect.as_ref())),
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            DumpQuery::Select(_) => EntryType::Table,
            DumpQuery::Native(_) => EntryType::Query,
        }
    }

    /// Catalog entry this query fills. Query entries are named by the caller.
    pub fn entry(&self, name: impl Into<String>, format: FormatType) -> CatalogEntry {
        match self {
            DumpQuery::Select(q) => {
                let mut entry = CatalogEntry::table(name, format);
                entry.source = Some(q.table.to_string());
                entry
            }
            DumpQuery::Native(q) => CatalogEntry::query(name, format, q.sql.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectResolver, MssqlDialect, MySqlDialect, PostgresDialect};
    use crate::metadata::Column;

    fn dialect(name: &str) -> Arc<dyn Dialect> {
        DialectResolver::default().by_name(name).unwrap()
    }

    #[test]
    fn test_select_from_spec() {
        let spec = TableSpec::parse("shop.orders:id,total@total > 10").unwrap();
        let sql = SelectQuery::for_spec(&spec).to_sql(&dialect("postgres")).unwrap();
        assert_eq!(sql, "SELECT \"id\", \"total\" FROM \"shop\".\"orders\" WHERE total > 10");
    }

    #[test]
    fn test_select_all_columns_with_limit() {
        let query = SelectQuery::new(QualifiedName::new(Some("shop"), None, "orders")).with_limit(Some(5));
        let sql = query.to_sql(&dialect("mysql")).unwrap();
        assert!(sql.starts_with("SELECT * FROM `shop`.`orders`"), "{}", sql);
        assert_eq!(sql, MySqlDialect::new().limit_query("SELECT * FROM `shop`.`orders`", 5));
    }

    #[test]
    fn test_schema_part_names_mysql_database() {
        let spec = TableSpec::parse("shop.orders").unwrap();
        let sql = SelectQuery::for_spec(&spec).to_sql(&dialect("mysql")).unwrap();
        assert_eq!(sql, "SELECT * FROM `shop`.`orders`");
    }

    #[test]
    fn test_select_for_table_orders_columns() {
        let mut table = Table::new(None, Some(Identifier::new("dbo")), Identifier::new("users"));
        table.columns.push(Column::new(Identifier::new("name"), 2));
        table.columns.push(Column::new(Identifier::new("id"), 1));
        let sql = SelectQuery::for_table(&table).to_sql(&dialect("mssql")).unwrap();
        assert_eq!(sql, "SELECT [id], [name] FROM [dbo].[users]");
    }

    #[test]
    fn test_native_query_limit() {
        let query = NativeQuery::new("SELECT 1;").with_limit(Some(3));
        assert_eq!(query.to_sql(&MssqlDialect::new()), "SELECT TOP 3 * FROM (SELECT 1) AS limited");
        assert_eq!(NativeQuery::new(" SELECT 1 ; ").to_sql(&PostgresDialect::new()), "SELECT 1");
    }

    #[test]
    fn test_insert_placeholders() {
        let table = QualifiedName::new(None, Some("public"), "orders");
        let columns = vec![Identifier::new("id"), Identifier::new("fruit")];
        let insert = InsertQuery::new(table.clone(), columns.clone(), InsertType::Insert);
        assert_eq!(
            insert.to_sql(&dialect("postgres")).unwrap(),
            "INSERT INTO \"public\".\"orders\" (\"id\", \"fruit\") VALUES ($1, $2)"
        );
        assert_eq!(
            insert.to_sql(&dialect("mssql")).unwrap(),
            "INSERT INTO [public].[orders] ([id], [fruit]) VALUES (@P1, @P2)"
        );
    }

    #[test]
    fn test_replace_falls_back_to_insert() {
        let table = QualifiedName::new(Some("shop"), None, "orders");
        let replace = InsertQuery::new(table, vec![Identifier::new("id")], InsertType::Replace);
        assert_eq!(
            replace.to_sql(&dialect("mysql")).unwrap(),
            "REPLACE INTO `shop`.`orders` (`id`) VALUES (?)"
        );
        assert!(replace.to_sql(&dialect("postgres")).unwrap().starts_with("INSERT INTO"));
    }

    #[test]
    fn test_entries() {
        let select = DumpQuery::Select(SelectQuery::new(QualifiedName::new(None, Some("s"), "t")));
        let entry = select.entry("s.t", FormatType::Csv);
        assert_eq!(entry.entry_type, EntryType::Table);
        assert_eq!(entry.source.as_deref(), Some("s.t"));

        let native = DumpQuery::Native(NativeQuery::new("SELECT 1"));
        let entry = native.entry("query-10-00-00", FormatType::Bson);
        assert_eq!(entry.entry_type, EntryType::Query);
        assert_eq!(entry.source.as_deref(), Some("SELECT 1"));
    }
}
