//! Per-object DDL generators.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::naming;
use super::{ScriptGenerator, ScriptGeneratorContext};
use crate::core::identifier::{validate_check_clause, Identifier};
use crate::dialect::{products, unwrap_parens, Dialect};
use crate::error::{MigrateError, Result};
use crate::metadata::{
    Check, Column, ForeignKey, Index, MetaDataType, PrimaryKey, QualifiedName, Sequence, Table,
};

/// An object rendered in the context of its owning table.
#[derive(Debug)]
pub struct TableObject<'a, T> {
    pub table: &'a Table,
    pub object: &'a T,
}

impl<'a, T> TableObject<'a, T> {
    pub fn new(table: &'a Table, object: &'a T) -> Self {
        Self { table, object }
    }
}

fn column_list<'a>(
    columns: impl IntoIterator<Item = &'a Identifier>,
    context: &ScriptGeneratorContext,
) -> Result<String> {
    let names = columns
        .into_iter()
        .map(|column| context.name(column, true))
        .collect::<Result<Vec<_>>>()?;
    Ok(names.join(", "))
}

fn table_name(table: &Table, context: &ScriptGeneratorContext) -> Result<String> {
    context.get_qualified_name(table, true)
}

/// Strip a PostgreSQL `::type` cast from a default expression.
fn strip_cast(value: &str) -> &str {
    match value.rfind("::") {
        Some(pos)
            if value[pos + 2..]
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ',' | '"')) =>
        {
            unwrap_parens(&value[..pos])
        }
        _ => value,
    }
}

fn is_expression(value: &str) -> bool {
    let upper = value.to_ascii_uppercase();
    matches!(upper.as_str(), "NULL" | "TRUE" | "FALSE" | "SYSDATE" | "LOCALTIMESTAMP")
        || upper.starts_with("CURRENT_")
        || value.contains('(')
}

/// Render a default value as SQL, quoting bare text for character and
/// temporal columns. Returns `None` when nothing can be rendered.
pub(crate) fn default_literal(value: &str, column: &Column) -> Option<String> {
    let value = strip_cast(value.trim());
    if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
        return Some(value.to_string());
    }
    let quoted = column.type_desc.is_character() || column.type_desc.is_temporal();
    if value.is_empty() {
        return quoted.then(|| "''".to_string());
    }
    if quoted && !is_expression(value) {
        Some(format!("'{}'", value.replace('\'', "''")))
    } else {
        Some(value.to_string())
    }
}

/// Column definitions, plus `ALTER TABLE ... ADD` / `DROP COLUMN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnGenerator;

impl ColumnGenerator {
    /// `name type [DEFAULT value] [NOT NULL] [identity]`.
    pub fn definition(&self, column: &Column, context: &ScriptGeneratorContext) -> Result<String> {
        let dialect = context.dialect();
        let type_name = dialect.type_name(column).ok_or_else(|| {
            MigrateError::ScriptGenerator(format!(
                "{} has no type for column {} of type {}",
                dialect.name(),
                column.name,
                column.type_desc
            ))
        })?;
        let mut definition = format!("{} {}", context.name(&column.name, true)?, type_name);

        let identity = if column.auto_increment {
            dialect.identity_clause(column)
        } else {
            None
        };
        if identity.is_none() {
            let default = context
                .translate_default(column)?
                .and_then(|value| default_literal(&value, column));
            if let Some(default) = default {
                definition.push_str(" DEFAULT ");
                definition.push_str(&default);
            }
        }
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        if let Some(identity) = identity {
            definition.push(' ');
            definition.push_str(&identity);
        }
        Ok(definition)
    }
}

impl<'a> ScriptGenerator<TableObject<'a, Column>> for ColumnGenerator {
    fn create_scripts(&self, item: &TableObject<'a, Column>, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD {}",
            table_name(item.table, context)?,
            self.definition(item.object, context)?
        )])
    }

    fn drop_scripts(&self, item: &TableObject<'a, Column>, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table_name(item.table, context)?,
            context.name(&item.object.name, true)?
        )])
    }
}

/// `CREATE TABLE` with inline primary key, unique constraints and checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableGenerator;

impl ScriptGenerator<Table> for TableGenerator {
    fn create_scripts(&self, table: &Table, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let mut items = Vec::with_capacity(table.columns.len() + 1);
        for column in &table.columns {
            items.push(ColumnGenerator.definition(column, context)?);
        }
        if items.is_empty() {
            return Err(MigrateError::ScriptGenerator(format!(
                "table {} has no columns",
                table.qualified_name()
            )));
        }

        if context.generates(MetaDataType::PrimaryKey) {
            if let Some(pk) = table.primary_key.as_ref().filter(|pk| !pk.columns.is_empty()) {
                items.push(PrimaryKeyGenerator.constraint_sql(pk, context)?);
            }
        }
        if context.generates(MetaDataType::Index) {
            for index in table.indexes.iter().filter(|i| IndexGenerator::is_constraint(i)) {
                match IndexGenerator.constraint_sql(table, index, context)? {
                    Some(sql) => items.push(sql),
                    None => debug!(
                        "Skipping unique index {:?} on {}: nullable columns",
                        index.name.as_ref().map(Identifier::value),
                        table.qualified_name()
                    ),
                }
            }
        }
        if context.generates(MetaDataType::Check) {
            for check in &table.checks {
                items.push(CheckGenerator.constraint_sql(check, context)?);
            }
        }

        Ok(vec![format!(
            "CREATE TABLE {} (\n    {}\n)",
            table_name(table, context)?,
            items.join(",\n    ")
        )])
    }

    fn drop_scripts(&self, table: &Table, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let dialect = context.dialect();
        let mut sql = String::from("DROP TABLE ");
        if dialect.supports_drop_table_if_exists() {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&table_name(table, context)?);
        if dialect.supports_cascade_drop() {
            sql.push(' ');
            sql.push_str(dialect.cascade_clause());
        }
        Ok(vec![sql])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryKeyGenerator;

impl PrimaryKeyGenerator {
    /// `[CONSTRAINT name] PRIMARY KEY (columns)`.
    pub fn constraint_sql(&self, pk: &PrimaryKey, context: &ScriptGeneratorContext) -> Result<String> {
        let mut sql = String::new();
        if let Some(name) = &pk.name {
            sql.push_str(&format!("CONSTRAINT {} ", context.name(name, true)?));
        }
        sql.push_str(&format!("PRIMARY KEY ({})", column_list(&pk.columns, context)?));
        Ok(sql)
    }
}

impl<'a> ScriptGenerator<TableObject<'a, PrimaryKey>> for PrimaryKeyGenerator {
    fn create_scripts(
        &self,
        item: &TableObject<'a, PrimaryKey>,
        context: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD {}",
            table_name(item.table, context)?,
            self.constraint_sql(item.object, context)?
        )])
    }

    fn drop_scripts(
        &self,
        item: &TableObject<'a, PrimaryKey>,
        context: &ScriptGeneratorContext,
    ) -> Result<Vec<String>> {
        let name = match &item.object.name {
            Some(name) => name.clone(),
            None => naming::primary_key_name(item.table, context)?,
        };
        Ok(vec![format!(
            "ALTER TABLE {} {}",
            table_name(item.table, context)?,
            context.dialect().drop_primary_key(&context.name(&name, true)?)
        )])
    }
}

/// Standalone `CREATE INDEX` / `DROP INDEX`, and the inline `UNIQUE`
/// constraint form used inside `CREATE TABLE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexGenerator;

impl IndexGenerator {
    /// Indexes rendered as table constraints rather than standalone.
    pub fn is_constraint(index: &Index) -> bool {
        index.unique && index.filter.is_none()
    }

    /// `[CONSTRAINT name] UNIQUE (columns)`, or `None` for non-unique
    /// indexes and for unique indexes over nullable columns on dialects that
    /// reject them.
    pub fn constraint_sql(
        &self,
        table: &Table,
        index: &Index,
        context: &ScriptGeneratorContext,
    ) -> Result<Option<String>> {
        if !index.unique {
            return Ok(None);
        }
        let nullable = index
            .columns
            .iter()
            .any(|name| table.column(name).map_or(false, |c| c.nullable));
        if nullable && !context.dialect().supports_not_null_unique() {
            return Ok(None);
        }
        let mut sql = String::new();
        if let Some(name) = &index.name {
            sql.push_str(&format!("CONSTRAINT {} ", context.name(name, true)?));
        }
        sql.push_str(&format!("UNIQUE ({})", column_list(&index.columns, context)?));
        Ok(Some(sql))
    }
}

impl<'a> ScriptGenerator<TableObject<'a, Index>> for IndexGenerator {
    fn create_scripts(&self, item: &TableObject<'a, Index>, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let (table, index) = (item.table, item.object);
        if index.filter.is_some() && !context.dialect().supports_partial_indexes() {
            warn!(
                "Skipping filtered index {:?} on {}: not supported by {}",
                index.name.as_ref().map(Identifier::value),
                table.qualified_name(),
                context.dialect().name()
            );
            return Ok(Vec::new());
        }
        let name = naming::index_name(table, index, context)?;
        let mut sql = String::from("CREATE");
        if index.unique {
            sql.push_str(" UNIQUE");
        }
        sql.push_str(&format!(
            " INDEX {} ON {} ({})",
            context.name(&name, true)?,
            table_name(table, context)?,
            column_list(&index.columns, context)?
        ));
        if let Some(filter) = &index.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        Ok(vec![sql])
    }

    fn drop_scripts(&self, item: &TableObject<'a, Index>, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let (table, index) = (item.table, item.object);
        let dialect = context.dialect();
        let name = naming::index_name(table, index, context)?;
        let mut sql = String::from("DROP INDEX ");
        if dialect.supports_drop_index_on_table() {
            sql.push_str(&context.name(&name, true)?);
            sql.push_str(" ON ");
            sql.push_str(&table_name(table, context)?);
        } else {
            // Index names are scoped by schema here.
            let qualified = QualifiedName {
                catalog: table.catalog.clone(),
                schema: table.schema.clone(),
                name,
            };
            sql.push_str(&context.qualified_name(&qualified, true)?);
        }
        if dialect.supports_drop_index_if_exists() {
            sql.push_str(" IF EXISTS");
        }
        Ok(vec![sql])
    }
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignKeyGenerator;

impl ScriptGenerator<ForeignKey> for ForeignKeyGenerator {
    fn create_scripts(&self, fk: &ForeignKey, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let dialect = context.dialect();
        let name = naming::foreign_key_name(fk, context)?;
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            context.qualified_name(&fk.foreign_table, true)?,
            context.name(&name, true)?,
            column_list(fk.foreign_columns(), context)?,
            context.qualified_name(&fk.primary_table, true)?,
            column_list(fk.primary_columns(), context)?
        );
        if let Some(action) = dialect.referential_action(fk.update_action, true) {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action);
        }
        if let Some(action) = dialect.referential_action(fk.delete_action, false) {
            sql.push_str(" ON DELETE ");
            sql.push_str(action);
        }
        if let Some(clause) = dialect.deferrability_clause(fk.deferrability) {
            sql.push(' ');
            sql.push_str(clause);
        }
        Ok(vec![sql])
    }

    fn drop_scripts(&self, fk: &ForeignKey, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let dialect = context.dialect();
        if !dialect.supports_drop_constraints() {
            return Ok(Vec::new());
        }
        let name = naming::foreign_key_name(fk, context)?;
        Ok(vec![format!(
            "ALTER TABLE {} {} {}",
            context.qualified_name(&fk.foreign_table, true)?,
            dialect.drop_foreign_key_keyword(),
            context.name(&name, true)?
        )])
    }
}

/// Rewrite `[name]` identifiers outside string literals with the target's quoting.
fn requote_brackets(clause: &str, dialect: &dyn Dialect) -> Result<String> {
    let mut out = String::with_capacity(clause.len());
    let mut chars = clause.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_string = !in_string;
                out.push(c);
            }
            '[' if !in_string => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(']') if chars.peek() == Some(&']') => {
                            chars.next();
                            name.push(']');
                        }
                        Some(']') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(MigrateError::ScriptGenerator(format!(
                                "Unterminated identifier in check clause: {:?}",
                                clause
                            )))
                        }
                    }
                }
                out.push_str(&dialect.quote(&name)?);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckGenerator;

impl CheckGenerator {
    /// The check condition in parentheses, requoted for the target.
    pub fn clause(&self, check: &Check, context: &ScriptGeneratorContext) -> Result<String> {
        validate_check_clause(&check.clause)?;
        let dialect = context.dialect();
        let mut clause = check.clause.trim().to_string();
        if context.source().is(products::MSSQL) && dialect.product_name() != products::MSSQL {
            clause = requote_brackets(&clause, dialect)?;
        }
        if unwrap_parens(&clause) == clause {
            clause = format!("({})", clause);
        }
        Ok(clause)
    }

    /// `[CONSTRAINT name] CHECK (condition)`.
    pub fn constraint_sql(&self, check: &Check, context: &ScriptGeneratorContext) -> Result<String> {
        let mut sql = String::new();
        if let Some(name) = &check.name {
            sql.push_str(&format!("CONSTRAINT {} ", context.name(name, true)?));
        }
        sql.push_str("CHECK ");
        sql.push_str(&self.clause(check, context)?);
        Ok(sql)
    }
}

impl<'a> ScriptGenerator<TableObject<'a, Check>> for CheckGenerator {
    fn create_scripts(&self, item: &TableObject<'a, Check>, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD {}",
            table_name(item.table, context)?,
            self.constraint_sql(item.object, context)?
        )])
    }

    // Unnamed checks cannot be addressed.
    fn drop_scripts(&self, item: &TableObject<'a, Check>, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let Some(name) = &item.object.name else {
            return Ok(Vec::new());
        };
        Ok(vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table_name(item.table, context)?,
            context.name(name, true)?
        )])
    }
}

fn fits_bigint(value: &Decimal) -> bool {
    *value >= Decimal::from(i64::MIN) && *value <= Decimal::from(i64::MAX)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceGenerator;

impl SequenceGenerator {
    /// Standalone sequence backing an auto-increment column, for dialects
    /// with sequences but no identity clause.
    pub fn for_column(
        &self,
        table: &Table,
        column: &Column,
        context: &ScriptGeneratorContext,
    ) -> Result<Option<Sequence>> {
        let dialect = context.dialect();
        if !column.auto_increment || !dialect.supports_sequences() || dialect.identity_clause(column).is_some() {
            return Ok(None);
        }
        let name = naming::sequence_name(table, column, context)?;
        let mut sequence = column
            .sequence
            .clone()
            .unwrap_or_else(|| Sequence::new(None, None, name.clone()));
        sequence.catalog = table.catalog.clone();
        sequence.schema = table.schema.clone();
        sequence.name = name;
        Ok(Some(sequence))
    }
}

impl ScriptGenerator<Sequence> for SequenceGenerator {
    fn create_scripts(&self, sequence: &Sequence, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        if !context.dialect().supports_sequences() {
            debug!("Skipping sequence {}: not supported by target", sequence.name);
            return Ok(Vec::new());
        }
        let mut sql = format!("CREATE SEQUENCE {}", context.get_qualified_name(sequence, true)?);
        if let Some(start) = sequence.start_with.filter(fits_bigint) {
            sql.push_str(&format!(" START WITH {}", start));
        }
        if let Some(increment) = sequence.increment_by.filter(|i| !i.is_zero() && fits_bigint(i)) {
            sql.push_str(&format!(" INCREMENT BY {}", increment));
        }
        // Bounds past the 64-bit range are vendor defaults; leave them out.
        if let Some(min) = sequence.min_value.filter(fits_bigint) {
            sql.push_str(&format!(" MINVALUE {}", min));
        }
        if let Some(max) = sequence.max_value.filter(fits_bigint) {
            sql.push_str(&format!(" MAXVALUE {}", max));
        }
        if let Some(cache) = sequence.cache.filter(|c| *c > Decimal::ONE && fits_bigint(c)) {
            sql.push_str(&format!(" CACHE {}", cache));
        }
        if sequence.cycle {
            sql.push_str(" CYCLE");
        }
        Ok(vec![sql])
    }

    fn drop_scripts(&self, sequence: &Sequence, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let dialect = context.dialect();
        if !dialect.supports_sequences() {
            return Ok(Vec::new());
        }
        let mut sql = String::from("DROP SEQUENCE ");
        if dialect.supports_drop_sequence_if_exists() {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&context.get_qualified_name(sequence, true)?);
        Ok(vec![sql])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::DatabaseInfo;
    use crate::core::types::{type_codes, JdbcTypeDesc};
    use crate::dialect::{
        MssqlDialect, MySqlDialect, NuoDbDialect, OracleDialect, PostgresDialect, SimpleDialect, TypeNameMap,
    };
    use crate::metadata::{Deferrability, ReferentialAction};
    use crate::script::ScriptType;
    use std::sync::Arc;

    fn context(dialect: Arc<dyn Dialect>) -> ScriptGeneratorContext {
        ScriptGeneratorContext::new(dialect)
    }

    fn orders() -> Table {
        let mut table = Table::new(None, Some(Identifier::new("shop")), Identifier::new("orders"));
        let id = table.add_column(Identifier::new("id"));
        id.type_desc = JdbcTypeDesc::code(type_codes::INTEGER);
        id.nullable = false;
        id.auto_increment = true;
        let status = table.add_column(Identifier::new("status"));
        status.type_desc = JdbcTypeDesc::code(type_codes::VARCHAR);
        status.size = Some(20);
        status.nullable = true;
        status.default_value = Some("new".to_string());
        table.primary_key = Some(PrimaryKey {
            name: None,
            columns: vec![Identifier::new("id")],
        });
        table
    }

    fn index(name: &str, unique: bool, columns: &[&str]) -> Index {
        Index {
            name: Some(Identifier::new(name)),
            unique,
            columns: columns.iter().map(|c| Identifier::new(*c)).collect(),
            filter: None,
        }
    }

    #[test]
    fn test_create_table_postgres() {
        let mut table = orders();
        table.checks.push(Check {
            name: Some(Identifier::new("ck_status")),
            clause: "status <> ''".to_string(),
        });
        let ctx = context(Arc::new(PostgresDialect::new())).with_script_types([ScriptType::Create]);
        let scripts = TableGenerator.scripts(&table, &ctx).unwrap();
        assert_eq!(
            scripts,
            vec![
                "CREATE TABLE \"shop\".\"orders\" (\n    \"id\" INTEGER NOT NULL GENERATED BY DEFAULT AS IDENTITY,\n    \
                 \"status\" VARCHAR(20) DEFAULT 'new',\n    PRIMARY KEY (\"id\"),\n    \
                 CONSTRAINT \"ck_status\" CHECK (status <> '')\n)"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_drop_then_create_order() {
        let ctx = context(Arc::new(PostgresDialect::new()));
        let scripts = TableGenerator.scripts(&orders(), &ctx).unwrap();
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[0], "DROP TABLE IF EXISTS \"shop\".\"orders\" CASCADE");
        assert!(scripts[1].starts_with("CREATE TABLE"));

        let none = context(Arc::new(PostgresDialect::new())).with_script_types(Vec::new());
        assert!(TableGenerator.scripts(&orders(), &none).unwrap().is_empty());
    }

    #[test]
    fn test_unique_over_nullable_columns_is_dropped_silently() {
        let mut table = orders();
        table.indexes.push(index("uq_status", true, &["status"]));
        table.indexes.push(index("uq_id", true, &["id"]));

        let nuodb = context(Arc::new(NuoDbDialect::new()));
        assert_eq!(IndexGenerator.constraint_sql(&table, &table.indexes[0], &nuodb).unwrap(), None);
        let create = TableGenerator.create_scripts(&table, &nuodb).unwrap();
        assert!(!create[0].contains("uq_status"));
        assert!(create[0].contains("CONSTRAINT \"uq_id\" UNIQUE (\"id\")"));

        let pg = context(Arc::new(PostgresDialect::new()));
        assert_eq!(
            IndexGenerator.constraint_sql(&table, &table.indexes[0], &pg).unwrap().as_deref(),
            Some("CONSTRAINT \"uq_status\" UNIQUE (\"status\")")
        );
    }

    #[test]
    fn test_index_drop_clause_truth_table() {
        let table = orders();
        let idx = index("idx_status", false, &["status"]);
        let item = TableObject::new(&table, &idx);

        // no ON, IF EXISTS
        let nuodb = context(Arc::new(NuoDbDialect::new()));
        assert_eq!(
            IndexGenerator.drop_scripts(&item, &nuodb).unwrap(),
            vec!["DROP INDEX \"shop\".\"idx_status\" IF EXISTS"]
        );
        // ON, no IF EXISTS
        let mysql = context(Arc::new(MySqlDialect::new()));
        assert_eq!(
            IndexGenerator.drop_scripts(&item, &mysql).unwrap(),
            vec!["DROP INDEX `idx_status` ON `orders`"]
        );
        // neither
        let pg = context(Arc::new(PostgresDialect::new()));
        assert_eq!(
            IndexGenerator.drop_scripts(&item, &pg).unwrap(),
            vec!["DROP INDEX \"shop\".\"idx_status\""]
        );
        // both
        let both = context(Arc::new(DropIndexOnTableIfExists(SimpleDialect::new())));
        assert_eq!(
            IndexGenerator.drop_scripts(&item, &both).unwrap(),
            vec!["DROP INDEX \"idx_status\" ON \"shop\".\"orders\" IF EXISTS"]
        );
    }

    /// ANSI rendering with both index DROP forms enabled.
    #[derive(Debug)]
    struct DropIndexOnTableIfExists(SimpleDialect);

    impl Dialect for DropIndexOnTableIfExists {
        fn name(&self) -> &'static str {
            "drop-index-on-table-if-exists"
        }

        fn product_name(&self) -> &'static str {
            self.0.product_name()
        }

        fn quote(&self, name: &str) -> Result<String> {
            self.0.quote(name)
        }

        fn type_names(&self) -> &TypeNameMap {
            self.0.type_names()
        }

        fn supports_drop_index_on_table(&self) -> bool {
            true
        }

        fn supports_drop_index_if_exists(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_create_index() {
        let table = orders();
        let mut idx = index("idx_status", false, &["status", "id"]);
        let ctx = context(Arc::new(MssqlDialect::new())).with_script_types([ScriptType::Create]);
        assert_eq!(
            IndexGenerator.scripts(&TableObject::new(&table, &idx), &ctx).unwrap(),
            vec!["CREATE INDEX [idx_status] ON [shop].[orders] ([status], [id])"]
        );

        idx.unique = true;
        idx.filter = Some("([status] IS NOT NULL)".to_string());
        assert_eq!(
            IndexGenerator.create_scripts(&TableObject::new(&table, &idx), &ctx).unwrap(),
            vec!["CREATE UNIQUE INDEX [idx_status] ON [shop].[orders] ([status], [id]) WHERE ([status] IS NOT NULL)"]
        );
        let nuodb = context(Arc::new(NuoDbDialect::new()));
        assert!(IndexGenerator
            .create_scripts(&TableObject::new(&table, &idx), &nuodb)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_primary_key_alter_scripts() {
        let table = orders();
        let pk = table.primary_key.clone().unwrap();
        let item = TableObject::new(&table, &pk);
        let mysql = context(Arc::new(MySqlDialect::new()));
        assert_eq!(
            PrimaryKeyGenerator.scripts(&item, &mysql).unwrap(),
            vec![
                "ALTER TABLE `orders` DROP PRIMARY KEY",
                "ALTER TABLE `orders` ADD PRIMARY KEY (`id`)"
            ]
        );
        let pg = context(Arc::new(PostgresDialect::new()));
        assert_eq!(
            PrimaryKeyGenerator.drop_scripts(&item, &pg).unwrap(),
            vec!["ALTER TABLE \"shop\".\"orders\" DROP CONSTRAINT \"pk_orders\""]
        );
    }

    fn foreign_key() -> ForeignKey {
        let mut fk = ForeignKey::new(
            QualifiedName::new(None, Some("shop"), "customers"),
            QualifiedName::new(None, Some("shop"), "orders"),
        );
        fk.add_reference(1, Identifier::new("id"), Identifier::new("customer_id"));
        fk.delete_action = ReferentialAction::Cascade;
        fk.update_action = ReferentialAction::Restrict;
        fk.deferrability = Deferrability::InitiallyDeferred;
        fk
    }

    #[test]
    fn test_foreign_key_scripts() {
        let fk = foreign_key();
        let pg = context(Arc::new(PostgresDialect::new()));
        assert_eq!(
            ForeignKeyGenerator.scripts(&fk, &pg).unwrap(),
            vec![
                "ALTER TABLE \"shop\".\"orders\" DROP CONSTRAINT \"fk_shop_customers_id_shop_orders_customer_id\"",
                "ALTER TABLE \"shop\".\"orders\" ADD CONSTRAINT \"fk_shop_customers_id_shop_orders_customer_id\" \
                 FOREIGN KEY (\"customer_id\") REFERENCES \"shop\".\"customers\" (\"id\") \
                 ON UPDATE RESTRICT ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED"
            ]
        );

        let mut named = foreign_key();
        named.name = Some(Identifier::new("orders_customer_fk"));
        let mysql = context(Arc::new(MySqlDialect::new()));
        assert_eq!(
            ForeignKeyGenerator.drop_scripts(&named, &mysql).unwrap(),
            vec!["ALTER TABLE `orders` DROP FOREIGN KEY `orders_customer_fk`"]
        );
        let oracle = context(Arc::new(OracleDialect::new())).with_script_types([ScriptType::Create]);
        let create = ForeignKeyGenerator.scripts(&named, &oracle).unwrap();
        assert!(create[0].ends_with("REFERENCES \"shop\".\"customers\" (\"id\") ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED"));
    }

    #[test]
    fn test_check_clause_requoted_from_sql_server() {
        let table = orders();
        let check = Check {
            name: Some(Identifier::new("ck_qty")),
            clause: "([qty]>(0) AND [code] LIKE '[A-Z]%')".to_string(),
        };
        let ctx = context(Arc::new(PostgresDialect::new()))
            .with_source(DatabaseInfo::new(products::MSSQL, "16.0"));
        assert_eq!(
            CheckGenerator.scripts(&TableObject::new(&table, &check), &ctx).unwrap(),
            vec![
                "ALTER TABLE \"shop\".\"orders\" DROP CONSTRAINT \"ck_qty\"",
                "ALTER TABLE \"shop\".\"orders\" ADD CONSTRAINT \"ck_qty\" CHECK (\"qty\">(0) AND \"code\" LIKE '[A-Z]%')"
            ]
        );

        let unnamed = Check {
            name: None,
            clause: "qty > 0; DROP TABLE orders".to_string(),
        };
        assert!(CheckGenerator.drop_scripts(&TableObject::new(&table, &unnamed), &ctx).unwrap().is_empty());
        assert!(matches!(
            CheckGenerator.constraint_sql(&unnamed, &ctx),
            Err(MigrateError::ScriptGenerator(_))
        ));
    }

    #[test]
    fn test_sequence_scripts() {
        let mut sequence = Sequence::new(None, Some(Identifier::new("hr")), Identifier::new("employees_seq"));
        sequence.start_with = Some(Decimal::from(1));
        sequence.increment_by = Some(Decimal::from(1));
        sequence.max_value = Some("9999999999999999999999999999".parse().unwrap());
        sequence.cache = Some(Decimal::from(20));
        sequence.cycle = true;

        let pg = context(Arc::new(PostgresDialect::new()));
        assert_eq!(
            SequenceGenerator.scripts(&sequence, &pg).unwrap(),
            vec![
                "DROP SEQUENCE IF EXISTS \"hr\".\"employees_seq\"",
                "CREATE SEQUENCE \"hr\".\"employees_seq\" START WITH 1 INCREMENT BY 1 CACHE 20 CYCLE"
            ]
        );
        let mysql = context(Arc::new(MySqlDialect::new()));
        assert!(SequenceGenerator.scripts(&sequence, &mysql).unwrap().is_empty());
    }

    #[test]
    fn test_column_defaults() {
        let mut column = Column::new(Identifier::new("label"), 1);
        column.type_desc = JdbcTypeDesc::code(type_codes::VARCHAR);
        column.size = Some(10);
        column.nullable = true;
        let ctx = context(Arc::new(MySqlDialect::new()));

        column.default_value = Some("'open'::character varying".to_string());
        assert_eq!(
            ColumnGenerator.definition(&column, &ctx).unwrap(),
            "`label` VARCHAR(10) DEFAULT 'open'"
        );
        column.default_value = Some("it's".to_string());
        assert_eq!(
            ColumnGenerator.definition(&column, &ctx).unwrap(),
            "`label` VARCHAR(10) DEFAULT 'it''s'"
        );

        column.type_desc = JdbcTypeDesc::code(type_codes::INTEGER);
        column.default_value = Some("((0))".to_string());
        column.nullable = false;
        assert_eq!(ColumnGenerator.definition(&column, &ctx).unwrap(), "`label` INT DEFAULT 0 NOT NULL");

        column.type_desc = JdbcTypeDesc::code(type_codes::TIMESTAMP);
        column.default_value = Some("now()".to_string());
        assert_eq!(
            ColumnGenerator.definition(&column, &ctx).unwrap(),
            "`label` DATETIME(6) DEFAULT CURRENT_TIMESTAMP NOT NULL"
        );
    }

    #[test]
    fn test_unmapped_type_is_an_error() {
        let mut column = Column::new(Identifier::new("geo"), 1);
        column.type_desc = JdbcTypeDesc::code(type_codes::NULL);
        let ctx = context(Arc::new(PostgresDialect::new()));
        assert!(matches!(
            ColumnGenerator.definition(&column, &ctx),
            Err(MigrateError::ScriptGenerator(_))
        ));
    }
}
