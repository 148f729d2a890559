use tracing::debug;

use super::generators::{
    CheckGenerator, ForeignKeyGenerator, IndexGenerator, PrimaryKeyGenerator, SequenceGenerator,
    TableGenerator, TableObject,
};
use super::{ScriptGenerator, ScriptGeneratorContext, ScriptType};
use crate::error::Result;
use crate::metadata::{Database, MetaDataType, Sequence, Table};

/// Renders a whole database in dependency order.
///
/// Drops run first: foreign keys, tables, sequences. Creates follow:
/// sequences, tables, standalone indexes, foreign keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptGeneratorManager;

impl ScriptGeneratorManager {
    pub fn new() -> Self {
        Self
    }

    pub fn database_scripts(&self, database: &Database, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        let tables: Vec<&Table> = database.tables().filter(|t| !t.is_view()).collect();
        let sequences = self.sequences(database, &tables, context)?;
        let mut scripts = Vec::new();

        if context.has_script_type(ScriptType::Drop) {
            if context.generates(MetaDataType::ForeignKey) {
                for fk in tables.iter().flat_map(|t| t.foreign_keys.iter()) {
                    scripts.extend(ForeignKeyGenerator.drop_scripts(fk, context)?);
                }
            }
            if context.generates(MetaDataType::Table) {
                for &table in &tables {
                    scripts.extend(TableGenerator.drop_scripts(table, context)?);
                }
            }
            for sequence in &sequences {
                scripts.extend(SequenceGenerator.drop_scripts(sequence, context)?);
            }
        }

        if context.has_script_type(ScriptType::Create) {
            for sequence in &sequences {
                scripts.extend(SequenceGenerator.create_scripts(sequence, context)?);
            }
            for &table in &tables {
                scripts.extend(self.table_create_scripts(table, context)?);
            }
            if context.generates(MetaDataType::Index) {
                for &table in &tables {
                    for index in &table.indexes {
                        // Unique constraints already went into CREATE TABLE.
                        if context.generates(MetaDataType::Table) && IndexGenerator::is_constraint(index) {
                            continue;
                        }
                        scripts.extend(IndexGenerator.create_scripts(&TableObject::new(table, index), context)?);
                    }
                }
            }
            if context.generates(MetaDataType::ForeignKey) {
                for fk in tables.iter().flat_map(|t| t.foreign_keys.iter()) {
                    scripts.extend(ForeignKeyGenerator.create_scripts(fk, context)?);
                }
            }
        }

        debug!("Generated {} scripts for {} tables", scripts.len(), tables.len());
        Ok(scripts)
    }

    /// Schema sequences plus generators for auto-increment columns the
    /// target cannot express with an identity clause.
    fn sequences(
        &self,
        database: &Database,
        tables: &[&Table],
        context: &ScriptGeneratorContext,
    ) -> Result<Vec<Sequence>> {
        let mut sequences = Vec::new();
        if context.generates(MetaDataType::Sequence) {
            sequences.extend(database.sequences().cloned());
        }
        if context.generates(MetaDataType::AutoIncrement) {
            for &table in tables {
                for column in &table.columns {
                    if let Some(sequence) = SequenceGenerator.for_column(table, column, context)? {
                        sequences.push(sequence);
                    }
                }
            }
        }
        Ok(sequences)
    }

    /// `CREATE TABLE`, or the constraints alone when tables are not rendered.
    fn table_create_scripts(&self, table: &Table, context: &ScriptGeneratorContext) -> Result<Vec<String>> {
        if context.generates(MetaDataType::Table) {
            return TableGenerator.create_scripts(table, context);
        }
        let mut scripts = Vec::new();
        if context.generates(MetaDataType::PrimaryKey) {
            if let Some(pk) = table.primary_key.as_ref().filter(|pk| !pk.columns.is_empty()) {
                scripts.extend(PrimaryKeyGenerator.create_scripts(&TableObject::new(table, pk), context)?);
            }
        }
        if context.generates(MetaDataType::Check) {
            for check in &table.checks {
                scripts.extend(CheckGenerator.create_scripts(&TableObject::new(table, check), context)?);
            }
        }
        Ok(scripts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::Identifier;
    use crate::core::session::DatabaseInfo;
    use crate::core::types::{type_codes, JdbcTypeDesc};
    use crate::dialect::{Dialect, MySqlDialect, PostgresDialect, TypeNameMap, TypeRule};
    use crate::error::Result;
    use crate::metadata::{Catalog, ForeignKey, Index, PrimaryKey, QualifiedName, Schema};
    use std::sync::Arc;

    fn table(name: &str) -> Table {
        let mut table = Table::new(None, Some(Identifier::new("shop")), Identifier::new(name));
        let id = table.add_column(Identifier::new("id"));
        id.type_desc = JdbcTypeDesc::code(type_codes::INTEGER);
        id.nullable = false;
        id.auto_increment = true;
        table.primary_key = Some(PrimaryKey {
            name: None,
            columns: vec![Identifier::new("id")],
        });
        table
    }

    fn database() -> Database {
        let customers = table("customers");
        let mut orders = table("orders");
        let customer_id = orders.add_column(Identifier::new("customer_id"));
        customer_id.type_desc = JdbcTypeDesc::code(type_codes::INTEGER);
        orders.indexes.push(Index {
            name: Some(Identifier::new("idx_customer")),
            unique: false,
            columns: vec![Identifier::new("customer_id")],
            filter: None,
        });
        let mut fk = ForeignKey::new(
            QualifiedName::new(None, Some("shop"), "customers"),
            QualifiedName::new(None, Some("shop"), "orders"),
        );
        fk.name = Some(Identifier::new("fk_orders_customer"));
        fk.add_reference(1, Identifier::new("id"), Identifier::new("customer_id"));
        orders.foreign_keys.push(fk);

        let mut view = Table::new(None, Some(Identifier::new("shop")), Identifier::new("order_totals"));
        view.table_type = "VIEW".to_string();

        let mut database = Database::new(DatabaseInfo::new("PostgreSQL", "16.2"));
        database.catalogs.push(Catalog {
            name: None,
            schemas: vec![Schema {
                catalog: None,
                name: Some(Identifier::new("shop")),
                tables: vec![customers, orders, view],
                sequences: vec![Sequence::new(None, Some(Identifier::new("shop")), Identifier::new("invoice_seq"))],
            }],
        });
        database
    }

    fn statement_kinds(scripts: &[String]) -> Vec<String> {
        scripts
            .iter()
            .map(|s| s.split_whitespace().take(2).collect::<Vec<_>>().join(" "))
            .collect()
    }

    #[test]
    fn test_database_script_order() {
        let context = ScriptGeneratorContext::new(Arc::new(PostgresDialect::new()));
        let scripts = ScriptGeneratorManager::new().database_scripts(&database(), &context).unwrap();
        assert_eq!(
            statement_kinds(&scripts),
            vec![
                "ALTER TABLE",
                "DROP TABLE",
                "DROP TABLE",
                "DROP SEQUENCE",
                "CREATE SEQUENCE",
                "CREATE TABLE",
                "CREATE TABLE",
                "CREATE INDEX",
                "ALTER TABLE",
            ]
        );
        assert!(scripts[0].contains("DROP CONSTRAINT \"fk_orders_customer\""));
        assert!(scripts[8].contains("ADD CONSTRAINT \"fk_orders_customer\""));
        assert!(!scripts.iter().any(|s| s.contains("order_totals")));
    }

    #[test]
    fn test_constraints_only_without_tables() {
        let context = ScriptGeneratorContext::new(Arc::new(MySqlDialect::new()))
            .with_script_types([ScriptType::Create])
            .with_meta_data_types([MetaDataType::PrimaryKey, MetaDataType::Index]);
        let scripts = ScriptGeneratorManager::new().database_scripts(&database(), &context).unwrap();
        assert_eq!(
            scripts,
            vec![
                "ALTER TABLE `customers` ADD PRIMARY KEY (`id`)",
                "ALTER TABLE `orders` ADD PRIMARY KEY (`id`)",
                "CREATE INDEX `idx_customer` ON `orders` (`customer_id`)",
            ]
        );
    }

    /// Sequences but no identity columns.
    #[derive(Debug)]
    struct SequenceOnlyDialect(TypeNameMap);

    impl Dialect for SequenceOnlyDialect {
        fn name(&self) -> &'static str {
            "sequence-only"
        }

        fn product_name(&self) -> &'static str {
            "SequenceOnly"
        }

        fn quote(&self, name: &str) -> Result<String> {
            crate::core::identifier::quote_ansi(name)
        }

        fn supports_sequences(&self) -> bool {
            true
        }

        fn type_names(&self) -> &TypeNameMap {
            &self.0
        }
    }

    #[test]
    fn test_auto_increment_sequences_without_identity() {
        let dialect = SequenceOnlyDialect(TypeNameMap::new(&[TypeRule::code(type_codes::INTEGER, "INTEGER")]));
        let context = ScriptGeneratorContext::new(Arc::new(dialect))
            .with_script_types([ScriptType::Create])
            .with_meta_data_types([MetaDataType::Table, MetaDataType::AutoIncrement]);
        let mut database = Database::new(DatabaseInfo::default());
        database.catalogs.push(Catalog {
            name: None,
            schemas: vec![Schema {
                catalog: None,
                name: None,
                tables: vec![table("users")],
                sequences: Vec::new(),
            }],
        });
        let scripts = ScriptGeneratorManager::new().database_scripts(&database, &context).unwrap();
        assert_eq!(scripts[0], "CREATE SEQUENCE \"shop\".\"seq_users_id\"");
        assert_eq!(scripts[1], "CREATE TABLE \"shop\".\"users\" (\n    \"id\" INTEGER NOT NULL\n)");
    }
}
