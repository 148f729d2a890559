//! MySQL inspectors. MySQL databases are reported as catalogs and tables
//! have no schema.

use super::rows::{self, decimal};
use super::{InspectionScope, Inspector, InspectorResolver, QueryInspector, ScopedQuery};
use crate::core::identifier::Identifier;
use crate::core::session::Row;
use crate::dialect::products::MYSQL;
use crate::error::Result;
use crate::metadata::{InspectionResults, MetaDataType, ObjectRef, QualifiedName, Sequence};

fn catalog_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new("SELECT SCHEMA_NAME AS TABLE_CATALOG FROM INFORMATION_SCHEMA.SCHEMATA")
        .and_like("SCHEMA_NAME", scope.database_name())
        .order_by("SCHEMA_NAME")
}

fn process_databases(results: &mut InspectionResults, rows: &[Row], _: &InspectionScope) -> Result<()> {
    for row in rows {
        let Some(catalog) = row.get_string("TABLE_CATALOG") else {
            continue;
        };
        if !rows::is_system_schema(&catalog) {
            results.add_schema(Some(&catalog), None);
        }
    }
    Ok(())
}

fn table_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TABLE_SCHEMA AS TABLE_CATALOG, NULL AS TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE, \
         TABLE_COMMENT AS REMARKS FROM INFORMATION_SCHEMA.TABLES",
    )
    .and_like("TABLE_SCHEMA", scope.database_name())
    .and_like("TABLE_NAME", scope.table.as_deref())
    .order_by("TABLE_SCHEMA, TABLE_NAME")
}

fn column_query(table: &QualifiedName) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TABLE_SCHEMA AS TABLE_CATALOG, NULL AS TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, \
         DATA_TYPE AS TYPE_NAME, COLUMN_TYPE, CHARACTER_MAXIMUM_LENGTH AS COLUMN_SIZE, \
         NUMERIC_PRECISION, NUMERIC_SCALE, IS_NULLABLE, COLUMN_DEFAULT AS COLUMN_DEF, \
         ORDINAL_POSITION, EXTRA, COLUMN_COMMENT AS REMARKS FROM INFORMATION_SCHEMA.COLUMNS",
    )
    .and_equals("TABLE_SCHEMA", table.catalog.as_ref().map(Identifier::value))
    .and_equals("TABLE_NAME", Some(table.name.value()))
    .order_by("ORDINAL_POSITION")
}

fn primary_key_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TABLE_SCHEMA AS TABLE_CATALOG, NULL AS TABLE_SCHEMA, TABLE_NAME, NULL AS PK_NAME, \
         COLUMN_NAME, ORDINAL_POSITION AS KEY_SEQ FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE",
    )
    .and("CONSTRAINT_NAME = 'PRIMARY'")
    .and_like("TABLE_SCHEMA", scope.database_name())
    .and_like("TABLE_NAME", scope.table.as_deref())
    .order_by("TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION")
}

fn foreign_key_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT KCU.REFERENCED_TABLE_SCHEMA AS PKTABLE_CAT, NULL AS PKTABLE_SCHEM, \
         KCU.REFERENCED_TABLE_NAME AS PKTABLE_NAME, KCU.REFERENCED_COLUMN_NAME AS PKCOLUMN_NAME, \
         KCU.TABLE_SCHEMA AS FKTABLE_CAT, NULL AS FKTABLE_SCHEM, KCU.TABLE_NAME AS FKTABLE_NAME, \
         KCU.COLUMN_NAME AS FKCOLUMN_NAME, KCU.ORDINAL_POSITION AS KEY_SEQ, \
         RC.UPDATE_RULE, RC.DELETE_RULE, KCU.CONSTRAINT_NAME AS FK_NAME \
         FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE KCU \
         INNER JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS RC \
         ON RC.CONSTRAINT_SCHEMA = KCU.CONSTRAINT_SCHEMA AND RC.CONSTRAINT_NAME = KCU.CONSTRAINT_NAME",
    )
    .and_like("KCU.TABLE_SCHEMA", scope.database_name())
    .and_like("KCU.TABLE_NAME", scope.table.as_deref())
    .order_by("KCU.TABLE_SCHEMA, KCU.TABLE_NAME, KCU.CONSTRAINT_NAME, KCU.ORDINAL_POSITION")
}

fn index_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TABLE_SCHEMA AS TABLE_CATALOG, NULL AS TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, \
         NON_UNIQUE, COLUMN_NAME, SEQ_IN_INDEX AS ORDINAL_POSITION \
         FROM INFORMATION_SCHEMA.STATISTICS",
    )
    .and("INDEX_NAME <> 'PRIMARY'")
    .and_like("TABLE_SCHEMA", scope.database_name())
    .and_like("TABLE_NAME", scope.table.as_deref())
    .order_by("TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX")
}

fn auto_increment_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TABLE_SCHEMA AS TABLE_CATALOG, NULL AS TABLE_SCHEMA, TABLE_NAME, AUTO_INCREMENT \
         FROM INFORMATION_SCHEMA.TABLES",
    )
    .and("AUTO_INCREMENT IS NOT NULL")
    .and_like("TABLE_SCHEMA", scope.database_name())
    .and_like("TABLE_NAME", scope.table.as_deref())
}

/// Attach the table's next `AUTO_INCREMENT` value to its auto-increment
/// column as an unnamed sequence.
fn process_auto_increments(results: &mut InspectionResults, rows: &[Row], _: &InspectionScope) -> Result<()> {
    for row in rows {
        let (Some(catalog), Some(name)) = (row.get_string("TABLE_CATALOG"), row.get_string("TABLE_NAME")) else {
            continue;
        };
        let qualified = QualifiedName::new(Some(&catalog), None, &name);
        let Some(table) = results.table_mut(&qualified) else {
            continue;
        };
        let Some(column) = table.columns.iter_mut().find(|c| c.auto_increment) else {
            continue;
        };
        let mut sequence = Sequence::new(table.catalog.clone(), None, Identifier::new(""));
        sequence.start_with = decimal(row, "AUTO_INCREMENT");
        column.sequence = Some(sequence);
        let object = ObjectRef::in_table(
            MetaDataType::AutoIncrement,
            &QualifiedName {
                catalog: table.catalog.clone(),
                schema: table.schema.clone(),
                name: table.name.clone(),
            },
            Some(column.name.clone()),
        );
        results.add_object(object);
    }
    Ok(())
}

pub(super) fn register(resolver: InspectorResolver) -> InspectorResolver {
    let inspector = match resolver.object_type() {
        MetaDataType::Catalog => QueryInspector::new(MetaDataType::Catalog, catalog_query, |results, rows, _| {
            rows::process_catalogs(results, rows)
        }),
        MetaDataType::Schema => QueryInspector::new(MetaDataType::Schema, catalog_query, process_databases),
        MetaDataType::Table => QueryInspector::new(MetaDataType::Table, table_query, rows::process_tables),
        MetaDataType::Column => QueryInspector::per_table(MetaDataType::Column, column_query, |results, rows, _| {
            rows::process_columns(results, rows)
        }),
        MetaDataType::PrimaryKey => {
            QueryInspector::new(MetaDataType::PrimaryKey, primary_key_query, |results, rows, _| {
                rows::process_primary_keys(results, rows)
            })
        }
        MetaDataType::ForeignKey => {
            QueryInspector::new(MetaDataType::ForeignKey, foreign_key_query, |results, rows, _| {
                rows::process_imported_keys(results, rows)
            })
        }
        MetaDataType::Index => QueryInspector::new(MetaDataType::Index, index_query, |results, rows, _| {
            rows::process_indexes(results, rows)
        }),
        MetaDataType::AutoIncrement => {
            QueryInspector::new(MetaDataType::AutoIncrement, auto_increment_query, process_auto_increments)
        }
        _ => return resolver,
    };
    resolver.with_product(MYSQL, inspector)
}
