//! Vendor-neutral inspectors over `INFORMATION_SCHEMA`.

use super::rows;
use super::{InspectionScope, InspectorResolver, QueryInspector, ScopedQuery};
use crate::metadata::MetaDataType;

fn catalog_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT DISTINCT CATALOG_NAME AS TABLE_CATALOG FROM INFORMATION_SCHEMA.SCHEMATA",
    )
    .and_like("CATALOG_NAME", scope.catalog.as_deref())
    .order_by("TABLE_CATALOG")
}

fn schema_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT CATALOG_NAME AS TABLE_CATALOG, SCHEMA_NAME AS TABLE_SCHEMA \
         FROM INFORMATION_SCHEMA.SCHEMATA",
    )
    .and_equals("CATALOG_NAME", scope.catalog.as_deref())
    .and_like("SCHEMA_NAME", scope.schema.as_deref())
    .order_by("TABLE_CATALOG, TABLE_SCHEMA")
}

fn table_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE \
         FROM INFORMATION_SCHEMA.TABLES",
    )
    .and_equals("TABLE_CATALOG", scope.catalog.as_deref())
    .and_like("TABLE_SCHEMA", scope.schema.as_deref())
    .and_like("TABLE_NAME", scope.table.as_deref())
    .order_by("TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME")
}

fn column_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, DATA_TYPE AS TYPE_NAME, \
         CHARACTER_MAXIMUM_LENGTH AS COLUMN_SIZE, NUMERIC_PRECISION, NUMERIC_SCALE, \
         IS_NULLABLE, COLUMN_DEFAULT AS COLUMN_DEF, ORDINAL_POSITION \
         FROM INFORMATION_SCHEMA.COLUMNS",
    )
    .and_equals("TABLE_CATALOG", scope.catalog.as_deref())
    .and_like("TABLE_SCHEMA", scope.schema.as_deref())
    .and_like("TABLE_NAME", scope.table.as_deref())
    .order_by("TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION")
}

fn primary_key_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT TC.TABLE_CATALOG, TC.TABLE_SCHEMA, TC.TABLE_NAME, TC.CONSTRAINT_NAME AS PK_NAME, \
         KCU.COLUMN_NAME, KCU.ORDINAL_POSITION AS KEY_SEQ \
         FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS TC \
         INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE KCU \
         ON TC.CONSTRAINT_CATALOG = KCU.CONSTRAINT_CATALOG \
         AND TC.CONSTRAINT_SCHEMA = KCU.CONSTRAINT_SCHEMA \
         AND TC.CONSTRAINT_NAME = KCU.CONSTRAINT_NAME \
         AND TC.TABLE_NAME = KCU.TABLE_NAME",
    )
    .and("TC.CONSTRAINT_TYPE = 'PRIMARY KEY'")
    .and_equals("TC.TABLE_CATALOG", scope.catalog.as_deref())
    .and_like("TC.TABLE_SCHEMA", scope.schema.as_deref())
    .and_like("TC.TABLE_NAME", scope.table.as_deref())
    .order_by("TC.TABLE_SCHEMA, TC.TABLE_NAME, KEY_SEQ")
}

fn foreign_key_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT PK.TABLE_CATALOG AS PKTABLE_CAT, PK.TABLE_SCHEMA AS PKTABLE_SCHEM, \
         PK.TABLE_NAME AS PKTABLE_NAME, PK.COLUMN_NAME AS PKCOLUMN_NAME, \
         FK.TABLE_CATALOG AS FKTABLE_CAT, FK.TABLE_SCHEMA AS FKTABLE_SCHEM, \
         FK.TABLE_NAME AS FKTABLE_NAME, FK.COLUMN_NAME AS FKCOLUMN_NAME, \
         FK.ORDINAL_POSITION AS KEY_SEQ, RC.UPDATE_RULE, RC.DELETE_RULE, \
         RC.CONSTRAINT_NAME AS FK_NAME \
         FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS RC \
         INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE FK \
         ON FK.CONSTRAINT_CATALOG = RC.CONSTRAINT_CATALOG \
         AND FK.CONSTRAINT_SCHEMA = RC.CONSTRAINT_SCHEMA \
         AND FK.CONSTRAINT_NAME = RC.CONSTRAINT_NAME \
         INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE PK \
         ON PK.CONSTRAINT_CATALOG = RC.UNIQUE_CONSTRAINT_CATALOG \
         AND PK.CONSTRAINT_SCHEMA = RC.UNIQUE_CONSTRAINT_SCHEMA \
         AND PK.CONSTRAINT_NAME = RC.UNIQUE_CONSTRAINT_NAME \
         AND PK.ORDINAL_POSITION = FK.POSITION_IN_UNIQUE_CONSTRAINT",
    )
    .and_equals("FK.TABLE_CATALOG", scope.catalog.as_deref())
    .and_like("FK.TABLE_SCHEMA", scope.schema.as_deref())
    .and_like("FK.TABLE_NAME", scope.table.as_deref())
    .order_by("FKTABLE_SCHEM, FKTABLE_NAME, FK_NAME, KEY_SEQ")
}

pub(super) fn catalogs() -> InspectorResolver {
    InspectorResolver::new(MetaDataType::Catalog).with_fallback(QueryInspector::new(
        MetaDataType::Catalog,
        catalog_query,
        |results, rows, _| rows::process_catalogs(results, rows),
    ))
}

pub(super) fn schemas() -> InspectorResolver {
    InspectorResolver::new(MetaDataType::Schema).with_fallback(QueryInspector::new(
        MetaDataType::Schema,
        schema_query,
        |results, rows, _| rows::process_schemas(results, rows),
    ))
}

pub(super) fn tables() -> InspectorResolver {
    InspectorResolver::new(MetaDataType::Table).with_fallback(QueryInspector::new(
        MetaDataType::Table,
        table_query,
        rows::process_tables,
    ))
}

pub(super) fn columns() -> InspectorResolver {
    InspectorResolver::new(MetaDataType::Column).with_fallback(QueryInspector::new(
        MetaDataType::Column,
        column_query,
        |results, rows, _| rows::process_columns(results, rows),
    ))
}

pub(super) fn primary_keys() -> InspectorResolver {
    InspectorResolver::new(MetaDataType::PrimaryKey).with_fallback(QueryInspector::new(
        MetaDataType::PrimaryKey,
        primary_key_query,
        |results, rows, _| rows::process_primary_keys(results, rows),
    ))
}

pub(super) fn foreign_keys() -> InspectorResolver {
    InspectorResolver::new(MetaDataType::ForeignKey).with_fallback(QueryInspector::new(
        MetaDataType::ForeignKey,
        foreign_key_query,
        |results, rows, _| rows::process_imported_keys(results, rows),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MssqlDialect;

    #[test]
    fn test_scoped_table_query() {
        let scope = InspectionScope {
            schema: Some("dbo".to_string()),
            table: Some("ord%".to_string()),
            ..InspectionScope::default()
        };
        let (sql, params) = table_query(&scope).build(&MssqlDialect::new());
        assert!(sql.ends_with(
            "WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME LIKE @P2 ORDER BY TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME"
        ));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_primary_key_query_keeps_constraint_filter_first() {
        let (sql, params) = primary_key_query(&InspectionScope::default()).build(&MssqlDialect::new());
        assert!(sql.contains("WHERE TC.CONSTRAINT_TYPE = 'PRIMARY KEY' ORDER BY"));
        assert!(params.is_empty());
    }
}
