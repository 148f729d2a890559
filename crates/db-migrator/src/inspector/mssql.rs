//! SQL Server inspectors over the `sys` catalog views.

use super::rows::{self, decimal};
use super::{InspectionScope, Inspector, InspectorResolver, QueryInspector, ScopedQuery};
use crate::core::identifier::Identifier;
use crate::core::session::Row;
use crate::dialect::products::MSSQL;
use crate::error::Result;
use crate::metadata::{InspectionResults, MetaDataType, ObjectRef, QualifiedName, Sequence};

fn schema_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT DB_NAME() AS TABLE_CATALOG, s.name AS TABLE_SCHEMA FROM sys.schemas s \
         INNER JOIN sys.database_principals p ON p.principal_id = s.principal_id",
    )
    .and("p.type <> 'R'")
    .and_like("s.name", scope.schema.as_deref())
    .order_by("s.name")
}

fn index_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT DB_NAME() AS TABLE_CATALOG, s.name AS TABLE_SCHEMA, t.name AS TABLE_NAME, \
         i.name AS INDEX_NAME, CASE WHEN i.is_unique = 1 THEN 0 ELSE 1 END AS NON_UNIQUE, \
         c.name AS COLUMN_NAME, ic.key_ordinal AS ORDINAL_POSITION, \
         i.filter_definition AS FILTER_CONDITION \
         FROM sys.indexes i \
         INNER JOIN sys.tables t ON t.object_id = i.object_id \
         INNER JOIN sys.schemas s ON s.schema_id = t.schema_id \
         INNER JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
         INNER JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id",
    )
    .and("i.is_primary_key = 0")
    .and("i.type > 0")
    .and("ic.is_included_column = 0")
    .and_like("s.name", scope.schema.as_deref())
    .and_like("t.name", scope.table.as_deref())
    .order_by("s.name, t.name, i.name, ic.key_ordinal")
}

fn check_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT DB_NAME() AS TABLE_CATALOG, s.name AS TABLE_SCHEMA, t.name AS TABLE_NAME, \
         cc.name AS CONSTRAINT_NAME, cc.definition AS CHECK_CLAUSE \
         FROM sys.check_constraints cc \
         INNER JOIN sys.tables t ON t.object_id = cc.parent_object_id \
         INNER JOIN sys.schemas s ON s.schema_id = t.schema_id",
    )
    .and_like("s.name", scope.schema.as_deref())
    .and_like("t.name", scope.table.as_deref())
    .order_by("s.name, t.name, cc.name")
}

fn sequence_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT DB_NAME() AS SEQUENCE_CATALOG, s.name AS SEQUENCE_SCHEMA, q.name AS SEQUENCE_NAME, \
         CAST(q.start_value AS DECIMAL(38, 0)) AS START_VALUE, \
         CAST(q.minimum_value AS DECIMAL(38, 0)) AS MINIMUM_VALUE, \
         CAST(q.maximum_value AS DECIMAL(38, 0)) AS MAXIMUM_VALUE, \
         CAST(q.increment AS DECIMAL(38, 0)) AS INCREMENT, q.is_cycling AS CYCLE_OPTION, \
         q.cache_size AS CACHE_SIZE, CAST(q.current_value AS DECIMAL(38, 0)) AS LAST_VALUE \
         FROM sys.sequences q INNER JOIN sys.schemas s ON s.schema_id = q.schema_id",
    )
    .and_like("s.name", scope.schema.as_deref())
    .order_by("s.name, q.name")
}

fn identity_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT DB_NAME() AS TABLE_CATALOG, s.name AS TABLE_SCHEMA, t.name AS TABLE_NAME, \
         c.name AS COLUMN_NAME, CAST(c.seed_value AS DECIMAL(38, 0)) AS START_VALUE, \
         CAST(c.increment_value AS DECIMAL(38, 0)) AS INCREMENT, \
         CAST(c.last_value AS DECIMAL(38, 0)) AS LAST_VALUE \
         FROM sys.identity_columns c \
         INNER JOIN sys.tables t ON t.object_id = c.object_id \
         INNER JOIN sys.schemas s ON s.schema_id = t.schema_id",
    )
    .and_like("s.name", scope.schema.as_deref())
    .and_like("t.name", scope.table.as_deref())
}

fn process_identity_columns(results: &mut InspectionResults, rows: &[Row], _: &InspectionScope) -> Result<()> {
    for row in rows {
        let (Some(table_name), Some(column_name)) = (row.get_string("TABLE_NAME"), row.get_string("COLUMN_NAME")) else {
            continue;
        };
        let qualified = QualifiedName::new(
            row.get_string("TABLE_CATALOG").as_deref(),
            row.get_string("TABLE_SCHEMA").as_deref(),
            &table_name,
        );
        let Some(table) = results.table_mut(&qualified) else {
            continue;
        };
        let owner = table.qualified_name();
        let column_name = Identifier::new(column_name);
        let Some(column) = table.column_mut(&column_name) else {
            continue;
        };
        let mut sequence = Sequence::new(owner.catalog.clone(), owner.schema.clone(), Identifier::new(""));
        sequence.start_with = decimal(row, "START_VALUE");
        sequence.increment_by = decimal(row, "INCREMENT");
        sequence.last_value = decimal(row, "LAST_VALUE");
        column.auto_increment = true;
        column.sequence = Some(sequence);
        results.add_object(ObjectRef::in_table(MetaDataType::AutoIncrement, &owner, Some(column_name)));
    }
    Ok(())
}

pub(super) fn register(resolver: InspectorResolver) -> InspectorResolver {
    let inspector = match resolver.object_type() {
        MetaDataType::Schema => QueryInspector::new(MetaDataType::Schema, schema_query, |results, rows, _| {
            rows::process_schemas(results, rows)
        }),
        MetaDataType::Index => QueryInspector::new(MetaDataType::Index, index_query, |results, rows, _| {
            rows::process_indexes(results, rows)
        }),
        MetaDataType::Check => QueryInspector::new(MetaDataType::Check, check_query, |results, rows, _| {
            rows::process_checks(results, rows)
        }),
        MetaDataType::Sequence => QueryInspector::new(MetaDataType::Sequence, sequence_query, |results, rows, _| {
            rows::process_sequences(results, rows)
        }),
        MetaDataType::AutoIncrement => {
            QueryInspector::new(MetaDataType::AutoIncrement, identity_query, process_identity_columns)
        }
        _ => return resolver,
    };
    resolver.with_product(MSSQL, inspector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;
    use crate::dialect::MssqlDialect;
    use crate::inspector::InspectionManager;
    use crate::testing::MockSession;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn s(v: &str) -> SqlValue<'static> {
        SqlValue::from(v.to_string())
    }

    #[test]
    fn test_schema_query_excludes_roles() {
        let scope = InspectionScope {
            schema: Some("dbo".to_string()),
            ..InspectionScope::default()
        };
        let (sql, _) = schema_query(&scope).build(&MssqlDialect::new());
        assert!(sql.contains("WHERE p.type <> 'R' AND s.name = @P1"));
    }

    #[tokio::test]
    async fn test_checks_sequences_and_identity() {
        let mut session = MockSession::new(MSSQL)
            .with_result(
                "sys.schemas s INNER JOIN sys.database_principals",
                &["TABLE_CATALOG", "TABLE_SCHEMA"],
                vec![vec![s("shop"), s("dbo")], vec![s("shop"), s("sys")]],
            )
            .with_result(
                "INFORMATION_SCHEMA.TABLES",
                &["TABLE_CATALOG", "TABLE_SCHEMA", "TABLE_NAME", "TABLE_TYPE"],
                vec![vec![s("shop"), s("dbo"), s("orders"), s("BASE TABLE")]],
            )
            .with_result(
                "INFORMATION_SCHEMA.COLUMNS",
                &["TABLE_CATALOG", "TABLE_SCHEMA", "TABLE_NAME", "COLUMN_NAME", "TYPE_NAME"],
                vec![
                    vec![s("shop"), s("dbo"), s("orders"), s("id"), s("int")],
                    vec![s("shop"), s("dbo"), s("orders"), s("qty"), s("int")],
                ],
            )
            .with_result(
                "sys.check_constraints",
                &["TABLE_CATALOG", "TABLE_SCHEMA", "TABLE_NAME", "CONSTRAINT_NAME", "CHECK_CLAUSE"],
                vec![vec![s("shop"), s("dbo"), s("orders"), s("ck_qty"), s("([qty]>(0))")]],
            )
            .with_result(
                "sys.sequences",
                &["SEQUENCE_CATALOG", "SEQUENCE_SCHEMA", "SEQUENCE_NAME", "START_VALUE", "MAXIMUM_VALUE", "CYCLE_OPTION"],
                vec![vec![
                    s("shop"),
                    s("dbo"),
                    s("ticket_seq"),
                    SqlValue::Decimal(Decimal::from(1)),
                    SqlValue::Decimal(Decimal::from_str("9223372036854775807").unwrap()),
                    SqlValue::Bool(true),
                ]],
            )
            .with_result(
                "sys.identity_columns",
                &["TABLE_CATALOG", "TABLE_SCHEMA", "TABLE_NAME", "COLUMN_NAME", "START_VALUE", "INCREMENT"],
                vec![vec![
                    s("shop"),
                    s("dbo"),
                    s("orders"),
                    s("id"),
                    SqlValue::Decimal(Decimal::from(1000)),
                    SqlValue::Decimal(Decimal::from(10)),
                ]],
            );

        let results = InspectionManager::new()
            .inspect(
                &mut session,
                &InspectionScope::default(),
                &[MetaDataType::Check, MetaDataType::Sequence, MetaDataType::AutoIncrement],
            )
            .await
            .unwrap();

        let database = results.database().unwrap();
        let orders = database.tables().next().unwrap();
        assert_eq!(orders.checks.len(), 1);
        assert_eq!(orders.checks[0].clause, "([qty]>(0))");

        let sequence = database.sequences().next().unwrap();
        assert!(sequence.cycle);
        assert_eq!(sequence.max_value.map(|d| d.to_string()).as_deref(), Some("9223372036854775807"));

        let id = &orders.columns[0];
        assert!(id.auto_increment);
        let identity = id.sequence.as_ref().unwrap();
        assert_eq!(identity.start_with, Some(Decimal::from(1000)));
        assert_eq!(identity.increment_by, Some(Decimal::from(10)));
        assert!(!orders.columns[1].auto_increment);
    }
}
