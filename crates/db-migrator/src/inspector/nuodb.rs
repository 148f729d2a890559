//! NuoDB inspectors over the `SYSTEM` schema.

use super::rows;
use super::{Inspector, InspectorResolver, QueryInspector, ScopedQuery};
use crate::core::identifier::Identifier;
use crate::dialect::products::NUODB;
use crate::metadata::{MetaDataType, QualifiedName};

const FOREIGN_KEYS: &str = "SELECT PRIMARYTABLE.SCHEMA AS PKTABLE_SCHEM, \
     PRIMARYTABLE.TABLENAME AS PKTABLE_NAME, PRIMARYFIELD.FIELD AS PKCOLUMN_NAME, \
     FOREIGNTABLE.SCHEMA AS FKTABLE_SCHEM, FOREIGNTABLE.TABLENAME AS FKTABLE_NAME, \
     FOREIGNFIELD.FIELD AS FKCOLUMN_NAME, FOREIGNKEYS.POSITION + 1 AS KEY_SEQ, \
     FOREIGNKEYS.UPDATERULE AS UPDATE_RULE, FOREIGNKEYS.DELETERULE AS DELETE_RULE, \
     FOREIGNKEYS.DEFERRABILITY AS DEFERRABILITY \
     FROM SYSTEM.FOREIGNKEYS \
     INNER JOIN SYSTEM.TABLES PRIMARYTABLE ON FOREIGNKEYS.PRIMARYTABLEID = PRIMARYTABLE.TABLEID \
     INNER JOIN SYSTEM.FIELDS PRIMARYFIELD ON PRIMARYTABLE.SCHEMA = PRIMARYFIELD.SCHEMA \
     AND PRIMARYTABLE.TABLENAME = PRIMARYFIELD.TABLENAME \
     AND FOREIGNKEYS.PRIMARYFIELDID = PRIMARYFIELD.FIELDID \
     INNER JOIN SYSTEM.TABLES FOREIGNTABLE ON FOREIGNKEYS.FOREIGNTABLEID = FOREIGNTABLE.TABLEID \
     INNER JOIN SYSTEM.FIELDS FOREIGNFIELD ON FOREIGNTABLE.SCHEMA = FOREIGNFIELD.SCHEMA \
     AND FOREIGNTABLE.TABLENAME = FOREIGNFIELD.TABLENAME \
     AND FOREIGNKEYS.FOREIGNFIELDID = FOREIGNFIELD.FIELDID";

/// Foreign keys of one table. Both filters are always bound so every
/// table shares one prepared statement.
fn foreign_key_query(table: &QualifiedName) -> ScopedQuery {
    ScopedQuery::new(FOREIGN_KEYS)
        .and_equals(
            "FOREIGNTABLE.SCHEMA",
            Some(table.schema.as_ref().map(Identifier::value).unwrap_or("")),
        )
        .and_equals("FOREIGNTABLE.TABLENAME", Some(table.name.value()))
        .order_by("PKTABLE_SCHEM, PKTABLE_NAME, KEY_SEQ")
}

pub(super) fn register(resolver: InspectorResolver) -> InspectorResolver {
    match resolver.object_type() {
        MetaDataType::ForeignKey => {
            let inspector = QueryInspector::per_table(MetaDataType::ForeignKey, foreign_key_query, |results, rows, _| {
                rows::process_imported_keys(results, rows)
            });
            resolver.with_product(NUODB, inspector)
        }
        _ => resolver,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;
    use crate::dialect::NuoDbDialect;
    use crate::inspector::{InspectionManager, InspectionScope};
    use crate::metadata::ReferentialAction;
    use crate::testing::MockSession;

    fn s(v: &str) -> SqlValue<'static> {
        SqlValue::from(v.to_string())
    }

    #[test]
    fn test_query_binds_schema_and_table() {
        let (sql, params) = foreign_key_query(&QualifiedName::new(None, Some("hockey"), "players"))
            .build(&NuoDbDialect::new());
        assert!(sql.ends_with(
            "WHERE FOREIGNTABLE.SCHEMA = ? AND FOREIGNTABLE.TABLENAME = ? ORDER BY PKTABLE_SCHEM, PKTABLE_NAME, KEY_SEQ"
        ));
        assert_eq!(params, vec![SqlValue::from("hockey"), SqlValue::from("players")]);
    }

    #[tokio::test]
    async fn test_foreign_keys_per_table() {
        // The mock answers every table's query with the same rows; keys are
        // attached to the foreign table named in the row.
        let mut session = MockSession::new(NUODB)
            .with_result(
                "INFORMATION_SCHEMA.TABLES",
                &["TABLE_SCHEMA", "TABLE_NAME", "TABLE_TYPE"],
                vec![
                    vec![s("hockey"), s("players"), s("TABLE")],
                    vec![s("hockey"), s("scoring"), s("TABLE")],
                ],
            )
            .with_result(
                "SYSTEM.FOREIGNKEYS",
                &[
                    "PKTABLE_SCHEM",
                    "PKTABLE_NAME",
                    "PKCOLUMN_NAME",
                    "FKTABLE_SCHEM",
                    "FKTABLE_NAME",
                    "FKCOLUMN_NAME",
                    "KEY_SEQ",
                    "UPDATE_RULE",
                    "DELETE_RULE",
                    "DEFERRABILITY",
                ],
                vec![vec![
                    s("hockey"),
                    s("players"),
                    s("id"),
                    s("hockey"),
                    s("scoring"),
                    s("player_id"),
                    SqlValue::I64(1),
                    SqlValue::I64(3),
                    SqlValue::I64(0),
                    SqlValue::I64(7),
                ]],
            );
        let stats = session.stats();
        let results = InspectionManager::new()
            .inspect(&mut session, &InspectionScope::default(), &[MetaDataType::ForeignKey])
            .await
            .unwrap();

        let database = results.database().unwrap();
        let scoring = database
            .find_table(&QualifiedName::new(None, Some("hockey"), "scoring"))
            .unwrap();
        assert!(!scoring.foreign_keys.is_empty());
        assert_eq!(scoring.foreign_keys[0].delete_action, ReferentialAction::Cascade);
        assert!(scoring.foreign_keys[0].name.is_none());

        let stats = stats.lock().unwrap();
        let fk_statements = stats
            .queries
            .iter()
            .filter(|q| q.contains("SYSTEM.FOREIGNKEYS"))
            .count();
        assert_eq!(fk_statements, 2);
        assert!(stats.open_statements.is_empty());
    }
}
