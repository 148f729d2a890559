//! PostgreSQL inspectors over `pg_catalog` and `information_schema`.

use std::sync::OnceLock;

use regex::Regex;

use super::rows::{self, decimal};
use super::{InspectionScope, Inspector, InspectorResolver, QueryInspector, ScopedQuery};
use crate::core::identifier::Identifier;
use crate::core::session::Row;
use crate::dialect::products::POSTGRESQL;
use crate::error::Result;
use crate::metadata::{InspectionResults, MetaDataType, ObjectRef, QualifiedName, Sequence};

fn index_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT current_database() AS TABLE_CATALOG, n.nspname AS TABLE_SCHEMA, \
         t.relname AS TABLE_NAME, i.relname AS INDEX_NAME, NOT ix.indisunique AS NON_UNIQUE, \
         a.attname AS COLUMN_NAME, k.ord AS ORDINAL_POSITION, \
         pg_get_expr(ix.indpred, ix.indrelid) AS FILTER_CONDITION \
         FROM pg_index ix \
         INNER JOIN pg_class t ON t.oid = ix.indrelid \
         INNER JOIN pg_class i ON i.oid = ix.indexrelid \
         INNER JOIN pg_namespace n ON n.oid = t.relnamespace \
         CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) \
         INNER JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum",
    )
    .and("NOT ix.indisprimary")
    .and_like("n.nspname", scope.schema.as_deref())
    .and_like("t.relname", scope.table.as_deref())
    .order_by("n.nspname, t.relname, i.relname, k.ord")
}

fn check_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT current_database() AS TABLE_CATALOG, n.nspname AS TABLE_SCHEMA, \
         t.relname AS TABLE_NAME, c.conname AS CONSTRAINT_NAME, \
         pg_get_constraintdef(c.oid) AS CHECK_CLAUSE \
         FROM pg_constraint c \
         INNER JOIN pg_class t ON t.oid = c.conrelid \
         INNER JOIN pg_namespace n ON n.oid = t.relnamespace",
    )
    .and("c.contype = 'c'")
    .and_like("n.nspname", scope.schema.as_deref())
    .and_like("t.relname", scope.table.as_deref())
    .order_by("n.nspname, t.relname, c.conname")
}

fn sequence_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT sequence_catalog AS SEQUENCE_CATALOG, sequence_schema AS SEQUENCE_SCHEMA, \
         sequence_name AS SEQUENCE_NAME, start_value AS START_VALUE, \
         minimum_value AS MINIMUM_VALUE, maximum_value AS MAXIMUM_VALUE, \
         increment AS INCREMENT, cycle_option AS CYCLE_OPTION \
         FROM information_schema.sequences",
    )
    .and_equals("sequence_catalog", scope.catalog.as_deref())
    .and_like("sequence_schema", scope.schema.as_deref())
    .order_by("sequence_schema, sequence_name")
}

fn auto_increment_query(scope: &InspectionScope) -> ScopedQuery {
    ScopedQuery::new(
        "SELECT table_catalog AS TABLE_CATALOG, table_schema AS TABLE_SCHEMA, \
         table_name AS TABLE_NAME, column_name AS COLUMN_NAME, column_default AS COLUMN_DEF, \
         is_identity AS IS_IDENTITY, identity_start AS START_VALUE, \
         identity_increment AS INCREMENT, identity_minimum AS MINIMUM_VALUE, \
         identity_maximum AS MAXIMUM_VALUE, identity_cycle AS CYCLE_OPTION \
         FROM information_schema.columns",
    )
    .and("(column_default LIKE 'nextval(%' OR is_identity = 'YES')")
    .and_equals("table_catalog", scope.catalog.as_deref())
    .and_like("table_schema", scope.schema.as_deref())
    .and_like("table_name", scope.table.as_deref())
}

fn nextval_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^nextval\('([^']+)'(?:::regclass)?\)$").ok())
        .as_ref()
}

/// Sequence named by a `nextval('schema.name'::regclass)` default.
pub(crate) fn nextval_sequence(default: &str) -> Option<(Option<Identifier>, Identifier)> {
    let captures = nextval_pattern()?.captures(default.trim())?;
    let target = captures.get(1)?.as_str();
    let mut parts = split_qualified(target);
    let name = parts.pop()?;
    Some((parts.pop(), name))
}

/// Split a possibly quoted dotted name, honouring dots inside quotes.
fn split_qualified(text: &str) -> Vec<Identifier> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            '.' if !quoted => parts.push(Identifier::parse(&std::mem::take(&mut current))),
            _ => current.push(c),
        }
    }
    parts.push(Identifier::parse(&current));
    parts
}

/// Identity columns carry their own generator settings; serial columns
/// take over the sequence named by their `nextval` default, which is then
/// removed from the schema and the default cleared.
fn process_auto_increments(results: &mut InspectionResults, rows: &[Row], _: &InspectionScope) -> Result<()> {
    for row in rows {
        let (Some(table_name), Some(column_name)) = (row.get_string("TABLE_NAME"), row.get_string("COLUMN_NAME")) else {
            continue;
        };
        let catalog = row.get_string("TABLE_CATALOG");
        let schema = row.get_string("TABLE_SCHEMA");
        let qualified = QualifiedName::new(catalog.as_deref(), schema.as_deref(), &table_name);
        let Some(table) = results.table_mut(&qualified) else {
            continue;
        };
        let table_catalog = table.catalog.clone();
        let table_schema = table.schema.clone();
        let column_name = Identifier::new(column_name);
        if table.column(&column_name).is_none() {
            continue;
        }

        let sequence = if row.get_bool("IS_IDENTITY").unwrap_or(false) {
            let mut sequence = Sequence::new(table_catalog.clone(), table_schema.clone(), Identifier::new(""));
            sequence.start_with = decimal(row, "START_VALUE");
            sequence.increment_by = decimal(row, "INCREMENT");
            sequence.min_value = decimal(row, "MINIMUM_VALUE");
            sequence.max_value = decimal(row, "MAXIMUM_VALUE");
            sequence.cycle = row.get_bool("CYCLE_OPTION").unwrap_or(false);
            sequence
        } else {
            let Some((sequence_schema, sequence_name)) = row
                .get_string("COLUMN_DEF")
                .as_deref()
                .and_then(nextval_sequence)
            else {
                continue;
            };
            let sequence_schema = sequence_schema.or_else(|| table_schema.clone());
            let lookup = QualifiedName {
                catalog: table_catalog.clone(),
                schema: sequence_schema.clone(),
                name: sequence_name.clone(),
            };
            results
                .take_sequence(&lookup)
                .unwrap_or_else(|| Sequence::new(table_catalog.clone(), sequence_schema, sequence_name))
        };

        let table_name = {
            let Some(table) = results.table_mut(&qualified) else {
                continue;
            };
            let Some(column) = table.column_mut(&column_name) else {
                continue;
            };
            column.auto_increment = true;
            column.default_value = None;
            column.sequence = Some(sequence);
            table.qualified_name()
        };
        results.add_object(ObjectRef::in_table(
            MetaDataType::AutoIncrement,
            &table_name,
            Some(column_name),
        ));
    }
    Ok(())
}

pub(super) fn register(resolver: InspectorResolver) -> InspectorResolver {
    let inspector = match resolver.object_type() {
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
            QueryInspector::new(MetaDataType::AutoIncrement, auto_increment_query, process_auto_increments)
        }
        _ => return resolver,
    };
    resolver.with_product(POSTGRESQL, inspector)
}
