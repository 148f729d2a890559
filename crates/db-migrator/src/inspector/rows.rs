//! Row processors shared by the vendor inspectors.
//!
//! Vendor queries alias their columns to one normalized shape per object
//! type (the JDBC `DatabaseMetaData` result-set layouts), so a single
//! processor merges rows from any product into [`InspectionResults`].

use std::str::FromStr;

use rust_decimal::Decimal;

use super::InspectionScope;
use crate::core::identifier::Identifier;
use crate::core::session::Row;
use crate::core::types::{type_codes, JdbcTypeDesc};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::metadata::{
    Check, Deferrability, ForeignKey, InspectionResults, MetaDataType, ObjectRef, PrimaryKey,
    QualifiedName, ReferentialAction,
};

const SYSTEM_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "sys",
    "mysql",
    "performance_schema",
];

/// Schemas (and MySQL databases) holding the product's own catalog.
pub fn is_system_schema(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SYSTEM_SCHEMAS.contains(&lower.as_str())
        || lower.starts_with("pg_temp_")
        || lower.starts_with("pg_toast_temp_")
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get_string(column).filter(|s| !s.is_empty())
}

pub(crate) fn decimal(row: &Row, column: &str) -> Option<Decimal> {
    match row.get_by_name(column)? {
        SqlValue::Decimal(d) => Some(*d),
        SqlValue::Text(t) => {
            let t = t.trim();
            Decimal::from_str(t)
                .or_else(|_| Decimal::from_scientific(t))
                .ok()
        }
        other => other.as_i64().map(Decimal::from),
    }
}

fn table_name(row: &Row, catalog: &str, schema: &str, table: &str) -> Option<QualifiedName> {
    let name = text(row, table)?;
    Some(QualifiedName::new(
        text(row, catalog).as_deref(),
        text(row, schema).as_deref(),
        &name,
    ))
}

fn owner(row: &Row) -> Option<QualifiedName> {
    table_name(row, "TABLE_CATALOG", "TABLE_SCHEMA", "TABLE_NAME")
}

fn in_system_schema(row: &Row, columns: &[&str]) -> bool {
    columns
        .iter()
        .filter_map(|c| text(row, c))
        .any(|name| is_system_schema(&name))
}

/// `TABLE_CATALOG`.
pub fn process_catalogs(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    for row in rows {
        if let Some(catalog) = text(row, "TABLE_CATALOG") {
            if !is_system_schema(&catalog) {
                results.add_catalog(Some(&catalog));
            }
        }
    }
    Ok(())
}

/// `TABLE_CATALOG`, `TABLE_SCHEMA`.
pub fn process_schemas(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    for row in rows {
        let Some(schema) = text(row, "TABLE_SCHEMA") else {
            continue;
        };
        if is_system_schema(&schema) {
            continue;
        }
        results.add_schema(text(row, "TABLE_CATALOG").as_deref(), Some(&schema));
    }
    Ok(())
}

fn normalize_table_type(table_type: Option<String>) -> String {
    match table_type.as_deref().map(str::to_ascii_uppercase).as_deref() {
        None | Some("BASE TABLE") | Some("TABLE") => "TABLE".to_string(),
        Some("SYSTEM VIEW") => "SYSTEM VIEW".to_string(),
        Some(other) => other.to_string(),
    }
}

/// `TABLE_CATALOG`, `TABLE_SCHEMA`, `TABLE_NAME`, `TABLE_TYPE`, `REMARKS`.
pub fn process_tables(results: &mut InspectionResults, rows: &[Row], scope: &InspectionScope) -> Result<()> {
    for row in rows {
        let Some(name) = text(row, "TABLE_NAME") else {
            continue;
        };
        if in_system_schema(row, &["TABLE_CATALOG", "TABLE_SCHEMA"]) {
            continue;
        }
        let table_type = normalize_table_type(text(row, "TABLE_TYPE"));
        if !scope.accepts_table_type(&table_type) {
            continue;
        }
        let table = results.add_table(
            text(row, "TABLE_CATALOG").as_deref(),
            text(row, "TABLE_SCHEMA").as_deref(),
            &name,
        );
        table.table_type = table_type;
        table.comment = text(row, "REMARKS");
    }
    Ok(())
}

/// Values of a MySQL `enum('a','b')` or `set(...)` column type.
pub fn parse_enum_values(column_type: &str) -> Vec<String> {
    let trimmed = column_type.trim();
    let lower = trimmed.to_ascii_lowercase();
    let body = if lower.starts_with("enum(") {
        &trimmed[5..]
    } else if lower.starts_with("set(") {
        &trimmed[4..]
    } else {
        return Vec::new();
    };
    let Some(body) = body.strip_suffix(')') else {
        return Vec::new();
    };

    let mut values = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if quoted && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push('\'');
            }
            '\'' => {
                if quoted {
                    values.push(std::mem::take(&mut current));
                }
                quoted = !quoted;
            }
            _ if quoted => current.push(c),
            _ => {}
        }
    }
    values
}

/// `TABLE_CATALOG`, `TABLE_SCHEMA`, `TABLE_NAME`, `COLUMN_NAME`, `TYPE_NAME`,
/// `COLUMN_SIZE`, `NUMERIC_PRECISION`, `NUMERIC_SCALE`, `IS_NULLABLE`,
/// `COLUMN_DEF`, `ORDINAL_POSITION`, plus the optional `IS_AUTOINCREMENT`,
/// `EXTRA`, `COLUMN_TYPE` and `REMARKS`.
///
/// Rows of tables not discovered by the table inspector are ignored.
pub fn process_columns(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    for row in rows {
        let (Some(qualified), Some(name)) = (owner(row), text(row, "COLUMN_NAME")) else {
            continue;
        };
        let Some(table) = results.table_mut(&qualified) else {
            continue;
        };
        let column_type = text(row, "COLUMN_TYPE");
        let type_name = text(row, "TYPE_NAME").unwrap_or_default();

        let column = table.add_column(Identifier::new(name));
        column.type_desc = match column_type.as_deref() {
            Some(t) if t.eq_ignore_ascii_case("tinyint(1)") => {
                JdbcTypeDesc::new(type_codes::BOOLEAN, "TINYINT")
            }
            _ => JdbcTypeDesc::from_type_name(&type_name),
        };
        column.precision = row.get_i64("NUMERIC_PRECISION").map(|p| p as i32);
        column.scale = row.get_i64("NUMERIC_SCALE").map(|s| s as i32);
        column.size = row.get_i64("COLUMN_SIZE").filter(|s| *s > 0);
        if column.size.is_none() && column.type_desc.type_code == type_codes::BIT {
            column.size = row.get_i64("NUMERIC_PRECISION");
        }
        column.nullable = row.get_bool("IS_NULLABLE").unwrap_or(true);
        column.default_value = row.get_string("COLUMN_DEF");
        if let Some(position) = row.get_i64("ORDINAL_POSITION") {
            column.position = position as i32;
        }
        let extra = text(row, "EXTRA").unwrap_or_default();
        column.auto_increment = row.get_bool("IS_AUTOINCREMENT").unwrap_or(false)
            || extra.to_ascii_lowercase().contains("auto_increment");
        column.comment = text(row, "REMARKS");
        if let Some(column_type) = column_type {
            column.enum_values = parse_enum_values(&column_type);
        }
    }
    Ok(())
}

/// `TABLE_CATALOG`, `TABLE_SCHEMA`, `TABLE_NAME`, `PK_NAME`, `COLUMN_NAME`,
/// `KEY_SEQ`; rows ordered by `KEY_SEQ` within a table.
pub fn process_primary_keys(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    for row in rows {
        let (Some(qualified), Some(column)) = (owner(row), text(row, "COLUMN_NAME")) else {
            continue;
        };
        let Some(table) = results.table_mut(&qualified) else {
            continue;
        };
        let created = table.primary_key.is_none();
        let name = Identifier::from_option(text(row, "PK_NAME").as_deref());
        let primary_key = table.primary_key.get_or_insert_with(|| PrimaryKey {
            name: name.clone(),
            columns: Vec::new(),
        });
        let column = Identifier::new(column);
        if !primary_key.columns.contains(&column) {
            primary_key.columns.push(column);
        }
        if created {
            let qualified = table.qualified_name();
            results.add_object(ObjectRef::in_table(MetaDataType::PrimaryKey, &qualified, name));
        }
    }
    Ok(())
}

fn referential_action(row: &Row, column: &str) -> ReferentialAction {
    let Some(value) = row.get_by_name(column) else {
        return ReferentialAction::default();
    };
    value
        .as_i64()
        .and_then(ReferentialAction::from_code)
        .or_else(|| {
            value
                .as_text()
                .and_then(|t| ReferentialAction::from_keyword(&t))
        })
        .unwrap_or_default()
}

const FOREIGN_KEY: &str = "foreign_key";

fn attach_foreign_key(results: &mut InspectionResults, foreign_key: ForeignKey) {
    let owner = foreign_key.foreign_table.clone();
    let table = results.add_table(
        owner.catalog.as_ref().map(Identifier::value),
        owner.schema.as_ref().map(Identifier::value),
        owner.name.value(),
    );
    let qualified = table.qualified_name();
    let object = ObjectRef::in_table(MetaDataType::ForeignKey, &qualified, foreign_key.name.clone());
    table.foreign_keys.push(foreign_key);
    results.add_object(object);
}

/// Reassemble foreign keys from rows in the JDBC imported-keys shape:
/// `PKTABLE_CAT`, `PKTABLE_SCHEM`, `PKTABLE_NAME`, `PKCOLUMN_NAME`,
/// `FKTABLE_CAT`, `FKTABLE_SCHEM`, `FKTABLE_NAME`, `FKCOLUMN_NAME`,
/// `KEY_SEQ`, `UPDATE_RULE`, `DELETE_RULE`, `FK_NAME`, `DEFERRABILITY`.
///
/// A row with `KEY_SEQ = 1` starts a new key; every other row adds its
/// column pair to the key started last. Both tables are created when the
/// table inspector has not seen them.
pub fn process_imported_keys(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    let mut current: Option<ForeignKey> = None;
    for row in rows {
        let key_seq = row
            .get_i64("KEY_SEQ")
            .ok_or_else(|| MigrateError::inspection(FOREIGN_KEY, "row without KEY_SEQ"))?;
        let (Some(primary), Some(foreign)) = (
            table_name(row, "PKTABLE_CAT", "PKTABLE_SCHEM", "PKTABLE_NAME"),
            table_name(row, "FKTABLE_CAT", "FKTABLE_SCHEM", "FKTABLE_NAME"),
        ) else {
            return Err(MigrateError::inspection(
                FOREIGN_KEY,
                "row without primary or foreign table",
            ));
        };

        if key_seq == 1 {
            if let Some(done) = current.take() {
                attach_foreign_key(results, done);
            }
            for table in [&primary, &foreign] {
                results.add_table(
                    table.catalog.as_ref().map(Identifier::value),
                    table.schema.as_ref().map(Identifier::value),
                    table.name.value(),
                );
            }
            let mut foreign_key = ForeignKey::new(primary, foreign);
            foreign_key.name = Identifier::from_option(text(row, "FK_NAME").as_deref());
            foreign_key.update_action = referential_action(row, "UPDATE_RULE");
            foreign_key.delete_action = referential_action(row, "DELETE_RULE");
            foreign_key.deferrability = row
                .get_i64("DEFERRABILITY")
                .and_then(Deferrability::from_code)
                .unwrap_or_default();
            current = Some(foreign_key);
        }

        let Some(foreign_key) = current.as_mut() else {
            return Err(MigrateError::inspection(
                FOREIGN_KEY,
                format!("KEY_SEQ {} before the first column of a key", key_seq),
            ));
        };
        let (Some(primary_column), Some(foreign_column)) =
            (text(row, "PKCOLUMN_NAME"), text(row, "FKCOLUMN_NAME"))
        else {
            return Err(MigrateError::inspection(FOREIGN_KEY, "row without key columns"));
        };
        foreign_key.add_reference(
            key_seq as i32,
            Identifier::new(primary_column),
            Identifier::new(foreign_column),
        );
    }
    if let Some(done) = current {
        attach_foreign_key(results, done);
    }
    Ok(())
}

/// `TABLE_CATALOG`, `TABLE_SCHEMA`, `TABLE_NAME`, `INDEX_NAME`, `NON_UNIQUE`,
/// `COLUMN_NAME`, `ORDINAL_POSITION`, `FILTER_CONDITION`; rows ordered by
/// position within an index.
pub fn process_indexes(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    for row in rows {
        let (Some(qualified), Some(index_name), Some(column)) =
            (owner(row), text(row, "INDEX_NAME"), text(row, "COLUMN_NAME"))
        else {
            continue;
        };
        let Some(table) = results.table_mut(&qualified) else {
            continue;
        };
        let name = Identifier::new(index_name);
        let created = !table.indexes.iter().any(|i| i.name.as_ref() == Some(&name));
        let index = table.add_index(name.clone());
        index.unique = !row.get_bool("NON_UNIQUE").unwrap_or(true);
        index.filter = text(row, "FILTER_CONDITION");
        let column = Identifier::new(column);
        if !index.columns.contains(&column) {
            index.columns.push(column);
        }
        if created {
            let qualified = table.qualified_name();
            results.add_object(ObjectRef::in_table(MetaDataType::Index, &qualified, Some(name)));
        }
    }
    Ok(())
}

/// Strip the `CHECK` keyword some catalogs prefix clauses with.
fn check_clause(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("CHECK") => trimmed[5..].trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// `TABLE_CATALOG`, `TABLE_SCHEMA`, `TABLE_NAME`, `CONSTRAINT_NAME`, `CHECK_CLAUSE`.
pub fn process_checks(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    for row in rows {
        let (Some(qualified), Some(clause)) = (owner(row), text(row, "CHECK_CLAUSE")) else {
            continue;
        };
        let Some(table) = results.table_mut(&qualified) else {
            continue;
        };
        let name = Identifier::from_option(text(row, "CONSTRAINT_NAME").as_deref());
        table.checks.push(Check {
            name: name.clone(),
            clause: check_clause(&clause),
        });
        let qualified = table.qualified_name();
        results.add_object(ObjectRef::in_table(MetaDataType::Check, &qualified, name));
    }
    Ok(())
}

/// `SEQUENCE_CATALOG`, `SEQUENCE_SCHEMA`, `SEQUENCE_NAME`, `START_VALUE`,
/// `MINIMUM_VALUE`, `MAXIMUM_VALUE`, `INCREMENT`, `CYCLE_OPTION`, and the
/// optional `CACHE_SIZE`, `LAST_VALUE`, `ORDER_FLAG`.
pub fn process_sequences(results: &mut InspectionResults, rows: &[Row]) -> Result<()> {
    for row in rows {
        let Some(name) = text(row, "SEQUENCE_NAME") else {
            continue;
        };
        let schema = text(row, "SEQUENCE_SCHEMA");
        if schema.as_deref().map_or(false, is_system_schema) {
            continue;
        }
        let sequence = results.add_sequence(
            text(row, "SEQUENCE_CATALOG").as_deref(),
            schema.as_deref(),
            &name,
        );
        sequence.start_with = decimal(row, "START_VALUE");
        sequence.min_value = decimal(row, "MINIMUM_VALUE");
        sequence.max_value = decimal(row, "MAXIMUM_VALUE");
        sequence.increment_by = decimal(row, "INCREMENT");
        sequence.cache = decimal(row, "CACHE_SIZE");
        sequence.last_value = decimal(row, "LAST_VALUE");
        sequence.cycle = row.get_bool("CYCLE_OPTION").unwrap_or(false);
        sequence.order = row.get_bool("ORDER_FLAG").unwrap_or(false);
    }
    Ok(())
}
