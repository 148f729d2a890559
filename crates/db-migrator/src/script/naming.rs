//! Names for constraints, indexes and sequences the source left unnamed.
//!
//! A generated name is a prefix plus a qualifier built from the owning table
//! and column names. The prefix follows the letter case of the qualifier
//! (`fk_orders_id`, `Fk_Orders_Id`, `FK_ORDERS_ID`) so generated names blend
//! in with the surrounding schema.

use super::ScriptGeneratorContext;
use crate::core::identifier::{CaseStyle, Identifier, MAX_IDENTIFIER_LENGTH};
use crate::error::Result;
use crate::metadata::{Column, ForeignKey, Index, QualifiedName, Table};

const DELIMITER: char = '_';

fn prefixed(prefix: &str, qualifier: &str) -> Identifier {
    let prefix = match CaseStyle::detect(qualifier, DELIMITER) {
        CaseStyle::Lower => prefix.to_lowercase(),
        CaseStyle::Capitalized => {
            let mut chars = prefix.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        }
        CaseStyle::Upper | CaseStyle::Mixed => prefix.to_uppercase(),
    };
    Identifier::new(fit(format!("{}{}{}", prefix, DELIMITER, qualifier)))
}

/// Shorten an over-long name, keeping it unique with a hash of the full text.
fn fit(name: String) -> String {
    if name.len() <= MAX_IDENTIFIER_LENGTH {
        return name;
    }
    // FNV-1a
    let hash = name
        .bytes()
        .fold(0x811c_9dc5u32, |hash, b| (hash ^ b as u32).wrapping_mul(0x0100_0193));
    let mut end = MAX_IDENTIFIER_LENGTH - 9;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}{:08x}", &name[..end], DELIMITER, hash)
}

fn table_qualifier(table: &QualifiedName, context: &ScriptGeneratorContext) -> Result<String> {
    Ok(context.qualified_name(table, false)?.replace('.', &DELIMITER.to_string()))
}

fn push_columns<'a>(
    qualifier: &mut String,
    columns: impl Iterator<Item = &'a Identifier>,
    context: &ScriptGeneratorContext,
) -> Result<()> {
    for column in columns {
        qualifier.push(DELIMITER);
        qualifier.push_str(&context.name(column, false)?);
    }
    Ok(())
}

/// `FK_<primary table>_<primary columns>_<foreign table>_<foreign columns>`.
pub fn foreign_key_name(foreign_key: &ForeignKey, context: &ScriptGeneratorContext) -> Result<Identifier> {
    if let Some(name) = &foreign_key.name {
        return Ok(name.clone());
    }
    let mut qualifier = table_qualifier(&foreign_key.primary_table, context)?;
    push_columns(&mut qualifier, foreign_key.primary_columns(), context)?;
    qualifier.push(DELIMITER);
    qualifier.push_str(&table_qualifier(&foreign_key.foreign_table, context)?);
    push_columns(&mut qualifier, foreign_key.foreign_columns(), context)?;
    Ok(prefixed("FK", &qualifier))
}

/// `IDX_<table>_<columns>`.
pub fn index_name(table: &Table, index: &Index, context: &ScriptGeneratorContext) -> Result<Identifier> {
    if let Some(name) = &index.name {
        return Ok(name.clone());
    }
    let mut qualifier = context.name(&table.name, false)?;
    push_columns(&mut qualifier, index.columns.iter(), context)?;
    Ok(prefixed("IDX", &qualifier))
}

/// `PK_<table>`.
pub fn primary_key_name(table: &Table, context: &ScriptGeneratorContext) -> Result<Identifier> {
    if let Some(name) = table.primary_key.as_ref().and_then(|pk| pk.name.clone()) {
        return Ok(name);
    }
    Ok(prefixed("PK", &context.name(&table.name, false)?))
}

/// `SEQ_<table>_<column>` for the generator behind an auto-increment column.
pub fn sequence_name(table: &Table, column: &Column, context: &ScriptGeneratorContext) -> Result<Identifier> {
    if let Some(sequence) = column.sequence.as_ref().filter(|s| !s.name.is_empty()) {
        return Ok(sequence.name.clone());
    }
    let mut qualifier = context.name(&table.name, false)?;
    push_columns(&mut qualifier, std::iter::once(&column.name), context)?;
    Ok(prefixed("SEQ", &qualifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{NuoDbDialect, PostgresDialect};
    use std::sync::Arc;

    fn foreign_key(primary: &str, foreign: &str, pk: &str, fk: &str) -> ForeignKey {
        let mut key = ForeignKey::new(
            QualifiedName::new(None, Some("hockey"), primary),
            QualifiedName::new(None, Some("hockey"), foreign),
        );
        key.add_reference(1, Identifier::new(pk), Identifier::new(fk));
        key
    }

    #[test]
    fn test_foreign_key_prefix_follows_case_style() {
        let context = ScriptGeneratorContext::new(Arc::new(PostgresDialect::new()));
        let lower = foreign_key_name(&foreign_key("players", "scoring", "id", "player_id"), &context).unwrap();
        assert_eq!(lower.value(), "fk_hockey_players_id_hockey_scoring_player_id");

        let upper = foreign_key_name(&foreign_key("PLAYERS", "SCORING", "ID", "PLAYER_ID"), &context);
        // Schema is lower case, so the qualifier is mixed.
        assert_eq!(upper.unwrap().value(), "FK_hockey_PLAYERS_ID_hockey_SCORING_PLAYER_ID");

        let mut capitalized = foreign_key("Players", "Scoring", "Id", "Player_Id");
        capitalized.primary_table.schema = Some(Identifier::new("Hockey"));
        capitalized.foreign_table.schema = Some(Identifier::new("Hockey"));
        assert_eq!(
            foreign_key_name(&capitalized, &context).unwrap().value(),
            "Fk_Hockey_Players_Id_Hockey_Scoring_Player_Id"
        );
    }

    #[test]
    fn test_foreign_key_name_uses_target_schema() {
        let context = ScriptGeneratorContext::new(Arc::new(NuoDbDialect::new())).with_target_schema(Some("target"));
        let name = foreign_key_name(&foreign_key("players", "scoring", "id", "player_id"), &context).unwrap();
        assert_eq!(name.value(), "fk_target_players_id_target_scoring_player_id");
    }

    #[test]
    fn test_existing_names_are_kept() {
        let context = ScriptGeneratorContext::new(Arc::new(PostgresDialect::new()));
        let mut key = foreign_key("players", "scoring", "id", "player_id");
        key.name = Some(Identifier::new("scoring_player_fk"));
        assert_eq!(foreign_key_name(&key, &context).unwrap().value(), "scoring_player_fk");
    }

    #[test]
    fn test_index_primary_key_and_sequence_names() {
        let context = ScriptGeneratorContext::new(Arc::new(PostgresDialect::new()));
        let mut table = Table::new(None, None, Identifier::new("Orders"));
        table.add_column(Identifier::new("Id"));
        let index = Index {
            name: None,
            unique: false,
            columns: vec![Identifier::new("Customer"), Identifier::new("Placed")],
            filter: None,
        };
        assert_eq!(index_name(&table, &index, &context).unwrap().value(), "Idx_Orders_Customer_Placed");
        assert_eq!(primary_key_name(&table, &context).unwrap().value(), "Pk_Orders");
        let column = &table.columns[0];
        assert_eq!(sequence_name(&table, column, &context).unwrap().value(), "Seq_Orders_Id");
    }

    #[test]
    fn test_long_names_are_shortened_deterministically() {
        let long = "x".repeat(200);
        let first = fit(long.clone());
        assert_eq!(first.len(), MAX_IDENTIFIER_LENGTH);
        assert_eq!(first, fit(long));
    }
}
