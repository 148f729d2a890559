//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SslMode;
    use crate::format::FormatType;
    use crate::metadata::MetaDataType;
    use crate::script::{IdentifierNormalizer, ScriptType};

    const YAML: &str = r#"
source:
  type: mysql
  host: db.internal
  database: shop
  user: reader
  password: secret
  log_statements: true
target:
  type: postgresql
  host: pg.internal
  database: shop
  user: writer
  ssl_mode: verify-full
dump:
  output_dir: /tmp/shop
  format: bson
  tables:
    - name: shop.orders
      columns: [id, total]
      filter: total > 0
  queries:
    - SELECT COUNT(*) FROM customers
  query_limit: 100
load:
  batch_size: 250
  insert_type: replace
  table_insert_types:
    orders: insert
schema:
  dialect: nuodb
  script_types: [create]
  meta_data_types: [table, column, primary_key]
  identifier_normalizer: lower
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        let source = config.source().unwrap();
        assert_eq!(source.r#type, DatabaseType::Mysql);
        assert_eq!(source.port(), 3306);
        assert!(source.log_statements);
        let target = config.target().unwrap();
        assert_eq!(target.r#type, DatabaseType::Postgres);
        assert_eq!(target.ssl_mode, SslMode::VerifyFull);

        assert_eq!(config.dump.format, FormatType::Bson);
        assert_eq!(config.dump.tables[0].columns, vec!["id", "total"]);
        assert_eq!(config.dump.threads, 4);
        assert_eq!(config.dump.table_types, vec!["TABLE"]);
        assert_eq!(config.dump.migration_modes, vec![MigrationMode::Data, MigrationMode::Schema]);

        assert_eq!(config.load.batch_size, 250);
        assert_eq!(config.load.insert_type_for("ORDERS"), InsertType::Insert);
        assert_eq!(config.load.insert_type_for("customers"), InsertType::Replace);

        assert_eq!(config.schema.script_types, vec![ScriptType::Create]);
        assert_eq!(config.schema.meta_data_types.len(), 3);
        assert!(config.schema.meta_data_types.contains(&MetaDataType::PrimaryKey));
        assert_eq!(config.schema.identifier_normalizer, IdentifierNormalizer::Lower);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert!(config.source().is_err());
        assert_eq!(config.load.batch_size, 1000);
        assert_eq!(config.schema.meta_data_types.len(), MetaDataType::ALL.len());
    }

    #[test]
    fn test_unknown_database_type() {
        let yaml = "source: {type: db2, host: h, database: d, user: u}";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(MigrationMode::from_name(" Schema "), Some(MigrationMode::Schema));
        assert_eq!(InsertType::from_name("REPLACE"), Some(InsertType::Replace));
        assert_eq!(InsertType::from_name("upsert"), None);
    }

    #[test]
    fn test_table_spec_parse() {
        let spec = TableSpec::parse("shop.orders:id, total@total > 10").unwrap();
        assert_eq!(spec.name, "shop.orders");
        assert_eq!(spec.columns, vec!["id", "total"]);
        assert_eq!(spec.filter.as_deref(), Some("total > 10"));
        assert_eq!(spec.name_parts(), (None, Some("shop"), "orders"));

        let spec = TableSpec::parse("orders").unwrap();
        assert!(spec.columns.is_empty());
        assert_eq!(spec.filter, None);
        assert_eq!(spec.name_parts(), (None, None, "orders"));

        assert!(TableSpec::parse(":id").is_err());
    }
}
