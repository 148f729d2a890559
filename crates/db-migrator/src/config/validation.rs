//! Configuration validation.

use super::{Config, ConnectionConfig};
use crate::access::parse_time_zone;
use crate::dialect::DialectResolver;
use crate::error::{MigrateError, Result};

fn validate_connection(key: &str, connection: &ConnectionConfig) -> Result<()> {
    if connection.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", key)));
    }
    if connection.database.is_empty() {
        return Err(MigrateError::Config(format!("{}.database is required", key)));
    }
    if connection.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", key)));
    }
    if connection.port == Some(0) {
        return Err(MigrateError::Config(format!("{}.port must not be 0", key)));
    }
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(source) = &config.source {
        validate_connection("source", source)?;
    }
    if let Some(target) = &config.target {
        validate_connection("target", target)?;
    }

    if config.dump.threads == 0 {
        return Err(MigrateError::Config("dump.threads must be at least 1".into()));
    }
    if config.dump.query_limit == Some(0) {
        return Err(MigrateError::Config("dump.query_limit must be at least 1".into()));
    }
    if let Some(zone) = &config.dump.time_zone {
        parse_time_zone(zone).map_err(|_| MigrateError::Config(format!("dump.time_zone '{}' is invalid", zone)))?;
    }
    if config.dump.migration_modes.is_empty() {
        return Err(MigrateError::Config("dump.migration_modes must not be empty".into()));
    }
    for (i, table) in config.dump.tables.iter().enumerate() {
        if table.name.trim().is_empty() {
            return Err(MigrateError::Config(format!("dump.tables[{}].name is required", i)));
        }
    }
    for (i, query) in config.dump.queries.iter().enumerate() {
        if query.trim().is_empty() {
            return Err(MigrateError::Config(format!("dump.queries[{}] is empty", i)));
        }
    }

    if config.load.threads == 0 {
        return Err(MigrateError::Config("load.threads must be at least 1".into()));
    }
    if config.load.batch_size == 0 {
        return Err(MigrateError::Config("load.batch_size must be at least 1".into()));
    }
    if let Some(zone) = &config.load.time_zone {
        parse_time_zone(zone).map_err(|_| MigrateError::Config(format!("load.time_zone '{}' is invalid", zone)))?;
    }

    if let Some(dialect) = &config.schema.dialect {
        DialectResolver::default()
            .by_name(dialect)
            .map_err(|_| MigrateError::Config(format!("schema.dialect '{}' is unknown", dialect)))?;
    }
    if config.schema.script_types.is_empty() {
        return Err(MigrateError::Config("schema.script_types must not be empty".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseType, TableSpec};

    fn valid_config() -> Config {
        let mut source = ConnectionConfig::new(DatabaseType::Mysql, "localhost", "shop", "root");
        source.password = "password".to_string();
        Config {
            source: Some(source),
            target: Some(ConnectionConfig::new(DatabaseType::Postgres, "localhost", "shop", "postgres")),
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_connections_are_optional() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.as_mut().unwrap().host = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.host"));
    }

    #[test]
    fn test_zero_threads() {
        let mut config = valid_config();
        config.load.threads = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("load.threads"));
    }

    #[test]
    fn test_invalid_time_zone() {
        let mut config = valid_config();
        config.dump.time_zone = Some("Mars/Olympus".to_string());
        assert!(matches!(validate(&config), Err(MigrateError::Config(_))));
        config.dump.time_zone = Some("+02:00".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_dialect() {
        let mut config = valid_config();
        config.schema.dialect = Some("db2".to_string());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("schema.dialect"));
    }

    #[test]
    fn test_blank_table_name() {
        let mut config = valid_config();
        config.dump.tables.push(TableSpec::new(" "));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("dump.tables[0]"));
    }

    #[test]
    fn test_connection_debug_redacts_password() {
        let mut config = valid_config();
        config.source.as_mut().unwrap().password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }
}
