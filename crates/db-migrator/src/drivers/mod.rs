//! Database drivers.
//!
//! Each driver implements [`Session`] for one engine:
//!
//! - [`mysql`]: MySQL and MariaDB over sqlx (feature `mysql`)
//! - [`postgres`]: PostgreSQL over tokio-postgres
//! - [`mssql`]: Microsoft SQL Server over tiberius
//! - [`common`]: TLS settings shared by the drivers
//!
//! Jobs never name a driver directly. They open sessions through a
//! [`SessionFactory`], which lets tests hand out in-memory sessions.

pub mod common;
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};

use async_trait::async_trait;
use tracing::debug;

use crate::config::{ConnectionConfig, DatabaseType};
use crate::core::logging::LoggingSession;
use crate::core::session::Session;
use crate::error::Result;

/// Open a session for a connection configuration.
///
/// Wraps the session in a [`LoggingSession`] when `log_statements` is set.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn Session>> {
    debug!("Opening {:?} session to {}", config.r#type, config.display_url());
    let session: Box<dyn Session> = match config.r#type {
        DatabaseType::Postgres => Box::new(postgres::PostgresSession::connect(config).await?),
        DatabaseType::Mssql => Box::new(mssql::MssqlSession::connect(config).await?),
        #[cfg(feature = "mysql")]
        DatabaseType::Mysql => Box::new(mysql::MySqlSession::connect(config).await?),
        #[cfg(not(feature = "mysql"))]
        DatabaseType::Mysql => {
            return Err(crate::error::MigrateError::Config(
                "MySQL support is not compiled in; rebuild with the `mysql` feature".into(),
            ))
        }
    };
    if config.log_statements {
        Ok(Box::new(LoggingSession::new(session)))
    } else {
        Ok(session)
    }
}

/// Source of new sessions for worker tasks.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Session>>;
}

/// Factory that connects with [`connect`] each time.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    config: ConnectionConfig,
}

impl ConnectionFactory {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl SessionFactory for ConnectionFactory {
    async fn open(&self) -> Result<Box<dyn Session>> {
        connect(&self.config).await
    }
}
