//! # db-migrator
//!
//! Schema and data migration between heterogeneous relational databases.
//!
//! The library inspects a source database into a vendor-neutral metadata
//! model, renders that model as DDL for another vendor, and moves data
//! through an on-disk catalog:
//!
//! - **Inspection** of catalogs, schemas, tables, columns, keys, indexes,
//!   checks and sequences for MySQL, PostgreSQL and SQL Server
//! - **DDL generation** per target dialect, with drop/create ordering and
//!   default-expression translation
//! - **Dump and load** of table data in CSV, XML, BSON or a compact binary
//!   format, with bounded worker pools and cooperative cancellation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use db_migrator::{Config, ConnectionFactory, DumpJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let factory = Arc::new(ConnectionFactory::new(config.source()?.clone()));
//!     let result = DumpJob::new(&config, factory)?.run().await?;
//!     println!("Dumped {} rows", result.rows_dumped);
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod catalog;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod format;
pub mod inspector;
pub mod metadata;
pub mod orchestrator;
pub mod script;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use crate::catalog::{CatalogEntry, CatalogManager, EntryType};
pub use crate::config::{
    Config, ConnectionConfig, DatabaseType, DumpConfig, LoadConfig, MigrationMode, SchemaConfig,
};
pub use crate::core::{DatabaseInfo, Identifier, Session};
pub use crate::dialect::{Dialect, DialectResolver};
pub use crate::drivers::{connect, ConnectionFactory, SessionFactory};
pub use crate::error::{MigrateError, Result};
pub use crate::format::FormatType;
pub use crate::inspector::{InspectionManager, InspectionScope};
pub use crate::metadata::{Database, MetaDataType};
pub use crate::orchestrator::{
    DumpJob, DumpResult, LoadJob, LoadResult, SchemaInput, SchemaJob, SchemaOutput, SchemaResult,
};
pub use crate::script::{ScriptGeneratorContext, ScriptGeneratorManager, ScriptType};
