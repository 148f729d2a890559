//! Schema discovery.
//!
//! The [`InspectionManager`] owns one [`Inspector`] per [`MetaDataType`].
//! Most of them are [`InspectorResolver`]s choosing a vendor implementation
//! by product name. A pass runs every requested kind in dependency order
//! against a single [`InspectionContext`], inside one read-only transaction.

mod context;
mod mssql;
mod mysql;
mod nuodb;
mod oracle;
mod postgres;
mod resolver;
mod rows;
mod simple;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use context::{InspectionContext, ScopedQuery};
pub use resolver::InspectorResolver;
pub use rows::{is_system_schema, parse_enum_values};

use crate::core::session::{Row, Session};
use crate::dialect::DialectResolver;
use crate::error::{MigrateError, Result};
use crate::metadata::{InspectionResults, MetaDataType, QualifiedName};

/// Which part of the source to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionScope {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    /// Table name or `%` pattern.
    pub table: Option<String>,
    /// Accepted table types; empty accepts every type.
    pub table_types: Vec<String>,
}

impl Default for InspectionScope {
    fn default() -> Self {
        Self {
            catalog: None,
            schema: None,
            table: None,
            table_types: vec!["TABLE".to_string()],
        }
    }
}

impl InspectionScope {
    pub fn accepts_table_type(&self, table_type: &str) -> bool {
        self.table_types.is_empty()
            || self
                .table_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(table_type))
    }

    /// Catalog for products exposing databases as catalogs, where a
    /// configured schema names the database too.
    pub(crate) fn database_name(&self) -> Option<&str> {
        self.catalog.as_deref().or(self.schema.as_deref())
    }
}

/// Reads one kind of metadata into the context's results.
#[async_trait]
pub trait Inspector: Send + Sync + fmt::Debug {
    fn object_type(&self) -> MetaDataType;

    async fn inspect(&self, context: &mut InspectionContext<'_>, scope: &InspectionScope) -> Result<()>;
}

pub(crate) type ProcessFn = fn(&mut InspectionResults, &[Row], &InspectionScope) -> Result<()>;

#[derive(Clone, Copy)]
enum QuerySource {
    /// One query covering the whole scope.
    Scope(fn(&InspectionScope) -> ScopedQuery),
    /// One query per discovered table, sharing a prepared statement.
    Table(fn(&QualifiedName) -> ScopedQuery),
}

/// An inspector made of a catalog query and a row processor.
#[derive(Clone, Copy)]
pub struct QueryInspector {
    object_type: MetaDataType,
    source: QuerySource,
    process: ProcessFn,
}

impl fmt::Debug for QueryInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per_table = matches!(self.source, QuerySource::Table(_));
        f.debug_struct("QueryInspector")
            .field("object_type", &self.object_type)
            .field("per_table", &per_table)
            .finish()
    }
}

impl QueryInspector {
    pub(crate) const fn new(
        object_type: MetaDataType,
        query: fn(&InspectionScope) -> ScopedQuery,
        process: ProcessFn,
    ) -> Self {
        Self {
            object_type,
            source: QuerySource::Scope(query),
            process,
        }
    }

    pub(crate) const fn per_table(
        object_type: MetaDataType,
        query: fn(&QualifiedName) -> ScopedQuery,
        process: ProcessFn,
    ) -> Self {
        Self {
            object_type,
            source: QuerySource::Table(query),
            process,
        }
    }
}

#[async_trait]
impl Inspector for QueryInspector {
    fn object_type(&self) -> MetaDataType {
        self.object_type
    }

    async fn inspect(&self, context: &mut InspectionContext<'_>, scope: &InspectionScope) -> Result<()> {
        match self.source {
            QuerySource::Scope(query) => {
                let rows = context.query(&query(scope)).await?;
                (self.process)(context.results_mut(), &rows, scope)
            }
            QuerySource::Table(query) => {
                for table in context.results().table_names() {
                    let rows = context.query(&query(&table)).await?;
                    (self.process)(context.results_mut(), &rows, scope)?;
                }
                Ok(())
            }
        }
    }
}

/// Records the product information of the session.
#[derive(Debug, Default)]
pub struct DatabaseInspector;

#[async_trait]
impl Inspector for DatabaseInspector {
    fn object_type(&self) -> MetaDataType {
        MetaDataType::Database
    }

    async fn inspect(&self, context: &mut InspectionContext<'_>, _scope: &InspectionScope) -> Result<()> {
        let info = context.database_info().clone();
        context.results_mut().set_database_info(info);
        Ok(())
    }
}

/// Kinds an inspector of `object_type` relies on having run first.
fn prerequisites(object_type: MetaDataType) -> &'static [MetaDataType] {
    use MetaDataType::*;
    match object_type {
        Database => &[],
        Catalog => &[Database],
        Schema => &[Database, Catalog],
        Table | Sequence => &[Database, Catalog, Schema],
        Column | PrimaryKey | ForeignKey | Index | Check => &[Database, Catalog, Schema, Table],
        AutoIncrement => &[Database, Catalog, Schema, Table, Column],
    }
}

/// Requested kinds plus their prerequisites, in dependency order.
pub fn expand_types(types: &[MetaDataType]) -> BTreeSet<MetaDataType> {
    types
        .iter()
        .flat_map(|t| prerequisites(*t).iter().chain(std::iter::once(t)))
        .copied()
        .collect()
}

/// Registry of inspectors and entry point of an inspection pass.
#[derive(Debug)]
pub struct InspectionManager {
    inspectors: BTreeMap<MetaDataType, Arc<dyn Inspector>>,
    dialects: DialectResolver,
}

impl Default for InspectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InspectionManager {
    /// Manager with the built-in vendor inspectors registered.
    pub fn new() -> Self {
        let mut manager = Self::empty();
        manager.register(Arc::new(DatabaseInspector));
        for resolver in [
            simple::catalogs(),
            simple::schemas(),
            simple::tables(),
            simple::columns(),
            simple::primary_keys(),
            simple::foreign_keys(),
            InspectorResolver::new(MetaDataType::Index),
            InspectorResolver::new(MetaDataType::Check),
            InspectorResolver::new(MetaDataType::Sequence),
            InspectorResolver::new(MetaDataType::AutoIncrement),
        ] {
            let resolver = mssql::register(oracle::register(nuodb::register(
                postgres::register(mysql::register(resolver)),
            )));
            manager.register(Arc::new(resolver));
        }
        manager
    }

    /// Manager with nothing registered.
    pub fn empty() -> Self {
        Self {
            inspectors: BTreeMap::new(),
            dialects: DialectResolver::default(),
        }
    }

    /// Register `inspector`, replacing any inspector of the same kind.
    pub fn register(&mut self, inspector: Arc<dyn Inspector>) {
        self.inspectors.insert(inspector.object_type(), inspector);
    }

    pub fn inspector(&self, object_type: MetaDataType) -> Option<&Arc<dyn Inspector>> {
        self.inspectors.get(&object_type)
    }

    /// Inspect `types` (and what they depend on) within `scope`.
    ///
    /// Statements prepared during the pass are closed before the read-only
    /// transaction ends, whether the pass succeeded or not.
    pub async fn inspect(
        &self,
        session: &mut dyn Session,
        scope: &InspectionScope,
        types: &[MetaDataType],
    ) -> Result<InspectionResults> {
        let types = expand_types(types);
        let dialect = self.dialects.resolve(session.database_info());
        info!(
            "Inspecting {} {} ({})",
            session.database_info().product_name,
            session.database_info().product_version,
            types.iter().map(MetaDataType::name).collect::<Vec<_>>().join(", ")
        );

        let mut context = InspectionContext::new(session, dialect);
        context.begin().await?;
        let outcome = self.run(&mut context, scope, &types).await;
        let closed = context.close().await;

        match outcome.and(closed) {
            Ok(()) => {
                context.commit().await?;
                Ok(context.into_results())
            }
            Err(e) => {
                if let Err(rollback) = context.rollback().await {
                    warn!("Rollback after failed inspection failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        context: &mut InspectionContext<'_>,
        scope: &InspectionScope,
        types: &BTreeSet<MetaDataType>,
    ) -> Result<()> {
        for object_type in types {
            let Some(inspector) = self.inspectors.get(object_type) else {
                debug!("No inspector registered for {}", object_type);
                continue;
            };
            inspector.inspect(context, scope).await.map_err(|e| match e {
                MigrateError::Database { message, .. } => {
                    MigrateError::inspection(object_type.name(), message)
                }
                other => other,
            })?;
            debug!(
                "Inspected {}: {} object(s)",
                object_type,
                context.results().objects(*object_type).len()
            );
        }
        Ok(())
    }
}
