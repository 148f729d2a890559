//! Per-pass inspection state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::core::session::{CursorOptions, DatabaseInfo, Row, Session, StatementId};
use crate::core::value::SqlValue;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::metadata::InspectionResults;

#[derive(Debug, Clone)]
enum Condition {
    Raw(String),
    Equals(String, String),
    Like(String, String),
}

/// A catalog query narrowed by optional scope filters.
///
/// Filters with no value are left out, so one builder serves scoped and
/// unscoped inspection. Placeholders are rendered by the session's dialect.
#[derive(Debug, Clone)]
pub struct ScopedQuery {
    select: String,
    conditions: Vec<Condition>,
    order_by: Option<String>,
}

impl ScopedQuery {
    pub fn new(select: impl Into<String>) -> Self {
        Self {
            select: select.into(),
            conditions: Vec::new(),
            order_by: None,
        }
    }

    /// Add a literal condition.
    pub fn and(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(Condition::Raw(condition.into()));
        self
    }

    pub fn and_equals(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.conditions
                .push(Condition::Equals(column.to_string(), value.to_string()));
        }
        self
    }

    /// `LIKE` when `pattern` contains `%`, equality otherwise.
    pub fn and_like(mut self, column: &str, pattern: Option<&str>) -> Self {
        if let Some(pattern) = pattern {
            let condition = if pattern.contains('%') {
                Condition::Like(column.to_string(), pattern.to_string())
            } else {
                Condition::Equals(column.to_string(), pattern.to_string())
            };
            self.conditions.push(condition);
        }
        self
    }

    pub fn order_by(mut self, order: impl Into<String>) -> Self {
        self.order_by = Some(order.into());
        self
    }

    pub fn build(&self, dialect: &dyn Dialect) -> (String, Vec<SqlValue<'static>>) {
        let mut sql = self.select.clone();
        let mut params = Vec::new();
        for (i, condition) in self.conditions.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            match condition {
                Condition::Raw(text) => sql.push_str(text),
                Condition::Equals(column, value) | Condition::Like(column, value) => {
                    params.push(SqlValue::from(value.clone()));
                    let op = if matches!(condition, Condition::Like(..)) {
                        "LIKE"
                    } else {
                        "="
                    };
                    sql.push_str(&format!(
                        "{} {} {}",
                        column,
                        op,
                        dialect.text_param_placeholder(params.len())
                    ));
                }
            }
        }
        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        (sql, params)
    }
}

/// Connection, results and statement cache of one inspection pass.
///
/// Statements are prepared once per distinct query text, so a per-table
/// query reuses one statement across every table. [`close`](Self::close)
/// releases them; the manager calls it on success and failure alike.
pub struct InspectionContext<'s> {
    session: &'s mut dyn Session,
    dialect: Arc<dyn Dialect>,
    results: InspectionResults,
    statements: HashMap<String, StatementId>,
}

impl<'s> InspectionContext<'s> {
    pub fn new(session: &'s mut dyn Session, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            session,
            dialect,
            results: InspectionResults::new(),
            statements: HashMap::new(),
        }
    }

    pub fn database_info(&self) -> &DatabaseInfo {
        self.session.database_info()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn results(&self) -> &InspectionResults {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut InspectionResults {
        &mut self.results
    }

    pub fn into_results(self) -> InspectionResults {
        self.results
    }

    /// Number of statements currently held open.
    pub fn open_statements(&self) -> usize {
        self.statements.len()
    }

    pub async fn query(&mut self, query: &ScopedQuery) -> Result<Vec<Row>> {
        let (sql, params) = query.build(self.dialect.as_ref());
        self.query_sql(&sql, &params).await
    }

    /// Run `sql` through the statement cache.
    pub async fn query_sql(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<Vec<Row>> {
        let id = match self.statements.get(sql) {
            Some(id) => *id,
            None => {
                let id = self.session.prepare(sql).await?;
                self.statements.insert(sql.to_string(), id);
                id
            }
        };
        trace!("inspect: {}", sql);
        let mut cursor = self
            .session
            .query_prepared(id, params, CursorOptions::default())
            .await?;
        cursor.collect_rows().await
    }

    pub(crate) async fn begin(&mut self) -> Result<()> {
        self.session.begin(true).await
    }

    pub(crate) async fn commit(&mut self) -> Result<()> {
        self.session.commit().await
    }

    pub(crate) async fn rollback(&mut self) -> Result<()> {
        self.session.rollback().await
    }

    /// Close every cached statement. Each statement is closed once; the
    /// first failure is returned after all of them were attempted.
    pub async fn close(&mut self) -> Result<()> {
        let statements = std::mem::take(&mut self.statements);
        let mut first_error: Option<MigrateError> = None;
        for (sql, id) in statements {
            if let Err(e) = self.session.close_statement(id).await {
                warn!("Failed to close statement {}: {}", sql, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect};
    use crate::testing::MockSession;

    #[test]
    fn test_scoped_query_skips_missing_filters() {
        let query = ScopedQuery::new("SELECT * FROM T")
            .and_equals("A", None)
            .and_like("B", Some("x%"))
            .and_like("C", Some("plain"))
            .order_by("B");
        let (sql, params) = query.build(&MySqlDialect::new());
        assert_eq!(sql, "SELECT * FROM T WHERE B LIKE ? AND C = ? ORDER BY B");
        assert_eq!(params.len(), 2);

        let (sql, _) = query.build(&PostgresDialect::new());
        assert_eq!(
            sql,
            "SELECT * FROM T WHERE B LIKE CAST($1 AS TEXT) AND C = CAST($2 AS TEXT) ORDER BY B"
        );
    }

    #[test]
    fn test_raw_condition_mixes_with_params() {
        let query = ScopedQuery::new("SELECT * FROM T")
            .and("KIND = 'X'")
            .and_equals("S", Some("public"));
        let (sql, params) = query.build(&MySqlDialect::new());
        assert_eq!(sql, "SELECT * FROM T WHERE KIND = 'X' AND S = ?");
        assert_eq!(params, vec![SqlValue::from("public")]);
    }

    #[tokio::test]
    async fn test_statement_cache_reuses_prepared_query() {
        let mut session = MockSession::new("MySQL");
        let stats = session.stats();
        let mut context = InspectionContext::new(&mut session, Arc::new(MySqlDialect::new()));
        for table in ["a", "b", "c"] {
            context
                .query_sql("SELECT * FROM COLUMNS WHERE TABLE_NAME = ?", &[SqlValue::from(table)])
                .await
                .unwrap();
        }
        assert_eq!(context.open_statements(), 1);
        context.close().await.unwrap();
        context.close().await.unwrap();

        let stats = stats.lock().unwrap();
        assert_eq!(stats.prepared, 1);
        assert_eq!(stats.queries.len(), 3);
        assert_eq!(stats.closed, 1);
        assert!(stats.open_statements.is_empty());
    }
}
