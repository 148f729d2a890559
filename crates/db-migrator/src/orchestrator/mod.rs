//! Dump, load and schema jobs.
//!
//! Each job opens its sessions through a
//! [`SessionFactory`](crate::drivers::SessionFactory). Per-entry work
//! runs on a [`BlockingWorkerPool`], with one session per entry. Sessions are
//! never shared between workers. A failing entry is reported in the job
//! result and the remaining entries carry on.

mod dump;
mod load;
mod pool;
mod query;
mod schema;

pub use dump::{DumpJob, DumpResult};
pub use load::{LoadJob, LoadResult};
pub use pool::{
    BlockedCallback, BlockingWorkerPool, BlockingWorkerPoolBuilder, PoolStatus, TaskHandle,
    DEFAULT_BLOCK_TIMEOUT,
};
pub use query::{DumpQuery, InsertQuery, NativeQuery, SelectQuery};
pub use schema::{SchemaInput, SchemaJob, SchemaOutput, SchemaResult};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::session::{IsolationLevel, Session};
use crate::dialect::Dialect;

/// Isolation levels tried for dump snapshots, most consistent first.
pub const ISOLATION_PREFERENCE: [IsolationLevel; 3] = [
    IsolationLevel::Serializable,
    IsolationLevel::RepeatableRead,
    IsolationLevel::ReadCommitted,
];

/// Set the first level of [`ISOLATION_PREFERENCE`] the session accepts.
///
/// Levels the dialect or the driver capabilities rule out are skipped
/// without a round trip. Returns `None` when every level was refused, in
/// which case the session keeps its default.
pub async fn negotiate_isolation(
    session: &mut dyn Session,
    dialect: &dyn Dialect,
) -> Option<IsolationLevel> {
    let supported = session.capabilities().isolation_levels.clone();
    for level in ISOLATION_PREFERENCE {
        if !dialect.supports_transaction_isolation(level)
            || (!supported.is_empty() && !supported.contains(&level))
        {
            continue;
        }
        match session.set_transaction_isolation(level).await {
            Ok(()) => {
                debug!("Using isolation level {}", level);
                return Some(level);
            }
            Err(e) => debug!("Isolation level {} refused: {}", level, e),
        }
    }
    warn!("No preferred isolation level accepted, keeping the session default");
    None
}

/// Outcome of one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Completed,
    Failed,
    /// Stopped by cancellation; rows written so far are kept.
    Cancelled,
    /// Never started because the job was cancelled first.
    Skipped,
}

/// Per-entry line of a job summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResult {
    pub name: String,
    pub status: EntryStatus,
    pub rows: u64,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryResult {
    fn new(name: impl Into<String>, status: EntryStatus) -> Self {
        Self {
            name: name.into(),
            status,
            rows: 0,
            duration_seconds: 0.0,
            isolation: None,
            error: None,
        }
    }

    fn failed(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(name, EntryStatus::Failed)
        }
    }

    fn skipped(name: impl Into<String>) -> Self {
        Self::new(name, EntryStatus::Skipped)
    }
}

/// Counters shared by dump and load summaries.
#[derive(Debug, Default)]
struct Totals {
    success: usize,
    failed: usize,
    cancelled: bool,
    rows: u64,
    failed_entries: Vec<String>,
}

impl Totals {
    fn of(entries: &[EntryResult]) -> Self {
        let mut totals = Self::default();
        for entry in entries {
            totals.rows += entry.rows;
            match entry.status {
                EntryStatus::Completed => totals.success += 1,
                EntryStatus::Failed => {
                    totals.failed += 1;
                    totals.failed_entries.push(entry.name.clone());
                }
                EntryStatus::Cancelled | EntryStatus::Skipped => totals.cancelled = true,
            }
        }
        totals
    }

    /// "cancelled" beats "failed" beats "completed".
    fn status(&self) -> &'static str {
        if self.cancelled {
            "cancelled"
        } else if self.failed > 0 {
            "failed"
        } else {
            "completed"
        }
    }
}

fn rows_per_second(rows: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (rows as f64 / secs) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectResolver, MySqlDialect, PostgresDialect};
    use crate::core::session::DriverCapabilities;
    use crate::testing::MockSession;

    #[tokio::test]
    async fn test_negotiation_prefers_serializable() {
        let mut session = MockSession::new("PostgreSQL");
        let stats = session.stats();
        let level = negotiate_isolation(&mut session, &PostgresDialect::new()).await;
        assert_eq!(level, Some(IsolationLevel::Serializable));
        assert_eq!(stats.lock().unwrap().isolation, Some(IsolationLevel::Serializable));
    }

    #[tokio::test]
    async fn test_negotiation_falls_back_on_refusal() {
        let mut session = MockSession::new("MySQL")
            .rejecting_isolation(IsolationLevel::Serializable);
        let level = negotiate_isolation(&mut session, &MySqlDialect::new()).await;
        assert_eq!(level, Some(IsolationLevel::RepeatableRead));
    }

    #[tokio::test]
    async fn test_negotiation_honours_capabilities() {
        let mut session = MockSession::new("PostgreSQL").with_capabilities(DriverCapabilities {
            isolation_levels: vec![IsolationLevel::ReadCommitted],
            ..DriverCapabilities::default()
        });
        let stats = session.stats();
        let dialect = DialectResolver::default().by_name("postgres").unwrap();
        let level = negotiate_isolation(&mut session, dialect.as_ref()).await;
        assert_eq!(level, Some(IsolationLevel::ReadCommitted));
        assert_eq!(stats.lock().unwrap().isolation, Some(IsolationLevel::ReadCommitted));
    }

    #[tokio::test]
    async fn test_negotiation_gives_up() {
        let mut session = MockSession::new("PostgreSQL")
            .rejecting_isolation(IsolationLevel::Serializable)
            .rejecting_isolation(IsolationLevel::RepeatableRead)
            .rejecting_isolation(IsolationLevel::ReadCommitted);
        assert_eq!(negotiate_isolation(&mut session, &PostgresDialect::new()).await, None);
    }

    #[test]
    fn test_totals_status() {
        let mut entries = vec![
            EntryResult { rows: 3, ..EntryResult::new("a", EntryStatus::Completed) },
            EntryResult::failed("b", "boom"),
        ];
        let totals = Totals::of(&entries);
        assert_eq!(totals.status(), "failed");
        assert_eq!(totals.rows, 3);
        assert_eq!(totals.failed_entries, vec!["b".to_string()]);

        entries.push(EntryResult::skipped("c"));
        assert_eq!(Totals::of(&entries).status(), "cancelled");
    }

    #[test]
    fn test_rows_per_second() {
        assert_eq!(rows_per_second(100, Duration::from_secs(4)), 25);
        assert_eq!(rows_per_second(100, Duration::ZERO), 0);
    }
}
