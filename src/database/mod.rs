//! Database handles
//!
//! - [`MySqlDb`]: pooled MySQL handle, safe for concurrent use
//! - [`SqliteDb`]: single-connection SQLite handle; every call is serialized
//!   through an [`ExclusiveSlot`]

pub mod cursor;
pub mod exclusive;
pub mod mysql;
pub mod sqlite;

pub use cursor::RowSet;
pub use exclusive::ExclusiveSlot;
pub use mysql::MySqlDb;
pub use sqlite::SqliteDb;

pub use sqlx::mysql::{MySqlArguments, MySqlRow, MySqlStatement};
pub use sqlx::sqlite::{SqliteArguments, SqliteQueryResult, SqliteRow};
pub use sqlx::{Arguments, Row, Transaction};

use crate::context::Context;
use crate::error::DbError;
use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    Sqlite,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Connection pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_open: u32,
    /// Idle connections the pool aims to keep; the driver pool has no hard
    /// cap on idle count, so for MySQL this is advisory
    pub max_idle: u32,
    pub max_lifetime: Duration,
}

const ONE_HOUR: Duration = Duration::from_secs(60 * 60);

pub const MYSQL_POOL_LIMITS: PoolLimits = PoolLimits {
    max_open: 25,
    max_idle: 10,
    max_lifetime: ONE_HOUR,
};

pub const SQLITE_POOL_LIMITS: PoolLimits = PoolLimits {
    max_open: 1,
    max_idle: 1,
    max_lifetime: ONE_HOUR,
};

/// Operations shared by every handle, used by health checks
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    fn backend(&self) -> Backend;

    /// Where the handle points, safe to print
    fn describe(&self) -> String;

    async fn ping(&self, ctx: &Context) -> Result<(), DbError>;

    async fn close(&self) -> Result<(), DbError>;

    async fn is_connected(&self) -> bool;
}

/// Time `fut` and record its outcome
pub(crate) async fn instrument<T, F>(
    backend: Backend,
    operation: &'static str,
    fut: F,
) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    let started = Instant::now();
    let result = fut.await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    crate::metrics::record_operation(backend.as_str(), operation, outcome, started.elapsed());

    if let Err(e) = &result {
        tracing::debug!(
            backend = backend.as_str(),
            operation,
            error = %e,
            "Database operation failed"
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Phase;

    #[test]
    fn test_pool_limits() {
        assert_eq!(MYSQL_POOL_LIMITS.max_open, 25);
        assert_eq!(MYSQL_POOL_LIMITS.max_idle, 10);
        assert_eq!(SQLITE_POOL_LIMITS.max_open, 1);
        assert_eq!(SQLITE_POOL_LIMITS.max_idle, 1);
        assert_eq!(SQLITE_POOL_LIMITS.max_lifetime, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_instrument_passes_result_through() {
        let ok = instrument(Backend::Sqlite, "execute", async { Ok::<_, DbError>(3) }).await;
        assert_eq!(ok.unwrap(), 3);

        let err = instrument(Backend::MySql, "query", async {
            Err::<(), _>(DbError::Cancelled { phase: Phase::Query })
        })
        .await;
        assert!(matches!(err, Err(DbError::Cancelled { .. })));
    }
}
