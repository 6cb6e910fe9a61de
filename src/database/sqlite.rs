//! Serialized SQLite handle
//!
//! One connection, one caller at a time. Every operation, including
//! `close`, waits its turn on the handle's lock and holds it until the
//! driver call returns. Rows and transactions keep the pooled connection
//! after the lock is released, so the next caller waits for them to be
//! dropped (or committed) before it reaches the database.

use crate::context::Context;
use crate::database::cursor::{RowSender, RowSet};
use crate::database::exclusive::ExclusiveSlot;
use crate::database::{instrument, Backend, DatabaseHandle, SQLITE_POOL_LIMITS};
use crate::error::{DbError, Phase};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteQueryResult,
    SqliteRow,
};
use sqlx::{Connection, Sqlite, Transaction};
use std::str::FromStr;

const FOREIGN_KEYS_PRAGMA: &str = "PRAGMA foreign_keys = ON;";
const MEMORY_PATH: &str = ":memory:";

#[derive(Debug)]
pub struct SqliteDb {
    path: String,
    slot: ExclusiveSlot<SqlitePool>,
}

impl SqliteDb {
    /// Open (creating if missing) the database at `path`
    ///
    /// `:memory:` opens a private in-memory database that lives as long as
    /// the handle. Foreign key enforcement is switched on before the handle
    /// is returned.
    pub async fn open(path: &str) -> Result<Self, DbError> {
        if path.trim().is_empty() {
            return Err(DbError::InvalidConfig(
                "SQLite path cannot be empty".to_string(),
            ));
        }

        let options = connect_options(path)?;
        let in_memory = is_in_memory(path);

        // The lone connection must never be recycled for an in-memory
        // database, or its contents go with it
        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_POOL_LIMITS.max_open)
            .min_connections(SQLITE_POOL_LIMITS.max_idle)
            .idle_timeout(None)
            .max_lifetime((!in_memory).then_some(SQLITE_POOL_LIMITS.max_lifetime))
            .connect_with(options)
            .await
            .map_err(|e| DbError::connection(Phase::Open, e))?;

        if let Err(e) = verify(&pool).await {
            pool.close().await;
            return Err(DbError::connection(Phase::Ping, e));
        }

        if let Err(e) = sqlx::query(FOREIGN_KEYS_PRAGMA).execute(&pool).await {
            pool.close().await;
            return Err(DbError::connection(Phase::Pragma, e));
        }

        tracing::info!(path, "SQLite database opened");

        Ok(Self {
            path: path.to_string(),
            slot: ExclusiveSlot::new(format!("sqlite:{path}"), pool),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn execute(
        &self,
        sql: &str,
        args: SqliteArguments<'_>,
    ) -> Result<SqliteQueryResult, DbError> {
        self.execute_with(&Context::background(), sql, args).await
    }

    /// Run a statement that returns no rows
    pub async fn execute_with(
        &self,
        ctx: &Context,
        sql: &str,
        args: SqliteArguments<'_>,
    ) -> Result<SqliteQueryResult, DbError> {
        let call = self.slot.with("execute", |pool| async move {
            sqlx::query_with(sql, args)
                .execute(&pool)
                .await
                .map_err(|e| DbError::execution(Phase::Execute, e))
        });

        instrument(Backend::Sqlite, "execute", ctx.run(Phase::Execute, call)).await
    }

    pub async fn query(
        &self,
        sql: &str,
        args: SqliteArguments<'static>,
    ) -> Result<RowSet<SqliteRow>, DbError> {
        self.query_with(&Context::background(), sql, args).await
    }

    /// Run a statement and stream its rows
    ///
    /// The lock is held until the first row (or error) arrives.
    pub async fn query_with(
        &self,
        ctx: &Context,
        sql: &str,
        args: SqliteArguments<'static>,
    ) -> Result<RowSet<SqliteRow>, DbError> {
        let sql = sql.to_owned();
        let call = self.slot.with("query", move |pool| {
            RowSet::start(move |tx| stream_rows(pool, sql, args, tx))
        });

        instrument(Backend::Sqlite, "query", ctx.run(Phase::Query, call)).await
    }

    pub async fn query_row(
        &self,
        sql: &str,
        args: SqliteArguments<'_>,
    ) -> Result<Option<SqliteRow>, DbError> {
        self.query_row_with(&Context::background(), sql, args).await
    }

    /// Run a statement and return its first row, if any
    pub async fn query_row_with(
        &self,
        ctx: &Context,
        sql: &str,
        args: SqliteArguments<'_>,
    ) -> Result<Option<SqliteRow>, DbError> {
        let call = self.slot.with("query_row", |pool| async move {
            sqlx::query_with(sql, args)
                .fetch_optional(&pool)
                .await
                .map_err(|e| DbError::execution(Phase::QueryRow, e))
        });

        instrument(Backend::Sqlite, "query_row", ctx.run(Phase::QueryRow, call)).await
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, DbError> {
        self.begin_with(&Context::background()).await
    }

    /// Start a transaction on the handle's connection
    ///
    /// Commit or roll back before issuing further calls on this handle.
    pub async fn begin_with(&self, ctx: &Context) -> Result<Transaction<'static, Sqlite>, DbError> {
        let call = self.slot.with("begin", |pool| async move {
            pool.begin()
                .await
                .map_err(|e| DbError::execution(Phase::BeginTransaction, e))
        });

        instrument(
            Backend::Sqlite,
            "begin",
            ctx.run(Phase::BeginTransaction, call),
        )
        .await
    }

    /// Check the connection is alive
    pub async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        let call = self.slot.with("ping", |pool| async move {
            verify(&pool)
                .await
                .map_err(|e| DbError::execution(Phase::Ping, e))
        });

        instrument(Backend::Sqlite, "ping", ctx.run(Phase::Ping, call)).await
    }

    /// Close the handle; later calls fail with `NotConnected`
    ///
    /// Waits for outstanding rows and transactions to give the connection
    /// back. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), DbError> {
        let path = &self.path;
        self.slot
            .close(|pool| async move {
                pool.close().await;
                tracing::info!(path = %path, "SQLite database closed");
                Ok(())
            })
            .await
    }

    pub async fn is_open(&self) -> bool {
        self.slot.is_open().await
    }
}

#[async_trait]
impl DatabaseHandle for SqliteDb {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path)
    }

    async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        SqliteDb::ping(self, ctx).await
    }

    async fn close(&self) -> Result<(), DbError> {
        SqliteDb::close(self).await
    }

    async fn is_connected(&self) -> bool {
        self.is_open().await
    }
}

fn is_in_memory(path: &str) -> bool {
    path == MEMORY_PATH || path == "sqlite::memory:"
}

fn connect_options(path: &str) -> Result<SqliteConnectOptions, DbError> {
    let options = if is_in_memory(path) {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::connection(Phase::Open, e))?
    } else {
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
    };

    // Also applied to any replacement connection after max lifetime
    Ok(options.foreign_keys(true))
}

async fn verify(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

async fn stream_rows(
    pool: SqlitePool,
    sql: String,
    args: SqliteArguments<'static>,
    tx: RowSender<SqliteRow>,
) {
    let mut rows = sqlx::query_with(&sql, args).fetch(&pool);
    while let Some(row) = rows.next().await {
        let failed = row.is_err();
        if tx.send(row).await.is_err() || failed {
            break;
        }
    }
}
