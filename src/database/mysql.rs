//! Pooled MySQL handle
//!
//! The pool hands out connections to concurrent callers; no extra locking
//! happens here.

use crate::config::MySqlConfig;
use crate::context::Context;
use crate::database::cursor::{RowSender, RowSet};
use crate::database::{instrument, Backend, DatabaseHandle, MYSQL_POOL_LIMITS};
use crate::error::{DbError, Phase};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::mysql::{
    MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlStatement,
};
use sqlx::{Connection, Executor, MySql, Transaction};
use std::time::Duration;

/// Idle connections above the pool's floor are closed after this long
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct MySqlDb {
    pool: MySqlPool,
    /// Connection URL with the password masked
    dsn: String,
}

impl MySqlDb {
    /// Open a pool to the configured server and verify it answers
    pub async fn connect(cfg: &MySqlConfig) -> Result<Self, DbError> {
        validate(cfg)?;

        let pool = pool_options()
            .connect_with(connect_options(cfg))
            .await
            .map_err(|e| DbError::connection(Phase::Open, e))?;

        if let Err(e) = verify(&pool).await {
            pool.close().await;
            return Err(DbError::connection(Phase::Ping, e));
        }

        let dsn = cfg.redacted_dsn();
        tracing::info!(dsn = %dsn, "MySQL pool opened");

        Ok(Self { pool, dsn })
    }

    /// Build a handle without connecting; the first call opens a connection
    pub fn connect_lazy(cfg: &MySqlConfig) -> Result<Self, DbError> {
        validate(cfg)?;
        Ok(Self {
            pool: pool_options().connect_lazy_with(connect_options(cfg)),
            dsn: cfg.redacted_dsn(),
        })
    }

    /// Connection URL with the password masked
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn execute(&self, sql: &str, args: MySqlArguments) -> Result<u64, DbError> {
        self.execute_with(&Context::background(), sql, args).await
    }

    /// Run a statement that returns no rows, returning the affected row count
    pub async fn execute_with(
        &self,
        ctx: &Context,
        sql: &str,
        args: MySqlArguments,
    ) -> Result<u64, DbError> {
        let call = async move {
            let pool = self.open_pool()?;
            let result = sqlx::query_with(sql, args)
                .execute(pool)
                .await
                .map_err(|e| DbError::execution(Phase::Execute, e))?;
            Ok(result.rows_affected())
        };

        instrument(Backend::MySql, "execute", ctx.run(Phase::Execute, call)).await
    }

    pub async fn query(
        &self,
        sql: &str,
        args: MySqlArguments,
    ) -> Result<RowSet<MySqlRow>, DbError> {
        self.query_with(&Context::background(), sql, args).await
    }

    /// Run a statement and stream its rows
    pub async fn query_with(
        &self,
        ctx: &Context,
        sql: &str,
        args: MySqlArguments,
    ) -> Result<RowSet<MySqlRow>, DbError> {
        let call = async move {
            let pool = self.open_pool()?.clone();
            let sql = sql.to_owned();
            RowSet::start(move |tx| stream_rows(pool, sql, args, tx)).await
        };

        instrument(Backend::MySql, "query", ctx.run(Phase::Query, call)).await
    }

    pub async fn query_row(
        &self,
        sql: &str,
        args: MySqlArguments,
    ) -> Result<Option<MySqlRow>, DbError> {
        self.query_row_with(&Context::background(), sql, args).await
    }

    /// Run a statement and return its first row, if any
    pub async fn query_row_with(
        &self,
        ctx: &Context,
        sql: &str,
        args: MySqlArguments,
    ) -> Result<Option<MySqlRow>, DbError> {
        let call = async move {
            let pool = self.open_pool()?;
            sqlx::query_with(sql, args)
                .fetch_optional(pool)
                .await
                .map_err(|e| DbError::execution(Phase::QueryRow, e))
        };

        instrument(Backend::MySql, "query_row", ctx.run(Phase::QueryRow, call)).await
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'static, MySql>, DbError> {
        self.begin_transaction_with(&Context::background()).await
    }

    /// Start a transaction on a connection checked out from the pool
    pub async fn begin_transaction_with(
        &self,
        ctx: &Context,
    ) -> Result<Transaction<'static, MySql>, DbError> {
        let call = async move {
            self.open_pool()?
                .begin()
                .await
                .map_err(|e| DbError::execution(Phase::BeginTransaction, e))
        };

        instrument(
            Backend::MySql,
            "begin_transaction",
            ctx.run(Phase::BeginTransaction, call),
        )
        .await
    }

    pub async fn prepare(&self, sql: &str) -> Result<MySqlStatement<'static>, DbError> {
        self.prepare_with(&Context::background(), sql).await
    }

    /// Prepare `sql` on the server and return the statement description
    pub async fn prepare_with(
        &self,
        ctx: &Context,
        sql: &str,
    ) -> Result<MySqlStatement<'static>, DbError> {
        let call = async move {
            let pool = self.open_pool()?;
            let statement = pool
                .prepare(sql)
                .await
                .map_err(|e| DbError::execution(Phase::Prepare, e))?;
            Ok(sqlx::Statement::to_owned(&statement))
        };

        instrument(Backend::MySql, "prepare", ctx.run(Phase::Prepare, call)).await
    }

    /// Check a pooled connection is alive
    pub async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        let call = async move {
            let pool = self.open_pool()?;
            verify(pool)
                .await
                .map_err(|e| DbError::execution(Phase::Ping, e))
        };

        instrument(Backend::MySql, "ping", ctx.run(Phase::Ping, call)).await
    }

    /// Close the pool, waiting for checked-out connections to come back
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), DbError> {
        if self.pool.is_closed() {
            return Ok(());
        }
        self.pool.close().await;
        tracing::info!(dsn = %self.dsn, "MySQL pool closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.pool.is_closed()
    }

    fn open_pool(&self) -> Result<&MySqlPool, DbError> {
        if self.pool.is_closed() {
            Err(DbError::NotConnected)
        } else {
            Ok(&self.pool)
        }
    }
}

#[async_trait]
impl DatabaseHandle for MySqlDb {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    fn describe(&self) -> String {
        self.dsn.clone()
    }

    async fn ping(&self, ctx: &Context) -> Result<(), DbError> {
        MySqlDb::ping(self, ctx).await
    }

    async fn close(&self) -> Result<(), DbError> {
        MySqlDb::close(self).await
    }

    async fn is_connected(&self) -> bool {
        self.is_open()
    }
}

fn validate(cfg: &MySqlConfig) -> Result<(), DbError> {
    if cfg.host.trim().is_empty() {
        return Err(DbError::InvalidConfig("MySQL host cannot be empty".to_string()));
    }
    if cfg.username.trim().is_empty() {
        return Err(DbError::InvalidConfig(
            "MySQL username cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Driver options for `cfg`
///
/// Dates come back as native date/time values; the server's session time
/// zone is left alone.
pub fn connect_options(cfg: &MySqlConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .username(&cfg.username)
        .charset(cfg.charset())
        .timezone(None::<String>);

    if !cfg.password.is_empty() {
        options = options.password(&cfg.password);
    }
    if !cfg.database.is_empty() {
        options = options.database(&cfg.database);
    }

    options
}

fn pool_options() -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(MYSQL_POOL_LIMITS.max_open)
        .max_lifetime(MYSQL_POOL_LIMITS.max_lifetime)
        .idle_timeout(IDLE_TIMEOUT)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

async fn verify(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

async fn stream_rows(
    pool: MySqlPool,
    sql: String,
    args: MySqlArguments,
    tx: RowSender<MySqlRow>,
) {
    let mut rows = sqlx::query_with(&sql, args).fetch(&pool);
    while let Some(row) = rows.next().await {
        let failed = row.is_err();
        if tx.send(row).await.is_err() || failed {
            break;
        }
    }
}
