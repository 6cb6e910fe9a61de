//! Streaming result sets
//!
//! A query's rows are pulled by a spawned task and handed over through a
//! bounded channel, so the caller can walk them without borrowing the pool.
//! The producing task owns the pooled connection until the last row is
//! read or the `RowSet` is dropped.

use crate::error::{DbError, Phase};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ROW_BUFFER: usize = 64;

pub(crate) type RowSender<R> = mpsc::Sender<Result<R, sqlx::Error>>;

/// Rows of a running query
pub struct RowSet<R> {
    head: Option<R>,
    rx: mpsc::Receiver<Result<R, sqlx::Error>>,
    task: JoinHandle<()>,
}

impl<R: Send + 'static> RowSet<R> {
    /// Spawn `produce` and wait for its first row
    ///
    /// A statement that fails outright is reported here rather than on the
    /// first `next()`.
    pub(crate) async fn start<F, Fut>(produce: F) -> Result<Self, DbError>
    where
        F: FnOnce(RowSender<R>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(ROW_BUFFER);
        let task = tokio::spawn(produce(tx));

        let mut rows = Self {
            head: None,
            rx,
            task,
        };
        match rows.rx.recv().await {
            Some(Ok(row)) => rows.head = Some(row),
            Some(Err(e)) => return Err(DbError::execution(Phase::Query, e)),
            None => {}
        }
        Ok(rows)
    }

    /// Next row, or `None` once the result set is exhausted
    pub async fn next(&mut self) -> Result<Option<R>, DbError> {
        if let Some(row) = self.head.take() {
            return Ok(Some(row));
        }

        match self.rx.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DbError::execution(Phase::Query, e)),
            None => Ok(None),
        }
    }

    /// Drain the remaining rows
    pub async fn all(mut self) -> Result<Vec<R>, DbError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Stop the query and give its connection back to the pool
    pub fn close(self) {}
}

impl<R> Drop for RowSet<R> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<R> std::fmt::Debug for RowSet<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSet")
            .field("buffered_head", &self.head.is_some())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
