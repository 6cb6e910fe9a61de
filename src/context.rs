//! Cancellation and deadline signal for database calls
//!
//! A `Context` covers a whole call: waiting for the serialized handle's
//! lock, waiting for a pooled connection and the driver round trip. When it
//! fires first, the in-flight future is dropped, which releases any lock or
//! connection it held.

use crate::error::{DbError, Phase};
use std::future::{pending, Future};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every `Context` created from it
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: None,
            deadline: Some(deadline),
        }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Derive a context that also expires after `timeout`, keeping the
    /// earlier of the two deadlines
    pub fn timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Drive `fut` until it completes or the context fires, whichever is first
    pub(crate) async fn run<T, F>(&self, phase: Phase, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        if self.is_cancelled() {
            return Err(DbError::Cancelled { phase });
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(DbError::DeadlineExceeded { phase });
        }

        tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => Err(DbError::Cancelled { phase }),
            _ = expired(self.deadline) => Err(DbError::DeadlineExceeded { phase }),
            out = fut => out,
        }
    }
}

async fn cancelled(rx: Option<watch::Receiver<bool>>) {
    if let Some(mut rx) = rx {
        if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
            return;
        }
    }
    // Sender gone without cancelling: never fires
    pending::<()>().await
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        let out = ctx.run(Phase::Execute, async { Ok::<_, DbError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let (ctx, handle) = Context::with_cancel();
        let task = tokio::spawn(async move {
            ctx.run(Phase::Query, pending::<Result<(), DbError>>()).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, DbError::Cancelled { phase: Phase::Query }));
    }

    #[tokio::test]
    async fn test_already_cancelled_short_circuits() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();
        assert!(ctx.is_cancelled());

        let never_polled = async {
            if true {
                panic!("must not be polled");
            }
            Ok::<(), DbError>(())
        };
        let err = ctx.run(Phase::Execute, never_polled).await.unwrap_err();
        assert!(matches!(err, DbError::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(Phase::BeginTransaction, pending::<Result<(), DbError>>())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::DeadlineExceeded {
                phase: Phase::BeginTransaction
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (ctx, handle) = Context::with_cancel();
        drop(handle);
        let out = ctx.run(Phase::Ping, async { Ok::<_, DbError>("ok") }).await;
        assert_eq!(out.unwrap(), "ok");
    }

    #[test]
    fn test_timeout_keeps_earlier_deadline() {
        let short = Context::with_timeout(Duration::from_millis(10));
        let derived = short.timeout(Duration::from_secs(60));
        assert_eq!(derived.deadline(), short.deadline());

        let unbounded = Context::background().timeout(Duration::from_secs(1));
        assert!(unbounded.deadline().is_some());
    }
}
