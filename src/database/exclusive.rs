//! Arena of one: a single owned resource behind a fair async lock
//!
//! Every use goes through [`ExclusiveSlot::with`], which holds the lock
//! until the caller's future finishes. The guard is released on every exit
//! path, including when the future is dropped mid-flight. Waiters are
//! served in arrival order (`tokio::sync::Mutex` is FIFO).
//!
//! Closing takes the resource out of the slot for good; later calls fail
//! with `DbError::NotConnected` without ever seeing the resource.

use crate::error::DbError;
use std::future::Future;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct ExclusiveSlot<T> {
    name: String,
    slot: Mutex<Option<T>>,
    #[cfg(test)]
    occupancy: Occupancy,
}

/// How many callers have been inside `with` at the same time
#[cfg(test)]
#[derive(Debug, Default)]
struct Occupancy {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[cfg(test)]
struct Occupied<'a>(&'a Occupancy);

#[cfg(test)]
impl Occupancy {
    fn enter(&self) -> Occupied<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Occupied(self)
    }
}

#[cfg(test)]
impl Drop for Occupied<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: Clone> ExclusiveSlot<T> {
    pub fn new(name: impl Into<String>, resource: T) -> Self {
        Self {
            name: name.into(),
            slot: Mutex::new(Some(resource)),
            #[cfg(test)]
            occupancy: Occupancy::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` with exclusive use of the resource
    ///
    /// `f` receives a clone of the resource handle; the lock stays held
    /// until the future it returns completes.
    pub async fn with<R, F, Fut>(&self, operation: &'static str, f: F) -> Result<R, DbError>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<R, DbError>>,
    {
        let started = Instant::now();
        let guard = self.slot.lock().await;
        crate::metrics::record_lock_wait(&self.name, operation, started.elapsed());

        let Some(resource) = guard.as_ref().cloned() else {
            return Err(DbError::NotConnected);
        };

        let result = {
            #[cfg(test)]
            let _occupied = self.occupancy.enter();
            f(resource).await
        };
        drop(guard);
        result
    }

    /// Most callers ever seen inside `with` at once
    #[cfg(test)]
    pub(crate) fn peak_occupancy(&self) -> usize {
        self.occupancy.peak.load(Ordering::SeqCst)
    }

    /// Take the resource out and hand it to `f` for teardown
    ///
    /// Idempotent: once the slot is empty this returns `Ok(())` without
    /// calling `f`. The slot stays empty even if `f` fails.
    pub async fn close<F, Fut>(&self, f: F) -> Result<(), DbError>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<(), DbError>>,
    {
        let mut guard = self.slot.lock().await;
        match guard.take() {
            Some(resource) => f(resource).await,
            None => Ok(()),
        }
    }

    /// Whether the resource is still present (waits for the lock)
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
