//! Counting permit pool bounding concurrent handler executions.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many handler tasks run at once. Unbounded when built with
/// `None`, in which case acquiring never waits.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Option<Arc<Semaphore>>,
}

/// One occupied slot. Freed by [`Permit::release`] or on drop.
#[derive(Debug)]
#[must_use = "dropping a permit frees its slot immediately"]
pub struct Permit {
    _inner: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyLimiter {
    /// `max_concurrent` of `Some(0)` is clamped to 1.
    pub fn new(max_concurrent: Option<usize>) -> Self {
        Self {
            semaphore: max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Wait for a free slot. Only the calling task is suspended; waiters
    /// are woken in FIFO order.
    pub async fn acquire(&self) -> Permit {
        let inner = match &self.semaphore {
            // The semaphore is never closed, so acquisition cannot fail.
            Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
            None => None,
        };
        Permit { _inner: inner }
    }

    /// Free slots right now, `None` when unbounded.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}

impl Permit {
    /// Return the slot to the pool. Never blocks.
    pub fn release(self) {}
}
