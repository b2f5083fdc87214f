//! Bounded-parallelism admission gate.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use tokenmeter_core::{ScanError, default_io_concurrency};

/// Runs at most `capacity` submitted tasks at once.
///
/// Waiting submissions are admitted in FIFO order (tokio's semaphore is
/// fair). A failing or panicking task frees its slot; the failure only
/// reaches whoever awaits that task. Once [`close`](Self::close)d, every
/// new submission fails with [`ScanError::LimiterClosed`].
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting `capacity` concurrent tasks (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Parallelism to use when the caller has no preference.
    pub fn default_parallelism() -> usize {
        default_io_concurrency()
    }

    /// Maximum number of concurrent tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ScanError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScanError::LimiterClosed)
    }

    /// Run `task` once a slot is free and return its output.
    pub async fn submit<F>(&self, task: F) -> Result<F::Output, ScanError>
    where
        F: Future,
    {
        let _permit = self.acquire().await?;
        Ok(task.await)
    }

    /// Start `task` on the runtime once a slot is free.
    ///
    /// Returns as soon as the task is admitted; the slot is held until the
    /// task completes.
    pub async fn spawn<F>(&self, task: F) -> Result<JoinHandle<F::Output>, ScanError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = self.acquire().await?;
        Ok(tokio::spawn(with_permit(permit, task)))
    }

    /// Start `task` under an already acquired permit.
    pub fn spawn_with<F>(&self, permit: OwnedSemaphorePermit, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(with_permit(permit, task))
    }

    /// Wait until every admitted task has released its slot.
    ///
    /// Everything a task did before finishing happens-before this returns.
    pub async fn drain(&self) -> Result<(), ScanError> {
        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        let permits = self
            .semaphore
            .acquire_many(all)
            .await
            .map_err(|_| ScanError::LimiterClosed)?;
        drop(permits);
        Ok(())
    }

    /// Refuse all further submissions. Waiting submissions fail too.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Check if the limiter has been closed.
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

async fn with_permit<F: Future>(permit: OwnedSemaphorePermit, task: F) -> F::Output {
    let output = task.await;
    drop(permit);
    output
}
