//! Bounded pool of delivery workers.
//!
//! Capacity is enforced with a semaphore: every running task holds one permit
//! and gives it back when it finishes. Tasks are tracked so that closing the
//! pool can wait for in-flight work.

use super::error::PoolError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// A task the pool could not accept, handed back to the caller
pub struct Rejected<F> {
    pub reason: PoolError,
    pub task: F,
}

// futures are rarely Debug, so only the reason is shown
impl<F> fmt::Debug for Rejected<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

pub struct WorkerPool {
    capacity: usize,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }

        Ok(Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
        })
    }

    /// Tasks currently holding a slot
    pub fn running(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Starts `task` if a slot is free, without waiting
    pub fn try_submit<F>(&self, task: F) -> Result<(), Rejected<F>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => {
                self.spawn(permit, task);
                Ok(())
            }
            Err(TryAcquireError::NoPermits) => Err(Rejected {
                reason: PoolError::Overloaded,
                task,
            }),
            Err(TryAcquireError::Closed) => Err(Rejected {
                reason: PoolError::Closed,
                task,
            }),
        }
    }

    /// Starts `task`, waiting for a slot if the pool is full.
    ///
    /// Fails only when the pool is closed before a slot frees up.
    pub async fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = match self.try_submit(task) {
            Ok(()) => return Ok(()),
            Err(Rejected {
                reason: PoolError::Overloaded,
                task,
            }) => task,
            Err(rejected) => return Err(rejected.reason),
        };

        debug!(running = self.running(), "worker pool full, waiting for a slot");

        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        self.spawn(permit, task);
        Ok(())
    }

    fn spawn<F>(&self, permit: OwnedSemaphorePermit, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(async move {
            task.await;
            drop(permit);
        });
    }

    /// Stops accepting work and waits up to `timeout` for running tasks.
    ///
    /// Submitters still waiting for a slot are rejected with
    /// [`PoolError::Closed`]. Tasks still running after the timeout keep
    /// running detached.
    pub async fn close(&self, timeout: Duration) -> Result<(), PoolError> {
        self.slots.close();
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(
                    running = self.tracker.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "worker pool did not drain in time"
                );
                Err(PoolError::DrainTimeout)
            }
        }
    }
}
