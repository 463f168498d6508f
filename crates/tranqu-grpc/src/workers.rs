//! Bounded worker pool.
//!
//! Every transpile call holds one permit while it is inside the engine, so no
//! more than `max_workers` engine calls run at once. Further calls wait in
//! FIFO order. There is no timeout: a permit is released only when the call
//! it guards completes or is dropped.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};
use crate::metrics::Metrics;

/// Pool of `max_workers` permits.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    metrics: Metrics,
}

/// A held worker slot. Dropping it frees the slot.
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
    metrics: Metrics,
}

impl WorkerPool {
    /// Create a pool; `max_workers` is clamped to at least one.
    pub fn new(max_workers: usize) -> Self {
        let capacity = max_workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            metrics: Metrics::new(),
        }
    }

    /// Wait for a free worker.
    pub async fn acquire(&self) -> Result<WorkerPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(format!("worker pool closed: {e}")))?;
        self.metrics.engine_call_started();
        Ok(WorkerPermit {
            _permit: permit,
            metrics: self.metrics.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Workers not currently in use.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.metrics.engine_call_finished();
    }
}
