//! Admission control: a bounded queue in front of a bounded inference pool.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, SemaphorePermit, TryAcquireError};
use tracing::{debug, warn};

use crate::config::AdmissionConfig;
use crate::error::{PipelineError, Result};

/// Gatekeeper for requests that may need inference.
///
/// A request is admitted only if fewer than
/// `max_concurrent_inference + queue_depth` requests are already in flight;
/// otherwise it is rejected immediately. Admitted requests then wait for one
/// of `max_concurrent_inference` worker slots before calling the provider.
pub struct Admission {
    queue: Arc<Semaphore>,
    workers: Semaphore,
    capacity: usize,
}

/// Proof that a request was admitted. Releases its queue slot on drop.
#[derive(Debug)]
pub struct Ticket {
    _slot: OwnedSemaphorePermit,
}

impl Admission {
    /// Create admission control with the given limits.
    pub fn new(config: &AdmissionConfig) -> Self {
        let workers = config.max_concurrent_inference.max(1);
        let capacity = workers + config.queue_depth;
        Self {
            queue: Arc::new(Semaphore::new(capacity)),
            workers: Semaphore::new(workers),
            capacity,
        }
    }

    /// Admit a request or reject it without waiting.
    pub fn admit(&self) -> Result<Ticket> {
        match Arc::clone(&self.queue).try_acquire_owned() {
            Ok(slot) => Ok(Ticket { _slot: slot }),
            Err(TryAcquireError::NoPermits) => {
                warn!("Rejecting request: {} already admitted", self.capacity);
                Err(PipelineError::Overloaded {
                    capacity: self.capacity,
                })
            }
            Err(TryAcquireError::Closed) => Err(PipelineError::NotReady),
        }
    }

    /// Wait for an inference slot. Requires a [`Ticket`].
    pub async fn inference_slot(&self, _ticket: &Ticket) -> Result<SemaphorePermit<'_>> {
        let permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| PipelineError::NotReady)?;
        debug!(
            "Inference slot acquired, {} free",
            self.workers.available_permits()
        );
        Ok(permit)
    }

    /// Requests currently admitted.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.queue.available_permits()
    }

    /// Maximum admitted requests.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop admitting. Requests waiting for a slot fail with `NotReady`.
    pub fn close(&self) {
        self.queue.close();
        self.workers.close();
    }
}
