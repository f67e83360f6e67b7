use super::queue::JobQueue;
use crate::backend::MessagingBackend;
use crate::job_store::JobStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Cancelled when the queue shuts down.
    pub cancellation_token: CancellationToken,

    /// Persisted jobs, for lookups across jobs (e.g. pending uploads).
    pub store: Arc<dyn JobStore>,

    pub backend: Arc<dyn MessagingBackend>,

    /// Handle for submitting follow-up jobs.
    pub queue: JobQueue,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        store: Arc<dyn JobStore>,
        backend: Arc<dyn MessagingBackend>,
        queue: JobQueue,
    ) -> Self {
        Self {
            cancellation_token,
            store,
            backend,
            queue,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
