use super::data::JobDataError;
use super::id::JobId;
use thiserror::Error;

/// Outcome of a failed job body.
///
/// Whether the queue retries is decided by [`JobError::is_permanent`].
#[derive(Debug, Error)]
pub enum JobError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by remote")]
    RateLimited,

    #[error("temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid job payload: {0}")]
    InvalidPayload(#[from] JobDataError),

    #[error("waiting for attachment upload")]
    AwaitingAttachmentUpload,

    #[error("{failed} of {total} batched messages failed")]
    PartialBatch { failed: usize, total: usize },

    #[error("job body panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            JobError::NotFound(_) | JobError::InvalidResponse(_) | JobError::InvalidPayload(_)
        )
    }
}

/// Errors raised while handing a job to the queue. Never used for execution
/// failures, which travel through the delegate instead.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("job {0} was already submitted")]
    AlreadySubmitted(JobId),

    #[error("job has no id and cannot be resumed")]
    MissingId,

    #[error("job store error: {0:#}")]
    Store(anyhow::Error),

    #[error("job queue is shut down")]
    QueueClosed,
}
