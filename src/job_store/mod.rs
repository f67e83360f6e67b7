mod schema;
mod sqlite_job_store;

pub use sqlite_job_store::SqliteJobStore;

use crate::job_queue::{Job, JobId};
use anyhow::Result;

/// A persisted row, as shown by admin tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredJobSummary {
    pub id: JobId,
    pub type_key: String,
    pub failure_count: u32,
    pub created_at: i64,
    pub canceled: bool,
}

/// Durable storage for submitted jobs.
///
/// Every method is atomic with respect to a single job id.
pub trait JobStore: Send + Sync {
    /// Inserts the job, or updates its failure count and payload.
    /// Fails for jobs without an id.
    fn persist_job(&self, job: &Job) -> Result<()>;

    fn mark_job_as_succeeded(&self, id: &JobId) -> Result<()>;

    fn mark_job_as_failed_permanently(&self, id: &JobId) -> Result<()>;

    /// All non-canceled rows of a type, ordered by id. `None` marks a row that
    /// could not be turned back into a job.
    fn get_all_pending_jobs(&self, type_key: &str) -> Result<Vec<(JobId, Option<Job>)>>;

    /// True when the job was canceled or its row no longer exists.
    fn is_job_canceled(&self, job: &Job) -> Result<bool>;

    /// Flags a job as canceled. Returns false if there is no such job.
    fn cancel_job(&self, id: &JobId) -> Result<bool>;

    /// Deletes canceled rows, returning how many were removed.
    fn delete_canceled_jobs(&self) -> Result<usize>;

    /// Swaps `retired_id` for `replacement` in one transaction.
    fn replace_job(&self, retired_id: &JobId, replacement: &Job) -> Result<()>;

    fn get_attachment_upload_job(&self, attachment_id: i64) -> Result<Option<Job>>;

    fn get_message_send_job(&self, id: &JobId) -> Result<Option<Job>>;

    /// Distinct type keys among stored rows.
    fn get_pending_type_keys(&self) -> Result<Vec<String>>;

    fn list_jobs(&self, type_key: Option<&str>) -> Result<Vec<StoredJobSummary>>;
}
