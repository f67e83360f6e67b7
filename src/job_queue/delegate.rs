use super::error::JobError;
use super::job::Job;

/// Receives the outcome of a job execution.
///
/// Jobs are handed over by value, so each run reports exactly once.
pub trait JobDelegate: Send + Sync {
    fn handle_job_succeeded(&self, job: Job);

    fn handle_job_failed(&self, job: Job, error: JobError);

    fn handle_job_failed_permanently(&self, job: Job, error: JobError);
}
