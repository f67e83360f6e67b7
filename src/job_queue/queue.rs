use super::context::JobContext;
use super::delegate::JobDelegate;
use super::error::{JobError, SubmissionError};
use super::id::{JobId, JobIdGenerator};
use super::job::Job;
use super::jobs::{BatchMessageReceiveJob, JobKind, TrimThreadJob};
use super::registry::JobFactoryRegistry;
use super::retry_policy::RetryPolicy;
use super::runner::JobQueueRunner;
use crate::backend::MessagingBackend;
use crate::config::JobQueueSettings;
use crate::job_store::JobStore;
use crate::metrics::{self, JobOutcome};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handle to the job queue. Cheap to clone; all clones share one queue.
///
/// The queue is also the [`JobDelegate`] every job reports back to.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    store: Arc<dyn JobStore>,
    registry: Arc<JobFactoryRegistry>,
    backend: Arc<dyn MessagingBackend>,
    intake: mpsc::UnboundedSender<Job>,
    ids: JobIdGenerator,
    retry_policy: RetryPolicy,
    pending_trims: Mutex<BTreeSet<i64>>,
    trim_requested: Notify,
    // Send jobs being resumed, and whether another resume was asked for meanwhile
    resuming: Mutex<HashMap<JobId, bool>>,
    has_resumed_pending_jobs: AtomicBool,
    shutdown: CancellationToken,
}

/// Creates a job queue and the runner driving it.
///
/// Spawn [`JobQueueRunner::run`] on the runtime; jobs submitted before that are
/// buffered. Cancelling `shutdown` stops the runner.
pub fn create_job_queue(
    store: Arc<dyn JobStore>,
    registry: Arc<JobFactoryRegistry>,
    backend: Arc<dyn MessagingBackend>,
    settings: &JobQueueSettings,
    shutdown: CancellationToken,
) -> (JobQueueRunner, JobQueue) {
    let (intake_tx, intake_rx) = mpsc::unbounded_channel();
    let queue = JobQueue {
        inner: Arc::new(QueueInner {
            store,
            registry,
            backend,
            intake: intake_tx,
            ids: JobIdGenerator::new(),
            retry_policy: RetryPolicy::new(settings),
            pending_trims: Mutex::new(BTreeSet::new()),
            trim_requested: Notify::new(),
            resuming: Mutex::new(HashMap::new()),
            has_resumed_pending_jobs: AtomicBool::new(false),
            shutdown,
        }),
    };
    let runner = JobQueueRunner::new(
        queue.clone(),
        intake_rx,
        settings.media_workers,
        Duration::from_secs(settings.shutdown_timeout_secs),
    );
    (runner, queue)
}

impl JobQueue {
    /// Assigns an id to `job`, persists it, then queues it for execution.
    ///
    /// The returned error only covers submission; execution failures are
    /// handled by the queue itself.
    pub fn add(&self, mut job: Job) -> Result<JobId, SubmissionError> {
        if let Some(id) = job.id() {
            return Err(SubmissionError::AlreadySubmitted(id.clone()));
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(SubmissionError::QueueClosed);
        }

        let id = self.inner.ids.next_id();
        job.assign_id(id.clone());
        self.inner
            .store
            .persist_job(&job)
            .map_err(SubmissionError::Store)?;
        debug!("Queued {} job {}", job.type_key(), id);
        metrics::record_job_submitted(job.type_key());
        self.enqueue(job)?;
        Ok(id)
    }

    /// Queues a parked send job again without persisting it.
    ///
    /// Returns `Ok(false)` when the same job is already being resumed. That run
    /// is then queued once more if it parks again.
    pub fn resume_pending_send_message(&self, job: Job) -> Result<bool, SubmissionError> {
        let Some(id) = job.id().cloned() else {
            error!("Cannot resume a {} job without an id", job.type_key());
            return Err(SubmissionError::MissingId);
        };
        {
            let mut resuming = self.inner.resuming.lock().unwrap();
            if let Some(requested_again) = resuming.get_mut(&id) {
                debug!("Job {} is already being resumed", id);
                *requested_again = true;
                return Ok(false);
            }
            resuming.insert(id.clone(), false);
        }
        info!("Resuming {} job {}", job.type_key(), id);
        if let Err(e) = self.enqueue(job) {
            self.inner.resuming.lock().unwrap().remove(&id);
            return Err(e);
        }
        Ok(true)
    }

    /// Loads a send job from the store and resumes it. A missing job is not an error.
    pub fn resume_message_send_job_if_needed(&self, id: &JobId) -> Result<bool, SubmissionError> {
        match self
            .inner
            .store
            .get_message_send_job(id)
            .map_err(SubmissionError::Store)?
        {
            Some(job) => self.resume_pending_send_message(job),
            None => Ok(false),
        }
    }

    /// Asks for the conversation to be trimmed once the queue is idle. Repeated
    /// requests before then are merged.
    pub fn queue_thread_for_trim(&self, thread_id: i64) {
        self.inner.pending_trims.lock().unwrap().insert(thread_id);
        self.inner.trim_requested.notify_one();
    }

    /// Re-queues every persisted job, in id order, under its original id.
    ///
    /// Rows that cannot be rebuilt are deleted. Only the first call per queue
    /// does anything; later calls return `Ok(0)`.
    pub fn resume_pending_jobs(&self) -> Result<usize, SubmissionError> {
        if self
            .inner
            .has_resumed_pending_jobs
            .swap(true, Ordering::SeqCst)
        {
            debug!("Pending jobs were already resumed");
            return Ok(0);
        }

        let store = &self.inner.store;
        if let Err(e) = store.delete_canceled_jobs() {
            warn!("Failed to delete canceled jobs: {:#}", e);
        }

        let mut type_keys: Vec<String> = self
            .inner
            .registry
            .type_keys()
            .iter()
            .map(|key| key.to_string())
            .collect();
        for stored_key in store.get_pending_type_keys().map_err(SubmissionError::Store)? {
            if !type_keys.contains(&stored_key) {
                warn!("Found jobs of unregistered type {}", stored_key);
                type_keys.push(stored_key);
            }
        }

        let mut resumed = 0;
        for type_key in &type_keys {
            let mut jobs = Vec::new();
            for (id, job) in store
                .get_all_pending_jobs(type_key)
                .map_err(SubmissionError::Store)?
            {
                match job {
                    Some(job) => jobs.push(job),
                    None => {
                        warn!("Dropping unrecoverable {} job {}", type_key, id);
                        if let Err(e) = store.mark_job_as_failed_permanently(&id) {
                            error!("Failed to delete job {}: {:#}", id, e);
                        }
                    }
                }
            }
            jobs.sort_by(|a, b| a.id().cmp(&b.id()));
            for job in jobs {
                debug!(
                    "Resuming {} job {:?} (failures: {})",
                    type_key,
                    job.id(),
                    job.failure_count()
                );
                self.enqueue(job)?;
                resumed += 1;
            }
        }

        info!("Resumed {} pending jobs", resumed);
        metrics::record_jobs_recovered(resumed);
        Ok(resumed)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn job_context(&self) -> JobContext {
        JobContext::new(
            self.inner.shutdown.clone(),
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.backend),
            self.clone(),
        )
    }

    /// Submits one trim job per pending conversation. Returns how many were submitted.
    pub(crate) fn submit_pending_trims(&self) -> usize {
        let thread_ids = std::mem::take(&mut *self.inner.pending_trims.lock().unwrap());
        for &thread_id in &thread_ids {
            if let Err(e) = self.add(Job::new(TrimThreadJob::new(thread_id, None))) {
                error!("Failed to queue trim of thread {}: {}", thread_id, e);
            }
        }
        thread_ids.len()
    }

    pub(crate) async fn trim_requested(&self) {
        self.inner.trim_requested.notified().await
    }

    fn enqueue(&self, job: Job) -> Result<(), SubmissionError> {
        self.inner
            .intake
            .send(job)
            .map_err(|_| SubmissionError::QueueClosed)
    }

    /// Returns whether a resume was requested while the job was running.
    fn release_resume_guard(&self, job: &Job) -> bool {
        job.id()
            .and_then(|id| self.inner.resuming.lock().unwrap().remove(id))
            .unwrap_or(false)
    }

    /// Whether trim requests are waiting to be submitted.
    pub(crate) fn has_pending_trims(&self) -> bool {
        !self.inner.pending_trims.lock().unwrap().is_empty()
    }

    fn schedule_retry(&self, job: Job, delay: Duration) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                "No runtime to schedule retry of job {:?}; it stays persisted",
                job.id()
            );
            return;
        };
        let intake = self.inner.intake.clone();
        let shutdown = self.inner.shutdown.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // A closed intake means the queue is gone; the job is still persisted
                    let _ = intake.send(job);
                }
            }
        });
    }

    /// Replaces a partially failed batch by a new job holding only the failed items.
    fn split_batch(&self, parent: &Job, subset: BatchMessageReceiveJob) {
        let mut replacement = Job::new(subset).with_failure_count(parent.failure_count() + 1);
        let replacement_id = self.inner.ids.next_id();
        replacement.assign_id(replacement_id.clone());

        let persisted = match parent.id() {
            Some(parent_id) => self.inner.store.replace_job(parent_id, &replacement),
            None => self.inner.store.persist_job(&replacement),
        };
        if let Err(e) = persisted {
            error!(
                "Failed to persist retry batch {} for job {:?}: {:#}",
                replacement_id,
                parent.id(),
                e
            );
        }

        info!(
            "Batch job {:?} partially failed, retrying the failed messages as job {}",
            parent.id(),
            replacement_id
        );
        metrics::record_job_outcome(parent.lane().name(), parent.type_key(), JobOutcome::Split);
        if let Err(e) = self.enqueue(replacement) {
            warn!("Could not queue retry batch {}: {}", replacement_id, e);
        }
    }
}

impl JobDelegate for JobQueue {
    fn handle_job_succeeded(&self, job: Job) {
        self.release_resume_guard(&job);
        if let Some(id) = job.id() {
            if let Err(e) = self.inner.store.mark_job_as_succeeded(id) {
                error!("Failed to remove finished job {}: {:#}", id, e);
            }
            info!("{} job {} succeeded", job.type_key(), id);
        }
        metrics::record_job_outcome(job.lane().name(), job.type_key(), JobOutcome::Succeeded);
    }

    fn handle_job_failed(&self, mut job: Job, error: JobError) {
        let resume_requested = self.release_resume_guard(&job);
        let lane = job.lane();

        match self.inner.store.is_job_canceled(&job) {
            Ok(true) => {
                info!("Dropping canceled {} job {:?}", job.type_key(), job.id());
                metrics::record_job_outcome(lane.name(), job.type_key(), JobOutcome::Canceled);
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(
                "Could not check whether job {:?} was canceled: {:#}",
                job.id(),
                e
            ),
        }

        if matches!(error, JobError::AwaitingAttachmentUpload) {
            debug!("Job {:?} parked until its attachments are uploaded", job.id());
            metrics::record_job_outcome(lane.name(), job.type_key(), JobOutcome::Parked);
            if resume_requested {
                // An upload finished while this run was checking attachments
                if let Err(e) = self.resume_pending_send_message(job) {
                    warn!("Could not resume parked send job: {}", e);
                }
            }
            return;
        }

        // Only a batch's first attempt is split; later attempts retry as a whole
        if job.failure_count() == 0 {
            if let JobKind::BatchMessageReceive(batch) = job.kind() {
                if let Some(subset) = batch.failed_subset() {
                    self.split_batch(&job, subset);
                    return;
                }
            }
        }

        let failure_count = job.increment_failure_count();
        if failure_count >= job.max_failure_count() {
            self.handle_job_failed_permanently(job, error);
            return;
        }

        if let Err(e) = self.inner.store.persist_job(&job) {
            error!("Failed to persist failure of job {:?}: {:#}", job.id(), e);
        }
        let delay = self.inner.retry_policy.backoff(failure_count);
        info!(
            "{} job {:?} failed ({}), retrying in {:?} (failure {}/{})",
            job.type_key(),
            job.id(),
            error,
            delay,
            failure_count,
            job.max_failure_count()
        );
        metrics::record_job_outcome(lane.name(), job.type_key(), JobOutcome::Retried);
        metrics::record_job_retry(job.type_key());
        self.schedule_retry(job, delay);
    }

    fn handle_job_failed_permanently(&self, job: Job, error: JobError) {
        self.release_resume_guard(&job);
        error!(
            "{} job {:?} failed permanently after {} failures: {}",
            job.type_key(),
            job.id(),
            job.failure_count(),
            error
        );
        if let Some(id) = job.id() {
            if let Err(e) = self.inner.store.mark_job_as_failed_permanently(id) {
                error!("Failed to remove failed job {}: {:#}", id, e);
            }
        }
        job.handle_permanent_failure(&self.job_context(), &error);
        metrics::record_job_outcome(
            job.lane().name(),
            job.type_key(),
            JobOutcome::FailedPermanently,
        );
    }
}
