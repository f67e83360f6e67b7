//! Common test infrastructure
//!
//! Queues created here run against a SQLite file in a temporary directory and a
//! [`FakeBackend`] that records every call. Retries use a 1 ms base interval.

mod backend;

pub use backend::{Call, FakeBackend};

use messaging_job_queue::backend::{Destination, OutgoingMessage, ReceivedMessage};
use messaging_job_queue::config::JobQueueSettings;
use messaging_job_queue::job_queue::{
    create_job_queue, JobFactoryRegistry, JobQueue, JobQueueRunner,
};
use messaging_job_queue::job_store::{JobStore, SqliteJobStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A jobs database that outlives individual queues.
pub struct TestDb {
    dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("jobs.db")
    }
}

pub struct TestQueue {
    pub queue: JobQueue,
    pub store: Arc<SqliteJobStore>,
    pub backend: Arc<FakeBackend>,
    shutdown: CancellationToken,
    runner: Option<JoinHandle<()>>,
    // Held so submissions are accepted while the runner is not started
    parked_runner: Option<JobQueueRunner>,
}

fn test_settings() -> JobQueueSettings {
    JobQueueSettings {
        retry_base_interval_ms: 1,
        shutdown_timeout_secs: 5,
        ..JobQueueSettings::default()
    }
}

impl TestQueue {
    /// Creates a queue and starts its runner.
    pub fn start(db: &TestDb, backend: Arc<FakeBackend>) -> Self {
        let mut queue = Self::idle(db, backend);
        if let Some(runner) = queue.parked_runner.take() {
            queue.runner = Some(tokio::spawn(runner.run()));
        }
        queue
    }

    /// Creates a queue whose runner never starts: jobs are only persisted.
    pub fn idle(db: &TestDb, backend: Arc<FakeBackend>) -> Self {
        let registry = Arc::new(JobFactoryRegistry::with_default_jobs());
        let store = Arc::new(SqliteJobStore::new(db.path(), registry.clone()).unwrap());
        let shutdown = CancellationToken::new();
        let (runner, queue) = create_job_queue(
            store.clone(),
            registry,
            backend.clone(),
            &test_settings(),
            shutdown.clone(),
        );
        Self {
            queue,
            store,
            backend,
            shutdown,
            runner: None,
            parked_runner: Some(runner),
        }
    }

    pub fn pending_jobs(&self) -> usize {
        self.store.list_jobs(None).unwrap().len()
    }

    /// Cancels the queue and waits for its runner to return.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(runner) = self.runner.take() {
            tokio::time::timeout(Duration::from_secs(10), runner)
                .await
                .expect("runner did not stop")
                .unwrap();
        }
    }
}

/// Polls `condition` until it holds, failing the test after ten seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn received(text: &str) -> ReceivedMessage {
    ReceivedMessage::new(text.as_bytes().to_vec())
}

pub fn outgoing(message_id: i64, attachment_ids: Vec<i64>) -> OutgoingMessage {
    OutgoingMessage {
        message_id,
        thread_id: 1,
        sent_timestamp: 1_700_000_000_000,
        body: b"hi".to_vec(),
        attachment_ids,
    }
}

pub fn contact() -> Destination {
    Destination::Contact {
        public_key: "05abcdef".to_string(),
    }
}
