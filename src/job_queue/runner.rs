//! Drives queued jobs through their execution lanes.
//!
//! The router drains the intake channel and forwards every job to its lane:
//! - `tx`: started in arrival order, run concurrently
//! - `rx`: one job at a time
//! - `media`: a fixed pool of workers
//! - `open_group`: one serial worker per open group, created on first use

use super::job::Job;
use super::lane::Lane;
use super::queue::JobQueue;
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub struct JobQueueRunner {
    queue: JobQueue,
    intake: UnboundedReceiver<Job>,
    media_workers: usize,
    shutdown_timeout: Duration,
}

struct LaneSenders {
    tx: UnboundedSender<Job>,
    rx: UnboundedSender<Job>,
    media: UnboundedSender<Job>,
    open_group: UnboundedSender<(String, Job)>,
}

impl LaneSenders {
    fn route(&self, job: Job) {
        let lane = job.lane();
        let id = job.id().cloned();
        let sent = match lane {
            Lane::Tx => self.tx.send(job).is_ok(),
            Lane::Rx => self.rx.send(job).is_ok(),
            Lane::Media => self.media.send(job).is_ok(),
            Lane::OpenGroup(ref group_id) => self.open_group.send((group_id.clone(), job)).is_ok(),
        };
        if !sent {
            warn!("Lane {} is closed, job {:?} stays persisted", lane, id);
        }
    }
}

impl JobQueueRunner {
    pub(crate) fn new(
        queue: JobQueue,
        intake: UnboundedReceiver<Job>,
        media_workers: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            intake,
            media_workers,
            shutdown_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn intake_mut(&mut self) -> &mut UnboundedReceiver<Job> {
        &mut self.intake
    }

    /// Runs until the queue's shutdown token is cancelled, then gives running
    /// jobs up to the shutdown timeout to finish.
    pub async fn run(self) {
        let Self {
            queue,
            mut intake,
            media_workers,
            shutdown_timeout,
        } = self;
        let shutdown = queue.shutdown_token();
        let mut lanes = JoinSet::new();

        let (tx_sender, tx_jobs) = mpsc::unbounded_channel();
        lanes.spawn(run_concurrent_lane(queue.clone(), tx_jobs));

        let (rx_sender, rx_jobs) = mpsc::unbounded_channel();
        lanes.spawn(run_serial_lane(Lane::Rx, queue.clone(), rx_jobs));

        let (media_sender, media_jobs) = mpsc::unbounded_channel();
        let media_jobs = Arc::new(Mutex::new(media_jobs));
        for worker in 0..media_workers {
            lanes.spawn(run_media_worker(
                worker,
                queue.clone(),
                Arc::clone(&media_jobs),
            ));
        }

        let (open_group_sender, open_group_jobs) = mpsc::unbounded_channel();
        lanes.spawn(run_open_group_dispatcher(queue.clone(), open_group_jobs));

        let senders = LaneSenders {
            tx: tx_sender,
            rx: rx_sender,
            media: media_sender,
            open_group: open_group_sender,
        };

        info!("Starting job queue with {} media workers", media_workers);
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match intake.try_recv() {
                Ok(job) => senders.route(job),
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    if queue.has_pending_trims() {
                        // Submitting persists each trim job
                        let submitter = queue.clone();
                        match tokio::task::spawn_blocking(move || submitter.submit_pending_trims())
                            .await
                        {
                            Ok(0) => {}
                            Ok(_) => continue,
                            Err(e) => error!("Submitting trim jobs did not complete: {}", e),
                        }
                    }
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        job = intake.recv() => match job {
                            Some(job) => senders.route(job),
                            None => break,
                        },
                        _ = queue.trim_requested() => {}
                    }
                }
            }
        }

        info!("Shutting down job queue...");
        drop(senders);
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while lanes.join_next().await.is_some() {}
        })
        .await;
        match drained {
            Ok(()) => info!("Job queue stopped"),
            Err(_) => {
                warn!(
                    "Jobs still running after {:?}, abandoning them",
                    shutdown_timeout
                );
                lanes.abort_all();
            }
        }
    }
}

/// Runs one job on the blocking pool. The job reports its own outcome.
async fn run_job(lane: &Lane, queue: &JobQueue, job: Job) {
    let ctx = queue.job_context();
    let delegate = queue.clone();
    debug!("Running {} job {:?} on lane {}", job.type_key(), job.id(), lane);

    let start_time = Instant::now();
    let result = tokio::task::spawn_blocking(move || job.execute(&ctx, &delegate)).await;
    metrics::observe_job_duration(lane.name(), start_time.elapsed());

    if let Err(e) = result {
        error!("Job task on lane {} did not complete: {}", lane, e);
    }
}

async fn run_concurrent_lane(queue: JobQueue, mut jobs: UnboundedReceiver<Job>) {
    let shutdown = queue.shutdown_token();
    let mut running = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(_) = running.join_next(), if !running.is_empty() => {}
            job = jobs.recv() => match job {
                Some(job) => {
                    let queue = queue.clone();
                    running.spawn(async move { run_job(&Lane::Tx, &queue, job).await });
                }
                None => break,
            },
        }
    }
    while running.join_next().await.is_some() {}
}

async fn run_serial_lane(lane: Lane, queue: JobQueue, mut jobs: UnboundedReceiver<Job>) {
    let shutdown = queue.shutdown_token();
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        run_job(&lane, &queue, job).await;
    }
    debug!("Lane {} stopped", lane);
}

async fn run_media_worker(
    worker: usize,
    queue: JobQueue,
    jobs: Arc<Mutex<UnboundedReceiver<Job>>>,
) {
    let shutdown = queue.shutdown_token();
    loop {
        let next = {
            let mut jobs = jobs.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                job = jobs.recv() => job,
            }
        };
        let Some(job) = next else {
            break;
        };
        run_job(&Lane::Media, &queue, job).await;
    }
    debug!("Media worker {} stopped", worker);
}

async fn run_open_group_dispatcher(
    queue: JobQueue,
    mut jobs: UnboundedReceiver<(String, Job)>,
) {
    let shutdown = queue.shutdown_token();
    let mut groups: HashMap<String, UnboundedSender<Job>> = HashMap::new();
    let mut workers = JoinSet::new();
    loop {
        let (group_id, job) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = jobs.recv() => match next {
                Some(next) => next,
                None => break,
            },
        };
        let sender = groups.entry(group_id.clone()).or_insert_with(|| {
            let (sender, group_jobs) = mpsc::unbounded_channel();
            workers.spawn(run_serial_lane(
                Lane::OpenGroup(group_id.clone()),
                queue.clone(),
                group_jobs,
            ));
            metrics::record_open_group_queue_created();
            debug!("Created queue for open group {}", group_id);
            sender
        });
        if sender.send(job).is_err() {
            warn!("Queue for open group {} is closed", group_id);
        }
    }
    drop(groups);
    while workers.join_next().await.is_some() {}
}
