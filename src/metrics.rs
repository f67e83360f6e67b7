use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all job queue metrics
const PREFIX: &str = "job_queue";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref JOBS_SUBMITTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_submitted_total"), "Jobs accepted by the queue"),
        &["type"]
    ).expect("Failed to create jobs_submitted_total metric");

    pub static ref JOB_OUTCOMES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_outcomes_total"), "Job executions by outcome"),
        &["lane", "type", "outcome"]
    ).expect("Failed to create job_outcomes_total metric");

    pub static ref JOB_RETRIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_retries_total"), "Retries scheduled after a failure"),
        &["type"]
    ).expect("Failed to create job_retries_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Time spent running a job body"
        )
        .buckets(vec![0.005, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        &["lane"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref JOBS_RECOVERED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_jobs_recovered_total"),
        "Persisted jobs re-enqueued at startup"
    ).expect("Failed to create jobs_recovered_total metric");

    pub static ref OPEN_GROUP_QUEUES: Gauge = Gauge::new(
        format!("{PREFIX}_open_group_queues"),
        "Open-group sub-queues created so far"
    ).expect("Failed to create open_group_queues metric");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Retried,
    FailedPermanently,
    Canceled,
    /// Send job waiting for an attachment upload.
    Parked,
    /// Batch split into its failed subset.
    Split,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Retried => "retried",
            JobOutcome::FailedPermanently => "failed_permanently",
            JobOutcome::Canceled => "canceled",
            JobOutcome::Parked => "parked",
            JobOutcome::Split => "split",
        }
    }
}

pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(JOBS_SUBMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_OUTCOMES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RETRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_RECOVERED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(OPEN_GROUP_QUEUES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_job_submitted(type_key: &str) {
    JOBS_SUBMITTED_TOTAL.with_label_values(&[type_key]).inc();
}

pub fn record_job_outcome(lane: &str, type_key: &str, outcome: JobOutcome) {
    JOB_OUTCOMES_TOTAL
        .with_label_values(&[lane, type_key, outcome.as_str()])
        .inc();
}

pub fn record_job_retry(type_key: &str) {
    JOB_RETRIES_TOTAL.with_label_values(&[type_key]).inc();
}

pub fn observe_job_duration(lane: &str, duration: Duration) {
    JOB_DURATION_SECONDS
        .with_label_values(&[lane])
        .observe(duration.as_secs_f64());
}

pub fn record_jobs_recovered(count: usize) {
    JOBS_RECOVERED_TOTAL.inc_by(count as u64);
}

pub fn record_open_group_queue_created() {
    OPEN_GROUP_QUEUES.inc();
}

/// Renders the registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
