//! Persistent job queue for messaging work.
//!
//! Jobs are persisted before they run, executed on a lane chosen by their kind,
//! retried with exponential backoff and resumed after a restart.

mod context;
mod data;
mod delegate;
mod error;
mod id;
mod job;
pub mod jobs;
mod lane;
mod queue;
mod registry;
mod retry_policy;
mod runner;
#[cfg(test)]
mod test_support;

pub use context::JobContext;
pub use data::{JobData, JobDataBuilder, JobDataError, JobValue};
pub use delegate::JobDelegate;
pub use error::{JobError, SubmissionError};
pub use id::{JobId, JobIdGenerator};
pub use job::Job;
pub use lane::Lane;
pub use queue::{create_job_queue, JobQueue};
pub use registry::{JobFactory, JobFactoryRegistry};
pub use retry_policy::RetryPolicy;
pub use runner::JobQueueRunner;
