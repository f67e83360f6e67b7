use super::context::JobContext;
use super::data::JobData;
use super::delegate::JobDelegate;
use super::error::JobError;
use super::id::JobId;
use super::jobs::JobKind;
use super::lane::Lane;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// A unit of persistable work: a kind-specific body plus the bookkeeping the
/// queue needs (id, failure count).
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: Option<JobId>,
    failure_count: u32,
    kind: JobKind,
}

impl Job {
    pub fn new(kind: impl Into<JobKind>) -> Self {
        Self {
            id: None,
            failure_count: 0,
            kind: kind.into(),
        }
    }

    /// Rebuilds a job read back from storage.
    pub(crate) fn restore(id: JobId, failure_count: u32, kind: JobKind) -> Self {
        Self {
            id: Some(id),
            failure_count,
            kind,
        }
    }

    pub fn id(&self) -> Option<&JobId> {
        self.id.as_ref()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn max_failure_count(&self) -> u32 {
        self.kind.max_failure_count()
    }

    pub fn type_key(&self) -> &'static str {
        self.kind.type_key()
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn lane(&self) -> Lane {
        Lane::for_kind(&self.kind)
    }

    pub fn serialize(&self) -> JobData {
        self.kind.serialize()
    }

    pub(crate) fn assign_id(&mut self, id: JobId) {
        debug_assert!(self.id.is_none(), "job id is assigned exactly once");
        self.id = Some(id);
    }

    pub(crate) fn with_failure_count(mut self, failure_count: u32) -> Self {
        self.failure_count = failure_count;
        self
    }

    pub(crate) fn increment_failure_count(&mut self) -> u32 {
        self.failure_count += 1;
        self.failure_count
    }

    /// Runs the body and reports the outcome through exactly one delegate call.
    ///
    /// Must be called from a context where blocking is fine.
    pub fn execute(mut self, ctx: &JobContext, delegate: &dyn JobDelegate) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.kind.execute(self.id.as_ref(), ctx)
        }))
        .unwrap_or_else(|payload| Err(JobError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(()) => delegate.handle_job_succeeded(self),
            Err(error) if error.is_permanent() => {
                delegate.handle_job_failed_permanently(self, error)
            }
            Err(error) => delegate.handle_job_failed(self, error),
        }
    }

    pub(crate) fn handle_permanent_failure(&self, ctx: &JobContext, error: &JobError) {
        self.kind
            .handle_permanent_failure(self.id.as_ref(), ctx, error);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
