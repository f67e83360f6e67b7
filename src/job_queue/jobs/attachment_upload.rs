use super::{put_destination, read_destination, JobBody, JobKind};
use crate::backend::Destination;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentUploadJob {
    pub attachment_id: i64,
    pub thread_id: i64,
    pub destination: Destination,
    /// The send job parked on this upload, if any.
    pub message_send_job_id: Option<JobId>,
}

impl AttachmentUploadJob {
    pub fn new(
        attachment_id: i64,
        thread_id: i64,
        destination: Destination,
        message_send_job_id: Option<JobId>,
    ) -> Self {
        Self {
            attachment_id,
            thread_id,
            destination,
            message_send_job_id,
        }
    }

    fn fail_parked_send(&self, send_job_id: &JobId, ctx: &JobContext, error: &JobError) {
        let send_job = match ctx.store.get_message_send_job(send_job_id) {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                error!(
                    "Failed to load send job {} after upload failure: {:#}",
                    send_job_id, e
                );
                return;
            }
        };
        if let JobKind::MessageSend(send) = send_job.kind() {
            ctx.backend.handle_failed_message_send(&send.message, error);
        }
        if let Err(e) = ctx.store.mark_job_as_failed_permanently(send_job_id) {
            error!("Failed to remove send job {}: {:#}", send_job_id, e);
        }
    }
}

const ATTACHMENT_ID_KEY: &str = "attachment_id";
const THREAD_ID_KEY: &str = "thread_id";
const MESSAGE_SEND_JOB_ID_KEY: &str = "message_send_job_id";

impl JobBody for AttachmentUploadJob {
    const TYPE_KEY: &'static str = "AttachmentUploadJob";
    const MAX_FAILURE_COUNT: u32 = 20;

    fn serialize(&self) -> JobData {
        let builder = JobData::builder()
            .long(ATTACHMENT_ID_KEY, self.attachment_id)
            .long(THREAD_ID_KEY, self.thread_id)
            .optional_string(
                MESSAGE_SEND_JOB_ID_KEY,
                self.message_send_job_id.as_ref().map(JobId::as_str),
            );
        put_destination(builder, &self.destination).build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self {
            attachment_id: *data.long(ATTACHMENT_ID_KEY)?,
            thread_id: *data.long(THREAD_ID_KEY)?,
            destination: read_destination(data)?,
            message_send_job_id: data
                .optional_string(MESSAGE_SEND_JOB_ID_KEY)?
                .map(|id| JobId::from_raw(id.as_str())),
        })
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        ctx.backend
            .upload_attachment(self.attachment_id, self.thread_id, &self.destination)?;
        info!("Attachment {} uploaded", self.attachment_id);

        if let Some(send_job_id) = &self.message_send_job_id {
            if let Err(e) = ctx.queue.resume_message_send_job_if_needed(send_job_id) {
                warn!(
                    "Attachment {} uploaded but send job {} could not be resumed: {}",
                    self.attachment_id, send_job_id, e
                );
            }
        }
        Ok(())
    }

    fn handle_permanent_failure(
        &self,
        _job_id: Option<&JobId>,
        ctx: &JobContext,
        error: &JobError,
    ) {
        if let Some(send_job_id) = &self.message_send_job_id {
            self.fail_parked_send(send_job_id, ctx, error);
        }
    }
}
