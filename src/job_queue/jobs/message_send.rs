use super::{put_destination, read_destination, unavailable, AttachmentUploadJob, JobBody};
use crate::backend::{Destination, OutgoingMessage};
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;
use crate::job_queue::job::Job;
use tracing::{debug, info};

/// Sends one message, after every attachment it references is uploaded.
///
/// When attachments are still pending the job parks itself by failing with
/// [`JobError::AwaitingAttachmentUpload`]; the upload job resumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSendJob {
    pub message: OutgoingMessage,
    pub destination: Destination,
}

impl MessageSendJob {
    pub fn new(message: OutgoingMessage, destination: Destination) -> Self {
        Self {
            message,
            destination,
        }
    }

    /// Makes sure an upload job exists for every attachment that still needs one.
    /// Returns how many attachments are not uploaded yet.
    fn ensure_uploads_queued(
        &self,
        job_id: Option<&JobId>,
        ctx: &JobContext,
    ) -> Result<usize, JobError> {
        let mut pending = 0;
        for &attachment_id in &self.message.attachment_ids {
            if ctx.backend.is_attachment_uploaded(attachment_id) {
                continue;
            }
            pending += 1;

            let existing = ctx
                .store
                .get_attachment_upload_job(attachment_id)
                .map_err(|e| unavailable("reading upload jobs", format!("{:#}", e)))?;
            if existing.is_some() {
                debug!(
                    "Upload of attachment {} for message {} already queued",
                    attachment_id, self.message.message_id
                );
                continue;
            }

            let upload = AttachmentUploadJob::new(
                attachment_id,
                self.message.thread_id,
                self.destination.clone(),
                job_id.cloned(),
            );
            ctx.queue
                .add(Job::new(upload))
                .map_err(|e| unavailable("queueing attachment upload", e))?;
        }
        Ok(pending)
    }
}

const MESSAGE_ID_KEY: &str = "message_id";
const THREAD_ID_KEY: &str = "thread_id";
const SENT_TIMESTAMP_KEY: &str = "sent_timestamp";
const BODY_KEY: &str = "body";
const ATTACHMENT_IDS_KEY: &str = "attachment_ids";

impl JobBody for MessageSendJob {
    const TYPE_KEY: &'static str = "MessageSendJob";
    const MAX_FAILURE_COUNT: u32 = 10;

    fn serialize(&self) -> JobData {
        let builder = JobData::builder()
            .long(MESSAGE_ID_KEY, self.message.message_id)
            .long(THREAD_ID_KEY, self.message.thread_id)
            .long(SENT_TIMESTAMP_KEY, self.message.sent_timestamp)
            .bytes(BODY_KEY, self.message.body.clone())
            .long_array(ATTACHMENT_IDS_KEY, self.message.attachment_ids.clone());
        put_destination(builder, &self.destination).build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self {
            message: OutgoingMessage {
                message_id: *data.long(MESSAGE_ID_KEY)?,
                thread_id: *data.long(THREAD_ID_KEY)?,
                sent_timestamp: *data.long(SENT_TIMESTAMP_KEY)?,
                body: data.bytes(BODY_KEY)?.clone(),
                attachment_ids: data.long_array(ATTACHMENT_IDS_KEY)?.clone(),
            },
            destination: read_destination(data)?,
        })
    }

    fn execute(&mut self, job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        let pending = self.ensure_uploads_queued(job_id, ctx)?;
        if pending > 0 {
            info!(
                "Message {} waits for {} attachment upload(s)",
                self.message.message_id, pending
            );
            return Err(JobError::AwaitingAttachmentUpload);
        }
        ctx.backend.send_message(&self.message, &self.destination)
    }

    fn handle_permanent_failure(
        &self,
        _job_id: Option<&JobId>,
        ctx: &JobContext,
        error: &JobError,
    ) {
        ctx.backend.handle_failed_message_send(&self.message, error);
    }
}

#[cfg(test)]
impl MessageSendJob {
    pub(crate) fn sample() -> Self {
        Self::new(
            OutgoingMessage {
                message_id: 11,
                thread_id: 3,
                sent_timestamp: 1_700_000_000_000,
                body: b"hello".to_vec(),
                attachment_ids: vec![],
            },
            Destination::Contact {
                public_key: "05deadbeef".to_string(),
            },
        )
    }
}
