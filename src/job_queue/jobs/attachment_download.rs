use super::JobBody;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDownloadJob {
    pub attachment_id: i64,
    pub message_id: i64,
}

impl AttachmentDownloadJob {
    pub fn new(attachment_id: i64, message_id: i64) -> Self {
        Self {
            attachment_id,
            message_id,
        }
    }
}

const ATTACHMENT_ID_KEY: &str = "attachment_id";
const MESSAGE_ID_KEY: &str = "message_id";

impl JobBody for AttachmentDownloadJob {
    const TYPE_KEY: &'static str = "AttachmentDownloadJob";
    const MAX_FAILURE_COUNT: u32 = 2;

    fn serialize(&self) -> JobData {
        JobData::builder()
            .long(ATTACHMENT_ID_KEY, self.attachment_id)
            .long(MESSAGE_ID_KEY, self.message_id)
            .build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self::new(
            *data.long(ATTACHMENT_ID_KEY)?,
            *data.long(MESSAGE_ID_KEY)?,
        ))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        ctx.backend
            .download_attachment(self.attachment_id, self.message_id)
    }
}
