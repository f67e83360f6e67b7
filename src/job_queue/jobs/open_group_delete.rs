use super::JobBody;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;

/// Removes messages the open-group server reported as deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenGroupDeleteJob {
    pub open_group_id: String,
    pub thread_id: i64,
    pub message_server_ids: Vec<i64>,
}

impl OpenGroupDeleteJob {
    pub fn new(
        open_group_id: impl Into<String>,
        thread_id: i64,
        message_server_ids: Vec<i64>,
    ) -> Self {
        Self {
            open_group_id: open_group_id.into(),
            thread_id,
            message_server_ids,
        }
    }
}

const OPEN_GROUP_ID_KEY: &str = "open_group_id";
const THREAD_ID_KEY: &str = "thread_id";
const MESSAGE_SERVER_IDS_KEY: &str = "message_server_ids";

impl JobBody for OpenGroupDeleteJob {
    const TYPE_KEY: &'static str = "OpenGroupDeleteJob";
    const MAX_FAILURE_COUNT: u32 = 1;

    fn serialize(&self) -> JobData {
        JobData::builder()
            .string(OPEN_GROUP_ID_KEY, &self.open_group_id)
            .long(THREAD_ID_KEY, self.thread_id)
            .long_array(MESSAGE_SERVER_IDS_KEY, self.message_server_ids.clone())
            .build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self::new(
            data.string(OPEN_GROUP_ID_KEY)?.as_str(),
            *data.long(THREAD_ID_KEY)?,
            data.long_array(MESSAGE_SERVER_IDS_KEY)?.clone(),
        ))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        if self.message_server_ids.is_empty() {
            return Ok(());
        }
        ctx.backend.delete_open_group_messages(
            &self.open_group_id,
            self.thread_id,
            &self.message_server_ids,
        )
    }
}
