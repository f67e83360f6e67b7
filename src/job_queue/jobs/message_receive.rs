use super::JobBody;
use crate::backend::ReceivedMessage;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageReceiveJob {
    pub message: ReceivedMessage,
}

impl MessageReceiveJob {
    pub fn new(message: ReceivedMessage) -> Self {
        Self { message }
    }
}

const DATA_KEY: &str = "data";
const SERVER_HASH_KEY: &str = "server_hash";
const OPEN_GROUP_SERVER_ID_KEY: &str = "open_group_server_id";

impl JobBody for MessageReceiveJob {
    const TYPE_KEY: &'static str = "MessageReceiveJob";
    const MAX_FAILURE_COUNT: u32 = 10;

    fn serialize(&self) -> JobData {
        JobData::builder()
            .bytes(DATA_KEY, self.message.data.clone())
            .optional_string(SERVER_HASH_KEY, self.message.server_hash.as_deref())
            .optional_long(OPEN_GROUP_SERVER_ID_KEY, self.message.open_group_server_id)
            .build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self::new(ReceivedMessage {
            data: data.bytes(DATA_KEY)?.clone(),
            server_hash: data.optional_string(SERVER_HASH_KEY)?.cloned(),
            open_group_server_id: data.optional_long(OPEN_GROUP_SERVER_ID_KEY)?.copied(),
        }))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        ctx.backend.process_received_message(&self.message, None)
    }
}
