use super::JobBody;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;

/// Trims a conversation's history down to its configured length.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimThreadJob {
    pub thread_id: i64,
    pub open_group_id: Option<String>,
}

impl TrimThreadJob {
    pub fn new(thread_id: i64, open_group_id: Option<String>) -> Self {
        Self {
            thread_id,
            open_group_id,
        }
    }
}

const THREAD_ID_KEY: &str = "thread_id";
const OPEN_GROUP_ID_KEY: &str = "open_group_id";

impl JobBody for TrimThreadJob {
    const TYPE_KEY: &'static str = "TrimThreadJob";
    const MAX_FAILURE_COUNT: u32 = 1;

    fn serialize(&self) -> JobData {
        JobData::builder()
            .long(THREAD_ID_KEY, self.thread_id)
            .optional_string(OPEN_GROUP_ID_KEY, self.open_group_id.as_deref())
            .build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self::new(
            *data.long(THREAD_ID_KEY)?,
            data.optional_string(OPEN_GROUP_ID_KEY)?.cloned(),
        ))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        ctx.backend
            .trim_thread(self.thread_id, self.open_group_id.as_deref())
    }
}
