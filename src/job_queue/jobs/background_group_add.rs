use super::JobBody;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;

/// Joins an open group from a join URL (`https://server/room?public_key=...`).
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundGroupAddJob {
    pub join_url: String,
}

impl BackgroundGroupAddJob {
    pub fn new(join_url: impl Into<String>) -> Self {
        Self {
            join_url: join_url.into(),
        }
    }

    /// The join URL without its query string.
    pub fn open_group_id(&self) -> String {
        match self.join_url.split_once('?') {
            Some((base, _)) => base.to_string(),
            None => self.join_url.clone(),
        }
    }
}

const JOIN_URL_KEY: &str = "join_url";

impl JobBody for BackgroundGroupAddJob {
    const TYPE_KEY: &'static str = "BackgroundGroupAddJob";
    const MAX_FAILURE_COUNT: u32 = 10;

    fn serialize(&self) -> JobData {
        JobData::builder().string(JOIN_URL_KEY, &self.join_url).build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self::new(data.string(JOIN_URL_KEY)?.as_str()))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        ctx.backend.join_open_group(&self.join_url)
    }
}
