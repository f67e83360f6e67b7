use super::JobBody;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;

#[derive(Debug, Clone, PartialEq)]
pub struct GroupAvatarDownloadJob {
    pub server: String,
    pub room: String,
    pub image_id: Option<String>,
}

impl GroupAvatarDownloadJob {
    pub fn new(
        server: impl Into<String>,
        room: impl Into<String>,
        image_id: Option<String>,
    ) -> Self {
        Self {
            server: server.into(),
            room: room.into(),
            image_id,
        }
    }

    /// `server.room`, the same id the room's other jobs are serialized under.
    pub fn open_group_id(&self) -> String {
        format!("{}.{}", self.server, self.room)
    }
}

const SERVER_KEY: &str = "server";
const ROOM_KEY: &str = "room";
const IMAGE_ID_KEY: &str = "image_id";

impl JobBody for GroupAvatarDownloadJob {
    const TYPE_KEY: &'static str = "GroupAvatarDownloadJob";
    const MAX_FAILURE_COUNT: u32 = 10;

    fn serialize(&self) -> JobData {
        JobData::builder()
            .string(SERVER_KEY, &self.server)
            .string(ROOM_KEY, &self.room)
            .optional_string(IMAGE_ID_KEY, self.image_id.as_deref())
            .build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self::new(
            data.string(SERVER_KEY)?.as_str(),
            data.string(ROOM_KEY)?.as_str(),
            data.optional_string(IMAGE_ID_KEY)?.cloned(),
        ))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        ctx.backend
            .download_group_avatar(&self.server, &self.room, self.image_id.as_deref())
    }
}
