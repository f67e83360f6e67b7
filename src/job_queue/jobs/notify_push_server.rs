use super::JobBody;
use crate::backend::PushNotification;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;

/// Tells the push notification server a message was stored for a recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyPushServerJob {
    pub notification: PushNotification,
}

impl NotifyPushServerJob {
    pub fn new(notification: PushNotification) -> Self {
        Self { notification }
    }
}

const RECIPIENT_KEY: &str = "recipient";
const DATA_KEY: &str = "data";
const TTL_KEY: &str = "ttl_ms";
const TIMESTAMP_KEY: &str = "timestamp";

impl JobBody for NotifyPushServerJob {
    const TYPE_KEY: &'static str = "NotifyPNServerJob";
    const MAX_FAILURE_COUNT: u32 = 20;

    fn serialize(&self) -> JobData {
        JobData::builder()
            .string(RECIPIENT_KEY, &self.notification.recipient)
            .bytes(DATA_KEY, self.notification.data.clone())
            .long(TTL_KEY, self.notification.ttl_ms)
            .long(TIMESTAMP_KEY, self.notification.timestamp)
            .build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        Ok(Self::new(PushNotification {
            recipient: data.string(RECIPIENT_KEY)?.clone(),
            data: data.bytes(DATA_KEY)?.clone(),
            ttl_ms: *data.long(TTL_KEY)?,
            timestamp: *data.long(TIMESTAMP_KEY)?,
        }))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        ctx.backend.notify_push_server(&self.notification)
    }
}
