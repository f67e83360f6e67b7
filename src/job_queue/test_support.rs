//! Backend double for unit tests. Every call succeeds.

use crate::backend::{
    Destination, MessagingBackend, OutgoingMessage, PushNotification, ReceivedMessage,
};
use crate::job_queue::JobError;
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct RecordingBackend {
    failed_sends: Mutex<Vec<i64>>,
}

impl RecordingBackend {
    /// Message ids reported through `handle_failed_message_send`.
    pub(crate) fn failed_sends(&self) -> Vec<i64> {
        self.failed_sends.lock().unwrap().clone()
    }
}

impl MessagingBackend for RecordingBackend {
    fn send_message(&self, _: &OutgoingMessage, _: &Destination) -> Result<(), JobError> {
        Ok(())
    }

    fn handle_failed_message_send(&self, message: &OutgoingMessage, _: &JobError) {
        self.failed_sends.lock().unwrap().push(message.message_id);
    }

    fn is_attachment_uploaded(&self, _: i64) -> bool {
        true
    }

    fn upload_attachment(&self, _: i64, _: i64, _: &Destination) -> Result<(), JobError> {
        Ok(())
    }

    fn download_attachment(&self, _: i64, _: i64) -> Result<(), JobError> {
        Ok(())
    }

    fn process_received_message(
        &self,
        _: &ReceivedMessage,
        _: Option<&str>,
    ) -> Result<(), JobError> {
        Ok(())
    }

    fn notify_push_server(&self, _: &PushNotification) -> Result<(), JobError> {
        Ok(())
    }

    fn trim_thread(&self, _: i64, _: Option<&str>) -> Result<(), JobError> {
        Ok(())
    }

    fn download_group_avatar(&self, _: &str, _: &str, _: Option<&str>) -> Result<(), JobError> {
        Ok(())
    }

    fn delete_open_group_messages(&self, _: &str, _: i64, _: &[i64]) -> Result<(), JobError> {
        Ok(())
    }

    fn join_open_group(&self, _: &str) -> Result<(), JobError> {
        Ok(())
    }
}
