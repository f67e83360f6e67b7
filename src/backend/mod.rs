//! The messaging operations job bodies delegate to.
//!
//! Everything behind this trait (envelope parsing, encryption, onion requests,
//! message database writes) lives outside the queue. Calls are synchronous: job
//! bodies run on the blocking thread pool.

mod models;

pub use models::{Destination, OutgoingMessage, PushNotification, ReceivedMessage};

use crate::job_queue::JobError;

pub trait MessagingBackend: Send + Sync {
    fn send_message(
        &self,
        message: &OutgoingMessage,
        destination: &Destination,
    ) -> Result<(), JobError>;

    /// Marks the message as failed for whoever is showing it.
    fn handle_failed_message_send(&self, message: &OutgoingMessage, error: &JobError);

    fn is_attachment_uploaded(&self, attachment_id: i64) -> bool;

    fn upload_attachment(
        &self,
        attachment_id: i64,
        thread_id: i64,
        destination: &Destination,
    ) -> Result<(), JobError>;

    fn download_attachment(&self, attachment_id: i64, message_id: i64) -> Result<(), JobError>;

    fn process_received_message(
        &self,
        message: &ReceivedMessage,
        open_group_id: Option<&str>,
    ) -> Result<(), JobError>;

    fn notify_push_server(&self, notification: &PushNotification) -> Result<(), JobError>;

    fn trim_thread(&self, thread_id: i64, open_group_id: Option<&str>) -> Result<(), JobError>;

    fn download_group_avatar(
        &self,
        server: &str,
        room: &str,
        image_id: Option<&str>,
    ) -> Result<(), JobError>;

    fn delete_open_group_messages(
        &self,
        open_group_id: &str,
        thread_id: i64,
        server_ids: &[i64],
    ) -> Result<(), JobError>;

    fn join_open_group(&self, join_url: &str) -> Result<(), JobError>;
}
