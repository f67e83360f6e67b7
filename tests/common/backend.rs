use messaging_job_queue::backend::{
    Destination, MessagingBackend, OutgoingMessage, PushNotification, ReceivedMessage,
};
use messaging_job_queue::job_queue::JobError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One backend call, labelled `operation:subject` (e.g. `receive:m2`).
#[derive(Debug, Clone)]
pub struct Call {
    pub label: String,
    pub start: Instant,
    pub end: Instant,
}

impl Call {
    pub fn overlaps(&self, other: &Call) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Scriptable backend: per-operation delays, queued failures per label.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    failures: Mutex<HashMap<String, VecDeque<JobError>>>,
    uploaded: Mutex<HashSet<i64>>,
    failed_sends: Mutex<Vec<i64>>,
}

impl FakeBackend {
    pub fn set_delay(&self, operation: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(operation, delay);
    }

    /// The next call with this label fails with `error`. Stacks.
    pub fn fail_next(&self, label: &str, error: JobError) {
        self.failures
            .lock()
            .unwrap()
            .entry(label.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.label).collect()
    }

    pub fn calls_to(&self, label: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.label == label)
            .collect()
    }

    pub fn failed_sends(&self) -> Vec<i64> {
        self.failed_sends.lock().unwrap().clone()
    }

    fn call(
        &self,
        operation: &'static str,
        subject: impl std::fmt::Display,
    ) -> Result<(), JobError> {
        let label = format!("{}:{}", operation, subject);
        let start = Instant::now();
        let delay = self.delays.lock().unwrap().get(operation).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&label)
            .and_then(|queued| queued.pop_front());
        self.calls.lock().unwrap().push(Call {
            label,
            start,
            end: Instant::now(),
        });
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl MessagingBackend for FakeBackend {
    fn send_message(
        &self,
        message: &OutgoingMessage,
        _destination: &Destination,
    ) -> Result<(), JobError> {
        self.call("send", message.message_id)
    }

    fn handle_failed_message_send(&self, message: &OutgoingMessage, _error: &JobError) {
        self.failed_sends.lock().unwrap().push(message.message_id);
    }

    fn is_attachment_uploaded(&self, attachment_id: i64) -> bool {
        self.uploaded.lock().unwrap().contains(&attachment_id)
    }

    fn upload_attachment(
        &self,
        attachment_id: i64,
        _thread_id: i64,
        _destination: &Destination,
    ) -> Result<(), JobError> {
        self.call("upload", attachment_id)?;
        self.uploaded.lock().unwrap().insert(attachment_id);
        Ok(())
    }

    fn download_attachment(&self, attachment_id: i64, _message_id: i64) -> Result<(), JobError> {
        self.call("download", attachment_id)
    }

    fn process_received_message(
        &self,
        message: &ReceivedMessage,
        _open_group_id: Option<&str>,
    ) -> Result<(), JobError> {
        self.call("receive", String::from_utf8_lossy(&message.data))
    }

    fn notify_push_server(&self, notification: &PushNotification) -> Result<(), JobError> {
        self.call("push", &notification.recipient)
    }

    fn trim_thread(&self, thread_id: i64, _open_group_id: Option<&str>) -> Result<(), JobError> {
        self.call("trim", thread_id)
    }

    fn download_group_avatar(
        &self,
        server: &str,
        room: &str,
        _image_id: Option<&str>,
    ) -> Result<(), JobError> {
        self.call("avatar", format!("{}.{}", server, room))
    }

    fn delete_open_group_messages(
        &self,
        open_group_id: &str,
        thread_id: i64,
        _server_ids: &[i64],
    ) -> Result<(), JobError> {
        self.call("delete", format!("{}/{}", open_group_id, thread_id))
    }

    fn join_open_group(&self, join_url: &str) -> Result<(), JobError> {
        self.call("join", join_url)
    }
}
