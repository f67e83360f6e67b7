mod attachment_download;
mod attachment_upload;
mod background_group_add;
mod batch_message_receive;
mod group_avatar_download;
mod message_receive;
mod message_send;
mod notify_push_server;
mod open_group_delete;
mod trim_thread;

pub use attachment_download::AttachmentDownloadJob;
pub use attachment_upload::AttachmentUploadJob;
pub use background_group_add::BackgroundGroupAddJob;
pub use batch_message_receive::BatchMessageReceiveJob;
pub use group_avatar_download::GroupAvatarDownloadJob;
pub use message_receive::MessageReceiveJob;
pub use message_send::MessageSendJob;
pub use notify_push_server::NotifyPushServerJob;
pub use open_group_delete::OpenGroupDeleteJob;
pub use trim_thread::TrimThreadJob;

use super::context::JobContext;
use super::data::{JobData, JobDataBuilder, JobDataError};
use super::error::JobError;
use super::id::JobId;
use crate::backend::Destination;

/// Behaviour every concrete job kind provides.
///
/// `serialize` and `deserialize` must agree on keys: whatever one writes the
/// other reads back without defaults.
pub trait JobBody: Sized + Into<JobKind> {
    const TYPE_KEY: &'static str;
    const MAX_FAILURE_COUNT: u32;

    fn serialize(&self) -> JobData;

    fn deserialize(data: &JobData) -> Result<Self, JobDataError>;

    /// Runs the work synchronously. `job_id` is `None` only for jobs executed
    /// outside the queue.
    fn execute(&mut self, job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError>;

    /// Called once when the job is given up on.
    fn handle_permanent_failure(
        &self,
        _job_id: Option<&JobId>,
        _ctx: &JobContext,
        _error: &JobError,
    ) {
    }
}

/// The closed set of job kinds the queue knows how to run.
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    MessageSend(MessageSendJob),
    AttachmentUpload(AttachmentUploadJob),
    NotifyPushServer(NotifyPushServerJob),
    AttachmentDownload(AttachmentDownloadJob),
    MessageReceive(MessageReceiveJob),
    BatchMessageReceive(BatchMessageReceiveJob),
    TrimThread(TrimThreadJob),
    GroupAvatarDownload(GroupAvatarDownloadJob),
    OpenGroupDelete(OpenGroupDeleteJob),
    BackgroundGroupAdd(BackgroundGroupAddJob),
}

macro_rules! with_body {
    ($kind:expr, $body:ident => $action:expr) => {
        match $kind {
            JobKind::MessageSend($body) => $action,
            JobKind::AttachmentUpload($body) => $action,
            JobKind::NotifyPushServer($body) => $action,
            JobKind::AttachmentDownload($body) => $action,
            JobKind::MessageReceive($body) => $action,
            JobKind::BatchMessageReceive($body) => $action,
            JobKind::TrimThread($body) => $action,
            JobKind::GroupAvatarDownload($body) => $action,
            JobKind::OpenGroupDelete($body) => $action,
            JobKind::BackgroundGroupAdd($body) => $action,
        }
    };
}

fn type_key_of<T: JobBody>(_: &T) -> &'static str {
    T::TYPE_KEY
}

fn max_failure_count_of<T: JobBody>(_: &T) -> u32 {
    T::MAX_FAILURE_COUNT
}

impl JobKind {
    pub fn type_key(&self) -> &'static str {
        with_body!(self, body => type_key_of(body))
    }

    pub fn max_failure_count(&self) -> u32 {
        with_body!(self, body => max_failure_count_of(body))
    }

    pub fn serialize(&self) -> JobData {
        with_body!(self, body => body.serialize())
    }

    pub(crate) fn execute(
        &mut self,
        job_id: Option<&JobId>,
        ctx: &JobContext,
    ) -> Result<(), JobError> {
        with_body!(self, body => body.execute(job_id, ctx))
    }

    pub(crate) fn handle_permanent_failure(
        &self,
        job_id: Option<&JobId>,
        ctx: &JobContext,
        error: &JobError,
    ) {
        with_body!(self, body => body.handle_permanent_failure(job_id, ctx, error))
    }
}

macro_rules! impl_from_body {
    ($($variant:ident($body:ty)),* $(,)?) => {
        $(
            impl From<$body> for JobKind {
                fn from(body: $body) -> Self {
                    JobKind::$variant(body)
                }
            }
        )*
    };
}

impl_from_body!(
    MessageSend(MessageSendJob),
    AttachmentUpload(AttachmentUploadJob),
    NotifyPushServer(NotifyPushServerJob),
    AttachmentDownload(AttachmentDownloadJob),
    MessageReceive(MessageReceiveJob),
    BatchMessageReceive(BatchMessageReceiveJob),
    TrimThread(TrimThreadJob),
    GroupAvatarDownload(GroupAvatarDownloadJob),
    OpenGroupDelete(OpenGroupDeleteJob),
    BackgroundGroupAdd(BackgroundGroupAddJob),
);

const DESTINATION_KIND_KEY: &str = "destination_kind";
const DESTINATION_ADDRESS_KEY: &str = "destination_address";
const DESTINATION_ROOM_KEY: &str = "destination_room";

pub(crate) fn put_destination(
    builder: JobDataBuilder,
    destination: &Destination,
) -> JobDataBuilder {
    let builder = builder.string(DESTINATION_KIND_KEY, destination.kind_str());
    match destination {
        Destination::Contact { public_key } => builder.string(DESTINATION_ADDRESS_KEY, public_key),
        Destination::ClosedGroup { group_public_key } => {
            builder.string(DESTINATION_ADDRESS_KEY, group_public_key)
        }
        Destination::OpenGroup { server, room } => builder
            .string(DESTINATION_ADDRESS_KEY, server)
            .string(DESTINATION_ROOM_KEY, room),
    }
}

pub(crate) fn read_destination(data: &JobData) -> Result<Destination, JobDataError> {
    let address = data.string(DESTINATION_ADDRESS_KEY)?.clone();
    match data.string(DESTINATION_KIND_KEY)?.as_str() {
        "contact" => Ok(Destination::Contact {
            public_key: address,
        }),
        "closed_group" => Ok(Destination::ClosedGroup {
            group_public_key: address,
        }),
        "open_group" => Ok(Destination::OpenGroup {
            server: address,
            room: data.string(DESTINATION_ROOM_KEY)?.clone(),
        }),
        other => Err(JobDataError::InvalidValue {
            key: DESTINATION_KIND_KEY.to_string(),
            reason: format!("unknown destination kind '{}'", other),
        }),
    }
}

/// Maps a backend failure that isn't tied to a job outcome (e.g. a store read)
/// to a retryable error.
pub(crate) fn unavailable(context: &str, error: impl std::fmt::Display) -> JobError {
    JobError::Unavailable(format!("{}: {}", context, error))
}
