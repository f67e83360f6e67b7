use super::jobs::JobKind;
use std::fmt;

/// The execution lane a job runs on.
///
/// - `Tx`: outgoing work, started in order, run concurrently.
/// - `Rx`: incoming work, one job at a time.
/// - `Media`: attachment downloads on a small worker pool.
/// - `OpenGroup`: one serial sub-queue per open group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lane {
    Tx,
    Rx,
    Media,
    OpenGroup(String),
}

impl Lane {
    pub fn for_kind(kind: &JobKind) -> Lane {
        match kind {
            JobKind::MessageSend(_)
            | JobKind::AttachmentUpload(_)
            | JobKind::NotifyPushServer(_) => Lane::Tx,
            JobKind::AttachmentDownload(_) => Lane::Media,
            JobKind::MessageReceive(_) => Lane::Rx,
            JobKind::BatchMessageReceive(job) => match &job.open_group_id {
                Some(open_group_id) => Lane::OpenGroup(open_group_id.clone()),
                None => Lane::Rx,
            },
            JobKind::TrimThread(job) => match &job.open_group_id {
                Some(open_group_id) => Lane::OpenGroup(open_group_id.clone()),
                None => Lane::Rx,
            },
            JobKind::GroupAvatarDownload(job) => Lane::OpenGroup(job.open_group_id()),
            JobKind::OpenGroupDelete(job) => Lane::OpenGroup(job.open_group_id.clone()),
            JobKind::BackgroundGroupAdd(job) => Lane::OpenGroup(job.open_group_id()),
        }
    }

    /// Label used in logs and metrics; open groups share one label.
    pub fn name(&self) -> &'static str {
        match self {
            Lane::Tx => "tx",
            Lane::Rx => "rx",
            Lane::Media => "media",
            Lane::OpenGroup(_) => "open_group",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::OpenGroup(open_group_id) => write!(f, "open_group({})", open_group_id),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Destination, PushNotification, ReceivedMessage};
    use crate::job_queue::jobs::*;

    fn lane(kind: impl Into<JobKind>) -> Lane {
        Lane::for_kind(&kind.into())
    }

    #[test]
    fn test_outgoing_work_goes_to_tx() {
        assert_eq!(lane(MessageSendJob::sample()), Lane::Tx);
        assert_eq!(
            lane(AttachmentUploadJob::new(
                1,
                1,
                Destination::Contact {
                    public_key: "05".into()
                },
                None
            )),
            Lane::Tx
        );
        assert_eq!(
            lane(NotifyPushServerJob::new(PushNotification {
                recipient: "05".into(),
                data: vec![],
                ttl_ms: 0,
                timestamp: 0,
            })),
            Lane::Tx
        );
    }

    #[test]
    fn test_downloads_go_to_media() {
        assert_eq!(lane(AttachmentDownloadJob::new(1, 2)), Lane::Media);
    }

    #[test]
    fn test_receive_and_trim_depend_on_open_group() {
        assert_eq!(lane(MessageReceiveJob::new(ReceivedMessage::new(vec![1]))), Lane::Rx);
        assert_eq!(lane(BatchMessageReceiveJob::new(vec![], None)), Lane::Rx);
        assert_eq!(
            lane(BatchMessageReceiveJob::new(vec![], Some("srv.room".into()))),
            Lane::OpenGroup("srv.room".into())
        );
        assert_eq!(lane(TrimThreadJob::new(5, None)), Lane::Rx);
        assert_eq!(
            lane(TrimThreadJob::new(5, Some("srv.room".into()))),
            Lane::OpenGroup("srv.room".into())
        );
    }

    #[test]
    fn test_group_jobs_share_the_room_lane() {
        assert_eq!(
            lane(GroupAvatarDownloadJob::new("srv", "room", None)),
            Lane::OpenGroup("srv.room".into())
        );
        assert_eq!(
            lane(OpenGroupDeleteJob::new("srv.room", 1, vec![3])),
            Lane::OpenGroup("srv.room".into())
        );
        assert_eq!(
            lane(BackgroundGroupAddJob::new("https://srv/room?public_key=ff")),
            Lane::OpenGroup("https://srv/room".into())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Lane::Media.to_string(), "media");
        assert_eq!(Lane::OpenGroup("a.b".into()).to_string(), "open_group(a.b)");
    }
}
