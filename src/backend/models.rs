//! Domain values passed between job bodies and the messaging backend.

/// Where an outgoing message (or attachment) is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Contact { public_key: String },
    ClosedGroup { group_public_key: String },
    OpenGroup { server: String, room: String },
}

impl Destination {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Destination::Contact { .. } => "contact",
            Destination::ClosedGroup { .. } => "closed_group",
            Destination::OpenGroup { .. } => "open_group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub message_id: i64,
    pub thread_id: i64,
    pub sent_timestamp: i64,
    pub body: Vec<u8>,
    pub attachment_ids: Vec<i64>,
}

/// A raw envelope pulled from a swarm or an open-group server, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub data: Vec<u8>,
    pub server_hash: Option<String>,
    pub open_group_server_id: Option<i64>,
}

impl ReceivedMessage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            server_hash: None,
            open_group_server_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub recipient: String,
    pub data: Vec<u8>,
    pub ttl_ms: i64,
    pub timestamp: i64,
}
