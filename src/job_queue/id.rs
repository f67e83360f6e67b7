use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

const MAX_SEQUENCE: u32 = 999_999;

/// Identifier assigned to a job when it is first submitted.
///
/// Millisecond timestamp (13 digits) followed by a per-millisecond counter
/// (6 digits). The fixed width makes string order equal creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct GeneratorState {
    last_millis: u64,
    sequence: u32,
}

/// Hands out strictly increasing [`JobId`]s, even if the wall clock stalls or
/// steps backwards.
#[derive(Debug, Default)]
pub struct JobIdGenerator {
    state: Mutex<GeneratorState>,
}

impl JobIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> JobId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.next_id_at(now)
    }

    fn next_id_at(&self, now_millis: u64) -> JobId {
        let mut state = self.state.lock().unwrap();
        if now_millis > state.last_millis {
            state.last_millis = now_millis;
            state.sequence = 0;
        } else if state.sequence == MAX_SEQUENCE {
            state.last_millis += 1;
            state.sequence = 0;
        } else {
            state.sequence += 1;
        }
        JobId(format!("{:013}{:06}", state.last_millis, state.sequence))
    }
}
