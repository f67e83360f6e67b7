use super::JobBody;
use crate::backend::ReceivedMessage;
use crate::job_queue::context::JobContext;
use crate::job_queue::data::{JobData, JobDataError};
use crate::job_queue::error::JobError;
use crate::job_queue::id::JobId;
use tracing::warn;

/// Processes a batch of received envelopes, one by one.
///
/// Items failing with a retryable error are remembered in `failed_indices` so
/// the queue can retry only those. Items failing permanently are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMessageReceiveJob {
    pub messages: Vec<ReceivedMessage>,
    pub open_group_id: Option<String>,
    failed_indices: Vec<usize>,
}

impl BatchMessageReceiveJob {
    pub fn new(messages: Vec<ReceivedMessage>, open_group_id: Option<String>) -> Self {
        Self {
            messages,
            open_group_id,
            failed_indices: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_failed_indices(mut self, failed_indices: Vec<usize>) -> Self {
        self.failed_indices = failed_indices;
        self
    }

    pub fn failed_count(&self) -> usize {
        self.failed_indices.len()
    }

    /// The batch to retry when some, but not all, items failed on the last run.
    pub fn failed_subset(&self) -> Option<Self> {
        if self.failed_indices.is_empty() || self.failed_indices.len() >= self.messages.len() {
            return None;
        }
        let messages = self
            .failed_indices
            .iter()
            .filter_map(|&index| self.messages.get(index).cloned())
            .collect();
        Some(Self::new(messages, self.open_group_id.clone()))
    }
}

const DATA_KEY: &str = "data";
// Parallel to `data`. Empty string / -1 stand for "absent".
const SERVER_HASHES_KEY: &str = "server_hashes";
const OPEN_GROUP_SERVER_IDS_KEY: &str = "open_group_server_ids";
const OPEN_GROUP_ID_KEY: &str = "open_group_id";

impl JobBody for BatchMessageReceiveJob {
    const TYPE_KEY: &'static str = "BatchMessageReceiveJob";
    const MAX_FAILURE_COUNT: u32 = 10;

    fn serialize(&self) -> JobData {
        let (data, (hashes, server_ids)): (Vec<Vec<u8>>, (Vec<String>, Vec<i64>)) = self
            .messages
            .iter()
            .map(|message| {
                (
                    message.data.clone(),
                    (
                        message.server_hash.clone().unwrap_or_default(),
                        message.open_group_server_id.unwrap_or(-1),
                    ),
                )
            })
            .unzip();
        JobData::builder()
            .bytes_array(DATA_KEY, data)
            .string_array(SERVER_HASHES_KEY, hashes)
            .long_array(OPEN_GROUP_SERVER_IDS_KEY, server_ids)
            .optional_string(OPEN_GROUP_ID_KEY, self.open_group_id.as_deref())
            .build()
    }

    fn deserialize(data: &JobData) -> Result<Self, JobDataError> {
        let payloads = data.bytes_array(DATA_KEY)?;
        let hashes = data.string_array(SERVER_HASHES_KEY)?;
        let server_ids = data.long_array(OPEN_GROUP_SERVER_IDS_KEY)?;
        if hashes.len() != payloads.len() || server_ids.len() != payloads.len() {
            return Err(JobDataError::InvalidValue {
                key: DATA_KEY.to_string(),
                reason: format!(
                    "{} payloads but {} hashes and {} server ids",
                    payloads.len(),
                    hashes.len(),
                    server_ids.len()
                ),
            });
        }

        let messages = payloads
            .iter()
            .zip(hashes)
            .zip(server_ids)
            .map(|((payload, hash), &server_id)| ReceivedMessage {
                data: payload.clone(),
                server_hash: (!hash.is_empty()).then(|| hash.clone()),
                open_group_server_id: (server_id >= 0).then_some(server_id),
            })
            .collect();
        Ok(Self::new(
            messages,
            data.optional_string(OPEN_GROUP_ID_KEY)?.cloned(),
        ))
    }

    fn execute(&mut self, _job_id: Option<&JobId>, ctx: &JobContext) -> Result<(), JobError> {
        self.failed_indices.clear();
        for (index, message) in self.messages.iter().enumerate() {
            if ctx.is_cancelled() {
                // Leave the rest for the next run
                self.failed_indices.extend(index..self.messages.len());
                break;
            }
            match ctx
                .backend
                .process_received_message(message, self.open_group_id.as_deref())
            {
                Ok(()) => {}
                Err(e) if e.is_permanent() => {
                    warn!("Dropping batched message {}: {}", index, e);
                }
                Err(e) => {
                    warn!("Batched message {} failed, will retry: {}", index, e);
                    self.failed_indices.push(index);
                }
            }
        }

        if self.failed_indices.is_empty() {
            Ok(())
        } else {
            Err(JobError::PartialBatch {
                failed: self.failed_indices.len(),
                total: self.messages.len(),
            })
        }
    }
}
