use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Message, Result};

/// Wire form of every message on the topic.
///
/// - `message_type`: the variant's [`Label`](crate::Label), used by consumers
///   to pick a decoder.
/// - `occurred_at`: when the message was sealed.
/// - `payload`: the variant's fields, shape determined by `message_type`.
///
/// ```json
/// { "messageType": "DeleteMethod",
///   "occurredAt": "2026-01-01T10:00:00Z",
///   "payload": { "id": 4, "loggedInUserId": 1, "sagaId": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new<T>(message_type: T, payload: Value) -> Self
    where
        T: Into<String>,
    {
        Self {
            message_type: message_type.into(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    /// Seal a message, tagging it with its variant label.
    pub fn seal<M: Message>(message: &M) -> Result<Self> {
        Ok(Self::new(message.label(), message.payload()?))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
