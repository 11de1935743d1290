use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// One row of the per-leg message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    pub receiver: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Fresh id and timestamp for a message stored under `chat_id`.
    pub fn stamped(chat_id: String, sender: &str, receiver: &str, message: &str) -> Self {
        Self {
            id: Ulid::new().to_string(),
            chat_id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Payload a client sends over the chat socket.
///
/// Only `message` is required; sender and receiver always come from the
/// connection path.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub message: String,
}
