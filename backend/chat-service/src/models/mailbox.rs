use super::profile::Profile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest-message summary for one directed pair, owned by `sender`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Mailbox {
    pub id: String,
    pub sender: String,
    pub receiver: Vec<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Mailbox row as served to the owner, with recipient profiles resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub id: String,
    pub sender: String,
    pub receiver: Vec<Profile>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl MailboxEntry {
    pub fn resolve(row: Mailbox, profiles: &[Profile]) -> Self {
        let receiver = row
            .receiver
            .iter()
            .filter_map(|id| profiles.iter().find(|p| &p.id == id).cloned())
            .collect();

        Self {
            id: row.id,
            sender: row.sender,
            receiver,
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}
