use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: String,
    pub email: String,
    /// PHC string; never leaves the service.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub verified: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// New, active, unverified member. The hash is filled in once the id exists.
    pub fn prepare(email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            email: email.trim().to_string(),
            password_hash: String::new(),
            verified: false,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
