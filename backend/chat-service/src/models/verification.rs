use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// How long an issued code stays usable.
pub const CODE_LIFETIME_MINUTES: i64 = 10;

/// Code purposes, as sent by clients in `code_type`.
pub mod code_types {
    pub const EMAIL_VERIFICATION: i16 = 1;
    pub const PASSWORD_RESET: i16 = 2;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VerificationCode {
    pub id: String,
    pub member: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub code_type: i16,
    pub taken: bool,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Fresh six-digit code for `member`.
    pub fn generate(member: &str, email: &str, code_type: i16) -> Self {
        let now = Utc::now();
        let code = rand::thread_rng().gen_range(0..1_000_000u32);
        Self {
            id: Ulid::new().to_string(),
            member: member.to_string(),
            email: email.to_string(),
            code: format!("{:06}", code),
            code_type,
            taken: false,
            expired_at: now + Duration::minutes(CODE_LIFETIME_MINUTES),
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expired_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_is_six_digits() {
        for _ in 0..50 {
            let code = VerificationCode::generate("m", "m@example.com", code_types::EMAIL_VERIFICATION);
            assert_eq!(code.code.len(), 6);
            assert!(code.code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.is_expired());
        }
    }

    #[test]
    fn test_past_expiry_is_expired() {
        let mut code = VerificationCode::generate("m", "m@example.com", code_types::PASSWORD_RESET);
        code.expired_at = Utc::now() - Duration::seconds(1);
        assert!(code.is_expired());
    }
}
