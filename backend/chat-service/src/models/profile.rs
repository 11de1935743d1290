use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-zA-Z0-9]+").expect("hardcoded nickname regex is invalid - fix source code")
});

/// Public face of a member. Chat participants are addressed by profile id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: String,
    pub member: String,
    pub display_name: String,
    pub nick_name: String,
    pub profile_image: String,
    pub authorized: i16,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Profile created alongside a new member.
    pub fn default_for(member_id: &str, email: &str, display_name: &str, profile_image: &str) -> Self {
        Self {
            id: Ulid::new().to_string(),
            member: member_id.to_string(),
            display_name: display_name.trim().to_string(),
            nick_name: nick_name_from_email(email),
            profile_image: profile_image.to_string(),
            authorized: 0,
            is_private: false,
            created_at: Utc::now(),
        }
    }
}

/// Lowercase nickname built from the email local part plus a ULID prefix of
/// the same length. Local parts longer than 8 characters are halved first.
pub fn nick_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut base = NON_ALPHANUMERIC.replace_all(local, "").into_owned();

    let mut take = base.len();
    if take > 8 {
        take /= 2;
        base.truncate(take);
    }

    let suffix = Ulid::new().to_string();
    let take = take.min(suffix.len());
    format!("{}{}", base, &suffix[..take]).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_local_part_is_kept_whole() {
        let nick = nick_name_from_email("bob.k@example.com");
        assert!(nick.starts_with("bobk"));
        assert_eq!(nick.len(), 8);
    }

    #[test]
    fn test_long_local_part_is_halved() {
        let nick = nick_name_from_email("alexandriaquinn@example.com");
        // 15 alphanumerics -> 7 kept, plus 7 from the ulid
        assert!(nick.starts_with("alexand"));
        assert_eq!(nick.len(), 14);
    }

    #[test]
    fn test_nick_name_is_lowercase() {
        let nick = nick_name_from_email("Ann@example.com");
        assert_eq!(nick, nick.to_lowercase());
    }
}
