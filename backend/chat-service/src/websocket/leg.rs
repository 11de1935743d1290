use once_cell::sync::Lazy;
use regex::Regex;

static PARTICIPANT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-7][0-9A-Z]{25}$").expect("hardcoded participant id regex is invalid - fix source code")
});

/// Whether `id` has the shape of a ULID-encoded profile id.
pub fn is_participant_id(id: &str) -> bool {
    PARTICIPANT_ID.is_match(id)
}

/// One direction of a conversation as seen by `viewer`.
///
/// A conversation between A and B is stored twice: once under `A-B` for A
/// and once under `B-A` for B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLeg {
    pub viewer: String,
    pub counterpart: String,
}

impl ChatLeg {
    pub fn new(viewer: impl Into<String>, counterpart: impl Into<String>) -> Self {
        Self {
            viewer: viewer.into(),
            counterpart: counterpart.into(),
        }
    }

    /// Leg owned by the viewer.
    pub fn forward(&self) -> String {
        leg_key(&self.viewer, &self.counterpart)
    }

    /// Leg owned by the counterpart.
    pub fn mirror(&self) -> String {
        leg_key(&self.counterpart, &self.viewer)
    }
}

fn leg_key(owner: &str, other: &str) -> String {
    format!("{}-{}", owner, other)
}
