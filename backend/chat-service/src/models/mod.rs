pub mod mailbox;
pub mod member;
pub mod message;
pub mod profile;
pub mod verification;

pub use mailbox::{Mailbox, MailboxEntry};
pub use member::Member;
pub use message::{ChatMessage, InboundMessage};
pub use profile::Profile;
pub use verification::VerificationCode;
