//! Persistence roles.
//!
//! Each role is a trait with one implementation per backend: PostgreSQL for
//! deployments, process-local maps for tests and local runs. Backend faults
//! are translated into [`AppError`] here so callers never see driver errors.

use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, MailboxEntry, Member, Profile, VerificationCode};
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn append(&self, message: &ChatMessage) -> AppResult<()>;

    /// Flip the `owner` mailbox row addressed to `counterpart` to read.
    async fn mark_read(&self, owner: &str, counterpart: &str) -> AppResult<u64>;

    async fn upsert_mailbox(
        &self,
        owner: &str,
        recipients: &[String],
        last_message: &str,
        is_read: bool,
    ) -> AppResult<()>;

    /// Messages stored under `chat_id`, oldest first.
    async fn history(&self, chat_id: &str) -> AppResult<Vec<ChatMessage>>;

    /// Mailbox rows owned by `owner`, newest first, recipients resolved.
    async fn list(&self, owner: &str) -> AppResult<Vec<MailboxEntry>>;

    async fn unread_count(&self, owner: &str) -> AppResult<i64>;
}

#[async_trait]
pub trait MemberRepository: Send + Sync {
    /// Fails with `Conflict("email_taken")` on a duplicate email.
    async fn create(&self, member: &Member) -> AppResult<()>;
    async fn delete(&self, id: &str) -> AppResult<()>;
    async fn find(&self, id: &str) -> AppResult<Option<Member>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Member>>;
    async fn update_password(&self, id: &str, password_hash: &str) -> AppResult<()>;
    async fn mark_verified(&self, id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn create(&self, profile: &Profile) -> AppResult<()>;
    async fn find_by_member(&self, member_id: &str) -> AppResult<Option<Profile>>;
    async fn find_by_nick_name(&self, nick_name: &str) -> AppResult<Option<Profile>>;
}

#[async_trait]
pub trait VerificationCodeRepository: Send + Sync {
    /// Store `code`, dropping every earlier code of the same member.
    async fn replace_for_member(&self, code: &VerificationCode) -> AppResult<()>;

    /// Untaken code matching all three fields, expired or not.
    async fn find_untaken(
        &self,
        member_id: &str,
        code: &str,
        code_type: i16,
    ) -> AppResult<Option<VerificationCode>>;

    async fn mark_taken(&self, id: &str) -> AppResult<()>;
}

/// Every repository the service talks to, behind trait objects.
#[derive(Clone)]
pub struct Persistence {
    pub chat: Arc<dyn ChatRepository>,
    pub members: Arc<dyn MemberRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub codes: Arc<dyn VerificationCodeRepository>,
}

impl Persistence {
    pub fn postgres(pool: Pool<Postgres>, call_timeout: Duration) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool, call_timeout)))
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ChatRepository
            + MemberRepository
            + ProfileRepository
            + VerificationCodeRepository
            + 'static,
    {
        Self {
            chat: store.clone(),
            members: store.clone(),
            profiles: store.clone(),
            codes: store,
        }
    }
}

/// Await `future` for at most `limit`.
pub async fn bounded<T, F>(limit: Duration, future: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(limit)),
    }
}
