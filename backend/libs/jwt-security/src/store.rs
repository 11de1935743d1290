//! Token id store.
//!
//! Maps an access id or refresh id to the user it was issued for. Entries
//! expire together with the token they belong to, so a missing entry means
//! the token was revoked, rotated or has lapsed.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis_utils::{with_timeout, RedisCallError, SharedConnectionManager};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("token store unavailable: {0}")]
    Backend(String),
}

impl From<RedisCallError> for StoreError {
    fn from(err: RedisCallError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Record `id -> user_id` for `ttl`.
    async fn put(&self, id: &str, user_id: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError>;

    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Refresh ids currently held for `user_id`.
    async fn sessions_for(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Redis-backed store; one plain string key per token id.
pub struct RedisTokenStore {
    redis: SharedConnectionManager,
    call_timeout: Duration,
}

impl RedisTokenStore {
    pub fn new(redis: SharedConnectionManager, call_timeout: Duration) -> Self {
        Self {
            redis,
            call_timeout,
        }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn put(&self, id: &str, user_id: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await.clone();
        let seconds = ttl.as_secs().max(1);
        with_timeout(
            self.call_timeout,
            conn.set_ex::<_, _, ()>(id, user_id, seconds),
        )
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.lock().await.clone();
        let value: Option<String> = with_timeout(self.call_timeout, conn.get(id)).await?;
        Ok(value)
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await.clone();
        with_timeout(self.call_timeout, conn.del::<_, ()>(id)).await?;
        Ok(())
    }

    async fn sessions_for(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.redis.lock().await.clone();
        let pattern = format!("*++{}", user_id);
        let keys: Vec<String> = with_timeout(self.call_timeout, conn.keys(pattern)).await?;
        Ok(keys)
    }
}

/// Process-local store used by tests and single-node development runs.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, id: &str) -> Option<String> {
        let expired = match self.entries.get(id) {
            Some(entry) if entry.1 > Instant::now() => return Some(entry.0.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!(id, "dropping lapsed token id");
            self.entries.remove(id);
        }
        None
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, id: &str, user_id: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(id.to_string(), (user_id.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live(id))
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.entries.remove(id);
        Ok(())
    }

    async fn sessions_for(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let suffix = format!("++{}", user_id);
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().ends_with(&suffix) && entry.value().1 > now)
            .map(|entry| entry.key().clone())
            .collect())
    }
}
