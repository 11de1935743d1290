//! Redis connection helper for tests.

use redis::aio::ConnectionManager;
use redis::Client;
use redis_utils::SharedConnectionManager;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Connect to `REDIS_TEST_URL` (or localhost). `None` when no server answers,
/// so callers can skip instead of failing.
pub async fn test_redis_manager() -> Option<SharedConnectionManager> {
    let redis_url =
        env::var("REDIS_TEST_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let client = Client::open(redis_url).ok()?;
    let manager = tokio::time::timeout(Duration::from_secs(1), ConnectionManager::new(client))
        .await
        .ok()?
        .ok()?;

    Some(Arc::new(Mutex::new(manager)))
}
