use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};
use tracing::{info, warn};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Startup connection settings.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Redis connection pool backed by a single auto-reconnecting manager.
pub struct RedisPool {
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str, options: ConnectOptions) -> Result<Self> {
        let client = Client::open(redis_url).context("failed to parse REDIS_URL connection string")?;

        let mut attempt = 0;
        let manager = loop {
            attempt += 1;
            match ConnectionManager::new(client.clone()).await {
                Ok(manager) => break manager,
                Err(err) if attempt < options.attempts => {
                    warn!(attempt, error = %err, "Redis not reachable yet, retrying");
                    sleep(options.backoff * attempt).await;
                }
                Err(err) => {
                    return Err(err).context("failed to initialize Redis connection manager");
                }
            }
        };

        info!("Redis connection manager ready");
        Ok(Self {
            manager: Arc::new(Mutex::new(manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RedisCallError {
    #[error("redis call timed out after {0:?}")]
    Elapsed(Duration),
    #[error("redis call failed: {0}")]
    Redis(#[from] RedisError),
}

/// Run a redis call with an upper bound on its duration.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, RedisCallError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(RedisCallError::from),
        Err(_) => Err(RedisCallError::Elapsed(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_value_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, RedisError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            sleep(Duration::from_secs(1)).await;
            Ok::<_, RedisError>(())
        })
        .await;

        assert!(matches!(result, Err(RedisCallError::Elapsed(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = RedisPool::connect("not a url", ConnectOptions::default()).await;
        assert!(result.is_err());
    }
}
