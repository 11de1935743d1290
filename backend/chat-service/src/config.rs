use crate::error::AppError;
use actix_middleware::RateLimitConfig;
use dotenvy::dotenv;
use jwt_security::ensure_secret_strength;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Where members, profiles, messages and codes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local maps; tokens are kept in memory too.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AppError::Config(format!("unknown STORAGE_BACKEND {other}"))),
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone)]
pub struct PasswordHashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 1,
            parallelism: 4,
        }
    }
}

/// SMTP settings. Without a host the mailer only logs.
#[derive(Debug, Clone, Default)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
}

#[derive(Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub access_secret: String,
    pub refresh_secret: String,
    pub password_secret: String,
    pub default_profile_pic: String,
    pub rate_limit: RateLimitConfig,
    pub feed_tick: Duration,
    pub store_timeout: Duration,
    pub password_hash: PasswordHashConfig,
    pub email: EmailConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::Postgres,
        };
        let database_url = match storage {
            StorageBackend::Postgres => env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?,
            StorageBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let port = parse_or("PORT", 3000);

        let access_secret = required_secret("ACCESS_SECRET")?;
        let refresh_secret = required_secret("REFRESH_SECRET")?;
        let password_secret = required_secret("PASSWORD_SECRET")?;

        let default_profile_pic = env::var("DEFAULT_PROFILE_PIC").unwrap_or_default();

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            per_second: parse_or("RATE_LIMIT_PER_SECOND", defaults.per_second),
            burst: parse_or("RATE_LIMIT_BURST", defaults.burst),
            idle_after: Duration::from_secs(parse_or(
                "RATE_LIMIT_IDLE_SECS",
                defaults.idle_after.as_secs(),
            )),
            sweep_every: nonzero(
                "RATE_LIMIT_SWEEP_SECS",
                Duration::from_secs(parse_or(
                    "RATE_LIMIT_SWEEP_SECS",
                    defaults.sweep_every.as_secs(),
                )),
            )?,
        };

        let feed_tick = nonzero(
            "FEED_TICK_MS",
            Duration::from_millis(parse_or("FEED_TICK_MS", 500)),
        )?;
        let store_timeout = Duration::from_millis(parse_or("STORE_TIMEOUT_MS", 5000));

        let hash_defaults = PasswordHashConfig::default();
        let password_hash = PasswordHashConfig {
            memory_kib: parse_or("PASSWORD_HASH_MEMORY_KIB", hash_defaults.memory_kib),
            iterations: parse_or("PASSWORD_HASH_ITERATIONS", hash_defaults.iterations),
            parallelism: parse_or("PASSWORD_HASH_PARALLELISM", hash_defaults.parallelism),
        };

        let email = EmailConfig {
            smtp_host: env::var("SMTP_HOST").ok().filter(|h| !h.trim().is_empty()),
            smtp_port: parse_or("SMTP_PORT", 587),
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            from_address: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "chatline <no-reply@chatline.local>".into()),
        };

        Ok(Self {
            storage,
            database_url,
            redis_url,
            port,
            access_secret,
            refresh_secret,
            password_secret,
            default_profile_pic,
            rate_limit,
            feed_tick,
            store_timeout,
            password_hash,
            email,
        })
    }
}

fn required_secret(name: &str) -> Result<String, AppError> {
    let value = env::var(name).map_err(|_| AppError::Config(format!("{name} missing")))?;
    ensure_secret_strength(name, &value).map_err(|e| AppError::Config(e.to_string()))?;
    Ok(value)
}

/// Tickers panic on a zero period.
fn nonzero(name: &str, value: Duration) -> Result<Duration, AppError> {
    if value.is_zero() {
        return Err(AppError::Config(format!("{name} must be greater than zero")));
    }
    Ok(value)
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!("Postgres".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert!("mongo".parse::<StorageBackend>().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_or_falls_back_on_garbage() {
        std::env::set_var("CHATLINE_TEST_PARSE_OR", "not-a-number");
        assert_eq!(parse_or("CHATLINE_TEST_PARSE_OR", 42u32), 42);
        std::env::set_var("CHATLINE_TEST_PARSE_OR", " 7 ");
        assert_eq!(parse_or("CHATLINE_TEST_PARSE_OR", 42u32), 7);
        std::env::remove_var("CHATLINE_TEST_PARSE_OR");
    }

    #[test]
    fn test_password_hash_defaults() {
        let params = PasswordHashConfig::default();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.iterations, 1);
        assert_eq!(params.parallelism, 4);
    }

    const SECRET: &str = "J8Kq2mPvRx4TnZs9YwLcGf7DhBe3Xa6W";

    fn set_memory_env(access: &str) {
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("ACCESS_SECRET", access);
        env::set_var("REFRESH_SECRET", SECRET);
        env::set_var("PASSWORD_SECRET", SECRET);
    }

    fn clear_env() {
        for name in [
            "STORAGE_BACKEND",
            "ACCESS_SECRET",
            "REFRESH_SECRET",
            "PASSWORD_SECRET",
            "FEED_TICK_MS",
            "RATE_LIMIT_SWEEP_SECS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_memory_backend() {
        set_memory_env(SECRET);
        env::set_var("FEED_TICK_MS", "250");

        let config = Config::from_env().unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.feed_tick, Duration::from_millis(250));
        assert!(config.email.smtp_host.is_none());
        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_rejects_weak_secret() {
        set_memory_env("secret");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_rejects_zero_tickers() {
        set_memory_env(SECRET);
        env::set_var("FEED_TICK_MS", "0");
        assert!(matches!(Config::from_env(), Err(AppError::Config(msg)) if msg.contains("FEED_TICK_MS")));

        env::remove_var("FEED_TICK_MS");
        env::set_var("RATE_LIMIT_SWEEP_SECS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(AppError::Config(msg)) if msg.contains("RATE_LIMIT_SWEEP_SECS")
        ));
        clear_env();
    }
}
