#![allow(dead_code)]

use actix_web::web;
use chat_service::config::{
    Config, EmailConfig, PasswordHashConfig, StorageBackend,
};
use chat_service::db::Persistence;
use chat_service::services::email::EmailService;
use chat_service::state::AppState;
use actix_middleware::RateLimitConfig;
use jwt_security::{MemoryTokenStore, TokenManager};
use std::sync::Arc;
use std::time::Duration;

pub const DEVICE: &str = "device-1";

pub fn test_config() -> Config {
    Config {
        storage: StorageBackend::Memory,
        database_url: String::new(),
        redis_url: String::new(),
        port: 0,
        access_secret: "J8Kq2mPvRx4TnZs9YwLcGf7DhBe3Xa6W".into(),
        refresh_secret: "Wq8Lj5BtNu1Zp0MkYhVgCxFbAsSdQwEr".into(),
        password_secret: "Zr4Nm8QpLx2Vc6TbHy9KdWs3Jf7Ga5Ue".into(),
        default_profile_pic: "https://cdn.example.com/default.png".into(),
        rate_limit: RateLimitConfig::default(),
        feed_tick: Duration::from_millis(20),
        store_timeout: Duration::from_secs(5),
        password_hash: PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        email: EmailConfig {
            from_address: "chatline <no-reply@chatline.local>".into(),
            ..EmailConfig::default()
        },
    }
}

pub fn test_state() -> AppState {
    let config = Arc::new(test_config());
    let tokens = Arc::new(
        TokenManager::new(
            config.access_secret.clone(),
            config.refresh_secret.clone(),
            Arc::new(MemoryTokenStore::new()),
        )
        .unwrap(),
    );
    let email = EmailService::new(&config.email).unwrap();
    AppState::new(config, Persistence::in_memory(), tokens, email).unwrap()
}

pub fn app_config(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let tokens = state.tokens.clone();
        cfg.app_data(web::Data::new(state));
        chat_service::routes::configure(cfg, tokens);
    }
}

/// Extract the six-digit code from the most recent mail.
pub async fn last_code(state: &AppState) -> String {
    let mail = state.email.outbox().await;
    let body = &mail.last().expect("a mail was sent").body;
    body.split_whitespace()
        .map(|w| w.trim_end_matches('.'))
        .find(|w| w.len() == 6 && w.chars().all(|c| c.is_ascii_digit()))
        .expect("code in body")
        .to_string()
}
