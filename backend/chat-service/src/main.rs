use actix_middleware::{Logging, RateLimitMiddleware, RequestIdMiddleware, VisitorTable};
use actix_web::{web, App, HttpServer};
use chat_service::{
    config::{self, StorageBackend},
    db::{self, Persistence},
    error::AppError,
    logging, routes,
    services::email::EmailService,
    state::AppState,
};
use jwt_security::{MemoryTokenStore, RedisTokenStore, TokenManager, TokenStore};
use redis_utils::{ConnectOptions, RedisPool};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let (persistence, token_store): (Persistence, Arc<dyn TokenStore>) = match cfg.storage {
        StorageBackend::Postgres => {
            let pool = db::postgres::init_pool(&cfg.database_url)
                .await
                .map_err(|e| AppError::StartServer(format!("db: {e}")))?;

            let redis = RedisPool::connect(&cfg.redis_url, ConnectOptions::default())
                .await
                .map_err(|e| AppError::StartServer(format!("redis: {e}")))?;

            (
                Persistence::postgres(pool, cfg.store_timeout),
                Arc::new(RedisTokenStore::new(redis.manager(), cfg.store_timeout)),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("running with in-memory storage; nothing survives a restart");
            (Persistence::in_memory(), Arc::new(MemoryTokenStore::new()))
        }
    };

    let tokens = Arc::new(
        TokenManager::new(
            cfg.access_secret.clone(),
            cfg.refresh_secret.clone(),
            token_store,
        )
        .map_err(|e| AppError::Config(format!("tokens: {e}")))?,
    );

    let email = EmailService::new(&cfg.email)?;
    let state = AppState::new(cfg.clone(), persistence, tokens.clone(), email)?;

    let visitors = VisitorTable::new(&cfg.rate_limit);
    let sweeper = visitors.spawn_sweeper();

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting chat-service");

    let server = HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let tokens = tokens.clone();
        App::new()
            .wrap(RateLimitMiddleware::new(visitors.clone()))
            .wrap(Logging)
            .wrap(RequestIdMiddleware)
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(move |cfg| routes::configure(cfg, tokens))
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind: {e}")))?
    .run();

    let result = server
        .await
        .map_err(|e| AppError::StartServer(format!("server: {e}")));

    sweeper.abort();
    tracing::info!("chat-service stopped");
    result
}
