use crate::{
    config::Config,
    db::Persistence,
    error::AppResult,
    security::PasswordService,
    services::{email::EmailService, message_router::MessageRouter},
    websocket::ConnectionRegistry,
};
use jwt_security::TokenManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persistence: Persistence,
    pub registry: ConnectionRegistry,
    pub router: MessageRouter,
    pub tokens: Arc<TokenManager>,
    pub passwords: Arc<PasswordService>,
    pub email: EmailService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        persistence: Persistence,
        tokens: Arc<TokenManager>,
        email: EmailService,
    ) -> AppResult<Self> {
        let passwords = Arc::new(PasswordService::new(
            &config.password_secret,
            &config.password_hash,
        )?);
        let registry = ConnectionRegistry::new();
        let router = MessageRouter::new(persistence.chat.clone(), registry.clone());

        Ok(Self {
            config,
            persistence,
            registry,
            router,
            tokens,
            passwords,
            email,
        })
    }
}
