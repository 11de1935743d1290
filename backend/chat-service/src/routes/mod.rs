pub mod auth;
pub mod chat;
pub mod profile;
pub mod verify;
pub mod wsroute;

use crate::error::AppError;
use actix_middleware::JwtAuthMiddleware;
use actix_web::{web, HttpResponse};
use jwt_security::TokenManager;
use std::sync::Arc;

/// Malformed JSON bodies answer with the shared validation error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        tracing::debug!(error = %err, "rejecting request body");
        AppError::Validation("error_parsing_data".into()).into()
    })
}

/// Mount every `/api/v1` route. Token-protected resources get their own
/// [`JwtAuthMiddleware`]; the chat socket authenticates through `?access=`.
pub fn configure(cfg: &mut web::ServiceConfig, tokens: Arc<TokenManager>) {
    let auth = || JwtAuthMiddleware::new(tokens.clone());

    cfg.app_data(json_config())
        .route("/health", web::get().to(|| async { HttpResponse::Ok().body("OK") }))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/user")
                        .route("/sign-up", web::post().to(auth::sign_up))
                        .route("/sign-in", web::post().to(auth::sign_in))
                        .route("/refresh", web::post().to(auth::refresh))
                        .route("/reset/code", web::post().to(verify::reset_code))
                        .route("/reset/password", web::post().to(verify::reset_password))
                        .service(
                            web::resource("/logout")
                                .wrap(auth())
                                .route(web::post().to(auth::logout)),
                        )
                        .service(
                            web::resource("/password")
                                .wrap(auth())
                                .route(web::put().to(auth::update_password)),
                        )
                        .service(
                            web::resource("/verify/code")
                                .wrap(auth())
                                .route(web::post().to(verify::request_code)),
                        )
                        .service(
                            web::resource("/verify/check")
                                .wrap(auth())
                                .route(web::post().to(verify::check_code)),
                        )
                        .service(
                            web::resource("/verify/renew")
                                .wrap(auth())
                                .route(web::post().to(verify::renew_code)),
                        )
                        .service(
                            web::resource("/verify/reset/password")
                                .wrap(auth())
                                .route(web::post().to(verify::reset_password)),
                        ),
                )
                .service(
                    web::resource("/chat-list")
                        .wrap(auth())
                        .route(web::get().to(chat::chat_list)),
                )
                .service(
                    web::resource("/chat-counter")
                        .wrap(auth())
                        .route(web::get().to(chat::chat_counter)),
                )
                .route("/ws/{sender}/{receiver}", web::get().to(wsroute::ws_handler))
                .service(
                    web::resource("/{nick_name}")
                        .wrap(auth())
                        .route(web::get().to(profile::get_by_nick_name)),
                ),
        );
}
