//! Account endpoints under `/user`

use crate::error::AppError;
use crate::services::auth_service::{
    self, ClientInfo, SignInRequest, SignUpRequest, UpdatePasswordRequest,
};
use crate::state::AppState;
use actix_middleware::AuthenticatedUser;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// **Endpoint**: `POST /user/sign-up`
pub async fn sign_up(
    state: web::Data<AppState>,
    body: web::Json<SignUpRequest>,
) -> Result<HttpResponse, AppError> {
    let session = auth_service::sign_up(&state, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(session))
}

/// **Endpoint**: `POST /user/sign-in`
pub async fn sign_in(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SignInRequest>,
) -> Result<HttpResponse, AppError> {
    let client = ClientInfo {
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        address: req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or_default()
            .to_string(),
    };
    let session = auth_service::sign_in(&state, body.into_inner(), client).await?;
    Ok(HttpResponse::Ok().json(session))
}

/// **Endpoint**: `POST /user/refresh`
pub async fn refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> Result<HttpResponse, AppError> {
    let pair = auth_service::refresh(&state, &body.refresh).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// **Endpoint**: `POST /user/logout`
pub async fn logout(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    auth_service::logout(&state, &user.access_uuid, &user.user_id).await?;
    Ok(HttpResponse::Ok().finish())
}

/// **Endpoint**: `PUT /user/password`
pub async fn update_password(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<UpdatePasswordRequest>,
) -> Result<HttpResponse, AppError> {
    auth_service::update_password(&state, &user.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(true))
}
