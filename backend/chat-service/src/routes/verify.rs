//! Verification code endpoints

use crate::error::AppError;
use crate::services::verification::{
    self, CheckCodeRequest, CodeRequest, ResetCodeRequest, ResetPasswordRequest,
};
use crate::state::AppState;
use actix_middleware::AuthenticatedUser;
use actix_web::{web, HttpResponse};

/// **Endpoint**: `POST /user/verify/code`
pub async fn request_code(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CodeRequest>,
) -> Result<HttpResponse, AppError> {
    verification::request_code(&state, &user.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().finish())
}

/// **Endpoint**: `POST /user/verify/check`
pub async fn check_code(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CheckCodeRequest>,
) -> Result<HttpResponse, AppError> {
    verification::check_code(&state, &user.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}

/// **Endpoint**: `POST /user/verify/renew`
pub async fn renew_code(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CodeRequest>,
) -> Result<HttpResponse, AppError> {
    verification::renew_code(&state, &user.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().finish())
}

/// **Endpoint**: `POST /user/reset/code`
pub async fn reset_code(
    state: web::Data<AppState>,
    body: web::Json<ResetCodeRequest>,
) -> Result<HttpResponse, AppError> {
    verification::request_reset_code(&state, body.into_inner()).await?;
    Ok(HttpResponse::Created().finish())
}

/// **Endpoint**: `POST /user/reset/password`
pub async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    verification::reset_password(&state, body.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}
