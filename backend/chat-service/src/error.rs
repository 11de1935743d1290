use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use error_types::ServiceError;
use jwt_security::{StoreError, TokenError};
use std::time::Duration;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("record".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Token(TokenError::Store(e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization: {e}"))
    }
}

impl AppError {
    /// Collapse into the wire taxonomy. Server-side causes stay in the logs.
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            AppError::Validation(msg) => ServiceError::Validation(msg.clone()),
            AppError::Unauthorized => ServiceError::Unauthorized,
            AppError::NotFound(what) => ServiceError::NotFound(what.clone()),
            AppError::Conflict(msg) => ServiceError::Conflict(msg.clone()),
            AppError::Token(err) if err.is_auth_failure() => ServiceError::Unauthorized,
            other => ServiceError::General(other.to_string()),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.to_service_error().status_code()
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let service_error = self.to_service_error();
        if let ServiceError::General(cause) = &service_error {
            tracing::error!(target: "internal_error", error = %cause, "request failed");
        }

        let mut builder = HttpResponse::build(ResponseError::status_code(self));
        if service_error.has_body() {
            builder.json(service_error.to_response())
        } else {
            builder.finish()
        }
    }
}
