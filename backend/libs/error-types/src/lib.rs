use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level error taxonomy shared by every chatline crate.
///
/// Each variant maps to exactly one HTTP status. `General` never leaks its
/// cause to the client; callers log the cause before building it.
///
/// ```ignore
/// repo.find(id).await.map_err(ServiceError::from)?;
/// ```
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests")]
    RateLimited,

    #[error("Internal server error")]
    General(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::Unauthorized => 401,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::RateLimited => 429,
            ServiceError::General(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => error_codes::VALIDATION_FAILED,
            ServiceError::NotFound(_) => error_codes::NOT_FOUND,
            ServiceError::Conflict(_) => error_codes::CONFLICT,
            ServiceError::Unauthorized => error_codes::TOKEN_INVALID,
            ServiceError::RateLimited => error_codes::RATE_LIMIT_EXCEEDED,
            ServiceError::General(_) => error_codes::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => error_types::VALIDATION_ERROR,
            ServiceError::NotFound(_) => error_types::NOT_FOUND_ERROR,
            ServiceError::Conflict(_) => error_types::CONFLICT_ERROR,
            ServiceError::Unauthorized => error_types::AUTHENTICATION_ERROR,
            ServiceError::RateLimited => error_types::RATE_LIMIT_ERROR,
            ServiceError::General(_) => error_types::SERVER_ERROR,
        }
    }

    /// Rate-limited responses carry no body at all.
    pub fn has_body(&self) -> bool {
        !matches!(self, ServiceError::RateLimited)
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(
            &self.to_string(),
            self.status_code(),
            self.error_type(),
            self.error_code(),
        )
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServiceError::NotFound("record".to_string()),
            other => ServiceError::General(other.to_string()),
        }
    }
}

/// JSON body returned for every non-2xx response that has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,

    pub status: u16,

    /// One of the constants in [`error_types`].
    pub error_type: String,

    /// Stable machine-readable code, see [`error_codes`].
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

pub mod error_codes {
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const RATE_LIMIT_ERROR: &str = "rate_limit_error";
    pub const SERVER_ERROR: &str = "server_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::Validation("bad".into()).status_code(), 400);
        assert_eq!(ServiceError::Unauthorized.status_code(), 401);
        assert_eq!(ServiceError::NotFound("member".into()).status_code(), 404);
        assert_eq!(ServiceError::Conflict("email_taken".into()).status_code(), 409);
        assert_eq!(ServiceError::RateLimited.status_code(), 429);
        assert_eq!(ServiceError::General("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_general_error_hides_cause() {
        let err = ServiceError::General("connection refused on 10.0.0.4".into());
        let body = err.to_response();

        assert_eq!(body.message, "Internal server error");
        assert_eq!(body.error_type, error_types::SERVER_ERROR);
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = ServiceError::Validation("email is invalid".into());
        assert_eq!(err.to_response().message, "email is invalid");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ServiceError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_rate_limited_has_no_body() {
        assert!(!ServiceError::RateLimited.has_body());
        assert!(ServiceError::Unauthorized.has_body());
    }

    #[test]
    fn test_trace_id_is_skipped_when_absent() {
        let json = serde_json::to_value(ServiceError::Unauthorized.to_response()).unwrap();
        assert!(json.get("trace_id").is_none());

        let json = serde_json::to_value(
            ServiceError::Unauthorized
                .to_response()
                .with_trace_id("req-1".into()),
        )
        .unwrap();
        assert_eq!(json["trace_id"], "req-1");
    }
}
