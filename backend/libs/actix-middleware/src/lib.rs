//! # Actix Middleware Library
//!
//! Shared middleware for the chatline HTTP surface
//!
//! ## Modules
//! - `rate_limit`: per-address token buckets with idle eviction
//! - `jwt_auth`: bearer token + device id authentication
//! - `request_id`: request id propagation
//! - `logging`: access log

pub mod jwt_auth;
pub mod logging;
pub mod rate_limit;
pub mod request_id;

pub use jwt_auth::{AuthenticatedUser, JwtAuthMiddleware, DEVICE_HEADER};
pub use logging::Logging;
pub use rate_limit::{RateLimitConfig, RateLimitMiddleware, VisitorTable};
pub use request_id::{request_id, RequestIdMiddleware};
