pub mod auth_service;
pub mod email;
pub mod live_feed;
pub mod message_router;
pub mod verification;
