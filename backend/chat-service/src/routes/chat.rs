//! Live mailbox feeds over server-sent events

use crate::services::live_feed::{chat_list_feed, unread_counter_feed};
use crate::state::AppState;
use actix_middleware::AuthenticatedUser;
use actix_web::{http::header, web, HttpResponse};

/// **Endpoint**: `GET /chat-list`
pub async fn chat_list(state: web::Data<AppState>, user: AuthenticatedUser) -> HttpResponse {
    let feed = chat_list_feed(
        state.persistence.chat.clone(),
        user.profile_id,
        state.config.feed_tick,
    );
    event_stream().streaming(feed)
}

/// **Endpoint**: `GET /chat-counter`
pub async fn chat_counter(state: web::Data<AppState>, user: AuthenticatedUser) -> HttpResponse {
    let feed = unread_counter_feed(
        state.persistence.chat.clone(),
        user.profile_id,
        state.config.feed_tick,
    );
    event_stream().streaming(feed)
}

fn event_stream() -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"));
    builder
}
