use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(default)]
    pub source: String,
}

/// Lookups are only served to the in-app search and QR scanner.
const LOOKUP_SOURCES: [&str; 2] = ["search", "qr_code"];

/// **Endpoint**: `GET /{nick_name}?source=search|qr_code`
pub async fn get_by_nick_name(
    state: web::Data<AppState>,
    nick_name: web::Path<String>,
    query: web::Query<LookupQuery>,
) -> Result<HttpResponse, AppError> {
    if !LOOKUP_SOURCES.contains(&query.source.as_str()) {
        return Err(AppError::Unauthorized);
    }

    let profile = state
        .persistence
        .profiles
        .find_by_nick_name(&nick_name.into_inner().to_lowercase())
        .await?
        .ok_or_else(|| AppError::NotFound("profile".into()))?;

    Ok(HttpResponse::Ok().json(profile))
}
