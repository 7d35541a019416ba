//! Media and newsletter API endpoints (public)
//!
//! - GET /api/v1/media?neighborhood=&listing=
//! - GET /api/v1/newsletters - sent issues only
//! - GET /api/v1/newsletters/{slug}

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, ApiPath, ApiQuery, AppState};
use crate::models::{MediaFilter, MediaItem, Newsletter};

pub fn media_router() -> Router<AppState> {
    Router::new().route("/", get(list_media))
}

pub fn newsletters_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_newsletters))
        .route("/{slug}", get(get_newsletter))
}

async fn list_media(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<MediaFilter>,
) -> Result<Json<Vec<MediaItem>>, ApiError> {
    Ok(Json(state.media_service.list(&filter).await?))
}

async fn list_newsletters(State(state): State<AppState>) -> Result<Json<Vec<Newsletter>>, ApiError> {
    Ok(Json(state.newsletter_service.list_sent().await?))
}

async fn get_newsletter(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Newsletter>, ApiError> {
    Ok(Json(state.newsletter_service.get_sent_by_slug(&slug).await?))
}
