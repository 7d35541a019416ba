//! Event API endpoints (public)
//!
//! - GET /api/v1/events?neighborhood=&page=&page_size= - upcoming events, soonest first
//! - GET /api/v1/events/{slug}

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_page_size, PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, ApiPath, ApiQuery, AppState};
use crate::models::Event;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub neighborhood: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events))
        .route("/{slug}", get(get_event))
}

async fn list_events(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<EventsQuery>,
) -> Result<Json<PageResponse<Event>>, ApiError> {
    let page = PaginationQuery {
        page: query.page,
        page_size: query.page_size,
    };
    let result = state
        .event_service
        .list_upcoming(query.neighborhood, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_event(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.get_published_by_slug(&slug).await?))
}
