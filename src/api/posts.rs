//! Blog post API endpoints (public)
//!
//! - GET /api/v1/posts?page=&page_size=
//! - GET /api/v1/posts/{slug} - post with linked businesses and neighborhoods

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};

use crate::api::common::{PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, ApiPath, ApiQuery, AppState};
use crate::models::{BlogPost, PostWithLinks};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/{slug}", get(get_post))
}

async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PaginationQuery>,
) -> Result<Json<PageResponse<BlogPost>>, ApiError> {
    let result = state.post_service.list_public(&page.into()).await?;
    Ok(Json(result.into()))
}

async fn get_post(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<PostWithLinks>, ApiError> {
    Ok(Json(state.post_service.get_published_by_slug(&slug).await?))
}
