//! Business listing API endpoints (public)
//!
//! - GET /api/v1/listings?neighborhood=&tier=&q=&page=&page_size=
//! - GET /api/v1/listings/{slug}

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_page_size, PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, ApiPath, ApiQuery, AppState};
use crate::models::{BusinessListing, ListingFilter, ListingTier};

#[derive(Debug, Deserialize)]
pub struct ListingsQuery {
    pub neighborhood: Option<String>,
    pub tier: Option<String>,
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl ListingsQuery {
    /// Split into the filter and the page; an unknown tier is a 400
    pub fn into_parts(self) -> Result<(ListingFilter, PaginationQuery), ApiError> {
        let tier = match self.tier.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => Some(
                raw.parse::<ListingTier>()
                    .map_err(|_| ApiError::validation_error(format!("tier '{}' is not valid", raw)))?,
            ),
            None => None,
        };
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let filter = ListingFilter {
            neighborhood: non_empty(self.neighborhood),
            tier,
            q: non_empty(self.q),
            published_only: true,
        };
        Ok((
            filter,
            PaginationQuery {
                page: self.page,
                page_size: self.page_size,
            },
        ))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_listings))
        .route("/{slug}", get(get_listing))
}

async fn list_listings(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListingsQuery>,
) -> Result<Json<PageResponse<BusinessListing>>, ApiError> {
    let (filter, page) = query.into_parts()?;
    let result = state
        .listing_service
        .list_public(filter, &page.into())
        .await?;
    Ok(Json(result.into()))
}

async fn get_listing(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<BusinessListing>, ApiError> {
    Ok(Json(state.listing_service.get_published_by_slug(&slug).await?))
}
