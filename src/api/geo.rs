//! Geography API endpoints (public)
//!
//! - GET /api/v1/cities
//! - GET /api/v1/cities/{slug} - city with its areas
//! - GET /api/v1/areas/{slug} - area with its neighborhoods
//! - GET /api/v1/neighborhoods
//! - GET /api/v1/neighborhoods/{slug} - the neighborhood guide bundle

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};

use crate::api::middleware::{ApiError, ApiPath, AppState};
use crate::models::{AreaWithNeighborhoods, City, CityWithAreas, Neighborhood, NeighborhoodGuide};

pub fn cities_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cities))
        .route("/{slug}", get(get_city))
}

pub fn areas_router() -> Router<AppState> {
    Router::new().route("/{slug}", get(get_area))
}

pub fn neighborhoods_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_neighborhoods))
        .route("/{slug}", get(get_guide))
}

async fn list_cities(State(state): State<AppState>) -> Result<Json<Vec<City>>, ApiError> {
    Ok(Json(state.geo_service.list_cities().await?))
}

async fn get_city(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<CityWithAreas>, ApiError> {
    Ok(Json(state.geo_service.city_with_areas(&slug).await?))
}

async fn get_area(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<AreaWithNeighborhoods>, ApiError> {
    Ok(Json(state.geo_service.area_with_neighborhoods(&slug).await?))
}

async fn list_neighborhoods(State(state): State<AppState>) -> Result<Json<Vec<Neighborhood>>, ApiError> {
    Ok(Json(state.geo_service.list_neighborhoods().await?))
}

async fn get_guide(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<NeighborhoodGuide>, ApiError> {
    Ok(Json(state.geo_service.neighborhood_guide(&slug).await?))
}
