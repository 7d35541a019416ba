//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api/v1`:
//! - Public content: cities, areas, neighborhoods, listings, events, posts,
//!   media, newsletters, site info
//! - Submission intake, checkout and the payment webhook
//! - Auth (register, login, logout, me)
//! - Admin portal under `/admin` (admin session required)

pub mod admin;
pub mod auth;
pub mod common;
pub mod events;
pub mod geo;
pub mod listings;
pub mod media;
pub mod middleware;
pub mod posts;
pub mod site;
pub mod submit;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, RequestStats};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/cities", geo::cities_router())
        .nest("/areas", geo::areas_router())
        .nest("/neighborhoods", geo::neighborhoods_router())
        .nest("/listings", listings::router())
        .nest("/events", events::router())
        .nest("/posts", posts::router())
        .nest("/media", media::media_router())
        .nest("/newsletters", media::newsletters_router())
        .nest("/site", site::router())
        .nest("/auth", auth::public_router())
        .merge(submit::router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // Cookie auth needs credentials, which rules out a wildcard origin
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin).allow_credentials(true),
        Err(e) => tracing::warn!("Ignoring invalid CORS origin '{}': {}", cors_origin, e),
    }

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Request stats middleware (outermost layer, runs for all requests)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}
