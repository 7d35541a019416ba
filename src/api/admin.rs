//! Admin API endpoints
//!
//! Everything here sits behind `require_auth` + `require_admin`:
//! - GET /admin/dashboard
//! - CRUD for cities, areas, neighborhoods, listings, events, posts, media,
//!   newsletters and subscriptions (`GET/POST /admin/<entity>`,
//!   `GET/PUT/DELETE /admin/<entity>/{id}`)
//! - Submission review (list, get, approve, reject)
//! - Site settings

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_page_size, PageResponse, PaginationQuery};
use crate::api::listings::ListingsQuery;
use crate::api::middleware::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, AuthenticatedUser};
use crate::models::{
    Area, BlogPost, BusinessListing, City, CreateAreaInput, CreateCityInput, CreateEventInput,
    CreateListingInput, CreateMediaInput, CreateNeighborhoodInput, CreateNewsletterInput,
    CreatePostInput, CreateSubscriptionInput, Event, ListingStatus, MediaFilter, MediaItem,
    Neighborhood, Newsletter, PostStatus, PostWithLinks, ReviewInput, Submission,
    SubmissionStatus, Subscription, UpdateAreaInput, UpdateCityInput, UpdateEventInput,
    UpdateListingInput, UpdateMediaInput, UpdateNeighborhoodInput, UpdateNewsletterInput,
    UpdatePostInput, UpdateSubscriptionInput,
};
use crate::services::SiteSettings;

/// Response for dashboard stats
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub cities: i64,
    pub neighborhoods: i64,
    pub published_listings: i64,
    pub draft_listings: i64,
    pub upcoming_events: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub pending_submissions: i64,
    pub active_subscriptions: i64,
    pub system: SystemStats,
}

#[derive(Debug, Serialize)]
pub struct SystemStats {
    pub version: String,
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub server_errors: u64,
    pub avg_response_time_ms: f64,
    pub cache_entries: u64,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    pub listing_id: Option<i64>,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/cities", get(list_cities).post(create_city))
        .route("/cities/{id}", get(get_city).put(update_city).delete(delete_city))
        .route("/areas", get(list_areas).post(create_area))
        .route("/areas/{id}", get(get_area).put(update_area).delete(delete_area))
        .route("/neighborhoods", get(list_neighborhoods).post(create_neighborhood))
        .route(
            "/neighborhoods/{id}",
            get(get_neighborhood).put(update_neighborhood).delete(delete_neighborhood),
        )
        .route("/listings", get(list_listings).post(create_listing))
        .route("/listings/{id}", get(get_listing).put(update_listing).delete(delete_listing))
        .route("/events", get(list_events).post(create_event))
        .route("/events/{id}", get(get_event).put(update_event).delete(delete_event))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).put(update_post).delete(delete_post))
        .route("/media", get(list_media).post(create_media))
        .route("/media/{id}", get(get_media).put(update_media).delete(delete_media))
        .route("/newsletters", get(list_newsletters).post(create_newsletter))
        .route(
            "/newsletters/{id}",
            get(get_newsletter).put(update_newsletter).delete(delete_newsletter),
        )
        .route("/subscriptions", get(list_subscriptions).post(create_subscription))
        .route(
            "/subscriptions/{id}",
            get(get_subscription).put(update_subscription).delete(delete_subscription),
        )
        .route("/submissions", get(list_submissions))
        .route("/submissions/{id}", get(get_submission))
        .route("/submissions/{id}/approve", post(approve_submission))
        .route("/submissions/{id}/reject", post(reject_submission))
        .route("/settings", get(get_settings).put(update_settings))
}

type Created<T> = (StatusCode, Json<T>);

fn created<T>(value: T) -> Created<T> {
    (StatusCode::CREATED, Json(value))
}

// ============================================================================
// Dashboard
// ============================================================================

/// GET /api/v1/admin/dashboard
async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let (
        cities,
        neighborhoods,
        published_listings,
        draft_listings,
        upcoming_events,
        published_posts,
        draft_posts,
        active_subscriptions,
    ) = tokio::try_join!(
        state.geo_service.count_cities(),
        state.geo_service.count_neighborhoods(),
        state.listing_service.count_by_status(ListingStatus::Published),
        state.listing_service.count_by_status(ListingStatus::Draft),
        state.event_service.count_upcoming(),
        state.post_service.count_by_status(PostStatus::Published),
        state.post_service.count_by_status(PostStatus::Draft),
        state.subscription_service.count_active(),
    )?;
    let pending_submissions = state
        .submission_service
        .count_by_status(SubmissionStatus::Pending)
        .await?;

    let stats = &state.request_stats;
    Ok(Json(DashboardResponse {
        cities,
        neighborhoods,
        published_listings,
        draft_listings,
        upcoming_events,
        published_posts,
        draft_posts,
        pending_submissions,
        active_subscriptions,
        system: SystemStats {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: stats.uptime_seconds(),
            total_requests: stats.total_requests(),
            server_errors: stats.server_errors(),
            avg_response_time_ms: stats.avg_response_time_us() / 1000.0,
            cache_entries: state.cache.entry_count(),
        },
    }))
}

// ============================================================================
// Geography
// ============================================================================

async fn list_cities(State(state): State<AppState>) -> Result<Json<Vec<City>>, ApiError> {
    Ok(Json(state.geo_service.list_cities().await?))
}

async fn create_city(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateCityInput>,
) -> Result<Created<City>, ApiError> {
    Ok(created(state.geo_service.create_city(body).await?))
}

async fn get_city(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<Json<City>, ApiError> {
    Ok(Json(state.geo_service.get_city(id).await?))
}

async fn update_city(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateCityInput>,
) -> Result<Json<City>, ApiError> {
    Ok(Json(state.geo_service.update_city(id, body).await?))
}

async fn delete_city(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<StatusCode, ApiError> {
    state.geo_service.delete_city(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_areas(State(state): State<AppState>) -> Result<Json<Vec<Area>>, ApiError> {
    Ok(Json(state.geo_service.list_areas().await?))
}

async fn create_area(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateAreaInput>,
) -> Result<Created<Area>, ApiError> {
    Ok(created(state.geo_service.create_area(body).await?))
}

async fn get_area(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<Json<Area>, ApiError> {
    Ok(Json(state.geo_service.get_area(id).await?))
}

async fn update_area(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateAreaInput>,
) -> Result<Json<Area>, ApiError> {
    Ok(Json(state.geo_service.update_area(id, body).await?))
}

async fn delete_area(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<StatusCode, ApiError> {
    state.geo_service.delete_area(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_neighborhoods(State(state): State<AppState>) -> Result<Json<Vec<Neighborhood>>, ApiError> {
    Ok(Json(state.geo_service.list_neighborhoods().await?))
}

async fn create_neighborhood(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateNeighborhoodInput>,
) -> Result<Created<Neighborhood>, ApiError> {
    Ok(created(state.geo_service.create_neighborhood(body).await?))
}

async fn get_neighborhood(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Neighborhood>, ApiError> {
    Ok(Json(state.geo_service.get_neighborhood(id).await?))
}

async fn update_neighborhood(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateNeighborhoodInput>,
) -> Result<Json<Neighborhood>, ApiError> {
    Ok(Json(state.geo_service.update_neighborhood(id, body).await?))
}

async fn delete_neighborhood(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.geo_service.delete_neighborhood(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Listings and events
// ============================================================================

/// GET /api/v1/admin/listings - all statuses
async fn list_listings(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListingsQuery>,
) -> Result<Json<PageResponse<BusinessListing>>, ApiError> {
    let (filter, page) = query.into_parts()?;
    let result = state.listing_service.list_all(filter, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn create_listing(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateListingInput>,
) -> Result<Created<BusinessListing>, ApiError> {
    Ok(created(state.listing_service.create(body).await?))
}

async fn get_listing(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<BusinessListing>, ApiError> {
    Ok(Json(state.listing_service.get(id).await?))
}

async fn update_listing(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateListingInput>,
) -> Result<Json<BusinessListing>, ApiError> {
    Ok(Json(state.listing_service.update(id, body).await?))
}

async fn delete_listing(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<StatusCode, ApiError> {
    state.listing_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/events - past and draft events included
async fn list_events(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PaginationQuery>,
) -> Result<Json<PageResponse<Event>>, ApiError> {
    Ok(Json(state.event_service.list_all(&page.into()).await?.into()))
}

async fn create_event(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateEventInput>,
) -> Result<Created<Event>, ApiError> {
    Ok(created(state.event_service.create(body).await?))
}

async fn get_event(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.get(id).await?))
}

async fn update_event(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateEventInput>,
) -> Result<Json<Event>, ApiError> {
    Ok(Json(state.event_service.update(id, body).await?))
}

async fn delete_event(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<StatusCode, ApiError> {
    state.event_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Posts, media, newsletters
// ============================================================================

async fn list_posts(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PaginationQuery>,
) -> Result<Json<PageResponse<BlogPost>>, ApiError> {
    Ok(Json(state.post_service.list_all(&page.into()).await?.into()))
}

/// POST /api/v1/admin/posts - authored by the current user
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<CreatePostInput>,
) -> Result<Created<BlogPost>, ApiError> {
    Ok(created(state.post_service.create(body, Some(user.0.id)).await?))
}

async fn get_post(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<Json<PostWithLinks>, ApiError> {
    Ok(Json(state.post_service.get(id).await?))
}

async fn update_post(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdatePostInput>,
) -> Result<Json<BlogPost>, ApiError> {
    Ok(Json(state.post_service.update(id, body).await?))
}

async fn delete_post(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_media(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<MediaFilter>,
) -> Result<Json<Vec<MediaItem>>, ApiError> {
    Ok(Json(state.media_service.list(&filter).await?))
}

async fn create_media(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateMediaInput>,
) -> Result<Created<MediaItem>, ApiError> {
    Ok(created(state.media_service.create(body).await?))
}

async fn get_media(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<Json<MediaItem>, ApiError> {
    Ok(Json(state.media_service.get(id).await?))
}

async fn update_media(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateMediaInput>,
) -> Result<Json<MediaItem>, ApiError> {
    Ok(Json(state.media_service.update(id, body).await?))
}

async fn delete_media(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Result<StatusCode, ApiError> {
    state.media_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/newsletters - drafts and scheduled issues included
async fn list_newsletters(State(state): State<AppState>) -> Result<Json<Vec<Newsletter>>, ApiError> {
    Ok(Json(state.newsletter_service.list_all().await?))
}

async fn create_newsletter(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateNewsletterInput>,
) -> Result<Created<Newsletter>, ApiError> {
    Ok(created(state.newsletter_service.create(body).await?))
}

async fn get_newsletter(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Newsletter>, ApiError> {
    Ok(Json(state.newsletter_service.get(id).await?))
}

async fn update_newsletter(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateNewsletterInput>,
) -> Result<Json<Newsletter>, ApiError> {
    Ok(Json(state.newsletter_service.update(id, body).await?))
}

async fn delete_newsletter(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.newsletter_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Subscriptions
// ============================================================================

async fn list_subscriptions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SubscriptionsQuery>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(state.subscription_service.list(query.listing_id).await?))
}

async fn create_subscription(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateSubscriptionInput>,
) -> Result<Created<Subscription>, ApiError> {
    Ok(created(state.subscription_service.create(body).await?))
}

async fn get_subscription(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Subscription>, ApiError> {
    Ok(Json(state.subscription_service.get(id).await?))
}

async fn update_subscription(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateSubscriptionInput>,
) -> Result<Json<Subscription>, ApiError> {
    Ok(Json(state.subscription_service.update(id, body).await?))
}

async fn delete_subscription(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.subscription_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Submissions
// ============================================================================

/// GET /api/v1/admin/submissions?status=&page=&page_size=
async fn list_submissions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SubmissionsQuery>,
) -> Result<Json<PageResponse<Submission>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<SubmissionStatus>()
                .map_err(|_| ApiError::validation_error(format!("status '{}' is not valid", raw)))?,
        ),
        None => None,
    };
    let page = PaginationQuery {
        page: query.page,
        page_size: query.page_size,
    };
    let result = state.submission_service.list(status, &page.into()).await?;
    Ok(Json(result.into()))
}

async fn get_submission(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Submission>, ApiError> {
    Ok(Json(state.submission_service.get(id).await?))
}

/// The review body (`{"note": ...}`) is optional
fn review_input(body: &Bytes) -> Result<ReviewInput, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReviewInput::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation_error(format!("Malformed review body: {}", e)))
}

/// POST /api/v1/admin/submissions/{id}/approve
async fn approve_submission(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    body: Bytes,
) -> Result<Json<Submission>, ApiError> {
    let review = review_input(&body)?;
    Ok(Json(state.submission_service.approve(id, review.note).await?))
}

/// POST /api/v1/admin/submissions/{id}/reject
async fn reject_submission(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    body: Bytes,
) -> Result<Json<Submission>, ApiError> {
    let review = review_input(&body)?;
    Ok(Json(state.submission_service.reject(id, review.note).await?))
}

// ============================================================================
// Settings
// ============================================================================

async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.get_site_settings().await?))
}

async fn update_settings(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SiteSettings>,
) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.update_site_settings(&body).await?))
}
