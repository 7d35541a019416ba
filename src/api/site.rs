//! Public site information API
//!
//! Site name, tagline and contact address for the frontend header/footer.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct SiteInfoResponse {
    pub version: String,
    pub site_name: String,
    pub site_tagline: String,
    pub contact_email: String,
    pub business_price_cents: i64,
    pub event_price_cents: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/info", get(get_site_info))
}

/// GET /api/v1/site/info
async fn get_site_info(State(state): State<AppState>) -> Result<Json<SiteInfoResponse>, ApiError> {
    let settings = state.settings_service.get_site_settings().await?;
    Ok(Json(SiteInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        site_name: settings.site_name,
        site_tagline: settings.site_tagline,
        contact_email: settings.contact_email,
        business_price_cents: state.config.payments.business_price_cents,
        event_price_cents: state.config.payments.event_price_cents,
    }))
}
