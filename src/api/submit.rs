//! Public submission and payment endpoints
//!
//! - POST /api/v1/submit - form-encoded business or event submission
//! - POST /api/v1/checkout - start a hosted checkout for a submission
//! - POST /api/v1/webhooks/payment - signed provider callback

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiForm, ApiJson, AppState};
use crate::models::{PaymentStatus, SubmissionForm, SubmissionStatus};
use crate::services::{CheckoutSession, WebhookEvent};

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub submission_id: i64,
    pub status: SubmissionStatus,
    pub payment_status: PaymentStatus,
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub submission_id: i64,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit))
        .route("/checkout", post(checkout))
        .route("/webhooks/payment", post(payment_webhook))
}

/// POST /api/v1/submit
async fn submit(
    State(state): State<AppState>,
    ApiForm(form): ApiForm<SubmissionForm>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let submission = state.submission_service.submit(form).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            submission_id: submission.id,
            status: submission.status,
            payment_status: submission.payment_status,
            amount_cents: submission.amount_cents,
        }),
    ))
}

/// POST /api/v1/checkout
async fn checkout(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    Ok(Json(state.payment_service.begin_checkout(body.submission_id).await?))
}

/// POST /api/v1/webhooks/payment
///
/// The signature covers the raw body, so the body is verified before it is
/// parsed.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Payment webhook without signature header");
            ApiError::unauthorized("Missing payment signature")
        })?;
    state
        .payment_service
        .verify_signature(signature, &body, Utc::now().timestamp())?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation_error(format!("Malformed webhook body: {}", e)))?;
    let outcome = state.payment_service.handle_event(&event).await?;
    tracing::debug!(?outcome, event_type = %event.event_type, "Payment webhook processed");

    Ok(Json(WebhookResponse { received: true }))
}
