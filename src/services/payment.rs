//! Payment service
//!
//! Provider-agnostic hosted checkout. `begin_checkout` hands the visitor a
//! redirect URL carrying a fresh reference; the provider later calls the
//! webhook with that reference, signed with a shared secret:
//!
//! ```text
//! X-Payment-Signature: t=<unix seconds>,v1=<hex HMAC-SHA256 of "<t>.<body>">
//! ```
//!
//! Reconciliation is idempotent. The payment status moves out of `unpaid`
//! once, and the submission is approved or rejected once; replays are
//! acknowledged without further change.

use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::submission::{SubmissionError, SubmissionService};
use crate::config::PaymentsConfig;
use crate::db::repositories::{SqlxSubmissionRepository, SubmissionRepository};
use crate::db::DynDatabasePool;
use crate::models::{PaymentStatus, Submission};

type HmacSha256 = Hmac<Sha256>;

pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.completed";
pub const EVENT_CHECKOUT_FAILED: &str = "checkout.failed";
pub const EVENT_CHECKOUT_EXPIRED: &str = "checkout.expired";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("No submission matches the payment reference")]
    NotFound,

    #[error("{0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SubmissionError> for PaymentError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::NotFound => Self::NotFound,
            SubmissionError::Internal(e) => Self::Internal(e),
            SubmissionError::Validation(msg) | SubmissionError::InvalidTransition(msg) => {
                Self::InvalidState(msg)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub reference: String,
}

/// What a webhook delivery changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Approved(i64),
    Rejected(i64),
    /// The submission was already settled; nothing changed
    AlreadyReconciled,
    /// Event type this service does not act on
    Ignored,
}

pub struct PaymentService {
    repo: Arc<dyn SubmissionRepository>,
    submissions: Arc<SubmissionService>,
    config: PaymentsConfig,
}

impl PaymentService {
    pub fn new(pool: DynDatabasePool, submissions: Arc<SubmissionService>, config: PaymentsConfig) -> Self {
        Self {
            repo: SqlxSubmissionRepository::boxed(pool),
            submissions,
            config,
        }
    }

    /// Start a checkout for a pending, unpaid submission
    ///
    /// Repeated calls return the reference issued first, so a payment
    /// completed from any of the visitor's checkout pages still matches.
    pub async fn begin_checkout(&self, submission_id: i64) -> Result<CheckoutSession, PaymentError> {
        let submission = self.submissions.get(submission_id).await?;
        if !submission.awaiting_payment() {
            return Err(not_payable(&submission));
        }

        let reference = match submission.checkout_reference.clone() {
            Some(existing) => existing,
            None => {
                let fresh = Uuid::new_v4().to_string();
                if self.repo.set_checkout_reference(submission_id, &fresh).await? {
                    fresh
                } else {
                    // A concurrent checkout claimed the reference, or the
                    // submission stopped awaiting payment.
                    let current = self.submissions.get(submission_id).await?;
                    match current.checkout_reference.clone() {
                        Some(existing) if current.awaiting_payment() => existing,
                        _ => {
                            return Err(PaymentError::InvalidState(format!(
                                "submission {} is no longer awaiting payment",
                                submission_id
                            )))
                        }
                    }
                }
            }
        };

        let checkout_url = self
            .config
            .checkout_url
            .replace("{reference}", &urlencoding::encode(&reference))
            .replace("{submission_id}", &submission_id.to_string())
            .replace("{amount_cents}", &submission.amount_cents.to_string());

        tracing::info!(submission_id, reference = %reference, "Checkout started");
        Ok(CheckoutSession {
            checkout_url,
            reference,
        })
    }

    /// Check an `X-Payment-Signature` header against the raw body
    ///
    /// `now` is the current unix time in seconds.
    pub fn verify_signature(&self, header: &str, body: &[u8], now: i64) -> Result<(), PaymentError> {
        let result = check_signature(
            &self.config.webhook_secret,
            self.config.signature_tolerance_secs,
            header,
            body,
            now,
        );
        if let Err(PaymentError::InvalidSignature(reason)) = &result {
            tracing::warn!(reason = %reason, "Rejected payment webhook");
        }
        result
    }

    /// Apply a verified webhook event
    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<Reconciliation, PaymentError> {
        let target = match event.event_type.as_str() {
            EVENT_CHECKOUT_COMPLETED => PaymentStatus::Paid,
            EVENT_CHECKOUT_FAILED | EVENT_CHECKOUT_EXPIRED => PaymentStatus::Failed,
            other => {
                tracing::debug!(event_type = %other, "Ignoring payment event");
                return Ok(Reconciliation::Ignored);
            }
        };

        let submission = self
            .submissions
            .get_by_reference(&event.data.reference)
            .await?
            .ok_or(PaymentError::NotFound)?;

        let settled = self.repo.settle_payment(submission.id, target).await?;
        let payment_status = if settled { target } else { submission.payment_status };
        if payment_status != target || !submission.is_pending() {
            tracing::info!(
                submission_id = submission.id,
                event_type = %event.event_type,
                "Payment event already reconciled"
            );
            return Ok(Reconciliation::AlreadyReconciled);
        }

        let note = Some(format!("payment {}", event.event_type));
        let resolved = match target {
            PaymentStatus::Paid => self.submissions.approve(submission.id, note).await,
            _ => self.submissions.reject(submission.id, note).await,
        };

        match resolved {
            Ok(resolved) => {
                tracing::info!(
                    submission_id = resolved.id,
                    payment_status = %target,
                    status = %resolved.status,
                    "Payment reconciled"
                );
                Ok(match target {
                    PaymentStatus::Paid => Reconciliation::Approved(resolved.id),
                    _ => Reconciliation::Rejected(resolved.id),
                })
            }
            // Reviewed by an admin between the payment update and now
            Err(SubmissionError::InvalidTransition(_)) => Ok(Reconciliation::AlreadyReconciled),
            Err(e) => Err(e.into()),
        }
    }
}

fn not_payable(submission: &Submission) -> PaymentError {
    PaymentError::InvalidState(format!(
        "submission {} is {} and {}; checkout needs a pending, unpaid submission",
        submission.id, submission.status, submission.payment_status
    ))
}

fn check_signature(
    secret: &str,
    tolerance_secs: i64,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), PaymentError> {
    if secret.is_empty() {
        return Err(PaymentError::InvalidSignature(
            "webhook secret is not configured".to_string(),
        ));
    }

    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.trim().parse::<i64>().ok(),
            Some(("v1", value)) => signature = Some(value.trim().to_ascii_lowercase()),
            _ => {}
        }
    }
    let timestamp =
        timestamp.ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    let signature =
        signature.ok_or_else(|| PaymentError::InvalidSignature("missing v1 signature".to_string()))?;

    if (now - timestamp).abs() > tolerance_secs {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let expected = HEXLOWER
        .decode(signature.as_bytes())
        .map_err(|_| PaymentError::InvalidSignature("signature is not hex".to_string()))?;
    signed_payload_mac(secret, timestamp, body)?
        .verify_slice(&expected)
        .map_err(|_| PaymentError::InvalidSignature("signature mismatch".to_string()))
}

fn signed_payload_mac(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PaymentError::Internal(anyhow::anyhow!("Invalid HMAC key: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Build the `X-Payment-Signature` header value a provider would send
pub fn signature_header(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, PaymentError> {
    let digest = signed_payload_mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, HEXLOWER.encode(&digest)))
}
