//! Submission service
//!
//! Public visitors submit a business or an event through a form. A
//! submission starts `pending`/`unpaid`; review (by an admin or by payment
//! reconciliation) moves it to `approved` or `rejected` exactly once.
//! Approval materializes a draft listing or event from the submission.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use super::error::ContentError;
use super::{EventService, ListingService};
use crate::cache::SharedCache;
use crate::config::PaymentsConfig;
use crate::db::repositories::{
    NeighborhoodRepository, SqlxNeighborhoodRepository, SqlxSubmissionRepository,
    SubmissionRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    CreateEventInput, CreateListingInput, ListParams, NewSubmission, PagedResult, Submission,
    SubmissionForm, SubmissionStatus, SubmissionType,
};

/// Form value accepted for `event_starts_at` besides RFC 3339
const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("{0}")]
    Validation(String),

    #[error("Submission not found")]
    NotFound,

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ContentError> for SubmissionError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Internal(e) => Self::Internal(e),
            other => Self::Validation(other.to_string()),
        }
    }
}

pub struct SubmissionService {
    repo: Arc<dyn SubmissionRepository>,
    neighborhoods: Arc<dyn NeighborhoodRepository>,
    listings: ListingService,
    events: EventService,
    payments: PaymentsConfig,
}

impl SubmissionService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache, payments: PaymentsConfig) -> Self {
        Self {
            repo: SqlxSubmissionRepository::boxed(pool.clone()),
            neighborhoods: SqlxNeighborhoodRepository::boxed(pool.clone()),
            listings: ListingService::new(pool.clone(), cache.clone()),
            events: EventService::new(pool, cache),
            payments,
        }
    }

    /// Check and normalize a raw form
    ///
    /// All fields are trimmed and blank optional fields dropped. Every
    /// error message names the offending field.
    pub async fn validate(&self, form: SubmissionForm) -> Result<NewSubmission, SubmissionError> {
        let submission_type = field("type", form.submission_type)?;
        let submission_type: SubmissionType = submission_type.parse().map_err(|_| {
            SubmissionError::Validation(format!(
                "type must be 'business' or 'event', got '{}'",
                submission_type
            ))
        })?;
        let contact_name = field("contact_name", form.contact_name)?;
        let email = field("email", form.email)?;
        if !email.contains('@') {
            return Err(SubmissionError::Validation(
                "email must be a valid email address".to_string(),
            ));
        }
        let title = field("title", form.title)?;

        let event_starts_at = match (submission_type, blank_to_none(form.event_starts_at)) {
            (SubmissionType::Event, None) => {
                return Err(SubmissionError::Validation(
                    "event_starts_at is required for event submissions".to_string(),
                ))
            }
            (_, Some(raw)) => Some(parse_starts_at(&raw)?),
            (SubmissionType::Business, None) => None,
        };

        let neighborhood_id = match blank_to_none(form.neighborhood) {
            Some(slug) => {
                let neighborhood = self
                    .neighborhoods
                    .get_by_slug(&slug)
                    .await?
                    .ok_or_else(|| {
                        SubmissionError::Validation(format!("neighborhood '{}' does not exist", slug))
                    })?;
                Some(neighborhood.id)
            }
            None => None,
        };

        let amount_cents = match submission_type {
            SubmissionType::Business => self.payments.business_price_cents,
            SubmissionType::Event => self.payments.event_price_cents,
        };

        Ok(NewSubmission {
            submission_type,
            contact_name,
            email,
            phone: blank_to_none(form.phone),
            title,
            description: blank_to_none(form.description),
            website: blank_to_none(form.website),
            neighborhood_id,
            event_starts_at,
            amount_cents,
        })
    }

    /// Validate and persist a new pending, unpaid submission
    pub async fn submit(&self, form: SubmissionForm) -> Result<Submission, SubmissionError> {
        let new = self.validate(form).await?;
        let submission = self.repo.create(&new).await?;

        tracing::info!(
            submission_id = submission.id,
            submission_type = %submission.submission_type,
            amount_cents = submission.amount_cents,
            "Submission received"
        );
        Ok(submission)
    }

    pub async fn get(&self, id: i64) -> Result<Submission, SubmissionError> {
        self.repo.get_by_id(id).await?.ok_or(SubmissionError::NotFound)
    }

    pub async fn get_by_reference(&self, reference: &str) -> Result<Option<Submission>, SubmissionError> {
        Ok(self.repo.get_by_reference(reference).await?)
    }

    pub async fn list(
        &self,
        status: Option<SubmissionStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Submission>, SubmissionError> {
        let (items, total) = self.repo.list(status, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn count_by_status(&self, status: SubmissionStatus) -> Result<i64, SubmissionError> {
        Ok(self.repo.count_by_status(status).await?)
    }

    /// Approve a pending submission, creating its draft listing or event
    pub async fn approve(&self, id: i64, note: Option<String>) -> Result<Submission, SubmissionError> {
        let submission = self.get(id).await?;
        ensure_pending(&submission)?;

        let record_id = self.materialize(&submission).await?;
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let moved = self
            .repo
            .resolve(id, SubmissionStatus::Approved, note.as_deref(), Some(record_id))
            .await?;
        if !moved {
            // Lost a race with another reviewer; drop the record just created.
            match submission.submission_type {
                SubmissionType::Business => self.listings.delete(record_id).await?,
                SubmissionType::Event => self.events.delete(record_id).await?,
            }
            return Err(already_resolved(id));
        }

        tracing::info!(
            submission_id = id,
            submission_type = %submission.submission_type,
            record_id,
            "Submission approved"
        );
        self.get(id).await
    }

    pub async fn reject(&self, id: i64, note: Option<String>) -> Result<Submission, SubmissionError> {
        let submission = self.get(id).await?;
        ensure_pending(&submission)?;

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if !self
            .repo
            .resolve(id, SubmissionStatus::Rejected, note.as_deref(), None)
            .await?
        {
            return Err(already_resolved(id));
        }

        tracing::info!(submission_id = id, "Submission rejected");
        self.get(id).await
    }

    async fn materialize(&self, submission: &Submission) -> Result<i64, SubmissionError> {
        let id = match submission.submission_type {
            SubmissionType::Business => {
                self.listings
                    .create(CreateListingInput {
                        neighborhood_id: submission.neighborhood_id,
                        name: submission.title.clone(),
                        description: submission.description.clone(),
                        phone: submission.phone.clone(),
                        website: submission.website.clone(),
                        email: Some(submission.email.clone()),
                        ..Default::default()
                    })
                    .await?
                    .id
            }
            SubmissionType::Event => {
                let starts_at = submission.event_starts_at.ok_or_else(|| {
                    SubmissionError::Validation("event_starts_at is missing".to_string())
                })?;
                self.events
                    .create(CreateEventInput {
                        neighborhood_id: submission.neighborhood_id,
                        business_listing_id: None,
                        slug: None,
                        title: submission.title.clone(),
                        description: submission.description.clone(),
                        venue: None,
                        starts_at,
                        ends_at: None,
                        status: None,
                    })
                    .await?
                    .id
            }
        };
        Ok(id)
    }
}

fn ensure_pending(submission: &Submission) -> Result<(), SubmissionError> {
    if submission.is_pending() {
        Ok(())
    } else {
        Err(SubmissionError::InvalidTransition(format!(
            "submission {} is already {}",
            submission.id, submission.status
        )))
    }
}

fn already_resolved(id: i64) -> SubmissionError {
    SubmissionError::InvalidTransition(format!("submission {} is no longer pending", id))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn field(name: &str, value: Option<String>) -> Result<String, SubmissionError> {
    blank_to_none(value).ok_or_else(|| SubmissionError::Validation(format!("{} is required", name)))
}

fn parse_starts_at(raw: &str) -> Result<DateTime<Utc>, SubmissionError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LOCAL_DATETIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| {
            SubmissionError::Validation(format!(
                "event_starts_at must be a date-time like 2026-06-01T18:30, got '{}'",
                raw
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::config::CacheConfig;
    use crate::models::{ListingStatus, PaymentStatus};
    use crate::services::test_support::seed_neighborhood;
    use chrono::TimeZone;

    async fn setup() -> (DynDatabasePool, SubmissionService) {
        let pool = crate::db::repositories::test_support::migrated_pool().await;
        let service = SubmissionService::new(
            pool.clone(),
            ContentCache::shared(&CacheConfig::default()),
            PaymentsConfig::default(),
        );
        (pool, service)
    }

    fn business_form() -> SubmissionForm {
        SubmissionForm {
            submission_type: Some(" business ".to_string()),
            contact_name: Some("Rosa".to_string()),
            email: Some("rosa@bakery.example".to_string()),
            phone: Some("   ".to_string()),
            title: Some("Rosa's Bakery".to_string()),
            description: Some("Fresh bread daily".to_string()),
            ..Default::default()
        }
    }

    fn event_form(starts_at: &str) -> SubmissionForm {
        SubmissionForm {
            submission_type: Some("event".to_string()),
            contact_name: Some("Lee".to_string()),
            email: Some("lee@example.com".to_string()),
            title: Some("Block Party".to_string()),
            event_starts_at: Some(starts_at.to_string()),
            ..Default::default()
        }
    }

    fn validation_message(result: Result<NewSubmission, SubmissionError>) -> String {
        match result {
            Err(SubmissionError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_fields_name_the_field() {
        let (_pool, service) = setup().await;
        for name in ["type", "contact_name", "email", "title"] {
            let mut form = business_form();
            match name {
                "type" => form.submission_type = None,
                "contact_name" => form.contact_name = Some("  ".to_string()),
                "email" => form.email = None,
                _ => form.title = Some(String::new()),
            }
            let msg = validation_message(service.validate(form).await);
            assert!(msg.contains(name), "{} not named in '{}'", name, msg);
        }
    }

    #[tokio::test]
    async fn test_invalid_type_and_email() {
        let (_pool, service) = setup().await;
        let mut form = business_form();
        form.submission_type = Some("restaurant".to_string());
        assert!(validation_message(service.validate(form).await).starts_with("type"));

        let mut form = business_form();
        form.email = Some("rosa.example".to_string());
        assert!(validation_message(service.validate(form).await).starts_with("email"));
    }

    #[tokio::test]
    async fn test_event_start_formats() {
        let (_pool, service) = setup().await;
        let local = service.validate(event_form("2026-06-01T18:30")).await.unwrap();
        assert_eq!(
            local.event_starts_at,
            Some(Utc.with_ymd_and_hms(2026, 6, 1, 18, 30, 0).unwrap())
        );

        let rfc = service
            .validate(event_form("2026-06-01T18:30:00+02:00"))
            .await
            .unwrap();
        assert_eq!(
            rfc.event_starts_at,
            Some(Utc.with_ymd_and_hms(2026, 6, 1, 16, 30, 0).unwrap())
        );

        let msg = validation_message(service.validate(event_form("next friday")).await);
        assert!(msg.starts_with("event_starts_at"));
        let msg = validation_message(service.validate(event_form(" ")).await);
        assert!(msg.starts_with("event_starts_at"));
    }

    #[tokio::test]
    async fn test_neighborhood_slug_must_exist() {
        let (pool, service) = setup().await;
        let mut form = business_form();
        form.neighborhood = Some("atlantis".to_string());
        assert!(validation_message(service.validate(form).await).contains("neighborhood"));

        let hood = seed_neighborhood(&pool, "Old Town").await;
        let mut form = business_form();
        form.neighborhood = Some(hood.slug.clone());
        assert_eq!(service.validate(form).await.unwrap().neighborhood_id, Some(hood.id));
    }

    #[tokio::test]
    async fn test_submit_persists_pending_priced_row() {
        let (_pool, service) = setup().await;
        let submission = service.submit(business_form()).await.unwrap();
        assert_eq!(submission.status, SubmissionStatus::Pending);
        assert_eq!(submission.payment_status, PaymentStatus::Unpaid);
        assert_eq!(submission.amount_cents, PaymentsConfig::default().business_price_cents);
        assert_eq!(submission.phone, None);

        let event = service.submit(event_form("2026-06-01T18:30")).await.unwrap();
        assert_eq!(event.amount_cents, PaymentsConfig::default().event_price_cents);
        assert_eq!(service.count_by_status(SubmissionStatus::Pending).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_approve_materializes_draft_listing_once() {
        let (pool, service) = setup().await;
        let submission = service.submit(business_form()).await.unwrap();

        let approved = service
            .approve(submission.id, Some("looks good".to_string()))
            .await
            .unwrap();
        assert_eq!(approved.status, SubmissionStatus::Approved);
        assert_eq!(approved.review_note.as_deref(), Some("looks good"));
        let listing_id = approved.created_record_id.expect("listing created");

        let listings = ListingService::new(pool, ContentCache::shared(&CacheConfig::default()));
        let listing = listings.get(listing_id).await.unwrap();
        assert_eq!(listing.name, "Rosa's Bakery");
        assert_eq!(listing.status, ListingStatus::Draft);

        assert!(matches!(
            service.approve(submission.id, None).await,
            Err(SubmissionError::InvalidTransition(_))
        ));
        assert!(matches!(
            service.reject(submission.id, None).await,
            Err(SubmissionError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_event_and_reject() {
        let (_pool, service) = setup().await;
        let event = service.submit(event_form("2026-06-01T18:30")).await.unwrap();
        let approved = service.approve(event.id, None).await.unwrap();
        assert!(approved.created_record_id.is_some());

        let other = service.submit(business_form()).await.unwrap();
        let rejected = service.reject(other.id, Some(" spam ".to_string())).await.unwrap();
        assert_eq!(rejected.status, SubmissionStatus::Rejected);
        assert_eq!(rejected.review_note.as_deref(), Some("spam"));
        assert_eq!(rejected.created_record_id, None);

        let page = service
            .list(Some(SubmissionStatus::Rejected), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(matches!(service.approve(999, None).await, Err(SubmissionError::NotFound)));
    }
}
