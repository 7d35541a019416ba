//! Submission repository
//!
//! State changes are conditional updates (`... WHERE status = 'pending'`);
//! each returns whether a row actually moved.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{ListParams, NewSubmission, PaymentStatus, Submission, SubmissionStatus};

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn create(&self, submission: &NewSubmission) -> Result<Submission>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Submission>>;
    async fn get_by_reference(&self, reference: &str) -> Result<Option<Submission>>;
    async fn list(&self, status: Option<SubmissionStatus>, params: &ListParams) -> Result<(Vec<Submission>, i64)>;
    /// Attach the first checkout reference; false unless the row is pending,
    /// unpaid and has no reference yet
    async fn set_checkout_reference(&self, id: i64, reference: &str) -> Result<bool>;
    /// Move an unpaid submission to `paid` or `failed`; false if already settled
    async fn settle_payment(&self, id: i64, payment_status: PaymentStatus) -> Result<bool>;
    /// Approve or reject a pending submission; false if it was not pending
    async fn resolve(
        &self,
        id: i64,
        status: SubmissionStatus,
        review_note: Option<&str>,
        created_record_id: Option<i64>,
    ) -> Result<bool>;
    async fn count_by_status(&self, status: SubmissionStatus) -> Result<i64>;
}

pub struct SqlxSubmissionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubmissionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubmissionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_SUBMISSION: &str = "SELECT id, submission_type, status, payment_status, contact_name, email, phone, title, \
     description, website, neighborhood_id, event_starts_at, amount_cents, checkout_reference, review_note, \
     created_record_id, created_at, updated_at FROM submissions";

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    submission_type: String,
    status: String,
    payment_status: String,
    contact_name: String,
    email: String,
    phone: Option<String>,
    title: String,
    description: Option<String>,
    website: Option<String>,
    neighborhood_id: Option<i64>,
    event_starts_at: Option<DateTime<Utc>>,
    amount_cents: i64,
    checkout_reference: Option<String>,
    review_note: Option<String>,
    created_record_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = anyhow::Error;

    fn try_from(row: SubmissionRow) -> Result<Self> {
        Ok(Submission {
            id: row.id,
            submission_type: row.submission_type.parse()?,
            status: row.status.parse()?,
            payment_status: row.payment_status.parse()?,
            contact_name: row.contact_name,
            email: row.email,
            phone: row.phone,
            title: row.title,
            description: row.description,
            website: row.website,
            neighborhood_id: row.neighborhood_id,
            event_starts_at: row.event_starts_at,
            amount_cents: row.amount_cents,
            checkout_reference: row.checkout_reference,
            review_note: row.review_note,
            created_record_id: row.created_record_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl SubmissionRepository for SqlxSubmissionRepository {
    async fn create(&self, submission: &NewSubmission) -> Result<Submission> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO submissions (submission_type, status, payment_status, contact_name, email, phone, title, description, \
             website, neighborhood_id, event_starts_at, amount_cents, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(submission.submission_type.to_string())
                .bind(SubmissionStatus::Pending.to_string())
                .bind(PaymentStatus::Unpaid.to_string())
                .bind(&submission.contact_name)
                .bind(&submission.email)
                .bind(&submission.phone)
                .bind(&submission.title)
                .bind(&submission.description)
                .bind(&submission.website)
                .bind(submission.neighborhood_id)
                .bind(submission.event_starts_at)
                .bind(submission.amount_cents)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create submission")?;

        Ok(Submission {
            id,
            submission_type: submission.submission_type,
            status: SubmissionStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            contact_name: submission.contact_name.clone(),
            email: submission.email.clone(),
            phone: submission.phone.clone(),
            title: submission.title.clone(),
            description: submission.description.clone(),
            website: submission.website.clone(),
            neighborhood_id: submission.neighborhood_id,
            event_starts_at: submission.event_starts_at,
            amount_cents: submission.amount_cents,
            checkout_reference: None,
            review_note: None,
            created_record_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Submission>> {
        let sql = format!("{} WHERE id = ?", SELECT_SUBMISSION);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, SubmissionRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get submission")?;
        row.map(Submission::try_from).transpose()
    }

    async fn get_by_reference(&self, reference: &str) -> Result<Option<Submission>> {
        let sql = format!("{} WHERE checkout_reference = ?", SELECT_SUBMISSION);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, SubmissionRow>(sql)
                .bind(reference)
                .fetch_optional(pool)
                .await
        })
        .context("Failed to get submission by checkout reference")?;
        row.map(Submission::try_from).transpose()
    }

    async fn list(&self, status: Option<SubmissionStatus>, params: &ListParams) -> Result<(Vec<Submission>, i64)> {
        let (total, rows) = match status {
            Some(status) => {
                let status = status.to_string();
                let total = on_backend!(
                    self.pool,
                    "SELECT COUNT(*) FROM submissions WHERE status = ?",
                    |pool, sql| sqlx::query_scalar::<_, i64>(sql).bind(&status).fetch_one(pool).await
                )
                .context("Failed to count submissions")?;
                let sql = format!(
                    "{} WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                    SELECT_SUBMISSION
                );
                let rows = on_backend!(self.pool, &sql, |pool, sql| {
                    sqlx::query_as::<_, SubmissionRow>(sql)
                        .bind(&status)
                        .bind(params.limit())
                        .bind(params.offset())
                        .fetch_all(pool)
                        .await
                })
                .context("Failed to list submissions")?;
                (total, rows)
            }
            None => {
                let total = on_backend!(self.pool, "SELECT COUNT(*) FROM submissions", |pool, sql| {
                    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
                })
                .context("Failed to count submissions")?;
                let sql = format!(
                    "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
                    SELECT_SUBMISSION
                );
                let rows = on_backend!(self.pool, &sql, |pool, sql| {
                    sqlx::query_as::<_, SubmissionRow>(sql)
                        .bind(params.limit())
                        .bind(params.offset())
                        .fetch_all(pool)
                        .await
                })
                .context("Failed to list submissions")?;
                (total, rows)
            }
        };

        let items = rows
            .into_iter()
            .map(Submission::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn set_checkout_reference(&self, id: i64, reference: &str) -> Result<bool> {
        let now = Utc::now();
        let affected = on_backend!(
            self.pool,
            "UPDATE submissions SET checkout_reference = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending' AND payment_status = 'unpaid' \
             AND checkout_reference IS NULL",
            |pool, sql| sqlx::query(sql)
                .bind(reference)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        )
        .context("Failed to set checkout reference")?;
        Ok(affected > 0)
    }

    async fn settle_payment(&self, id: i64, payment_status: PaymentStatus) -> Result<bool> {
        let now = Utc::now();
        let affected = on_backend!(
            self.pool,
            "UPDATE submissions SET payment_status = ?, updated_at = ? WHERE id = ? AND payment_status = 'unpaid'",
            |pool, sql| sqlx::query(sql)
                .bind(payment_status.to_string())
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        )
        .context("Failed to update payment status")?;
        Ok(affected > 0)
    }

    async fn resolve(
        &self,
        id: i64,
        status: SubmissionStatus,
        review_note: Option<&str>,
        created_record_id: Option<i64>,
    ) -> Result<bool> {
        let now = Utc::now();
        let affected = on_backend!(
            self.pool,
            "UPDATE submissions SET status = ?, review_note = ?, created_record_id = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending'",
            |pool, sql| sqlx::query(sql)
                .bind(status.to_string())
                .bind(review_note)
                .bind(created_record_id)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        )
        .context("Failed to resolve submission")?;
        Ok(affected > 0)
    }

    async fn count_by_status(&self, status: SubmissionStatus) -> Result<i64> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM submissions WHERE status = ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(status.to_string())
                .fetch_one(pool)
                .await
        )
        .context("Failed to count submissions")?;
        Ok(count)
    }
}
