//! Newsletter repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{Newsletter, NewsletterStatus};

#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    async fn create(&self, newsletter: &Newsletter) -> Result<Newsletter>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Newsletter>>;
    /// All issues, or only those with `status`, newest first
    async fn list(&self, status: Option<NewsletterStatus>) -> Result<Vec<Newsletter>>;
    async fn update(&self, newsletter: &Newsletter) -> Result<Newsletter>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

pub struct SqlxNewsletterRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsletterRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsletterRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_NEWSLETTER: &str = "SELECT id, slug, title, subject, content, content_html, status, scheduled_for, \
     sent_at, created_at, updated_at FROM newsletters";

#[derive(sqlx::FromRow)]
struct NewsletterRow {
    id: i64,
    slug: String,
    title: String,
    subject: String,
    content: String,
    content_html: String,
    status: String,
    scheduled_for: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NewsletterRow> for Newsletter {
    type Error = anyhow::Error;

    fn try_from(row: NewsletterRow) -> Result<Self> {
        Ok(Newsletter {
            id: row.id,
            slug: row.slug,
            title: row.title,
            subject: row.subject,
            content: row.content,
            content_html: row.content_html,
            status: row.status.parse()?,
            scheduled_for: row.scheduled_for,
            sent_at: row.sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl NewsletterRepository for SqlxNewsletterRepository {
    async fn create(&self, newsletter: &Newsletter) -> Result<Newsletter> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO newsletters (slug, title, subject, content, content_html, status, scheduled_for, sent_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(&newsletter.slug)
                .bind(&newsletter.title)
                .bind(&newsletter.subject)
                .bind(&newsletter.content)
                .bind(&newsletter.content_html)
                .bind(newsletter.status.to_string())
                .bind(newsletter.scheduled_for)
                .bind(newsletter.sent_at)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create newsletter")?;

        Ok(Newsletter {
            id,
            created_at: now,
            updated_at: now,
            ..newsletter.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>> {
        let sql = format!("{} WHERE id = ?", SELECT_NEWSLETTER);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, NewsletterRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get newsletter")?;
        row.map(Newsletter::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Newsletter>> {
        let sql = format!("{} WHERE slug = ?", SELECT_NEWSLETTER);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, NewsletterRow>(sql).bind(slug).fetch_optional(pool).await
        })
        .context("Failed to get newsletter by slug")?;
        row.map(Newsletter::try_from).transpose()
    }

    async fn list(&self, status: Option<NewsletterStatus>) -> Result<Vec<Newsletter>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "{} WHERE status = ? ORDER BY COALESCE(sent_at, created_at) DESC, id DESC",
                    SELECT_NEWSLETTER
                );
                on_backend!(self.pool, &sql, |pool, sql| {
                    sqlx::query_as::<_, NewsletterRow>(sql)
                        .bind(status.to_string())
                        .fetch_all(pool)
                        .await
                })
            }
            None => {
                let sql = format!(
                    "{} ORDER BY COALESCE(sent_at, created_at) DESC, id DESC",
                    SELECT_NEWSLETTER
                );
                on_backend!(self.pool, &sql, |pool, sql| {
                    sqlx::query_as::<_, NewsletterRow>(sql).fetch_all(pool).await
                })
            }
        }
        .context("Failed to list newsletters")?;
        rows.into_iter().map(Newsletter::try_from).collect()
    }

    async fn update(&self, newsletter: &Newsletter) -> Result<Newsletter> {
        let now = Utc::now();
        on_backend!(
            self.pool,
            "UPDATE newsletters SET slug = ?, title = ?, subject = ?, content = ?, content_html = ?, status = ?, \
             scheduled_for = ?, sent_at = ?, updated_at = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(&newsletter.slug)
                .bind(&newsletter.title)
                .bind(&newsletter.subject)
                .bind(&newsletter.content)
                .bind(&newsletter.content_html)
                .bind(newsletter.status.to_string())
                .bind(newsletter.scheduled_for)
                .bind(newsletter.sent_at)
                .bind(now)
                .bind(newsletter.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update newsletter")?;

        self.get_by_id(newsletter.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Newsletter not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM newsletters WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete newsletter")?;
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM newsletters WHERE slug = ? AND id <> ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(pool)
                .await
        )
        .context("Failed to check newsletter slug")?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    fn issue(slug: &str, status: NewsletterStatus) -> Newsletter {
        let now = Utc::now();
        Newsletter {
            id: 0,
            slug: slug.to_string(),
            title: slug.to_string(),
            subject: format!("This week: {}", slug),
            content: "Hi!".to_string(),
            content_html: "<p>Hi!</p>\n".to_string(),
            status,
            scheduled_for: None,
            sent_at: (status == NewsletterStatus::Sent).then(Utc::now),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let repo = SqlxNewsletterRepository::new(migrated_pool().await);
        repo.create(&issue("week-1", NewsletterStatus::Sent)).await.unwrap();
        repo.create(&issue("week-2", NewsletterStatus::Draft)).await.unwrap();

        let sent = repo.list(Some(NewsletterStatus::Sent)).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].slug, "week-1");
        assert_eq!(repo.list(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_marks_sent() {
        let repo = SqlxNewsletterRepository::new(migrated_pool().await);
        let mut created = repo.create(&issue("week-3", NewsletterStatus::Scheduled)).await.unwrap();

        created.status = NewsletterStatus::Sent;
        created.sent_at = Some(Utc::now());
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.status, NewsletterStatus::Sent);
        assert!(updated.sent_at.is_some());
        assert!(repo.slug_exists("week-3", None).await.unwrap());
        assert!(!repo.slug_exists("week-3", Some(created.id)).await.unwrap());
    }
}
