//! Newsletter archive service
//!
//! Only issues with status `sent` are visible publicly. `sent_at` is
//! stamped the first time an issue is marked sent.

use chrono::Utc;
use std::sync::Arc;

use super::error::{required, ContentError};
use super::markdown::MarkdownRenderer;
use super::slug::{claim_slug, slug_changes};
use crate::cache::SharedCache;
use crate::db::repositories::{NewsletterRepository, SqlxNewsletterRepository};
use crate::db::DynDatabasePool;
use crate::models::{
    CreateNewsletterInput, Newsletter, NewsletterStatus, UpdateNewsletterInput,
};

const CACHE_PREFIX_NEWSLETTERS: &str = "newsletters:";
const CACHE_KEY_NEWSLETTER_ARCHIVE: &str = "newsletters:archive";

pub struct NewsletterService {
    repo: Arc<dyn NewsletterRepository>,
    cache: SharedCache,
    markdown: MarkdownRenderer,
}

impl NewsletterService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            repo: SqlxNewsletterRepository::boxed(pool),
            cache,
            markdown: MarkdownRenderer::new(),
        }
    }

    /// Sent issues, newest first
    pub async fn list_sent(&self) -> Result<Vec<Newsletter>, ContentError> {
        if let Some(hit) = self
            .cache
            .get::<Vec<Newsletter>>(CACHE_KEY_NEWSLETTER_ARCHIVE)
            .await
            .ok()
            .flatten()
        {
            return Ok(hit);
        }
        let issues = self.repo.list(Some(NewsletterStatus::Sent)).await?;
        let _ = self.cache.set(CACHE_KEY_NEWSLETTER_ARCHIVE, &issues).await;
        Ok(issues)
    }

    pub async fn list_all(&self) -> Result<Vec<Newsletter>, ContentError> {
        Ok(self.repo.list(None).await?)
    }

    pub async fn get_sent_by_slug(&self, slug: &str) -> Result<Newsletter, ContentError> {
        self.repo
            .get_by_slug(slug)
            .await?
            .filter(|n| n.status == NewsletterStatus::Sent)
            .ok_or_else(|| ContentError::NotFound("Newsletter".to_string()))
    }

    pub async fn get(&self, id: i64) -> Result<Newsletter, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Newsletter".to_string()))
    }

    pub async fn create(&self, input: CreateNewsletterInput) -> Result<Newsletter, ContentError> {
        let title = required("title", &input.title)?;
        let subject = required("subject", &input.subject)?;
        let content = required("content", &input.content)?;
        let repo = &self.repo;
        let slug = claim_slug(input.slug.as_deref(), &title, |s| async move {
            repo.slug_exists(&s, None).await
        })
        .await?;

        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        let newsletter = self
            .repo
            .create(&Newsletter {
                id: 0,
                slug,
                title,
                subject,
                content_html: self.markdown.render(&content),
                content,
                status,
                scheduled_for: input.scheduled_for,
                sent_at: (status == NewsletterStatus::Sent).then_some(now),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(newsletter_id = newsletter.id, status = %newsletter.status, "Newsletter created");
        self.cache.delete_prefix(CACHE_PREFIX_NEWSLETTERS).await;
        Ok(newsletter)
    }

    pub async fn update(&self, id: i64, input: UpdateNewsletterInput) -> Result<Newsletter, ContentError> {
        let mut newsletter = self.get(id).await?;

        if let Some(title) = input.title {
            newsletter.title = required("title", &title)?;
        }
        if let Some(subject) = input.subject {
            newsletter.subject = required("subject", &subject)?;
        }
        if let Some(content) = input.content {
            newsletter.content = required("content", &content)?;
            newsletter.content_html = self.markdown.render(&newsletter.content);
        }
        if let Some(scheduled_for) = input.scheduled_for {
            newsletter.scheduled_for = scheduled_for;
        }
        if let Some(status) = input.status {
            newsletter.status = status;
        }
        if newsletter.status == NewsletterStatus::Sent && newsletter.sent_at.is_none() {
            newsletter.sent_at = Some(Utc::now());
        }
        if let Some(slug) = input.slug.filter(|s| slug_changes(s, &newsletter.slug)) {
            let repo = &self.repo;
            newsletter.slug = claim_slug(Some(&slug), &newsletter.title, |s| async move {
                repo.slug_exists(&s, Some(id)).await
            })
            .await?;
        }

        let updated = self.repo.update(&newsletter).await?;
        self.cache.delete_prefix(CACHE_PREFIX_NEWSLETTERS).await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(id).await? {
            return Err(ContentError::NotFound("Newsletter".to_string()));
        }
        self.cache.delete_prefix(CACHE_PREFIX_NEWSLETTERS).await;
        Ok(())
    }
}
