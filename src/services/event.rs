//! Event service

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::error::{optional, required, ContentError};
use super::geo::CACHE_PREFIX_GUIDE;
use super::slug::{claim_slug, slug_changes};
use crate::cache::SharedCache;
use crate::db::repositories::{
    EventRepository, ListingRepository, NeighborhoodRepository, SqlxEventRepository,
    SqlxListingRepository, SqlxNeighborhoodRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    CreateEventInput, Event, EventFilter, EventStatus, ListParams, PagedResult, UpdateEventInput,
};

const CACHE_KEY_EVENT_BY_SLUG: &str = "events:slug:";
const CACHE_PREFIX_EVENTS: &str = "events:";

pub struct EventService {
    repo: Arc<dyn EventRepository>,
    neighborhoods: Arc<dyn NeighborhoodRepository>,
    listings: Arc<dyn ListingRepository>,
    cache: SharedCache,
}

impl EventService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            repo: SqlxEventRepository::boxed(pool.clone()),
            neighborhoods: SqlxNeighborhoodRepository::boxed(pool.clone()),
            listings: SqlxListingRepository::boxed(pool),
            cache,
        }
    }

    /// Published events starting now or later, soonest first
    pub async fn list_upcoming(
        &self,
        neighborhood: Option<String>,
        params: &ListParams,
    ) -> Result<PagedResult<Event>, ContentError> {
        let filter = EventFilter {
            neighborhood: neighborhood.filter(|s| !s.is_empty()),
            starts_after: Some(Utc::now()),
            published_only: true,
        };
        let (items, total) = self.repo.list(&filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Every event, past ones included, for the admin portal
    pub async fn list_all(&self, params: &ListParams) -> Result<PagedResult<Event>, ContentError> {
        let (items, total) = self.repo.list(&EventFilter::default(), params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Event, ContentError> {
        let cache_key = format!("{}{}", CACHE_KEY_EVENT_BY_SLUG, slug);
        if let Some(hit) = self.cache.get::<Event>(&cache_key).await.ok().flatten() {
            return Ok(hit);
        }

        let event = self
            .repo
            .get_by_slug(slug)
            .await?
            .filter(|e| e.status == EventStatus::Published)
            .ok_or_else(|| ContentError::NotFound("Event".to_string()))?;
        let _ = self.cache.set(&cache_key, &event).await;
        Ok(event)
    }

    pub async fn get(&self, id: i64) -> Result<Event, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Event".to_string()))
    }

    pub async fn create(&self, input: CreateEventInput) -> Result<Event, ContentError> {
        let title = required("title", &input.title)?;
        check_schedule(input.starts_at, input.ends_at)?;
        self.ensure_references(input.neighborhood_id, input.business_listing_id)
            .await?;
        let repo = &self.repo;
        let slug = claim_slug(input.slug.as_deref(), &title, |s| async move {
            repo.slug_exists(&s, None).await
        })
        .await?;

        let now = Utc::now();
        let event = self
            .repo
            .create(&Event {
                id: 0,
                neighborhood_id: input.neighborhood_id,
                business_listing_id: input.business_listing_id,
                slug,
                title,
                description: optional(input.description),
                venue: optional(input.venue),
                starts_at: input.starts_at,
                ends_at: input.ends_at,
                status: input.status.unwrap_or_default(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(event_id = event.id, slug = %event.slug, starts_at = %event.starts_at, "Event created");
        self.invalidate_cache().await;
        Ok(event)
    }

    pub async fn update(&self, id: i64, input: UpdateEventInput) -> Result<Event, ContentError> {
        let mut event = self.get(id).await?;

        if let Some(neighborhood_id) = input.neighborhood_id {
            self.ensure_references(neighborhood_id, None).await?;
            event.neighborhood_id = neighborhood_id;
        }
        if let Some(business_listing_id) = input.business_listing_id {
            self.ensure_references(None, business_listing_id).await?;
            event.business_listing_id = business_listing_id;
        }
        if let Some(title) = input.title {
            event.title = required("title", &title)?;
        }
        if let Some(description) = input.description {
            event.description = optional(description);
        }
        if let Some(venue) = input.venue {
            event.venue = optional(venue);
        }
        if let Some(starts_at) = input.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = input.ends_at {
            event.ends_at = ends_at;
        }
        if let Some(status) = input.status {
            event.status = status;
        }
        check_schedule(event.starts_at, event.ends_at)?;
        if let Some(slug) = input.slug.filter(|s| slug_changes(s, &event.slug)) {
            let repo = &self.repo;
            event.slug = claim_slug(Some(&slug), &event.title, |s| async move {
                repo.slug_exists(&s, Some(id)).await
            })
            .await?;
        }

        let updated = self.repo.update(&event).await?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(id).await? {
            return Err(ContentError::NotFound("Event".to_string()));
        }
        tracing::info!(event_id = id, "Event deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn count_upcoming(&self) -> Result<i64, ContentError> {
        Ok(self.repo.count_upcoming(Utc::now()).await?)
    }

    async fn ensure_references(
        &self,
        neighborhood_id: Option<i64>,
        business_listing_id: Option<i64>,
    ) -> Result<(), ContentError> {
        if let Some(id) = neighborhood_id {
            if self.neighborhoods.get_by_id(id).await?.is_none() {
                return Err(ContentError::InvalidReference(format!(
                    "neighborhood {} does not exist",
                    id
                )));
            }
        }
        if let Some(id) = business_listing_id {
            if self.listings.get_by_id(id).await?.is_none() {
                return Err(ContentError::InvalidReference(format!(
                    "listing {} does not exist",
                    id
                )));
            }
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        self.cache.delete_prefix(CACHE_PREFIX_EVENTS).await;
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
    }
}

fn check_schedule(starts_at: DateTime<Utc>, ends_at: Option<DateTime<Utc>>) -> Result<(), ContentError> {
    match ends_at {
        Some(ends_at) if ends_at < starts_at => Err(ContentError::Validation(
            "ends_at must not be before starts_at".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::migrated_pool;
    use chrono::Duration;

    fn setup(pool: DynDatabasePool) -> EventService {
        EventService::new(pool, ContentCache::shared(&CacheConfig::default()))
    }

    fn input(title: &str, starts_in: Duration, status: EventStatus) -> CreateEventInput {
        CreateEventInput {
            neighborhood_id: None,
            business_listing_id: None,
            slug: None,
            title: title.to_string(),
            description: None,
            venue: Some("Main St".to_string()),
            starts_at: Utc::now() + starts_in,
            ends_at: None,
            status: Some(status),
        }
    }

    #[tokio::test]
    async fn test_upcoming_excludes_past_and_drafts() {
        let service = setup(migrated_pool().await);
        service
            .create(input("Street Fair", Duration::days(3), EventStatus::Published))
            .await
            .unwrap();
        service
            .create(input("Night Market", Duration::days(1), EventStatus::Published))
            .await
            .unwrap();
        service
            .create(input("Last Week Jam", Duration::days(-7), EventStatus::Published))
            .await
            .unwrap();
        service
            .create(input("Secret Show", Duration::days(2), EventStatus::Draft))
            .await
            .unwrap();

        let page = service.list_upcoming(None, &ListParams::default()).await.unwrap();
        let titles: Vec<&str> = page.items.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Night Market", "Street Fair"]);
        assert_eq!(service.count_upcoming().await.unwrap(), 2);
        assert_eq!(service.list_all(&ListParams::default()).await.unwrap().total, 4);
    }

    #[tokio::test]
    async fn test_end_before_start_is_rejected() {
        let service = setup(migrated_pool().await);
        let mut bad = input("Backwards", Duration::days(1), EventStatus::Draft);
        bad.ends_at = Some(bad.starts_at - Duration::hours(2));
        assert!(matches!(service.create(bad).await, Err(ContentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_listing_is_rejected() {
        let service = setup(migrated_pool().await);
        let mut orphan = input("Orphan", Duration::days(1), EventStatus::Draft);
        orphan.business_listing_id = Some(7);
        assert!(matches!(
            service.create(orphan).await,
            Err(ContentError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_then_fetch_by_slug() {
        let service = setup(migrated_pool().await);
        let event = service
            .create(input("Porch Concert", Duration::days(5), EventStatus::Draft))
            .await
            .unwrap();
        assert!(service.get_published_by_slug("porch-concert").await.is_err());

        service
            .update(
                event.id,
                UpdateEventInput {
                    status: Some(EventStatus::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let found = service.get_published_by_slug("porch-concert").await.unwrap();
        assert_eq!(found.id, event.id);

        service.delete(event.id).await.unwrap();
        assert!(matches!(service.delete(event.id).await, Err(ContentError::NotFound(_))));
    }
}
