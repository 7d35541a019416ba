//! Media library service

use chrono::Utc;
use std::sync::Arc;

use super::error::{optional, required, ContentError};
use super::geo::CACHE_PREFIX_GUIDE;
use crate::cache::SharedCache;
use crate::db::repositories::{
    ListingRepository, MediaRepository, NeighborhoodRepository, SqlxListingRepository,
    SqlxMediaRepository, SqlxNeighborhoodRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{CreateMediaInput, MediaFilter, MediaItem, UpdateMediaInput};

pub struct MediaService {
    repo: Arc<dyn MediaRepository>,
    neighborhoods: Arc<dyn NeighborhoodRepository>,
    listings: Arc<dyn ListingRepository>,
    cache: SharedCache,
}

impl MediaService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            repo: SqlxMediaRepository::boxed(pool.clone()),
            neighborhoods: SqlxNeighborhoodRepository::boxed(pool.clone()),
            listings: SqlxListingRepository::boxed(pool),
            cache,
        }
    }

    pub async fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaItem>, ContentError> {
        Ok(self.repo.list(filter).await?)
    }

    pub async fn get(&self, id: i64) -> Result<MediaItem, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Media item".to_string()))
    }

    pub async fn create(&self, input: CreateMediaInput) -> Result<MediaItem, ContentError> {
        let title = required("title", &input.title)?;
        let url = required("url", &input.url)?;
        self.ensure_references(input.neighborhood_id, input.business_listing_id)
            .await?;

        let item = self
            .repo
            .create(&MediaItem {
                id: 0,
                title,
                media_type: input.media_type,
                url,
                alt_text: optional(input.alt_text),
                neighborhood_id: input.neighborhood_id,
                business_listing_id: input.business_listing_id,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(media_id = item.id, media_type = %item.media_type, "Media item created");
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
        Ok(item)
    }

    pub async fn update(&self, id: i64, input: UpdateMediaInput) -> Result<MediaItem, ContentError> {
        let mut item = self.get(id).await?;

        if let Some(title) = input.title {
            item.title = required("title", &title)?;
        }
        if let Some(media_type) = input.media_type {
            item.media_type = media_type;
        }
        if let Some(url) = input.url {
            item.url = required("url", &url)?;
        }
        if let Some(alt_text) = input.alt_text {
            item.alt_text = optional(alt_text);
        }
        if let Some(neighborhood_id) = input.neighborhood_id {
            self.ensure_references(neighborhood_id, None).await?;
            item.neighborhood_id = neighborhood_id;
        }
        if let Some(business_listing_id) = input.business_listing_id {
            self.ensure_references(None, business_listing_id).await?;
            item.business_listing_id = business_listing_id;
        }

        let updated = self.repo.update(&item).await?;
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(id).await? {
            return Err(ContentError::NotFound("Media item".to_string()));
        }
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
        Ok(())
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::models::MediaType;

    fn setup(pool: DynDatabasePool) -> MediaService {
        MediaService::new(pool, ContentCache::shared(&CacheConfig::default()))
    }

    fn input(title: &str) -> CreateMediaInput {
        CreateMediaInput {
            title: title.to_string(),
            media_type: MediaType::Image,
            url: format!("https://cdn.example/{}.jpg", title),
            alt_text: Some(" ".to_string()),
            neighborhood_id: None,
            business_listing_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_requires_url() {
        let service = setup(migrated_pool().await);
        let mut bad = input("mural");
        bad.url = "   ".to_string();
        assert!(matches!(service.create(bad).await, Err(ContentError::Validation(_))));

        let item = service.create(input("mural")).await.unwrap();
        assert_eq!(item.alt_text, None);
    }

    #[tokio::test]
    async fn test_unknown_neighborhood_is_rejected() {
        let service = setup(migrated_pool().await);
        let mut orphan = input("orphan");
        orphan.neighborhood_id = Some(3);
        assert!(matches!(
            service.create(orphan).await,
            Err(ContentError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let service = setup(migrated_pool().await);
        let item = service.create(input("storefront")).await.unwrap();

        let updated = service
            .update(
                item.id,
                UpdateMediaInput {
                    media_type: Some(MediaType::Video),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.media_type, MediaType::Video);
        assert_eq!(service.list(&MediaFilter::default()).await.unwrap().len(), 1);

        service.delete(item.id).await.unwrap();
        assert!(matches!(service.get(item.id).await, Err(ContentError::NotFound(_))));
    }
}
