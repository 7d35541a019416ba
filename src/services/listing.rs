//! Business listing service

use chrono::Utc;
use std::sync::Arc;

use super::error::{optional, required, ContentError};
use super::geo::CACHE_PREFIX_GUIDE;
use super::slug::{claim_slug, slug_changes};
use crate::cache::SharedCache;
use crate::db::repositories::{
    ListingRepository, NeighborhoodRepository, SqlxListingRepository, SqlxNeighborhoodRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    BusinessListing, CreateListingInput, ListParams, ListingFilter, ListingStatus, PagedResult,
    UpdateListingInput,
};

/// Cache key prefixes
const CACHE_PREFIX_LISTINGS: &str = "listings:";
const CACHE_KEY_LISTING_LIST: &str = "listings:list:";
const CACHE_KEY_LISTING_BY_SLUG: &str = "listings:slug:";

pub struct ListingService {
    repo: Arc<dyn ListingRepository>,
    neighborhoods: Arc<dyn NeighborhoodRepository>,
    cache: SharedCache,
}

impl ListingService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            repo: SqlxListingRepository::boxed(pool.clone()),
            neighborhoods: SqlxNeighborhoodRepository::boxed(pool),
            cache,
        }
    }

    /// Published listings, premium first, narrowed by `filter`
    pub async fn list_public(
        &self,
        mut filter: ListingFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BusinessListing>, ContentError> {
        filter.published_only = true;
        let cache_key = list_cache_key(&filter, params);
        if let Some(hit) = self
            .cache
            .get::<PagedResult<BusinessListing>>(&cache_key)
            .await
            .ok()
            .flatten()
        {
            return Ok(hit);
        }

        let (items, total) = self.repo.list(&filter, params).await?;
        let page = PagedResult::new(items, total, params);
        let _ = self.cache.set(&cache_key, &page).await;
        Ok(page)
    }

    /// Every listing regardless of status, for the admin portal
    pub async fn list_all(
        &self,
        mut filter: ListingFilter,
        params: &ListParams,
    ) -> Result<PagedResult<BusinessListing>, ContentError> {
        filter.published_only = false;
        let (items, total) = self.repo.list(&filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_published_by_slug(&self, slug: &str) -> Result<BusinessListing, ContentError> {
        let cache_key = format!("{}{}", CACHE_KEY_LISTING_BY_SLUG, slug);
        if let Some(hit) = self.cache.get::<BusinessListing>(&cache_key).await.ok().flatten() {
            return Ok(hit);
        }

        let listing = self
            .repo
            .get_by_slug(slug)
            .await?
            .filter(BusinessListing::is_published)
            .ok_or_else(|| ContentError::NotFound("Listing".to_string()))?;
        let _ = self.cache.set(&cache_key, &listing).await;
        Ok(listing)
    }

    pub async fn get(&self, id: i64) -> Result<BusinessListing, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Listing".to_string()))
    }

    pub async fn create(&self, input: CreateListingInput) -> Result<BusinessListing, ContentError> {
        let name = required("name", &input.name)?;
        if let Some(neighborhood_id) = input.neighborhood_id {
            self.ensure_neighborhood(neighborhood_id).await?;
        }
        let repo = &self.repo;
        let slug = claim_slug(input.slug.as_deref(), &name, |s| async move {
            repo.slug_exists(&s, None).await
        })
        .await?;

        let now = Utc::now();
        let listing = self
            .repo
            .create(&BusinessListing {
                id: 0,
                neighborhood_id: input.neighborhood_id,
                slug,
                name,
                description: optional(input.description),
                category: optional(input.category),
                address: optional(input.address),
                phone: optional(input.phone),
                website: optional(input.website),
                email: optional(input.email),
                tier: input.tier.unwrap_or_default(),
                status: input.status.unwrap_or_default(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(listing_id = listing.id, slug = %listing.slug, status = %listing.status, "Listing created");
        self.invalidate_cache().await;
        Ok(listing)
    }

    pub async fn update(&self, id: i64, input: UpdateListingInput) -> Result<BusinessListing, ContentError> {
        let mut listing = self.get(id).await?;

        if let Some(neighborhood_id) = input.neighborhood_id {
            if let Some(neighborhood_id) = neighborhood_id {
                self.ensure_neighborhood(neighborhood_id).await?;
            }
            listing.neighborhood_id = neighborhood_id;
        }
        if let Some(name) = input.name {
            listing.name = required("name", &name)?;
        }
        if let Some(description) = input.description {
            listing.description = optional(description);
        }
        if let Some(category) = input.category {
            listing.category = optional(category);
        }
        if let Some(address) = input.address {
            listing.address = optional(address);
        }
        if let Some(phone) = input.phone {
            listing.phone = optional(phone);
        }
        if let Some(website) = input.website {
            listing.website = optional(website);
        }
        if let Some(email) = input.email {
            listing.email = optional(email);
        }
        if let Some(tier) = input.tier {
            listing.tier = tier;
        }
        if let Some(status) = input.status {
            listing.status = status;
        }
        if let Some(slug) = input.slug.filter(|s| slug_changes(s, &listing.slug)) {
            let repo = &self.repo;
            listing.slug = claim_slug(Some(&slug), &listing.name, |s| async move {
                repo.slug_exists(&s, Some(id)).await
            })
            .await?;
        }

        let updated = self.repo.update(&listing).await?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(id).await? {
            return Err(ContentError::NotFound("Listing".to_string()));
        }
        tracing::info!(listing_id = id, "Listing deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn count_by_status(&self, status: ListingStatus) -> Result<i64, ContentError> {
        Ok(self.repo.count_by_status(status).await?)
    }

    async fn ensure_neighborhood(&self, id: i64) -> Result<(), ContentError> {
        match self.neighborhoods.get_by_id(id).await? {
            Some(_) => Ok(()),
            None => Err(ContentError::InvalidReference(format!(
                "neighborhood {} does not exist",
                id
            ))),
        }
    }

    async fn invalidate_cache(&self) {
        self.cache.delete_prefix(CACHE_PREFIX_LISTINGS).await;
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
    }
}

/// Cache key of one public listing page
///
/// Free-text parts are percent-encoded so no value can contain the `:`
/// separator.
fn list_cache_key(filter: &ListingFilter, params: &ListParams) -> String {
    format!(
        "{}{}:{}:{}:{}:{}",
        CACHE_KEY_LISTING_LIST,
        urlencoding::encode(filter.neighborhood.as_deref().unwrap_or("")),
        filter.tier.map(|t| t.to_string()).unwrap_or_default(),
        urlencoding::encode(&filter.q.as_deref().unwrap_or("").to_lowercase()),
        params.page,
        params.per_page
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::models::ListingTier;

    fn setup(pool: DynDatabasePool) -> ListingService {
        ListingService::new(pool, ContentCache::shared(&CacheConfig::default()))
    }

    fn input(name: &str, tier: ListingTier, status: ListingStatus) -> CreateListingInput {
        CreateListingInput {
            name: name.to_string(),
            tier: Some(tier),
            status: Some(status),
            ..Default::default()
        }
    }

    #[test]
    fn test_list_cache_key_separates_free_text() {
        let params = ListParams::default();
        let embedded = ListingFilter {
            neighborhood: Some("a:premium".to_string()),
            q: Some(String::new()),
            ..Default::default()
        };
        let split = ListingFilter {
            neighborhood: Some("a".to_string()),
            tier: Some(ListingTier::Premium),
            q: Some(":".to_string()),
            ..Default::default()
        };
        assert_ne!(list_cache_key(&embedded, &params), list_cache_key(&split, &params));
        assert!(list_cache_key(&split, &params).starts_with(CACHE_KEY_LISTING_LIST));
    }

    #[tokio::test]
    async fn test_public_list_hides_drafts() {
        let service = setup(migrated_pool().await);
        service
            .create(input("Blue Door Cafe", ListingTier::Free, ListingStatus::Published))
            .await
            .unwrap();
        service
            .create(input("Hidden Bar", ListingTier::Premium, ListingStatus::Draft))
            .await
            .unwrap();

        let page = service
            .list_public(ListingFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Blue Door Cafe");

        let all = service
            .list_all(ListingFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);
    }

    #[tokio::test]
    async fn test_public_list_refreshes_after_write() {
        let service = setup(migrated_pool().await);
        let first = service
            .list_public(ListingFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(first.total, 0);

        service
            .create(input("Corner Deli", ListingTier::Basic, ListingStatus::Published))
            .await
            .unwrap();
        let second = service
            .list_public(ListingFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(second.total, 1);
    }

    #[tokio::test]
    async fn test_draft_is_not_public_by_slug() {
        let service = setup(migrated_pool().await);
        let draft = service
            .create(input("Quiet Books", ListingTier::Free, ListingStatus::Draft))
            .await
            .unwrap();
        assert!(matches!(
            service.get_published_by_slug("quiet-books").await,
            Err(ContentError::NotFound(_))
        ));

        service
            .update(
                draft.id,
                UpdateListingInput {
                    status: Some(ListingStatus::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(service.get_published_by_slug("quiet-books").await.unwrap().id, draft.id);
    }

    #[tokio::test]
    async fn test_generated_slugs_are_numbered() {
        let service = setup(migrated_pool().await);
        let first = service
            .create(input("Taqueria", ListingTier::Free, ListingStatus::Draft))
            .await
            .unwrap();
        let second = service
            .create(input("Taqueria", ListingTier::Free, ListingStatus::Draft))
            .await
            .unwrap();
        assert_eq!(first.slug, "taqueria");
        assert_eq!(second.slug, "taqueria-2");
    }

    #[tokio::test]
    async fn test_unknown_neighborhood_is_rejected() {
        let service = setup(migrated_pool().await);
        let result = service
            .create(CreateListingInput {
                name: "Lost Shop".to_string(),
                neighborhood_id: Some(99),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ContentError::InvalidReference(_))));
    }

    #[tokio::test]
    async fn test_update_clears_nullable_fields_and_delete() {
        let service = setup(migrated_pool().await);
        let listing = service
            .create(CreateListingInput {
                name: "Bike Hub".to_string(),
                phone: Some("555-0100".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listing.phone.as_deref(), Some("555-0100"));

        let updated = service
            .update(
                listing.id,
                UpdateListingInput {
                    phone: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone, None);

        service.delete(listing.id).await.unwrap();
        assert!(matches!(service.get(listing.id).await, Err(ContentError::NotFound(_))));
    }
}
