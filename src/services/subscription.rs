//! Listing subscription service
//!
//! Subscriptions record the paid tier of a business listing. A listing
//! carries the highest tier among its active subscriptions, and drops back
//! to free once none is active.

use chrono::Utc;
use std::sync::Arc;

use super::error::{optional, ContentError};
use super::geo::CACHE_PREFIX_GUIDE;
use crate::cache::SharedCache;
use crate::db::repositories::{
    ListingRepository, SqlxListingRepository, SqlxSubscriptionRepository, SubscriptionRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    CreateSubscriptionInput, ListingTier, Subscription, SubscriptionStatus,
    UpdateSubscriptionInput,
};

const CACHE_PREFIX_LISTINGS: &str = "listings:";

pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    listings: Arc<dyn ListingRepository>,
    cache: SharedCache,
}

impl SubscriptionService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            repo: SqlxSubscriptionRepository::boxed(pool.clone()),
            listings: SqlxListingRepository::boxed(pool),
            cache,
        }
    }

    pub async fn list(&self, listing_id: Option<i64>) -> Result<Vec<Subscription>, ContentError> {
        Ok(self.repo.list(listing_id).await?)
    }

    pub async fn get(&self, id: i64) -> Result<Subscription, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Subscription".to_string()))
    }

    pub async fn create(&self, input: CreateSubscriptionInput) -> Result<Subscription, ContentError> {
        if self.listings.get_by_id(input.business_listing_id).await?.is_none() {
            return Err(ContentError::InvalidReference(format!(
                "listing {} does not exist",
                input.business_listing_id
            )));
        }

        let now = Utc::now();
        let subscription = self
            .repo
            .create(&Subscription {
                id: 0,
                business_listing_id: input.business_listing_id,
                tier: input.tier,
                status: input.status.unwrap_or_default(),
                external_reference: optional(input.external_reference),
                current_period_end: input.current_period_end,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(
            subscription_id = subscription.id,
            listing_id = subscription.business_listing_id,
            tier = %subscription.tier,
            "Subscription created"
        );
        self.sync_listing_tier(subscription.business_listing_id).await?;
        Ok(subscription)
    }

    pub async fn update(&self, id: i64, input: UpdateSubscriptionInput) -> Result<Subscription, ContentError> {
        let mut subscription = self.get(id).await?;

        if let Some(tier) = input.tier {
            subscription.tier = tier;
        }
        if let Some(status) = input.status {
            subscription.status = status;
        }
        if let Some(external_reference) = input.external_reference {
            subscription.external_reference = optional(external_reference);
        }
        if let Some(current_period_end) = input.current_period_end {
            subscription.current_period_end = current_period_end;
        }

        let updated = self.repo.update(&subscription).await?;
        self.sync_listing_tier(updated.business_listing_id).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentError> {
        let subscription = self.get(id).await?;
        if !self.repo.delete(id).await? {
            return Err(ContentError::NotFound("Subscription".to_string()));
        }
        self.sync_listing_tier(subscription.business_listing_id).await
    }

    pub async fn count_active(&self) -> Result<i64, ContentError> {
        Ok(self.repo.count_by_status(SubscriptionStatus::Active).await?)
    }

    /// Recompute a listing's tier from its active subscriptions
    async fn sync_listing_tier(&self, listing_id: i64) -> Result<(), ContentError> {
        let Some(mut listing) = self.listings.get_by_id(listing_id).await? else {
            return Ok(());
        };
        let tier = self
            .repo
            .list(Some(listing_id))
            .await?
            .into_iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .map(|s| s.tier)
            .max()
            .unwrap_or(ListingTier::Free);
        if listing.tier == tier {
            return Ok(());
        }

        tracing::info!(listing_id, from = %listing.tier, to = %tier, "Listing tier changed");
        listing.tier = tier;
        self.listings.update(&listing).await?;
        self.cache.delete_prefix(CACHE_PREFIX_LISTINGS).await;
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
        Ok(())
    }
}
