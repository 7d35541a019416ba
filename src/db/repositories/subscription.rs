//! Listing subscription repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{Subscription, SubscriptionStatus};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>>;
    /// Newest first, optionally for a single listing
    async fn list(&self, listing_id: Option<i64>) -> Result<Vec<Subscription>>;
    async fn update(&self, subscription: &Subscription) -> Result<Subscription>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn count_by_status(&self, status: SubscriptionStatus) -> Result<i64>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_SUBSCRIPTION: &str = "SELECT id, business_listing_id, tier, status, external_reference, \
     current_period_end, created_at, updated_at FROM subscriptions";

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    business_listing_id: i64,
    tier: String,
    status: String,
    external_reference: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = anyhow::Error;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        Ok(Subscription {
            id: row.id,
            business_listing_id: row.business_listing_id,
            tier: row.tier.parse()?,
            status: row.status.parse()?,
            external_reference: row.external_reference,
            current_period_end: row.current_period_end,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO subscriptions (business_listing_id, tier, status, external_reference, current_period_end, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(subscription.business_listing_id)
                .bind(subscription.tier.to_string())
                .bind(subscription.status.to_string())
                .bind(&subscription.external_reference)
                .bind(subscription.current_period_end)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create subscription")?;

        Ok(Subscription {
            id,
            created_at: now,
            updated_at: now,
            ..subscription.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>> {
        let sql = format!("{} WHERE id = ?", SELECT_SUBSCRIPTION);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, SubscriptionRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get subscription")?;
        row.map(Subscription::try_from).transpose()
    }

    async fn list(&self, listing_id: Option<i64>) -> Result<Vec<Subscription>> {
        let rows = match listing_id {
            Some(listing_id) => {
                let sql = format!(
                    "{} WHERE business_listing_id = ? ORDER BY created_at DESC, id DESC",
                    SELECT_SUBSCRIPTION
                );
                on_backend!(self.pool, &sql, |pool, sql| {
                    sqlx::query_as::<_, SubscriptionRow>(sql)
                        .bind(listing_id)
                        .fetch_all(pool)
                        .await
                })
            }
            None => {
                let sql = format!("{} ORDER BY created_at DESC, id DESC", SELECT_SUBSCRIPTION);
                on_backend!(self.pool, &sql, |pool, sql| {
                    sqlx::query_as::<_, SubscriptionRow>(sql).fetch_all(pool).await
                })
            }
        }
        .context("Failed to list subscriptions")?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn update(&self, subscription: &Subscription) -> Result<Subscription> {
        let now = Utc::now();
        on_backend!(
            self.pool,
            "UPDATE subscriptions SET tier = ?, status = ?, external_reference = ?, current_period_end = ?, updated_at = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(subscription.tier.to_string())
                .bind(subscription.status.to_string())
                .bind(&subscription.external_reference)
                .bind(subscription.current_period_end)
                .bind(now)
                .bind(subscription.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update subscription")?;

        self.get_by_id(subscription.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Subscription not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM subscriptions WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete subscription")?;
        Ok(affected > 0)
    }

    async fn count_by_status(&self, status: SubscriptionStatus) -> Result<i64> {
        on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM subscriptions WHERE status = ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(status.to_string())
                .fetch_one(pool)
                .await
        )
        .context("Failed to count subscriptions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{ListingRepository, SqlxListingRepository};
    use crate::models::{BusinessListing, ListingStatus, ListingTier};

    async fn listing_id(pool: &DynDatabasePool) -> i64 {
        let now = Utc::now();
        let listing = BusinessListing {
            id: 0,
            neighborhood_id: None,
            slug: "corner-bakery".to_string(),
            name: "Corner Bakery".to_string(),
            description: None,
            category: None,
            address: None,
            phone: None,
            website: None,
            email: None,
            tier: ListingTier::Basic,
            status: ListingStatus::Published,
            created_at: now,
            updated_at: now,
        };
        SqlxListingRepository::new(pool.clone())
            .create(&listing)
            .await
            .unwrap()
            .id
    }

    fn subscription(listing_id: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: 0,
            business_listing_id: listing_id,
            tier: ListingTier::Premium,
            status: SubscriptionStatus::Active,
            external_reference: Some("sub_123".to_string()),
            current_period_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_update_count() {
        let pool = migrated_pool().await;
        let listing_id = listing_id(&pool).await;
        let repo = SqlxSubscriptionRepository::new(pool);

        let created = repo.create(&subscription(listing_id)).await.unwrap();
        assert_eq!(repo.count_by_status(SubscriptionStatus::Active).await.unwrap(), 1);

        let mut changed = created.clone();
        changed.status = SubscriptionStatus::PastDue;
        let updated = repo.update(&changed).await.unwrap();
        assert_eq!(updated.status, SubscriptionStatus::PastDue);
        assert_eq!(updated.tier, ListingTier::Premium);
        assert_eq!(repo.count_by_status(SubscriptionStatus::Active).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_by_listing_and_delete() {
        let pool = migrated_pool().await;
        let listing_id = listing_id(&pool).await;
        let repo = SqlxSubscriptionRepository::new(pool);

        let created = repo.create(&subscription(listing_id)).await.unwrap();
        assert_eq!(repo.list(Some(listing_id)).await.unwrap().len(), 1);
        assert!(repo.list(Some(listing_id + 1)).await.unwrap().is_empty());

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(repo.list(None).await.unwrap().is_empty());
    }
}
