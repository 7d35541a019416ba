//! Business listing repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{like_pattern, FilterValue};
use crate::db::DynDatabasePool;
use crate::models::{BusinessListing, ListParams, ListingFilter, ListingStatus};

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn create(&self, listing: &BusinessListing) -> Result<BusinessListing>;
    async fn get_by_id(&self, id: i64) -> Result<Option<BusinessListing>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<BusinessListing>>;
    /// Filtered page of listings, premium tier first, plus the total match count
    async fn list(&self, filter: &ListingFilter, params: &ListParams) -> Result<(Vec<BusinessListing>, i64)>;
    async fn list_published_by_neighborhood(&self, neighborhood_id: i64) -> Result<Vec<BusinessListing>>;
    /// Listings featured by a blog post
    async fn list_by_post(&self, post_id: i64) -> Result<Vec<BusinessListing>>;
    async fn update(&self, listing: &BusinessListing) -> Result<BusinessListing>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn count_by_status(&self, status: ListingStatus) -> Result<i64>;
}

pub struct SqlxListingRepository {
    pool: DynDatabasePool,
}

impl SqlxListingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ListingRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_LISTING: &str = "SELECT l.id, l.neighborhood_id, l.slug, l.name, l.description, l.category, l.address, \
     l.phone, l.website, l.email, l.tier, l.status, l.created_at, l.updated_at FROM business_listings l";

const TIER_ORDER: &str =
    "CASE l.tier WHEN 'premium' THEN 0 WHEN 'basic' THEN 1 ELSE 2 END, l.name";

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: i64,
    neighborhood_id: Option<i64>,
    slug: String,
    name: String,
    description: Option<String>,
    category: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    website: Option<String>,
    email: Option<String>,
    tier: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListingRow> for BusinessListing {
    type Error = anyhow::Error;

    fn try_from(row: ListingRow) -> Result<Self> {
        Ok(BusinessListing {
            id: row.id,
            neighborhood_id: row.neighborhood_id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            category: row.category,
            address: row.address,
            phone: row.phone,
            website: row.website,
            email: row.email,
            tier: row.tier.parse()?,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_listings(rows: Vec<ListingRow>) -> Result<Vec<BusinessListing>> {
    rows.into_iter().map(BusinessListing::try_from).collect()
}

/// WHERE clause and its bind values for a listing filter
fn filter_clause(filter: &ListingFilter) -> (String, Vec<FilterValue>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds = Vec::new();

    if filter.published_only {
        clauses.push("l.status = ?");
        binds.push(FilterValue::Text(ListingStatus::Published.to_string()));
    }
    if let Some(slug) = filter.neighborhood.as_deref().filter(|s| !s.is_empty()) {
        clauses.push("l.neighborhood_id IN (SELECT id FROM neighborhoods WHERE slug = ?)");
        binds.push(FilterValue::Text(slug.to_string()));
    }
    if let Some(tier) = filter.tier {
        clauses.push("l.tier = ?");
        binds.push(FilterValue::Text(tier.to_string()));
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("LOWER(l.name) LIKE ? ESCAPE '\\'");
        binds.push(FilterValue::Text(like_pattern(q)));
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), binds)
    }
}

#[async_trait]
impl ListingRepository for SqlxListingRepository {
    async fn create(&self, listing: &BusinessListing) -> Result<BusinessListing> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO business_listings (neighborhood_id, slug, name, description, category, address, phone, website, email, tier, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(listing.neighborhood_id)
                .bind(&listing.slug)
                .bind(&listing.name)
                .bind(&listing.description)
                .bind(&listing.category)
                .bind(&listing.address)
                .bind(&listing.phone)
                .bind(&listing.website)
                .bind(&listing.email)
                .bind(listing.tier.to_string())
                .bind(listing.status.to_string())
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create listing")?;

        Ok(BusinessListing {
            id,
            created_at: now,
            updated_at: now,
            ..listing.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BusinessListing>> {
        let sql = format!("{} WHERE l.id = ?", SELECT_LISTING);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, ListingRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get listing")?;
        row.map(BusinessListing::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BusinessListing>> {
        let sql = format!("{} WHERE l.slug = ?", SELECT_LISTING);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, ListingRow>(sql).bind(slug).fetch_optional(pool).await
        })
        .context("Failed to get listing by slug")?;
        row.map(BusinessListing::try_from).transpose()
    }

    async fn list(&self, filter: &ListingFilter, params: &ListParams) -> Result<(Vec<BusinessListing>, i64)> {
        let (where_clause, binds) = filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM business_listings l{}", where_clause);
        let total = on_backend!(self.pool, &count_sql, |pool, sql| {
            let mut query = sqlx::query_scalar::<_, i64>(sql);
            for value in &binds {
                query = match value {
                    FilterValue::Text(v) => query.bind(v.clone()),
                    FilterValue::Time(v) => query.bind(*v),
                };
            }
            query.fetch_one(pool).await
        })
        .context("Failed to count listings")?;

        let list_sql = format!(
            "{}{} ORDER BY {} LIMIT ? OFFSET ?",
            SELECT_LISTING, where_clause, TIER_ORDER
        );
        let rows = on_backend!(self.pool, &list_sql, |pool, sql| {
            let mut query = sqlx::query_as::<_, ListingRow>(sql);
            for value in &binds {
                query = match value {
                    FilterValue::Text(v) => query.bind(v.clone()),
                    FilterValue::Time(v) => query.bind(*v),
                };
            }
            query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
        })
        .context("Failed to list listings")?;

        Ok((into_listings(rows)?, total))
    }

    async fn list_published_by_neighborhood(&self, neighborhood_id: i64) -> Result<Vec<BusinessListing>> {
        let sql = format!(
            "{} WHERE l.neighborhood_id = ? AND l.status = 'published' ORDER BY {}",
            SELECT_LISTING, TIER_ORDER
        );
        let rows = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, ListingRow>(sql)
                .bind(neighborhood_id)
                .fetch_all(pool)
                .await
        })
        .context("Failed to list neighborhood listings")?;
        into_listings(rows)
    }

    async fn list_by_post(&self, post_id: i64) -> Result<Vec<BusinessListing>> {
        let sql = format!(
            "{} INNER JOIN post_businesses pb ON pb.business_listing_id = l.id WHERE pb.post_id = ? ORDER BY l.name",
            SELECT_LISTING
        );
        let rows = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, ListingRow>(sql).bind(post_id).fetch_all(pool).await
        })
        .context("Failed to list listings for post")?;
        into_listings(rows)
    }

    async fn update(&self, listing: &BusinessListing) -> Result<BusinessListing> {
        let now = Utc::now();
        on_backend!(
            self.pool,
            "UPDATE business_listings SET neighborhood_id = ?, slug = ?, name = ?, description = ?, category = ?, address = ?, \
             phone = ?, website = ?, email = ?, tier = ?, status = ?, updated_at = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(listing.neighborhood_id)
                .bind(&listing.slug)
                .bind(&listing.name)
                .bind(&listing.description)
                .bind(&listing.category)
                .bind(&listing.address)
                .bind(&listing.phone)
                .bind(&listing.website)
                .bind(&listing.email)
                .bind(listing.tier.to_string())
                .bind(listing.status.to_string())
                .bind(now)
                .bind(listing.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update listing")?;

        self.get_by_id(listing.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Listing not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM business_listings WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete listing")?;
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM business_listings WHERE slug = ? AND id <> ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(pool)
                .await
        )
        .context("Failed to check listing slug")?;
        Ok(count > 0)
    }

    async fn count_by_status(&self, status: ListingStatus) -> Result<i64> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM business_listings WHERE status = ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(status.to_string())
                .fetch_one(pool)
                .await
        )
        .context("Failed to count listings")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::models::ListingTier;

    fn listing(slug: &str, name: &str, tier: ListingTier, status: ListingStatus) -> BusinessListing {
        let now = Utc::now();
        BusinessListing {
            id: 0,
            neighborhood_id: None,
            slug: slug.to_string(),
            name: name.to_string(),
            description: None,
            category: Some("Food".to_string()),
            address: None,
            phone: None,
            website: None,
            email: None,
            tier,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded_repo() -> SqlxListingRepository {
        let repo = SqlxListingRepository::new(migrated_pool().await);
        for (slug, name, tier, status) in [
            ("arizmendi", "Arizmendi Bakery", ListingTier::Free, ListingStatus::Published),
            ("tartine", "Tartine Bakery", ListingTier::Premium, ListingStatus::Published),
            ("mission-pie", "Mission Pie", ListingTier::Basic, ListingStatus::Published),
            ("secret-spot", "Secret Bakery", ListingTier::Premium, ListingStatus::Draft),
        ] {
            repo.create(&listing(slug, name, tier, status)).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_published_listings_sort_premium_first() {
        let repo = seeded_repo().await;
        let filter = ListingFilter {
            published_only: true,
            ..Default::default()
        };

        let (items, total) = repo.list(&filter, &ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 3);
        let slugs: Vec<&str> = items.iter().map(|l| l.slug.as_str()).collect();
        assert_eq!(slugs, vec!["tartine", "mission-pie", "arizmendi"]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let repo = seeded_repo().await;
        let filter = ListingFilter {
            q: Some("BAKERY".to_string()),
            published_only: true,
            ..Default::default()
        };

        let (items, total) = repo.list(&filter, &ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 2);
        assert!(items.iter().all(|l| l.name.contains("Bakery")));
    }

    #[tokio::test]
    async fn test_tier_filter_and_paging() {
        let repo = seeded_repo().await;
        let filter = ListingFilter {
            tier: Some(ListingTier::Premium),
            ..Default::default()
        };
        let (_, total) = repo.list(&filter, &ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 2);

        let (page, total) = repo
            .list(&ListingFilter::default(), &ListParams::new(2, 3))
            .await
            .unwrap();
        assert_eq!(total, 4);
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_neighborhood_filter_matches_nothing() {
        let repo = seeded_repo().await;
        let filter = ListingFilter {
            neighborhood: Some("atlantis".to_string()),
            ..Default::default()
        };
        let (items, total) = repo.list(&filter, &ListParams::default()).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_update_and_count_by_status() {
        let repo = seeded_repo().await;
        let mut draft = repo.get_by_slug("secret-spot").await.unwrap().unwrap();
        draft.status = ListingStatus::Archived;
        draft.phone = Some("555-0100".to_string());

        let updated = repo.update(&draft).await.unwrap();
        assert_eq!(updated.status, ListingStatus::Archived);
        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert_eq!(repo.count_by_status(ListingStatus::Published).await.unwrap(), 3);
        assert_eq!(repo.count_by_status(ListingStatus::Draft).await.unwrap(), 0);
    }
}
