//! Media item repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::FilterValue;
use crate::db::DynDatabasePool;
use crate::models::{MediaFilter, MediaItem};

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, item: &MediaItem) -> Result<MediaItem>;
    async fn get_by_id(&self, id: i64) -> Result<Option<MediaItem>>;
    /// Newest first, narrowed by neighborhood and/or listing slug
    async fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaItem>>;
    async fn list_by_neighborhood(&self, neighborhood_id: i64) -> Result<Vec<MediaItem>>;
    async fn update(&self, item: &MediaItem) -> Result<MediaItem>;
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxMediaRepository {
    pool: DynDatabasePool,
}

impl SqlxMediaRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MediaRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_MEDIA: &str = "SELECT m.id, m.title, m.media_type, m.url, m.alt_text, m.neighborhood_id, \
     m.business_listing_id, m.created_at FROM media_items m";

#[derive(sqlx::FromRow)]
struct MediaRow {
    id: i64,
    title: String,
    media_type: String,
    url: String,
    alt_text: Option<String>,
    neighborhood_id: Option<i64>,
    business_listing_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for MediaItem {
    type Error = anyhow::Error;

    fn try_from(row: MediaRow) -> Result<Self> {
        Ok(MediaItem {
            id: row.id,
            title: row.title,
            media_type: row.media_type.parse()?,
            url: row.url,
            alt_text: row.alt_text,
            neighborhood_id: row.neighborhood_id,
            business_listing_id: row.business_listing_id,
            created_at: row.created_at,
        })
    }
}

fn into_media(rows: Vec<MediaRow>) -> Result<Vec<MediaItem>> {
    rows.into_iter().map(MediaItem::try_from).collect()
}

#[async_trait]
impl MediaRepository for SqlxMediaRepository {
    async fn create(&self, item: &MediaItem) -> Result<MediaItem> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO media_items (title, media_type, url, alt_text, neighborhood_id, business_listing_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(&item.title)
                .bind(item.media_type.to_string())
                .bind(&item.url)
                .bind(&item.alt_text)
                .bind(item.neighborhood_id)
                .bind(item.business_listing_id)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create media item")?;

        Ok(MediaItem {
            id,
            created_at: now,
            ..item.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<MediaItem>> {
        let sql = format!("{} WHERE m.id = ?", SELECT_MEDIA);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, MediaRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get media item")?;
        row.map(MediaItem::try_from).transpose()
    }

    async fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaItem>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut binds = Vec::new();
        if let Some(slug) = filter.neighborhood.as_deref().filter(|s| !s.is_empty()) {
            clauses.push("m.neighborhood_id IN (SELECT id FROM neighborhoods WHERE slug = ?)");
            binds.push(FilterValue::Text(slug.to_string()));
        }
        if let Some(slug) = filter.listing.as_deref().filter(|s| !s.is_empty()) {
            clauses.push("m.business_listing_id IN (SELECT id FROM business_listings WHERE slug = ?)");
            binds.push(FilterValue::Text(slug.to_string()));
        }

        let mut sql = SELECT_MEDIA.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY m.created_at DESC, m.id DESC");

        let rows = on_backend!(self.pool, &sql, |pool, sql| {
            let mut query = sqlx::query_as::<_, MediaRow>(sql);
            for value in &binds {
                query = match value {
                    FilterValue::Text(v) => query.bind(v.clone()),
                    FilterValue::Time(v) => query.bind(*v),
                };
            }
            query.fetch_all(pool).await
        })
        .context("Failed to list media")?;
        into_media(rows)
    }

    async fn list_by_neighborhood(&self, neighborhood_id: i64) -> Result<Vec<MediaItem>> {
        let sql = format!(
            "{} WHERE m.neighborhood_id = ? ORDER BY m.created_at DESC, m.id DESC",
            SELECT_MEDIA
        );
        let rows = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, MediaRow>(sql)
                .bind(neighborhood_id)
                .fetch_all(pool)
                .await
        })
        .context("Failed to list neighborhood media")?;
        into_media(rows)
    }

    async fn update(&self, item: &MediaItem) -> Result<MediaItem> {
        on_backend!(
            self.pool,
            "UPDATE media_items SET title = ?, media_type = ?, url = ?, alt_text = ?, neighborhood_id = ?, business_listing_id = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(&item.title)
                .bind(item.media_type.to_string())
                .bind(&item.url)
                .bind(&item.alt_text)
                .bind(item.neighborhood_id)
                .bind(item.business_listing_id)
                .bind(item.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update media item")?;

        self.get_by_id(item.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Media item not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM media_items WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete media item")?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::models::MediaType;

    fn item(title: &str) -> MediaItem {
        MediaItem {
            id: 0,
            title: title.to_string(),
            media_type: MediaType::Image,
            url: format!("https://cdn.example/{}.jpg", title),
            alt_text: None,
            neighborhood_id: None,
            business_listing_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_list_update_delete() {
        let repo = SqlxMediaRepository::new(migrated_pool().await);
        let created = repo.create(&item("mural")).await.unwrap();
        repo.create(&item("storefront")).await.unwrap();

        assert_eq!(repo.list(&MediaFilter::default()).await.unwrap().len(), 2);

        let mut changed = created.clone();
        changed.media_type = MediaType::Video;
        changed.alt_text = Some("Painted wall".to_string());
        let updated = repo.update(&changed).await.unwrap();
        assert_eq!(updated.media_type, MediaType::Video);
        assert_eq!(updated.alt_text.as_deref(), Some("Painted wall"));

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filter_by_unknown_neighborhood() {
        let repo = SqlxMediaRepository::new(migrated_pool().await);
        repo.create(&item("mural")).await.unwrap();

        let filter = MediaFilter {
            neighborhood: Some("nowhere".to_string()),
            listing: None,
        };
        assert!(repo.list(&filter).await.unwrap().is_empty());
        assert!(repo.list_by_neighborhood(1).await.unwrap().is_empty());
    }
}
