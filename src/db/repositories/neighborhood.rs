//! Neighborhood repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::Neighborhood;

#[async_trait]
pub trait NeighborhoodRepository: Send + Sync {
    async fn create(&self, neighborhood: &Neighborhood) -> Result<Neighborhood>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Neighborhood>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Neighborhood>>;
    async fn list(&self) -> Result<Vec<Neighborhood>>;
    async fn list_by_area(&self, area_id: i64) -> Result<Vec<Neighborhood>>;
    /// Neighborhoods linked to a blog post
    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Neighborhood>>;
    async fn update(&self, neighborhood: &Neighborhood) -> Result<Neighborhood>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn count(&self) -> Result<i64>;
}

pub struct SqlxNeighborhoodRepository {
    pool: DynDatabasePool,
}

impl SqlxNeighborhoodRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NeighborhoodRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct NeighborhoodRow {
    id: i64,
    area_id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    hero_image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NeighborhoodRow> for Neighborhood {
    fn from(row: NeighborhoodRow) -> Self {
        Neighborhood {
            id: row.id,
            area_id: row.area_id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            hero_image_url: row.hero_image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl NeighborhoodRepository for SqlxNeighborhoodRepository {
    async fn create(&self, neighborhood: &Neighborhood) -> Result<Neighborhood> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO neighborhoods (area_id, slug, name, description, hero_image_url, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(neighborhood.area_id)
                .bind(&neighborhood.slug)
                .bind(&neighborhood.name)
                .bind(&neighborhood.description)
                .bind(&neighborhood.hero_image_url)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create neighborhood")?;

        Ok(Neighborhood {
            id,
            created_at: now,
            updated_at: now,
            ..neighborhood.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Neighborhood>> {
        let row = on_backend!(
            self.pool,
            "SELECT id, area_id, slug, name, description, hero_image_url, created_at, updated_at FROM neighborhoods WHERE id = ?",
            |pool, sql| sqlx::query_as::<_, NeighborhoodRow>(sql)
                .bind(id)
                .fetch_optional(pool)
                .await
        )
        .context("Failed to get neighborhood")?;
        Ok(row.map(Neighborhood::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Neighborhood>> {
        let row = on_backend!(
            self.pool,
            "SELECT id, area_id, slug, name, description, hero_image_url, created_at, updated_at FROM neighborhoods WHERE slug = ?",
            |pool, sql| sqlx::query_as::<_, NeighborhoodRow>(sql)
                .bind(slug)
                .fetch_optional(pool)
                .await
        )
        .context("Failed to get neighborhood by slug")?;
        Ok(row.map(Neighborhood::from))
    }

    async fn list(&self) -> Result<Vec<Neighborhood>> {
        let rows = on_backend!(
            self.pool,
            "SELECT id, area_id, slug, name, description, hero_image_url, created_at, updated_at FROM neighborhoods ORDER BY name",
            |pool, sql| sqlx::query_as::<_, NeighborhoodRow>(sql).fetch_all(pool).await
        )
        .context("Failed to list neighborhoods")?;
        Ok(rows.into_iter().map(Neighborhood::from).collect())
    }

    async fn list_by_area(&self, area_id: i64) -> Result<Vec<Neighborhood>> {
        let rows = on_backend!(
            self.pool,
            "SELECT id, area_id, slug, name, description, hero_image_url, created_at, updated_at FROM neighborhoods WHERE area_id = ? ORDER BY name",
            |pool, sql| sqlx::query_as::<_, NeighborhoodRow>(sql)
                .bind(area_id)
                .fetch_all(pool)
                .await
        )
        .context("Failed to list neighborhoods for area")?;
        Ok(rows.into_iter().map(Neighborhood::from).collect())
    }

    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Neighborhood>> {
        let rows = on_backend!(
            self.pool,
            "SELECT n.id, n.area_id, n.slug, n.name, n.description, n.hero_image_url, n.created_at, n.updated_at \
             FROM neighborhoods n INNER JOIN post_neighborhoods pn ON pn.neighborhood_id = n.id \
             WHERE pn.post_id = ? ORDER BY n.name",
            |pool, sql| sqlx::query_as::<_, NeighborhoodRow>(sql)
                .bind(post_id)
                .fetch_all(pool)
                .await
        )
        .context("Failed to list neighborhoods for post")?;
        Ok(rows.into_iter().map(Neighborhood::from).collect())
    }

    async fn update(&self, neighborhood: &Neighborhood) -> Result<Neighborhood> {
        let now = Utc::now();
        on_backend!(
            self.pool,
            "UPDATE neighborhoods SET area_id = ?, slug = ?, name = ?, description = ?, hero_image_url = ?, updated_at = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(neighborhood.area_id)
                .bind(&neighborhood.slug)
                .bind(&neighborhood.name)
                .bind(&neighborhood.description)
                .bind(&neighborhood.hero_image_url)
                .bind(now)
                .bind(neighborhood.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update neighborhood")?;

        self.get_by_id(neighborhood.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Neighborhood not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM neighborhoods WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete neighborhood")?;
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM neighborhoods WHERE slug = ? AND id <> ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(pool)
                .await
        )
        .context("Failed to check neighborhood slug")?;
        Ok(count > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count = on_backend!(self.pool, "SELECT COUNT(*) FROM neighborhoods", |pool, sql| {
            sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
        })
        .context("Failed to count neighborhoods")?;
        Ok(count)
    }
}
