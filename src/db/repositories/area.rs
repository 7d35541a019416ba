//! Area repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::Area;

#[async_trait]
pub trait AreaRepository: Send + Sync {
    async fn create(&self, area: &Area) -> Result<Area>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Area>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Area>>;
    async fn list(&self) -> Result<Vec<Area>>;
    async fn list_by_city(&self, city_id: i64) -> Result<Vec<Area>>;
    async fn update(&self, area: &Area) -> Result<Area>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

pub struct SqlxAreaRepository {
    pool: DynDatabasePool,
}

impl SqlxAreaRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AreaRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct AreaRow {
    id: i64,
    city_id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AreaRow> for Area {
    fn from(row: AreaRow) -> Self {
        Area {
            id: row.id,
            city_id: row.city_id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl AreaRepository for SqlxAreaRepository {
    async fn create(&self, area: &Area) -> Result<Area> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO areas (city_id, slug, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(area.city_id)
                .bind(&area.slug)
                .bind(&area.name)
                .bind(&area.description)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create area")?;

        Ok(Area {
            id,
            created_at: now,
            updated_at: now,
            ..area.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Area>> {
        let row = on_backend!(
            self.pool,
            "SELECT id, city_id, slug, name, description, created_at, updated_at FROM areas WHERE id = ?",
            |pool, sql| sqlx::query_as::<_, AreaRow>(sql).bind(id).fetch_optional(pool).await
        )
        .context("Failed to get area")?;
        Ok(row.map(Area::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Area>> {
        let row = on_backend!(
            self.pool,
            "SELECT id, city_id, slug, name, description, created_at, updated_at FROM areas WHERE slug = ?",
            |pool, sql| sqlx::query_as::<_, AreaRow>(sql).bind(slug).fetch_optional(pool).await
        )
        .context("Failed to get area by slug")?;
        Ok(row.map(Area::from))
    }

    async fn list(&self) -> Result<Vec<Area>> {
        let rows = on_backend!(
            self.pool,
            "SELECT id, city_id, slug, name, description, created_at, updated_at FROM areas ORDER BY name",
            |pool, sql| sqlx::query_as::<_, AreaRow>(sql).fetch_all(pool).await
        )
        .context("Failed to list areas")?;
        Ok(rows.into_iter().map(Area::from).collect())
    }

    async fn list_by_city(&self, city_id: i64) -> Result<Vec<Area>> {
        let rows = on_backend!(
            self.pool,
            "SELECT id, city_id, slug, name, description, created_at, updated_at FROM areas WHERE city_id = ? ORDER BY name",
            |pool, sql| sqlx::query_as::<_, AreaRow>(sql).bind(city_id).fetch_all(pool).await
        )
        .context("Failed to list areas for city")?;
        Ok(rows.into_iter().map(Area::from).collect())
    }

    async fn update(&self, area: &Area) -> Result<Area> {
        let now = Utc::now();
        on_backend!(
            self.pool,
            "UPDATE areas SET city_id = ?, slug = ?, name = ?, description = ?, updated_at = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(area.city_id)
                .bind(&area.slug)
                .bind(&area.name)
                .bind(&area.description)
                .bind(now)
                .bind(area.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update area")?;

        self.get_by_id(area.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Area not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM areas WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete area")?;
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM areas WHERE slug = ? AND id <> ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(pool)
                .await
        )
        .context("Failed to check area slug")?;
        Ok(count > 0)
    }
}
