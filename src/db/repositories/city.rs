//! City repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::City;

#[async_trait]
pub trait CityRepository: Send + Sync {
    async fn create(&self, city: &City) -> Result<City>;
    async fn get_by_id(&self, id: i64) -> Result<Option<City>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<City>>;
    async fn list(&self) -> Result<Vec<City>>;
    async fn update(&self, city: &City) -> Result<City>;
    async fn delete(&self, id: i64) -> Result<bool>;
    /// Whether another city (not `exclude_id`) already uses `slug`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn count(&self) -> Result<i64>;
}

pub struct SqlxCityRepository {
    pool: DynDatabasePool,
}

impl SqlxCityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CityRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct CityRow {
    id: i64,
    slug: String,
    name: String,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CityRow> for City {
    fn from(row: CityRow) -> Self {
        City {
            id: row.id,
            slug: row.slug,
            name: row.name,
            state: row.state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CityRepository for SqlxCityRepository {
    async fn create(&self, city: &City) -> Result<City> {
        let now = Utc::now();
        let id: i64 = on_backend!(
            self.pool,
            "INSERT INTO cities (slug, name, state, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(&city.slug)
                .bind(&city.name)
                .bind(&city.state)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create city")?;

        Ok(City {
            id,
            created_at: now,
            updated_at: now,
            ..city.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<City>> {
        let row = on_backend!(
            self.pool,
            "SELECT id, slug, name, state, created_at, updated_at FROM cities WHERE id = ?",
            |pool, sql| sqlx::query_as::<_, CityRow>(sql).bind(id).fetch_optional(pool).await
        )
        .context("Failed to get city")?;
        Ok(row.map(City::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<City>> {
        let row = on_backend!(
            self.pool,
            "SELECT id, slug, name, state, created_at, updated_at FROM cities WHERE slug = ?",
            |pool, sql| sqlx::query_as::<_, CityRow>(sql).bind(slug).fetch_optional(pool).await
        )
        .context("Failed to get city by slug")?;
        Ok(row.map(City::from))
    }

    async fn list(&self) -> Result<Vec<City>> {
        let rows = on_backend!(
            self.pool,
            "SELECT id, slug, name, state, created_at, updated_at FROM cities ORDER BY name",
            |pool, sql| sqlx::query_as::<_, CityRow>(sql).fetch_all(pool).await
        )
        .context("Failed to list cities")?;
        Ok(rows.into_iter().map(City::from).collect())
    }

    async fn update(&self, city: &City) -> Result<City> {
        let now = Utc::now();
        on_backend!(
            self.pool,
            "UPDATE cities SET slug = ?, name = ?, state = ?, updated_at = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(&city.slug)
                .bind(&city.name)
                .bind(&city.state)
                .bind(now)
                .bind(city.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update city")?;

        self.get_by_id(city.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("City not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM cities WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete city")?;
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count: i64 = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM cities WHERE slug = ? AND id <> ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(pool)
                .await
        )
        .context("Failed to check city slug")?;
        Ok(count > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = on_backend!(self.pool, "SELECT COUNT(*) FROM cities", |pool, sql| {
            sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
        })
        .context("Failed to count cities")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    fn city(slug: &str, name: &str) -> City {
        let now = Utc::now();
        City {
            id: 0,
            slug: slug.to_string(),
            name: name.to_string(),
            state: "CA".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = SqlxCityRepository::new(migrated_pool().await);

        let created = repo.create(&city("oakland", "Oakland")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.slug, "oakland");
        let by_slug = repo.get_by_slug("oakland").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert!(repo.get_by_slug("berkeley").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_name() {
        let repo = SqlxCityRepository::new(migrated_pool().await);
        repo.create(&city("san-jose", "San Jose")).await.unwrap();
        repo.create(&city("alameda", "Alameda")).await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Alameda", "San Jose"]);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = SqlxCityRepository::new(migrated_pool().await);
        let mut created = repo.create(&city("sf", "SF")).await.unwrap();

        created.name = "San Francisco".to_string();
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.name, "San Francisco");

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_slug_exists_excludes_self() {
        let repo = SqlxCityRepository::new(migrated_pool().await);
        let created = repo.create(&city("oakland", "Oakland")).await.unwrap();

        assert!(repo.slug_exists("oakland", None).await.unwrap());
        assert!(!repo.slug_exists("oakland", Some(created.id)).await.unwrap());
        assert!(!repo.slug_exists("fremont", None).await.unwrap());
    }
}
