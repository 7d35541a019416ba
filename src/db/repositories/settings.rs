//! Settings repository
//!
//! Key/value site settings (site name, tagline, contact address...).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::DynDatabasePool;

/// A setting key-value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Repository trait for settings operations
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    /// All settings, ordered by key
    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Insert or overwrite a single setting
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()>;
}

/// SQLx-based settings repository
pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        on_backend!(
            self.pool,
            "SELECT key, value FROM settings WHERE key = ?",
            |pool, sql| sqlx::query_as::<_, Setting>(sql).bind(key).fetch_optional(pool).await
        )
        .context("Failed to get setting")
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        on_backend!(self.pool, "SELECT key, value FROM settings ORDER BY key", |pool, sql| {
            sqlx::query_as::<_, Setting>(sql).fetch_all(pool).await
        })
        .context("Failed to list settings")
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        on_backend!(
            self.pool,
            "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            |pool, sql| sqlx::query(sql)
                .bind(key)
                .bind(value)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .with_context(|| format!("Failed to save setting {}", key))
    }

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        for (key, value) in settings {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    #[tokio::test]
    async fn test_defaults_are_seeded() {
        let repo = SqlxSettingsRepository::new(migrated_pool().await);
        let name = repo.get("site_name").await.unwrap().unwrap();
        assert_eq!(name.value, "Townsquare");
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_inserts() {
        let repo = SqlxSettingsRepository::new(migrated_pool().await);
        let mut batch = HashMap::new();
        batch.insert("site_name".to_string(), "Eastside Daily".to_string());
        batch.insert("instagram".to_string(), "@eastside".to_string());
        repo.set_many(&batch).await.unwrap();

        assert_eq!(repo.get("site_name").await.unwrap().unwrap().value, "Eastside Daily");
        let keys: Vec<String> = repo.get_all().await.unwrap().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["contact_email", "instagram", "site_name", "site_tagline"]);
    }
}
