//! Content cache
//!
//! In-process TTL cache for the public read paths (city pages, neighborhood
//! guides, listing and event lists). Values are stored as JSON so any
//! serializable response type can be cached under a string key.
//!
//! Keys are namespaced with a prefix (`guide:`, `listings:` ...) and writers
//! invalidate whole namespaces with [`ContentCache::delete_prefix`].
//!
//! ```rust,ignore
//! use townsquare::cache::ContentCache;
//! use townsquare::config::CacheConfig;
//!
//! let cache = ContentCache::from_config(&CacheConfig::default());
//! cache.set("guide:mission", &guide).await?;
//! let hit: Option<NeighborhoodGuide> = cache.get("guide:mission").await?;
//! ```

use anyhow::{Context, Result};
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// Shared handle to the content cache
pub type SharedCache = Arc<ContentCache>;

/// JSON-serialized cache value
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Moka-backed cache with a single global TTL
pub struct ContentCache {
    cache: Cache<String, CacheEntry>,
    ttl: Duration,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ContentCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache, ttl }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_capacity, Duration::from_secs(config.ttl_seconds))
    }

    pub fn shared(config: &CacheConfig) -> SharedCache {
        Arc::new(Self::from_config(config))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Get a value; `Ok(None)` on miss or expiry
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite a value
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let entry = CacheEntry::new(value)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Remove every key starting with `prefix`
    pub async fn delete_prefix(&self, prefix: &str) {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys {
            self.cache.invalidate(&key).await;
        }
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Card {
        name: String,
        rank: u32,
    }

    fn cache() -> ContentCache {
        ContentCache::new(100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_set_and_get_struct() {
        let cache = cache();
        let card = Card {
            name: "Blue Bottle".to_string(),
            rank: 1,
        };

        cache.set("listing:blue-bottle", &card).await.unwrap();
        let hit: Option<Card> = cache.get("listing:blue-bottle").await.unwrap();
        assert_eq!(hit, Some(card));
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let cache = cache();
        let hit: Option<String> = cache.get("nope").await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_wrong_type_is_an_error() {
        let cache = cache();
        cache.set("k", &"text").await.unwrap();
        let result: Result<Option<Card>> = cache.get("k").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_prefix_keeps_other_namespaces() {
        let cache = cache();
        cache.set("guide:mission", &1).await.unwrap();
        cache.set("guide:soma", &2).await.unwrap();
        cache.set("listings:page:1", &3).await.unwrap();

        cache.delete_prefix("guide:").await;

        assert!(cache.get::<i32>("guide:mission").await.unwrap().is_none());
        assert!(cache.get::<i32>("guide:soma").await.unwrap().is_none());
        assert_eq!(cache.get::<i32>("listings:page:1").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = cache();
        cache.set("a", &1).await.unwrap();
        cache.set("b", &2).await.unwrap();

        cache.delete("a").await;
        assert!(cache.get::<i32>("a").await.unwrap().is_none());

        cache.clear().await;
        assert!(cache.get::<i32>("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = ContentCache::new(100, Duration::from_millis(20));
        cache.set("short", &"lived").await.unwrap();
        assert!(cache.get::<String>("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get::<String>("short").await.unwrap().is_none());
    }
}
