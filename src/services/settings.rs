//! Settings service
//!
//! Site-wide settings shown on every page: name, tagline and the public
//! contact address. Missing keys fall back to defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::SharedCache;
use crate::db::repositories::{SettingsRepository, SqlxSettingsRepository};
use crate::db::DynDatabasePool;

/// Known setting keys
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const SITE_TAGLINE: &str = "site_tagline";
    pub const CONTACT_EMAIL: &str = "contact_email";
}

const CACHE_KEY_SITE_SETTINGS: &str = "settings:site";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_tagline: String,
    pub contact_email: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Townsquare".to_string(),
            site_tagline: "Your neighborhood, in one place".to_string(),
            contact_email: String::new(),
        }
    }
}

/// Settings service errors
#[derive(Debug, Error)]
pub enum SettingsServiceError {
    #[error("Failed to load settings: {0}")]
    LoadError(String),

    #[error("Failed to save settings: {0}")]
    SaveError(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: SharedCache,
}

impl SettingsService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            repo: SqlxSettingsRepository::boxed(pool),
            cache,
        }
    }

    pub async fn get_site_settings(&self) -> Result<SiteSettings, SettingsServiceError> {
        if let Some(hit) = self
            .cache
            .get::<SiteSettings>(CACHE_KEY_SITE_SETTINGS)
            .await
            .ok()
            .flatten()
        {
            return Ok(hit);
        }

        let mut settings: HashMap<String, String> = self
            .repo
            .get_all()
            .await
            .map_err(|e| SettingsServiceError::LoadError(e.to_string()))?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();
        let defaults = SiteSettings::default();

        let site = SiteSettings {
            site_name: settings
                .remove(keys::SITE_NAME)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.site_name),
            site_tagline: settings
                .remove(keys::SITE_TAGLINE)
                .unwrap_or(defaults.site_tagline),
            contact_email: settings
                .remove(keys::CONTACT_EMAIL)
                .unwrap_or(defaults.contact_email),
        };
        let _ = self.cache.set(CACHE_KEY_SITE_SETTINGS, &site).await;
        Ok(site)
    }

    pub async fn update_site_settings(&self, settings: &SiteSettings) -> Result<SiteSettings, SettingsServiceError> {
        let site = SiteSettings {
            site_name: settings.site_name.trim().to_string(),
            site_tagline: settings.site_tagline.trim().to_string(),
            contact_email: settings.contact_email.trim().to_string(),
        };
        if site.site_name.is_empty() {
            return Err(SettingsServiceError::InvalidValue(
                "site_name cannot be empty".to_string(),
            ));
        }
        if !site.contact_email.is_empty() && !site.contact_email.contains('@') {
            return Err(SettingsServiceError::InvalidValue(
                "contact_email must be an email address".to_string(),
            ));
        }

        let mut map = HashMap::new();
        map.insert(keys::SITE_NAME.to_string(), site.site_name.clone());
        map.insert(keys::SITE_TAGLINE.to_string(), site.site_tagline.clone());
        map.insert(keys::CONTACT_EMAIL.to_string(), site.contact_email.clone());

        self.repo
            .set_many(&map)
            .await
            .map_err(|e| SettingsServiceError::SaveError(e.to_string()))?;
        self.cache.delete(CACHE_KEY_SITE_SETTINGS).await;

        tracing::info!(site_name = %site.site_name, "Site settings updated");
        Ok(site)
    }
}
