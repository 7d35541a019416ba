//! Media library items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::double_option;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Document,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Document => write!(f, "document"),
        }
    }
}

impl FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            _ => Err(anyhow::anyhow!("Invalid media type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: i64,
    pub title: String,
    pub media_type: MediaType,
    pub url: String,
    pub alt_text: Option<String>,
    pub neighborhood_id: Option<i64>,
    pub business_listing_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Media query: by neighborhood slug and/or listing slug
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFilter {
    pub neighborhood: Option<String>,
    pub listing: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMediaInput {
    pub title: String,
    pub media_type: MediaType,
    pub url: String,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub neighborhood_id: Option<i64>,
    #[serde(default)]
    pub business_listing_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMediaInput {
    pub title: Option<String>,
    pub media_type: Option<MediaType>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub alt_text: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub neighborhood_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub business_listing_id: Option<Option<i64>>,
}
