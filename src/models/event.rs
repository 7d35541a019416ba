//! Event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::double_option;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Cancelled,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for EventStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid event status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub neighborhood_id: Option<i64>,
    pub business_listing_id: Option<i64>,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.starts_at >= now
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    /// Neighborhood slug
    pub neighborhood: Option<String>,
    /// Only events starting at or after this instant
    #[serde(skip)]
    pub starts_after: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub published_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventInput {
    #[serde(default)]
    pub neighborhood_id: Option<i64>,
    #[serde(default)]
    pub business_listing_id: Option<i64>,
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<EventStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateEventInput {
    #[serde(default, deserialize_with = "double_option")]
    pub neighborhood_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub business_listing_id: Option<Option<i64>>,
    pub slug: Option<String>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub venue: Option<Option<String>>,
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
    pub status: Option<EventStatus>,
}
