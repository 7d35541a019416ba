//! Newsletter issues

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::double_option;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsletterStatus {
    #[default]
    Draft,
    Scheduled,
    Sent,
}

impl fmt::Display for NewsletterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Sent => write!(f, "sent"),
        }
    }
}

impl FromStr for NewsletterStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            _ => Err(anyhow::anyhow!("Invalid newsletter status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub subject: String,
    pub content: String,
    pub content_html: String,
    pub status: NewsletterStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNewsletterInput {
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub status: Option<NewsletterStatus>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNewsletterInput {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub status: Option<NewsletterStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_for: Option<Option<DateTime<Utc>>>,
}
