//! Public listing/event submissions
//!
//! A submission starts `pending`/`unpaid`. Payment moves `payment_status`;
//! an editor (or a completed payment) moves `status` to approved or
//! rejected, after which it never changes again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionType {
    Business,
    Event,
}

impl fmt::Display for SubmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Business => write!(f, "business"),
            Self::Event => write!(f, "event"),
        }
    }
}

impl FromStr for SubmissionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "business" => Ok(Self::Business),
            "event" => Ok(Self::Event),
            _ => Err(anyhow::anyhow!("Invalid submission type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(anyhow::anyhow!("Invalid submission status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unpaid => write!(f, "unpaid"),
            Self::Paid => write!(f, "paid"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("Invalid payment status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub submission_type: SubmissionType,
    pub status: SubmissionStatus,
    pub payment_status: PaymentStatus,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub neighborhood_id: Option<i64>,
    pub event_starts_at: Option<DateTime<Utc>>,
    pub amount_cents: i64,
    pub checkout_reference: Option<String>,
    pub review_note: Option<String>,
    /// Id of the listing or event created on approval
    pub created_record_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn is_pending(&self) -> bool {
        self.status == SubmissionStatus::Pending
    }

    /// Pending and not yet paid: the only state checkout may start from
    pub fn awaiting_payment(&self) -> bool {
        self.is_pending() && self.payment_status == PaymentStatus::Unpaid
    }
}

/// Raw form body of `POST /submit`; every field arrives as optional text
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionForm {
    #[serde(rename = "type", default)]
    pub submission_type: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    /// Neighborhood slug
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub event_starts_at: Option<String>,
}

/// A validated submission ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubmission {
    pub submission_type: SubmissionType,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub neighborhood_id: Option<i64>,
    pub event_starts_at: Option<DateTime<Utc>>,
    pub amount_cents: i64,
}

/// Reviewer decision body for approve/reject
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewInput {
    #[serde(default)]
    pub note: Option<String>,
}
