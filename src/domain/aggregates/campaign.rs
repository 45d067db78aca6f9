//! Email campaign Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub recipient_count: i32,
}

impl Campaign {
    pub fn create(subject: &str, body: &str) -> Result<Self, CampaignError> {
        let (subject, body) = (subject.trim(), body.trim());
        if subject.is_empty() || body.is_empty() { return Err(CampaignError::MissingFields); }
        Ok(Self {
            id: Uuid::now_v7(),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            sent_at: None,
            recipient_count: 0,
        })
    }

    pub fn is_sent(&self) -> bool { self.sent_at.is_some() }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CampaignError {
    #[error("Subject and body are required")]
    MissingFields,
    #[error("Campaign not found")]
    NotFound,
    #[error("Campaign already sent")]
    AlreadySent,
    #[error("No users to send email to")]
    NoRecipients,
    #[error("Failed to send campaign emails")]
    Delivery,
}
