//! Newsletter discount codes: issuance, read-only validation and the expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use validator::Validate;

use super::events::EventPublisher;
use super::mailer::{discount_mail, Mailer};
use crate::domain::aggregates::{DiscountCode, DiscountError};
use crate::domain::events::{DiscountEvent, DomainEvent};
use crate::domain::value_objects::{DiscountCodeValue, Email};
use crate::error::Result;
use crate::store::{DiscountStore, Store};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SubscribeRequest {
    #[validate(length(min = 1, message = "Valid email is required"))]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ValidateDiscountRequest {
    #[validate(length(min = 1, message = "Discount code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "Valid email is required"))]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscountValidity {
    pub valid: bool,
    pub code: String,
    pub discount_percent: u32,
    pub expires_at: DateTime<Utc>,
}

/// Finds the code issued to `email` and checks it can still be redeemed.
/// A code owned by another email reads as not found.
pub async fn redeemable_code(store: &dyn Store, code: &DiscountCodeValue, email: &Email, now: DateTime<Utc>) -> Result<DiscountCode> {
    let found = store.find_discount(code.as_str(), &email.normalized()).await?.ok_or(DiscountError::NotFound)?;
    found.ensure_redeemable(now)?;
    Ok(found)
}

#[derive(Clone)]
pub struct DiscountService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    events: EventPublisher,
}

impl DiscountService {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, events: EventPublisher) -> Self {
        Self { store, mailer, events }
    }

    /// Issues the one code an email may own and mails it.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<DiscountCode> {
        request.validate()?;
        let email = Email::parse(&request.email).map_err(|_| DiscountError::InvalidEmail)?;
        let code = DiscountCode::issue(&email, Utc::now());
        self.store.issue_discount(&code).await?;
        tracing::info!(email = %code.email, expires_at = %code.expires_at, "Discount code issued");

        let mail = discount_mail(&code.email, code.code.as_str(), DiscountCode::PERCENT_OFF, code.expires_at);
        if let Err(e) = self.mailer.send(mail).await {
            tracing::warn!(error = %e, email = %code.email, "Failed to mail discount code");
        }
        self.events
            .publish(DomainEvent::Discount(DiscountEvent::Issued { email: code.email.clone(), code: code.code.as_str().to_string() }))
            .await;
        Ok(code)
    }

    /// Never consumes the code.
    pub async fn validate(&self, request: ValidateDiscountRequest) -> Result<DiscountValidity> {
        request.validate()?;
        let email = Email::parse(&request.email).map_err(|_| DiscountError::InvalidEmail)?;
        let code = DiscountCodeValue::parse(&request.code).map_err(|_| DiscountError::NotFound)?;
        let found = redeemable_code(self.store.as_ref(), &code, &email, Utc::now()).await?;
        Ok(DiscountValidity {
            valid: true,
            code: found.code.as_str().to_string(),
            discount_percent: DiscountCode::PERCENT_OFF,
            expires_at: found.expires_at,
        })
    }
}

/// Deletes expired codes every `every`.
pub fn spawn_expiry_sweep(store: Arc<dyn Store>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired_discounts(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired discount codes"),
                Err(e) => tracing::error!(error = %e, "Discount sweep failed"),
            }
        }
    })
}
