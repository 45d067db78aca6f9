//! Discount code Aggregate

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{round_money, DiscountCodeValue, Email};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: Uuid,
    /// Owner email, lower-cased.
    pub email: String,
    pub code: DiscountCodeValue,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DiscountCode {
    pub const VALIDITY_DAYS: i64 = 7;
    /// Flat reduction applied to the merchandise subtotal, in percent.
    pub const PERCENT_OFF: u32 = 10;

    pub fn issue(email: &Email, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: email.normalized(),
            code: DiscountCodeValue::generate(),
            is_used: false,
            created_at: now,
            expires_at: now + Duration::days(Self::VALIDITY_DAYS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.expires_at < now }

    /// Redeemability check; the claim itself happens atomically in the store.
    pub fn ensure_redeemable(&self, now: DateTime<Utc>) -> Result<(), DiscountError> {
        if self.is_used { return Err(DiscountError::AlreadyUsed); }
        if self.is_expired(now) { return Err(DiscountError::Expired); }
        Ok(())
    }

    /// `round(subtotal * 0.9, 2)`.
    pub fn apply_to(subtotal: Decimal) -> Decimal {
        let factor = Decimal::from(100 - Self::PERCENT_OFF) / Decimal::from(100);
        round_money(subtotal * factor)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscountError {
    #[error("Invalid or expired discount code")]
    NotFound,
    #[error("Discount code has already been used")]
    AlreadyUsed,
    #[error("Discount code has expired")]
    Expired,
    #[error("Email is already subscribed")]
    AlreadySubscribed,
    #[error("Valid email is required")]
    InvalidEmail,
}
