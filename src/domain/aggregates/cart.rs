//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Size;

/// Who a cart (and an order) belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(Uuid),
    Guest(String),
}

impl CartOwner {
    /// An authenticated user wins over a guest id; blank guest ids are ignored.
    pub fn resolve(user_id: Option<Uuid>, guest_id: Option<&str>) -> Option<Self> {
        match (user_id, guest_id.map(str::trim).filter(|g| !g.is_empty())) {
            (Some(id), _) => Some(Self::User(id)),
            (None, Some(guest)) => Some(Self::Guest(guest.to_string())),
            (None, None) => None,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self { Self::User(id) => Some(*id), Self::Guest(_) => None }
    }

    pub fn guest_id(&self) -> Option<&str> {
        match self { Self::User(_) => None, Self::Guest(id) => Some(id) }
    }

    /// Single-column form used for uniqueness in storage.
    pub fn key(&self) -> String {
        match self { Self::User(id) => format!("user:{id}"), Self::Guest(id) => format!("guest:{id}") }
    }
}

/// Identity of a cart line within one owner's cart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CartKey {
    pub product_id: Uuid,
    pub selected_image: String,
    pub selected_size: Option<Size>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_id: Option<String>,
    pub product_id: Uuid,
    pub selected_image: String,
    pub selected_size: Option<Size>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    pub fn new(owner: &CartOwner, key: &CartKey) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id: owner.user_id(),
            guest_id: owner.guest_id().map(str::to_string),
            product_id: key.product_id,
            selected_image: key.selected_image.clone(),
            selected_size: key.selected_size,
            quantity: 1,
            created_at: now, updated_at: now,
        }
    }

    pub fn owned_by(&self, owner: &CartOwner) -> bool {
        match owner {
            CartOwner::User(id) => self.user_id == Some(*id),
            CartOwner::Guest(id) => self.user_id.is_none() && self.guest_id.as_deref() == Some(id.as_str()),
        }
    }

    pub fn matches(&self, owner: &CartOwner, key: &CartKey) -> bool {
        self.owned_by(owner)
            && self.product_id == key.product_id
            && self.selected_image == key.selected_image
            && self.selected_size == key.selected_size
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CartError {
    #[error("User or guest ID required")]
    OwnerRequired,
    #[error("Product ID and selected image are required")]
    MissingFields,
    #[error("Invalid product ID format")]
    InvalidProductId,
    #[error("Product not found")]
    ProductNotFound,
    #[error("Please select a size for this product")]
    SizeRequired,
    #[error("Selected size is invalid or out of stock")]
    SizeUnavailable,
    #[error("Product is out of stock")]
    OutOfStock,
    #[error("Cart item not found")]
    ItemNotFound,
}
