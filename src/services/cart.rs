//! Per-user and per-guest carts.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::product::StockIssue;
use crate::domain::aggregates::{CartError, CartKey, CartLine, CartOwner, Product, StockBucket};
use crate::error::{AppError, Result};
use crate::store::{CartStore, CatalogStore, Store};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartRequest {
    pub product_id: Option<String>,
    pub selected_image: Option<String>,
    pub selected_size: Option<String>,
    #[serde(rename = "guestId")]
    pub guest_id: Option<String>,
}

/// Cart lookup query. Shoppers send `guestId`, the analytics view sends `guest_id` or `user_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartLookup {
    #[serde(alias = "guestId")]
    pub guest_id: Option<String>,
    pub user_id: Option<String>,
}

impl CartLookup {
    /// The caller's own cart, or the guest cart when unauthenticated.
    pub fn shopper(&self, caller: Option<Uuid>) -> Result<CartOwner> {
        CartOwner::resolve(caller, self.guest_id.as_deref())
            .ok_or_else(|| AppError::Validation("User or guest ID required".to_string()))
    }

    /// Any owner's cart; a guest id wins over a user id.
    pub fn any_owner(&self) -> Result<CartOwner> {
        let guest = self.guest_id.as_deref().map(str::trim).filter(|g| !g.is_empty());
        let user = self.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty());
        match (guest, user) {
            (Some(guest), _) => Ok(CartOwner::Guest(guest.to_string())),
            (None, Some(user)) => user
                .parse::<Uuid>()
                .map(CartOwner::User)
                .map_err(|_| AppError::Validation("Invalid user_id".to_string())),
            (None, None) => Err(AppError::Validation("guest_id or user_id is required".to_string())),
        }
    }
}

/// A cart line with its product inlined; `product` is `None` once the product is gone.
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub line: CartLine,
    pub product: Option<Product>,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn cart(&self, owner: &CartOwner) -> Result<Vec<CartItem>> {
        let lines = self.store.cart(owner).await?;
        let products = try_join_all(lines.iter().map(|line| self.store.get_product(line.product_id))).await?;
        Ok(lines.into_iter().zip(products).map(|(line, product)| CartItem { line, product }).collect())
    }

    fn parse_ids(request: &CartRequest) -> std::result::Result<(Uuid, String), CartError> {
        let (Some(raw_id), Some(image)) = (
            request.product_id.as_deref().map(str::trim).filter(|p| !p.is_empty()),
            request.selected_image.as_deref().map(str::trim).filter(|i| !i.is_empty()),
        ) else {
            return Err(CartError::MissingFields);
        };
        let product_id = raw_id.parse::<Uuid>().map_err(|_| CartError::InvalidProductId)?;
        Ok((product_id, image.to_string()))
    }

    /// Adds one unit of the selected variant. The variant must currently be in stock.
    pub async fn add(&self, owner: &CartOwner, request: CartRequest) -> Result<Vec<CartItem>> {
        let (product_id, selected_image) = Self::parse_ids(&request)?;
        let product = self.store.get_product(product_id).await?.ok_or(CartError::ProductNotFound)?;
        let bucket = product.bucket_for(request.selected_size.as_deref()).map_err(|issue| match issue {
            StockIssue::SizeRequired => CartError::SizeRequired,
            _ => CartError::SizeUnavailable,
        })?;
        if product.available(bucket) <= 0 {
            return Err(match bucket {
                StockBucket::Flat => CartError::OutOfStock,
                StockBucket::Sized(_) => CartError::SizeUnavailable,
            }
            .into());
        }
        let key = CartKey { product_id, selected_image, selected_size: bucket.size() };
        let line = self.store.add_to_cart(owner, &key).await?;
        tracing::debug!(owner = %owner.key(), product_id = %product_id, quantity = line.quantity, "Cart line added");
        self.cart(owner).await
    }

    /// Takes one unit off the matching line, dropping the line at zero.
    pub async fn remove(&self, owner: &CartOwner, request: CartRequest) -> Result<Vec<CartItem>> {
        let (product_id, selected_image) = Self::parse_ids(&request)?;
        let selected_size = request
            .selected_size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok());
        let key = CartKey { product_id, selected_image, selected_size };
        if !self.store.remove_from_cart(owner, &key).await? {
            return Err(CartError::ItemNotFound.into());
        }
        self.cart(owner).await
    }

    pub async fn clear(&self, owner: &CartOwner) -> Result<u64> {
        let removed = self.store.clear_cart(owner).await?;
        tracing::debug!(owner = %owner.key(), removed, "Cart cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_parse_ids() {
        let missing = CartRequest { product_id: Some("x".into()), ..Default::default() };
        assert_eq!(CartService::parse_ids(&missing), Err(CartError::MissingFields));
        let bad = CartRequest { product_id: Some("not-a-uuid".into()), selected_image: Some("a.jpg".into()), ..Default::default() };
        assert_eq!(CartService::parse_ids(&bad), Err(CartError::InvalidProductId));
    }

    #[test]
    fn test_cart_lookup() {
        let both = CartLookup { guest_id: Some("g-1".into()), user_id: Some("junk".into()) };
        assert_eq!(both.any_owner().unwrap(), CartOwner::Guest("g-1".into()));
        let bad = CartLookup { user_id: Some("junk".into()), ..Default::default() };
        assert_eq!(bad.any_owner().unwrap_err().to_string(), "Invalid user_id");
        assert_eq!(CartLookup::default().any_owner().unwrap_err().to_string(), "guest_id or user_id is required");

        let user = Uuid::now_v7();
        assert_eq!(both.shopper(Some(user)).unwrap(), CartOwner::User(user));
        assert!(CartLookup::default().shopper(None).is_err());
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let cart = CartService::new(Arc::new(MemoryStore::new()));
        let owner = CartOwner::Guest("g-1".into());
        let request = CartRequest { product_id: Some(Uuid::now_v7().to_string()), selected_image: Some("a.jpg".into()), ..Default::default() };
        assert_eq!(cart.add(&owner, request).await.unwrap_err().to_string(), "Product not found");
        assert!(cart.cart(&owner).await.unwrap().is_empty());
    }
}
