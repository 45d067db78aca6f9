//! Order workflow.
//!
//! Everything that can be checked without side effects happens here: request shape,
//! product lookup, stock per line, discount ownership and expiry. The store then
//! claims the code, decrements stock, writes the order and clears the cart as one
//! unit, so a rejection at that point leaves nothing behind.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::auth::Claims;
use super::discounts::redeemable_code;
use super::events::EventPublisher;
use crate::domain::aggregates::order::OrderTotals;
use crate::domain::aggregates::{
    Activity, CartOwner, DiscountClaim, Order, OrderDraft, OrderError, OrderRequest, OrderStatus, PricedLine, Product,
};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::error::{AppError, Result};
use crate::store::{AccountStore, ActivityStore, CatalogStore, Conflict, OrderStore, Store, StoreError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
}

/// Request context that only feeds the `order_placed` analytics event.
#[derive(Debug, Clone, Default)]
pub struct OrderContext {
    pub referer: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self { Self { store, events } }

    pub async fn create_order(&self, caller: Option<&Claims>, request: OrderRequest, context: OrderContext) -> Result<Order> {
        let checked = request.check()?;
        let owner = CartOwner::resolve(caller.map(|c| c.sub), checked.guest_id.as_deref());

        let mut products: Vec<Product> = Vec::with_capacity(checked.lines.len());
        let mut priced = Vec::with_capacity(checked.lines.len());
        for line in &checked.lines {
            let product = self
                .store
                .get_product(line.product_id)
                .await?
                .ok_or_else(|| OrderError::ProductNotFound(line.product_id.to_string()))?;
            priced.push(PricedLine::price(line, &product)?);
            products.push(product);
        }

        let now = Utc::now();
        let claim = match &checked.discount_code {
            Some(code) => {
                let found = redeemable_code(self.store.as_ref(), code, &checked.order_email, now).await?;
                Some(DiscountClaim { code: found.code, email: found.email })
            }
            None => None,
        };

        if let Some(client_total) = checked.client_total {
            let server = OrderTotals::compute(&priced, false).subtotal;
            if client_total != server {
                tracing::warn!(%client_total, %server, "Client subtotal differs from recomputed subtotal");
            }
        }

        let draft = OrderDraft::build(checked, owner, &priced, claim);
        let order = self.store.place_order(&draft).await.map_err(|e| match e {
            StoreError::Conflict(Conflict::InsufficientStock(id)) => {
                tracing::warn!(product_id = %id, "Stock moved before the order could be placed");
                AppError::from(OrderError::StockConflict(id))
            }
            other => other.into(),
        })?;
        tracing::info!(
            order_id = %order.id,
            total = %order.total_amount,
            discount_applied = order.discount_applied,
            items = order.products.len(),
            "Order placed"
        );

        self.record_placement(&order, &products, context).await;
        self.events
            .publish(DomainEvent::Order(OrderEvent::Placed {
                order_id: order.id,
                user_id: order.user_id,
                guest_id: order.guest_id.clone(),
                total_amount: order.total_amount,
                discount_code: order.discount_code.clone(),
                items: order.products.len(),
            }))
            .await;
        Ok(order)
    }

    /// Best-effort `order_placed` analytics event.
    async fn record_placement(&self, order: &Order, products: &[Product], context: OrderContext) {
        let lines: Vec<_> = order
            .products
            .iter()
            .map(|line| {
                let product = products.iter().find(|p| p.id == line.product_id);
                let image = match product {
                    Some(p) if !p.images.contains(&line.selected_image) => p.images.first().unwrap_or(&line.selected_image),
                    _ => &line.selected_image,
                };
                json!({
                    "product_id": line.product_id,
                    "product_name": product.map(|p| p.name.as_str()),
                    "selected_image": image,
                    "quantity": line.quantity,
                })
            })
            .collect();
        let username = match order.user_id {
            Some(id) => match self.store.get_account(id).await {
                Ok(account) => account.map(|a| a.username),
                Err(e) => {
                    tracing::debug!(error = %e, user_id = %id, "Account lookup for order analytics failed");
                    None
                }
            },
            None => None,
        };
        let event = Activity::server_event(
            Activity::ORDER_PLACED,
            order.user_id,
            order.guest_id.clone(),
            username.or_else(|| Some(order.full_name.clone())),
            context.referer,
            json!({ "order_id": order.id, "products": lines, "total_amount": order.total_amount }),
        );
        if let Err(e) = self.store.insert_activity(&event).await {
            tracing::warn!(error = %e, order_id = %order.id, "Failed to record order analytics");
        }
    }

    /// Caller's orders when authenticated, else the guest's; empty without either.
    pub async fn my_orders(&self, caller: Option<&Claims>, guest_id: Option<&str>) -> Result<Vec<Order>> {
        match CartOwner::resolve(caller.map(|c| c.sub), guest_id) {
            Some(owner) => Ok(self.store.orders_for(&owner).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>> { Ok(self.store.list_orders().await?) }

    pub async fn get_order(&self, id: Uuid) -> Result<Order> {
        Ok(self.store.get_order(id).await?.ok_or(OrderError::NotFound)?)
    }

    pub async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<Order> {
        let current = self.get_order(id).await?;
        let status: OrderStatus = update.status.as_deref().map(str::trim).unwrap_or_default().parse()?;
        let order = self.store.update_order_status(id, status).await?.ok_or(OrderError::NotFound)?;
        tracing::info!(order_id = %id, from = %current.status, to = %status, "Order status updated");
        self.events
            .publish(DomainEvent::Order(OrderEvent::StatusChanged { order_id: id, from: current.status, to: status }))
            .await;
        Ok(order)
    }

    /// Deletes the order and puts its units back on the shelf.
    pub async fn delete_order(&self, id: Uuid) -> Result<Order> {
        let order = self.store.delete_order(id).await?.ok_or(OrderError::NotFound)?;
        tracing::info!(order_id = %id, lines = order.products.len(), "Order deleted, stock restored");
        self.events
            .publish(DomainEvent::Order(OrderEvent::Deleted { order_id: id, restocked_lines: order.products.len() }))
            .await;
        Ok(order)
    }
}
