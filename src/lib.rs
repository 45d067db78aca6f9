//! BZCart storefront backend.
//!
//! ## Features
//! - Product catalog with categories, sized stock and reviews
//! - Guest and account carts
//! - Orders with one-time newsletter discount codes
//! - Email campaigns
//! - Storefront analytics with background geo/device enrichment

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod services;
pub mod store;

use std::sync::Arc;

use services::{
    AnalyticsService, AuthService, CampaignService, CartService, CatalogService, DiscountService, EnrichmentQueue,
    EventPublisher, Mailer, OrderService, TokenKeys,
};
use store::Store;

pub use http::build_router;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
    pub catalog: CatalogService,
    pub cart: CartService,
    pub orders: OrderService,
    pub discounts: DiscountService,
    pub analytics: AnalyticsService,
    pub campaigns: CampaignService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        events: EventPublisher,
        keys: TokenKeys,
        enrichment: EnrichmentQueue,
    ) -> Self {
        Self {
            auth: AuthService::new(store.clone(), mailer.clone(), keys),
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone()),
            orders: OrderService::new(store.clone(), events.clone()),
            discounts: DiscountService::new(store.clone(), mailer.clone(), events),
            analytics: AnalyticsService::new(store.clone(), enrichment),
            campaigns: CampaignService::new(store.clone(), mailer),
            store,
        }
    }
}
