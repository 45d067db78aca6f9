//! Persistence seam.
//!
//! Every request handler talks to an `Arc<dyn Store>`. [`postgres::PgStore`] is the
//! production implementation; [`memory::MemoryStore`] keeps everything behind one lock
//! and backs local development and the test suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Account, Activity, ActivityMeta, ActivitySummary, Campaign, CartKey, CartLine, CartOwner, Category,
    CounterWrites, DiscountCode, EventFilter, MonthlyStats, Order, OrderDraft, OrderStatus, Product, Review,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Rejections a store raises when a conditional write does not apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("Invalid or expired discount code")]
    DiscountUnavailable,
    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),
    #[error("Email already exists!")]
    DuplicateEmail,
    #[error("Email is already subscribed")]
    AlreadySubscribed,
    #[error("Product with code {0} already exists")]
    DuplicateProductCode(String),
    #[error("You have already reviewed this product")]
    AlreadyReviewed,
    #[error("Campaign already sent")]
    CampaignAlreadySent,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] Conflict),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self) -> StoreResult<Vec<Product>>;
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    /// Products whose category or subcategories include `category_id`.
    async fn products_in_category(&self, category_id: Uuid) -> StoreResult<Vec<Product>>;
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    /// Writes the edited attributes. Stock, sizes and rating keep their stored
    /// values unless `counters` names them. Returns the row as stored.
    async fn update_product(&self, product: &Product, counters: CounterWrites) -> StoreResult<Option<Product>>;
    /// Also drops the product's cart lines and reviews.
    async fn delete_product(&self, id: Uuid) -> StoreResult<bool>;

    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>>;
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn update_category(&self, category: &Category) -> StoreResult<bool>;
    async fn delete_category(&self, id: Uuid) -> StoreResult<bool>;
    async fn count_subcategories(&self, id: Uuid) -> StoreResult<i64>;

    /// Inserts the review and returns the product's recomputed mean rating.
    async fn insert_review(&self, review: &Review) -> StoreResult<f64>;
    async fn list_reviews(&self, product_id: Uuid) -> StoreResult<Vec<Review>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart(&self, owner: &CartOwner) -> StoreResult<Vec<CartLine>>;
    /// Adds one unit, creating the line if needed.
    async fn add_to_cart(&self, owner: &CartOwner, key: &CartKey) -> StoreResult<CartLine>;
    /// Removes one unit, deleting the line at zero. False when no such line exists.
    async fn remove_from_cart(&self, owner: &CartOwner, key: &CartKey) -> StoreResult<bool>;
    async fn clear_cart(&self, owner: &CartOwner) -> StoreResult<u64>;
}

#[async_trait]
pub trait DiscountStore: Send + Sync {
    /// Fails with [`Conflict::AlreadySubscribed`] when the email already owns a code.
    async fn issue_discount(&self, code: &DiscountCode) -> StoreResult<()>;
    async fn find_discount(&self, code: &str, email: &str) -> StoreResult<Option<DiscountCode>>;
    async fn purge_expired_discounts(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Claims the discount, decrements stock, persists the order and clears the
    /// owner's cart as one unit. Nothing is written when any step is rejected.
    async fn place_order(&self, draft: &OrderDraft) -> StoreResult<Order>;
    async fn orders_for(&self, owner: &CartOwner) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self) -> StoreResult<Vec<Order>>;
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>>;
    /// Deletes the order and returns its units to stock.
    async fn delete_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn insert_activity(&self, activity: &Activity) -> StoreResult<()>;
    async fn set_activity_meta(&self, id: Uuid, meta: &ActivityMeta) -> StoreResult<bool>;
    async fn list_activities(&self, filter: &EventFilter) -> StoreResult<Vec<Activity>>;
    async fn activity_summary(&self) -> StoreResult<ActivitySummary>;
    async fn monthly_stats(&self, since: DateTime<Utc>) -> StoreResult<MonthlyStats>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: &Account) -> StoreResult<()>;
    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>>;
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;
    async fn save_account(&self, account: &Account) -> StoreResult<bool>;
    async fn account_emails(&self) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(&self, campaign: &Campaign) -> StoreResult<()>;
    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>>;
    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>>;
    /// Sets `sent_at` only while it is still unset.
    async fn mark_campaign_sent(&self, id: Uuid, sent_at: DateTime<Utc>, recipients: i32) -> StoreResult<Option<Campaign>>;
    async fn clear_campaign_sent(&self, id: Uuid) -> StoreResult<()>;
    async fn delete_campaign(&self, id: Uuid) -> StoreResult<bool>;
}

pub trait Store: CatalogStore + CartStore + DiscountStore + OrderStore + ActivityStore + AccountStore + CampaignStore {}

impl<T> Store for T where T: CatalogStore + CartStore + DiscountStore + OrderStore + ActivityStore + AccountStore + CampaignStore {}
