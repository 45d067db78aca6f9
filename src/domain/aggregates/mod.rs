//! Aggregates module
pub mod account;
pub mod activity;
pub mod campaign;
pub mod cart;
pub mod category;
pub mod discount;
pub mod order;
pub mod product;

pub use account::{Account, AccountView, AuthError, Role};
pub use activity::{Activity, ActivityInput, ActivityMeta, ActivitySummary, DeviceInfo, EventFilter, GeoLocation, MonthlyStats};
pub use campaign::{Campaign, CampaignError};
pub use cart::{CartError, CartKey, CartLine, CartOwner};
pub use category::{Category, CategoryPatch, ParentChange};
pub use discount::{DiscountCode, DiscountError};
pub use order::{DiscountClaim, Order, OrderDraft, OrderError, OrderLine, OrderRequest, OrderStatus, PaymentStatus, PricedLine};
pub use product::{CatalogError, CounterWrites, Product, ProductInput, ProductPatch, Review, SizeStock, StockBucket};
