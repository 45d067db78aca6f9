//! Application services. Each one owns a slice of the workflow and talks to the
//! store through `Arc<dyn Store>`.

pub mod analytics;
pub mod auth;
pub mod campaigns;
pub mod cart;
pub mod catalog;
pub mod discounts;
pub mod events;
pub mod mailer;
pub mod orders;

pub use analytics::{AnalyticsService, EnrichmentQueue, GeoLocator, IpApiLocator};
pub use auth::{AuthService, Claims, TokenKeys};
pub use campaigns::CampaignService;
pub use cart::CartService;
pub use catalog::CatalogService;
pub use discounts::DiscountService;
pub use events::EventPublisher;
pub use mailer::{LogMailer, Mailer, SmtpMailer};
pub use orders::OrderService;
