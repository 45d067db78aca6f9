use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bzcart_api::config::Config;
use bzcart_api::services::analytics::{spawn_enrichment_worker, QUEUE_CAPACITY};
use bzcart_api::services::discounts::spawn_expiry_sweep;
use bzcart_api::services::{EventPublisher, GeoLocator, IpApiLocator, LogMailer, Mailer, SmtpMailer, TokenKeys};
use bzcart_api::store::{MemoryStore, PgStore, Store};
use bzcart_api::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::debug!(?config, "Loaded configuration");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, 10).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events disabled");
                None
            }
        },
        None => None,
    };

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(SmtpMailer::new(mail)?),
        None => {
            tracing::warn!("Mail settings not set, outgoing mail is only logged");
            Arc::new(LogMailer)
        }
    };

    let locator: Option<Arc<dyn GeoLocator>> = if config.geo_lookup_enabled {
        Some(Arc::new(IpApiLocator::new(&config.geo_lookup_url)?))
    } else {
        None
    };

    let _sweep = spawn_expiry_sweep(store.clone(), config.discount_sweep);
    let (enrichment, _worker) = spawn_enrichment_worker(store.clone(), locator, QUEUE_CAPACITY);

    let state = AppState::new(
        store,
        mailer,
        EventPublisher::new(nats),
        TokenKeys::new(&config.jwt_secret, config.token_ttl_days),
        enrichment,
    );
    let app = build_router(state).layer(cors(&config.allowed_origins));

    let addr = config.socket_addr();
    tracing::info!("BZCart API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

fn cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(allowed)).allow_methods(Any).allow_headers(Any)
}
