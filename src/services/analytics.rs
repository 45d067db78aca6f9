//! Analytics ingest and reporting.
//!
//! Events are stored as soon as they arrive. Geo and device enrichment runs on a
//! bounded background queue; a full queue or a failed lookup only costs the
//! enrichment, never the event.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::auth::Claims;
use crate::domain::aggregates::{
    Activity, ActivityInput, ActivityMeta, ActivitySummary, DeviceInfo, EventFilter, GeoLocation, MonthlyStats,
};
use crate::error::{AppError, Result};
use crate::store::{ActivityStore, Store};

pub const QUEUE_CAPACITY: usize = 1024;
pub const MAX_ATTEMPTS: u32 = 3;
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geo lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geo lookup rejected the address: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: &str) -> std::result::Result<GeoLocation, GeoError>;
}

/// `ipapi.co`-compatible JSON lookup.
pub struct IpApiLocator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
    country: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    lat: Option<f64>,
    lon: Option<f64>,
    org: Option<String>,
}

impl IpApiLocator {
    pub fn new(base_url: &str) -> std::result::Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: &str) -> std::result::Result<GeoLocation, GeoError> {
        let info: IpApiResponse = self
            .client
            .get(format!("{}/{}/json/", self.base_url, ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if info.error {
            return Err(GeoError::Rejected(info.reason.unwrap_or_default()));
        }
        Ok(GeoLocation {
            ip: ip.to_string(),
            city: info.city,
            region: info.region,
            country: info.country_name.or(info.country),
            latitude: info.latitude.or(info.lat),
            longitude: info.longitude.or(info.lon),
            org: info.org,
        })
    }
}

/// Loopback and private addresses have no public location.
fn is_routable(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => !(v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()),
        Ok(IpAddr::V6(v6)) => !(v6.is_loopback() || v6.is_unspecified()),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub activity_id: Uuid,
    pub meta: ActivityMeta,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::Sender<EnrichmentJob>,
}

impl EnrichmentQueue {
    /// Never waits; a full or closed queue drops the job.
    pub fn enqueue(&self, job: EnrichmentJob) {
        if let Err(e) = self.tx.try_send(job) {
            tracing::debug!(error = %e, "Dropped analytics enrichment job");
        }
    }
}

/// Starts the enrichment worker. `locator` is `None` when geo lookup is disabled.
pub fn spawn_enrichment_worker(
    store: Arc<dyn Store>,
    locator: Option<Arc<dyn GeoLocator>>,
    capacity: usize,
) -> (EnrichmentQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<EnrichmentJob>(capacity);
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            enrich(store.as_ref(), locator.as_deref(), job).await;
        }
        tracing::debug!("Enrichment queue closed");
    });
    (EnrichmentQueue { tx }, handle)
}

async fn enrich(store: &dyn Store, locator: Option<&dyn GeoLocator>, job: EnrichmentJob) {
    let mut meta = job.meta;
    meta.device = job.user_agent.as_deref().map(DeviceInfo::from_user_agent);
    if let (Some(locator), Some(ip)) = (locator, meta.ip.clone().filter(|ip| is_routable(ip))) {
        meta.location = locate_with_retry(locator, &ip).await;
    }
    if meta.device.is_none() && meta.location.is_none() {
        return;
    }
    for attempt in 1..=MAX_ATTEMPTS {
        match store.set_activity_meta(job.activity_id, &meta).await {
            Ok(_) => return,
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(error = %e, attempt, activity_id = %job.activity_id, "Retrying enrichment write");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => tracing::warn!(error = %e, activity_id = %job.activity_id, "Giving up on enrichment write"),
        }
    }
}

async fn locate_with_retry(locator: &dyn GeoLocator, ip: &str) -> Option<GeoLocation> {
    for attempt in 1..=MAX_ATTEMPTS {
        match locator.locate(ip).await {
            Ok(location) => return Some(location),
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::debug!(error = %e, attempt, "Retrying geo lookup");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => tracing::debug!(error = %e, "Geo lookup failed"),
        }
    }
    None
}

#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn Store>,
    queue: EnrichmentQueue,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn Store>, queue: EnrichmentQueue) -> Self { Self { store, queue } }

    /// Stores the event right away and queues its enrichment.
    pub async fn ingest(
        &self,
        input: ActivityInput,
        caller: Option<&Claims>,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<Activity> {
        let activity = Activity::from_input(input, caller.map(|c| c.sub), ip)
            .ok_or_else(|| AppError::Validation("event_type is required".to_string()))?;
        self.store.insert_activity(&activity).await?;
        if activity.meta.ip.is_some() || user_agent.is_some() {
            self.queue.enqueue(EnrichmentJob { activity_id: activity.id, meta: activity.meta.clone(), user_agent });
        }
        Ok(activity)
    }

    pub async fn events(&self, filter: &EventFilter) -> Result<Vec<Activity>> {
        Ok(self.store.list_activities(filter).await?)
    }

    pub async fn summary(&self) -> Result<ActivitySummary> { Ok(self.store.activity_summary().await?) }

    pub async fn monthly(&self) -> Result<MonthlyStats> {
        Ok(self.store.monthly_stats(MonthlyStats::window_start(Utc::now())).await?)
    }
}
