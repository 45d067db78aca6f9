//! Analytics activity log

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// One append-only analytics event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_id: Option<String>,
    pub user_display: Option<String>,
    pub session_id: Option<String>,
    pub event_type: String,
    pub url: Option<String>,
    pub element: Option<String>,
    pub data: Value,
    pub duration_ms: Option<i64>,
    pub meta: ActivityMeta,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    /// Client supplied keys are kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub ip: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub org: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub os: String,
    pub browser: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType { Desktop, Mobile, Tablet, Bot }

impl DeviceInfo {
    /// Coarse classification from a `User-Agent` header.
    pub fn from_user_agent(ua: &str) -> Self {
        let lower = ua.to_ascii_lowercase();
        let device_type = if ["bot", "crawler", "spider", "curl/", "wget"].iter().any(|m| lower.contains(m)) {
            DeviceType::Bot
        } else if lower.contains("ipad") || lower.contains("tablet") || (lower.contains("android") && !lower.contains("mobile")) {
            DeviceType::Tablet
        } else if lower.contains("mobi") || lower.contains("iphone") {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        };
        let os = if lower.contains("windows") { "Windows" }
            else if lower.contains("iphone") || lower.contains("ipad") || lower.contains("ios") { "iOS" }
            else if lower.contains("android") { "Android" }
            else if lower.contains("mac os") || lower.contains("macintosh") { "macOS" }
            else if lower.contains("linux") { "Linux" }
            else { "Unknown" };
        // Order matters: Edge and Opera also carry "chrome", Chrome carries "safari".
        let browser = if lower.contains("edg/") { "Edge" }
            else if lower.contains("opr/") || lower.contains("opera") { "Opera" }
            else if lower.contains("firefox/") { "Firefox" }
            else if lower.contains("chrome/") || lower.contains("crios/") { "Chrome" }
            else if lower.contains("safari/") { "Safari" }
            else { "Unknown" };
        Self { device_type, os: os.to_string(), browser: browser.to_string() }
    }
}

/// `POST /event` body.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActivityInput {
    pub user_id: Option<String>,
    pub guest_id: Option<String>,
    pub user_display: Option<String>,
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub element: Option<String>,
    pub data: Option<Value>,
    pub duration_ms: Option<i64>,
    pub meta: Option<Map<String, Value>>,
}

impl Activity {
    pub const ORDER_PLACED: &'static str = "order_placed";
    pub const PAGE_VIEW: &'static str = "page_view";
    pub const ADD_TO_CART: &'static str = "add_to_cart";
    pub const SESSION_END: &'static str = "session_end";

    /// Builds an event from an ingest body. `None` when `event_type` is missing.
    pub fn from_input(input: ActivityInput, auth_user: Option<Uuid>, ip: Option<String>) -> Option<Self> {
        let event_type = input.event_type.map(|e| e.trim().to_string()).filter(|e| !e.is_empty())?;
        let mut extra = input.meta.unwrap_or_default();
        extra.remove("ip");
        Some(Self {
            id: Uuid::now_v7(),
            user_id: auth_user.or_else(|| input.user_id.as_deref().and_then(|u| u.parse().ok())),
            guest_id: input.guest_id,
            user_display: input.user_display,
            session_id: input.session_id,
            event_type,
            url: input.url.or(input.path),
            element: input.element,
            data: input.data.unwrap_or_else(|| Value::Object(Map::new())),
            duration_ms: input.duration_ms,
            meta: ActivityMeta { ip, location: None, device: None, extra },
            created_at: Utc::now(),
        })
    }

    pub fn server_event(event_type: &str, user_id: Option<Uuid>, guest_id: Option<String>, user_display: Option<String>, url: Option<String>, data: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id, guest_id, user_display,
            session_id: None,
            event_type: event_type.to_string(),
            url, element: None, data,
            duration_ms: None,
            meta: ActivityMeta::default(),
            created_at: Utc::now(),
        }
    }
}

/// Filters of `GET /events`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EventFilter {
    pub user_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

impl EventFilter {
    pub const DEFAULT_LIMIT: i64 = 200;
    pub const MAX_LIMIT: i64 = 1000;

    pub fn limit(&self) -> i64 { self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT) }
    pub fn skip(&self) -> i64 { self.skip.unwrap_or(0).max(0) }

    pub fn matches(&self, a: &Activity) -> bool {
        self.user_id.map_or(true, |u| a.user_id == Some(u))
            && self.event_type.as_deref().map_or(true, |e| a.event_type == e)
            && self.start.map_or(true, |s| a.created_at >= s)
            && self.end.map_or(true, |e| a.created_at <= e)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCount {
    pub event_type: String,
    pub count: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub counts_by_type: Vec<EventCount>,
    pub unique_users: i64,
    pub avg_session_duration_ms: f64,
    pub session_samples: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    pub page_view: i64,
    pub add_to_cart: i64,
    pub order_placed: i64,
    pub visitors: i64,
}

impl DayStats {
    fn add(&mut self, other: &DayStats) {
        self.page_view += other.page_view;
        self.add_to_cart += other.add_to_cart;
        self.order_placed += other.order_placed;
        self.visitors += other.visitors;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub totals: DayStats,
    /// Keyed by `YYYY-MM-DD`.
    pub by_day: BTreeMap<String, DayStats>,
}

impl MonthlyStats {
    pub const WINDOW_DAYS: i64 = 30;

    pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> { now - Duration::days(Self::WINDOW_DAYS) }

    pub fn from_days(by_day: BTreeMap<String, DayStats>) -> Self {
        let mut totals = DayStats::default();
        by_day.values().for_each(|d| totals.add(d));
        Self { totals, by_day }
    }
}

pub const SUMMARY_TYPE_LIMIT: usize = 50;

pub fn summarize(events: &[Activity]) -> ActivitySummary {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    let mut users = HashSet::new();
    let (mut total_ms, mut samples) = (0i64, 0i64);
    for e in events {
        *counts.entry(e.event_type.as_str()).or_default() += 1;
        if let Some(user) = e.user_id { users.insert(user); }
        if e.event_type == Activity::SESSION_END {
            if let Some(ms) = e.duration_ms { total_ms += ms; samples += 1; }
        }
    }
    let mut counts_by_type: Vec<EventCount> = counts.into_iter()
        .map(|(t, count)| EventCount { event_type: t.to_string(), count })
        .collect();
    counts_by_type.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.event_type.cmp(&b.event_type)));
    counts_by_type.truncate(SUMMARY_TYPE_LIMIT);
    ActivitySummary {
        counts_by_type,
        unique_users: users.len() as i64,
        avg_session_duration_ms: if samples > 0 { total_ms as f64 / samples as f64 } else { 0.0 },
        session_samples: samples,
    }
}

/// Per-day counters for events at or after `since`.
pub fn monthly(events: &[Activity], since: DateTime<Utc>) -> MonthlyStats {
    let mut by_day: BTreeMap<String, DayStats> = BTreeMap::new();
    let mut sessions: HashMap<String, HashSet<&str>> = HashMap::new();
    for e in events.iter().filter(|e| e.created_at >= since) {
        let day = e.created_at.format("%Y-%m-%d").to_string();
        let stats = by_day.entry(day.clone()).or_default();
        match e.event_type.as_str() {
            Activity::PAGE_VIEW => {
                stats.page_view += 1;
                if let Some(session) = e.session_id.as_deref() {
                    sessions.entry(day).or_default().insert(session);
                }
            }
            Activity::ADD_TO_CART => stats.add_to_cart += 1,
            Activity::ORDER_PLACED => stats.order_placed += 1,
            _ => {}
        }
    }
    for (day, stats) in by_day.iter_mut() {
        stats.visitors = sessions.get(day).map_or(0, |s| s.len() as i64);
    }
    MonthlyStats::from_days(by_day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: &str, user: Option<Uuid>, session: Option<&str>, ms: Option<i64>) -> Activity {
        let mut a = Activity::server_event(kind, user, None, None, None, json!({}));
        a.session_id = session.map(str::to_string);
        a.duration_ms = ms;
        a
    }

    #[test]
    fn test_device_classification() {
        let iphone = DeviceInfo::from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Version/17.0 Mobile/15E148 Safari/604.1");
        assert_eq!(iphone.device_type, DeviceType::Mobile);
        assert_eq!(iphone.os, "iOS");
        assert_eq!(iphone.browser, "Safari");

        let edge = DeviceInfo::from_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36 Edg/120.0");
        assert_eq!(edge.device_type, DeviceType::Desktop);
        assert_eq!(edge.browser, "Edge");

        assert_eq!(DeviceInfo::from_user_agent("Googlebot/2.1").device_type, DeviceType::Bot);
        assert_eq!(DeviceInfo::from_user_agent("Mozilla/5.0 (Linux; Android 13; SM-X200) Chrome/119.0").device_type, DeviceType::Tablet);
    }

    #[test]
    fn test_from_input_requires_event_type() {
        assert!(Activity::from_input(ActivityInput::default(), None, None).is_none());
        let input = ActivityInput { event_type: Some("page_view".into()), path: Some("/shop".into()), user_id: Some("nope".into()), ..Default::default() };
        let a = Activity::from_input(input, None, Some("1.2.3.4".into())).unwrap();
        assert_eq!(a.url.as_deref(), Some("/shop"));
        assert_eq!(a.user_id, None);
        assert_eq!(a.meta.ip.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_filter_limit_bounds() {
        assert_eq!(EventFilter::default().limit(), 200);
        assert_eq!(EventFilter { limit: Some(5000), ..Default::default() }.limit(), 1000);
        assert_eq!(EventFilter { skip: Some(-3), ..Default::default() }.skip(), 0);
    }

    #[test]
    fn test_summary() {
        let u = Uuid::now_v7();
        let events = vec![
            event("page_view", Some(u), None, None),
            event("page_view", None, None, None),
            event("session_end", Some(u), None, Some(1000)),
            event("session_end", None, None, Some(3000)),
        ];
        let s = summarize(&events);
        assert_eq!(s.counts_by_type[0].count, 2);
        assert_eq!(s.unique_users, 1);
        assert_eq!(s.session_samples, 2);
        assert_eq!(s.avg_session_duration_ms, 2000.0);
    }

    #[test]
    fn test_monthly_counts_visitors_per_session() {
        let events = vec![
            event("page_view", None, Some("s1"), None),
            event("page_view", None, Some("s1"), None),
            event("page_view", None, Some("s2"), None),
            event("order_placed", None, None, None),
        ];
        let m = monthly(&events, MonthlyStats::window_start(Utc::now()));
        assert_eq!(m.totals.page_view, 3);
        assert_eq!(m.totals.visitors, 2);
        assert_eq!(m.totals.order_placed, 1);
    }
}
