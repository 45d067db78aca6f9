//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `JWT_SECRET` - HS256 signing secret for bearer tokens
//!
//! ## Optional
//! - `DATABASE_URL` - `PostgreSQL` connection string (absent: in-memory store)
//! - `HOST` / `PORT` - Bind address (default: 0.0.0.0:3003)
//! - `TOKEN_TTL_DAYS` - Bearer token lifetime (default: 15)
//! - `NATS_URL` - Domain event bus
//! - `MAIL_HOST`, `MAIL_PORT`, `MAIL_USER`, `MAIL_PASS`, `MAIL_FROM` - SMTP relay (default port 465)
//! - `GEO_LOOKUP_URL` - IP geolocation service (default: <https://ipapi.co>)
//! - `GEO_LOOKUP_ENABLED` - Toggle geolocation enrichment (default: true)
//! - `ALLOWED_ORIGINS` - Comma-separated CORS origins (empty: permissive)
//! - `DISCOUNT_SWEEP_SECS` - Expired discount purge interval (default: 3600)

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub nats_url: Option<String>,
    pub mail: Option<MailConfig>,
    pub geo_lookup_url: String,
    pub geo_lookup_enabled: bool,
    pub allowed_origins: Vec<String>,
    pub discount_sweep: Duration,
}

#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

// Secrets stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl_days", &self.token_ttl_days)
            .field("nats_url", &self.nats_url)
            .field("mail", &self.mail.as_ref().map(|m| &m.host))
            .field("geo_lookup_url", &self.geo_lookup_url)
            .field("geo_lookup_enabled", &self.geo_lookup_enabled)
            .field("allowed_origins", &self.allowed_origins)
            .field("discount_sweep", &self.discount_sweep)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let host = parse_as::<IpAddr>("HOST", &or("HOST", "0.0.0.0"))?;
        let port = parse_as::<u16>("PORT", &or("PORT", "3003"))?;
        let jwt_secret = get("JWT_SECRET").ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;
        let token_ttl_days = parse_as::<i64>("TOKEN_TTL_DAYS", &or("TOKEN_TTL_DAYS", "15"))?;
        if token_ttl_days <= 0 {
            return Err(ConfigError::InvalidEnvVar("TOKEN_TTL_DAYS".to_string(), "must be positive".to_string()));
        }

        let mail = match (get("MAIL_HOST"), get("MAIL_USER"), get("MAIL_PASS")) {
            (Some(host), Some(user), Some(pass)) => Some(MailConfig {
                port: parse_as::<u16>("MAIL_PORT", &or("MAIL_PORT", "465"))?,
                from: get("MAIL_FROM").unwrap_or_else(|| user.clone()),
                host, user, pass,
            }),
            _ => None,
        };

        let sweep_secs = parse_as::<u64>("DISCOUNT_SWEEP_SECS", &or("DISCOUNT_SWEEP_SECS", "3600"))?;
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidEnvVar("DISCOUNT_SWEEP_SECS".to_string(), "must be positive".to_string()));
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            host,
            port,
            jwt_secret,
            token_ttl_days,
            nats_url: get("NATS_URL"),
            mail,
            geo_lookup_url: or("GEO_LOOKUP_URL", "https://ipapi.co").trim_end_matches('/').to_string(),
            geo_lookup_enabled: parse_as::<bool>("GEO_LOOKUP_ENABLED", &or("GEO_LOOKUP_ENABLED", "true"))?,
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
                .unwrap_or_default(),
            discount_sweep: Duration::from_secs(sweep_secs),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_as<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", "s3cr3t")]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3003");
        assert_eq!(config.token_ttl_days, 15);
        assert!(config.database_url.is_none());
        assert!(config.mail.is_none());
        assert!(config.geo_lookup_enabled);
        assert_eq!(config.geo_lookup_url, "https://ipapi.co");
        assert_eq!(config.discount_sweep, Duration::from_secs(3600));
    }

    #[test]
    fn test_jwt_secret_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::MissingEnvVar("JWT_SECRET".into()));
    }

    #[test]
    fn test_invalid_port() {
        assert!(matches!(load(&[("JWT_SECRET", "x"), ("PORT", "http")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PORT"));
    }

    #[test]
    fn test_mail_and_origins() {
        let config = load(&[
            ("JWT_SECRET", "x"),
            ("MAIL_HOST", "smtp.example.com"),
            ("MAIL_USER", "shop@example.com"),
            ("MAIL_PASS", "pw"),
            ("ALLOWED_ORIGINS", "https://bzcart.store, https://admin.bzcart.store,"),
        ]).unwrap();
        let mail = config.mail.unwrap();
        assert_eq!(mail.port, 465);
        assert_eq!(mail.from, "shop@example.com");
        assert_eq!(config.allowed_origins, vec!["https://bzcart.store", "https://admin.bzcart.store"]);
    }
}
