use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_GEO_BASE: &str = "https://ipapi.co";
pub const DEFAULT_USER_AGENT: &str = concat!("visitgate/", env!("CARGO_PKG_VERSION"));
const DEFAULT_RECENT_EVENTS: usize = 50;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Registry server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// When set, the registry is loaded from and persisted to this JSON file.
    pub snapshot_path: Option<PathBuf>,
    /// When set, dashboard routes require `Authorization: Bearer <token>`.
    pub admin_token: Option<String>,
    pub recent_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            snapshot_path: None,
            admin_token: None,
            recent_events: DEFAULT_RECENT_EVENTS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = non_empty(lookup("VISITGATE_BIND")).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            key: "VISITGATE_BIND",
            value: bind_raw.clone(),
            reason: "expected host:port",
        })?;

        let recent_events = match non_empty(lookup("VISITGATE_RECENT_EVENTS")) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|v| (1..=1000).contains(v))
                .ok_or(ConfigError::Invalid {
                    key: "VISITGATE_RECENT_EVENTS",
                    value: raw,
                    reason: "expected an integer in 1..=1000",
                })?,
            None => DEFAULT_RECENT_EVENTS,
        };

        Ok(Self {
            bind,
            snapshot_path: non_empty(lookup("VISITGATE_SNAPSHOT")).map(PathBuf::from),
            admin_token: non_empty(lookup("VISITGATE_ADMIN_TOKEN")),
            recent_events,
        })
    }
}

/// Settings shared by the telemetry client and the operator console.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub geo_base: String,
    pub user_agent: String,
    pub admin_token: Option<String>,
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            geo_base: DEFAULT_GEO_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            admin_token: None,
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let http_timeout = match non_empty(lookup("VISITGATE_HTTP_TIMEOUT_MS")) {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|v| (100..=120_000).contains(v))
                .map(Duration::from_millis)
                .ok_or(ConfigError::Invalid {
                    key: "VISITGATE_HTTP_TIMEOUT_MS",
                    value: raw,
                    reason: "expected milliseconds in 100..=120000",
                })?,
            None => defaults.http_timeout,
        };

        Ok(Self {
            api_base: non_empty(lookup("VISITGATE_API_BASE"))
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            geo_base: non_empty(lookup("VISITGATE_GEO_BASE"))
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.geo_base),
            user_agent: non_empty(lookup("VISITGATE_USER_AGENT")).unwrap_or(defaults.user_agent),
            admin_token: non_empty(lookup("VISITGATE_ADMIN_TOKEN")),
            http_timeout,
        })
    }

    pub fn ingest_url(&self) -> String {
        format!("{}/tracking/track/", self.api_base)
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}/tracking/dashboard/visitors/", self.api_base)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
