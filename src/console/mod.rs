//! Operator console: merges registry detail with IP geolocation and issues
//! access-status transitions.
//!
//! A `VisitorView` is the only place the console holds `access_status`, and
//! every `open_visitor` fetches it fresh.

pub mod dashboard;
pub mod geo;

use thiserror::Error;
use tracing::{info, warn};

pub use dashboard::DashboardClient;
pub use geo::{GeoLocation, GeoLocator};

use crate::client::context::{decode_context, ContextSnapshot};
use crate::config::ClientConfig;
use crate::registry::{AccessStatus, VisitorDetail, VisitorIdentity};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("geolocation unavailable: {0}")]
    Geolocation(String),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Result slot of one isolated lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Lookup<T> {
    pub fn available(&self) -> Option<&T> {
        match self {
            Lookup::Available(value) => Some(value),
            Lookup::Unavailable(_) => None,
        }
    }
}

impl<T> From<Result<T, ConsoleError>> for Lookup<T> {
    fn from(result: Result<T, ConsoleError>) -> Self {
        match result {
            Ok(value) => Lookup::Available(value),
            Err(e) => Lookup::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisitorView {
    pub visitor_id: String,
    pub ip_address: Option<String>,
    pub geo: Lookup<GeoLocation>,
    pub record: Lookup<VisitorDetail>,
}

impl VisitorView {
    pub fn access_status(&self) -> Option<AccessStatus> {
        self.record.available().map(|d| d.visitor.access_status)
    }

    /// Device snapshot carried by the newest event that has one.
    pub fn device(&self) -> Option<ContextSnapshot> {
        self.record
            .available()?
            .recent_events
            .iter()
            .find_map(|e| decode_context(&e.encoded_context))
    }
}

/// Operator-visible outcome of a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Success(String),
    Failure(String),
}

impl Feedback {
    pub fn is_success(&self) -> bool {
        matches!(self, Feedback::Success(_))
    }
}

pub struct AdminConsole {
    dashboard: DashboardClient,
    geo: GeoLocator,
}

impl AdminConsole {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            dashboard: DashboardClient::new(config),
            geo: GeoLocator::new(config),
        }
    }

    pub fn dashboard(&self) -> &DashboardClient {
        &self.dashboard
    }

    pub async fn list_visitors(&self) -> Result<Vec<VisitorIdentity>, ConsoleError> {
        self.dashboard.list_visitors().await
    }

    /// Runs the geolocation and registry lookups concurrently. Either may fail
    /// without affecting the other.
    pub async fn open_visitor(&self, visitor_id: &str, ip_address: Option<&str>) -> VisitorView {
        let geo = async {
            match ip_address {
                Some(ip) => Lookup::from(self.geo.locate(ip).await),
                None => Lookup::Unavailable("no ip address on record".to_string()),
            }
        };
        let record = async { Lookup::from(self.dashboard.visitor_detail(visitor_id).await) };

        let (geo, record) = tokio::join!(geo, record);

        if let Lookup::Unavailable(reason) = &geo {
            warn!("geolocation for {} unavailable: {}", visitor_id, reason);
        }
        if let Lookup::Unavailable(reason) = &record {
            warn!("registry detail for {} unavailable: {}", visitor_id, reason);
        }

        VisitorView {
            visitor_id: visitor_id.to_string(),
            ip_address: ip_address.map(str::to_string),
            geo,
            record,
        }
    }

    /// Like `open_visitor`, taking the ip from the visitor's list row so both
    /// lookups still run side by side. `key` is a visitor_id or numeric pk.
    pub async fn open_recorded_visitor(&self, key: &str) -> VisitorView {
        let ip_address = match self.list_visitors().await {
            Ok(rows) => rows
                .into_iter()
                .find(|v| v.visitor_id == key || v.id.to_string() == key)
                .and_then(|v| v.ip_address),
            Err(e) => {
                warn!("visitor list unavailable, skipping geolocation: {}", e);
                None
            }
        };
        self.open_visitor(key, ip_address.as_deref()).await
    }

    /// PATCHes first; the view is only touched after the server confirms.
    pub async fn change_status(&self, view: &mut VisitorView, target: AccessStatus) -> Feedback {
        match self.dashboard.update_access_status(&view.visitor_id, target).await {
            Ok(updated) => {
                if let Lookup::Available(detail) = &mut view.record {
                    detail.visitor.access_status = updated.access_status;
                }
                info!("visitor {} set to {}", view.visitor_id, updated.access_status);
                Feedback::Success(format!(
                    "Visitor {} is now {}",
                    view.visitor_id, updated.access_status
                ))
            }
            Err(e) => {
                warn!("status change for {} failed: {}", view.visitor_id, e);
                Feedback::Failure(format!("Could not update {}: {}", view.visitor_id, e))
            }
        }
    }
}
