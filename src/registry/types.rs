use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::time::UnixMillis;

/// Tri-state policy flag. Exactly one value holds per visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// Default for every new visitor.
    #[default]
    Allow,
    /// Unauthenticated requests must pass through login first.
    ForceLogin,
    /// Refused regardless of authentication.
    Block,
}

impl AccessStatus {
    pub const ALL: [AccessStatus; 3] = [AccessStatus::Allow, AccessStatus::ForceLogin, AccessStatus::Block];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Allow => "allow",
            AccessStatus::ForceLogin => "force_login",
            AccessStatus::Block => "block",
        }
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown access status {0:?} (expected allow, force_login or block)")]
pub struct UnknownStatus(pub String);

impl FromStr for AccessStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Canonical per-visitor record, owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    /// Numeric primary key, assigned in creation order starting at 1.
    pub id: u64,
    pub visitor_id: String,
    pub ip_address: Option<String>,
    pub first_seen: UnixMillis,
    pub last_seen: UnixMillis,
    pub access_status: AccessStatus,
    #[serde(default)]
    pub event_count: u64,
}

/// One recorded interaction. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub visitor_id: String,
    pub event_type: String,
    pub url: String,
    #[serde(default)]
    pub target_resource: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub encoded_context: String,
    pub timestamp: UnixMillis,
}

/// Detail view: the record plus its newest events, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorDetail {
    #[serde(flatten)]
    pub visitor: VisitorIdentity,
    #[serde(default)]
    pub recent_events: Vec<TrackingEvent>,
}

/// Body of the dashboard PATCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub access_status: AccessStatus,
}
