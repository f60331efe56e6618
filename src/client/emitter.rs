use std::sync::{Arc, RwLock};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::context::{encode_context, get_device_info, PlatformContextProvider};
use super::identity::IdentityResolver;
use crate::config::ClientConfig;

pub const PAGE_VIEW: &str = "page_view";

/// Body of `POST /tracking/track/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingPayload {
    pub visitor_id: String,
    pub event_type: String,
    pub url: String,
    #[serde(default)]
    pub target_resource: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub encoded_info: String,
}

/// What happened to one event. Informational only; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped(String),
}

/// Best-effort, at-most-once telemetry.
///
/// `track_event` detaches the send onto the runtime and returns immediately.
/// A detached send still in flight when the process exits is lost.
#[derive(Clone)]
pub struct EventEmitter {
    client: Client,
    ingest_url: String,
    identity: Arc<IdentityResolver>,
    context: Arc<dyn PlatformContextProvider>,
    location: Arc<RwLock<String>>,
}

impl EventEmitter {
    pub fn new(
        config: &ClientConfig,
        identity: Arc<IdentityResolver>,
        context: Arc<dyn PlatformContextProvider>,
    ) -> Self {
        Self {
            // Cookie store plays the role of "credentials: include"
            client: Client::builder()
                .cookie_store(true)
                .user_agent(config.user_agent.clone())
                .timeout(config.http_timeout)
                .build()
                .unwrap_or_default(),
            ingest_url: config.ingest_url(),
            identity,
            context,
            location: Arc::new(RwLock::new(config.api_base.clone())),
        }
    }

    /// Current page URL reported with each event.
    pub fn set_location(&self, url: impl Into<String>) {
        if let Ok(mut location) = self.location.write() {
            *location = url.into();
        }
    }

    pub fn location(&self) -> String {
        self.location
            .read()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    /// Fire and forget. Never fails, never blocks the caller. Outside a Tokio
    /// runtime the event is dropped with a warning.
    pub fn track_event(&self, event_type: &str, metadata: Map<String, Value>, target_resource: &str) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("dropping {} event: {}", event_type, e);
                return;
            }
        };
        let emitter = self.clone();
        let event_type = event_type.to_string();
        let target_resource = target_resource.to_string();
        handle.spawn(async move {
            emitter.emit(&event_type, metadata, &target_resource).await;
        });
    }

    pub fn track_page_view(&self, url: &str) {
        self.track_event(PAGE_VIEW, page_view_metadata(url), "");
    }

    /// Builds the payload for the current identity, context and location.
    pub async fn compose(
        &self,
        event_type: &str,
        metadata: Map<String, Value>,
        target_resource: &str,
    ) -> TrackingPayload {
        let visitor_id = self.identity.visitor_id().await;
        let snapshot = get_device_info(self.context.as_ref());

        TrackingPayload {
            visitor_id,
            event_type: event_type.to_string(),
            url: self.location(),
            target_resource: target_resource.to_string(),
            metadata,
            encoded_info: encode_context(&snapshot),
        }
    }

    /// Awaitable form of `track_event`. Failures are logged and reported as
    /// `Dropped`, never returned as errors.
    pub async fn emit(
        &self,
        event_type: &str,
        metadata: Map<String, Value>,
        target_resource: &str,
    ) -> Delivery {
        let payload = self.compose(event_type, metadata, target_resource).await;
        self.send(&payload).await
    }

    pub async fn emit_page_view(&self, url: &str) -> Delivery {
        self.emit(PAGE_VIEW, page_view_metadata(url), "").await
    }

    async fn send(&self, payload: &TrackingPayload) -> Delivery {
        let result = self
            .client
            .post(&self.ingest_url)
            .json(payload)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!("tracked {} for {}", payload.event_type, payload.visitor_id);
                Delivery::Delivered
            }
            Ok(resp) => {
                let reason = format!("ingestion rejected event: {}", resp.status());
                warn!("dropping {} event: {}", payload.event_type, reason);
                Delivery::Dropped(reason)
            }
            Err(e) => {
                warn!("dropping {} event: {}", payload.event_type, e);
                Delivery::Dropped(e.to_string())
            }
        }
    }
}

fn page_view_metadata(url: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("path".to_string(), Value::String(url.to_string()));
    metadata
}
