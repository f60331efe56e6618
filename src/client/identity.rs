use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use super::context::{get_device_info, PlatformContextProvider};
use crate::time::now_ms;

pub const FALLBACK_PREFIX: &str = "unknown-visitor-";

pub type FingerprintFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// The expensive part of identity resolution. May take arbitrarily long and
/// may fail; the resolver absorbs both.
pub trait FingerprintSource: Send + Sync {
    fn compute(&self) -> FingerprintFuture<'_>;
}

/// Stable id derived from the device snapshot: a UUIDv5 over the signals that
/// do not change between page loads on the same browser.
pub struct DeviceFingerprint {
    provider: Arc<dyn PlatformContextProvider>,
}

impl DeviceFingerprint {
    pub fn new(provider: Arc<dyn PlatformContextProvider>) -> Self {
        Self { provider }
    }

    fn derive(&self) -> Result<String> {
        let info = get_device_info(self.provider.as_ref());
        if info.user_agent.is_none() && info.platform.is_none() {
            return Err(anyhow!("not enough device signals to fingerprint"));
        }

        let components = [
            info.user_agent.unwrap_or_default(),
            info.language.unwrap_or_default(),
            info.platform.unwrap_or_default(),
            info.screen_width.map(|v| v.to_string()).unwrap_or_default(),
            info.screen_height.map(|v| v.to_string()).unwrap_or_default(),
            info.color_depth.map(|v| v.to_string()).unwrap_or_default(),
            info.timezone.unwrap_or_default(),
            info.hardware_concurrency.map(|v| v.to_string()).unwrap_or_default(),
            info.device_memory.map(|v| v.to_string()).unwrap_or_default(),
        ];
        let material = components.join("\u{1f}");
        Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()).to_string())
    }
}

impl FingerprintSource for DeviceFingerprint {
    fn compute(&self) -> FingerprintFuture<'_> {
        Box::pin(async move { self.derive() })
    }
}

pub fn fallback_visitor_id() -> String {
    format!("{}{}", FALLBACK_PREFIX, now_ms())
}

/// Memoized visitor identity.
///
/// The first call spawns the one and only fingerprint computation; every
/// caller, before or after it finishes, waits on the same result slot.
/// Dropping a waiting caller does not restart or abort the computation.
/// A source that errors or panics resolves to one shared fallback id.
/// Requires a Tokio runtime on first use.
pub struct IdentityResolver {
    source: Arc<dyn FingerprintSource>,
    slot: OnceLock<watch::Receiver<Option<String>>>,
    orphaned: OnceLock<String>,
}

impl IdentityResolver {
    pub fn new(source: Arc<dyn FingerprintSource>) -> Self {
        Self {
            source,
            slot: OnceLock::new(),
            orphaned: OnceLock::new(),
        }
    }

    pub fn for_device(provider: Arc<dyn PlatformContextProvider>) -> Self {
        Self::new(Arc::new(DeviceFingerprint::new(provider)))
    }

    fn start(&self) -> watch::Receiver<Option<String>> {
        let (tx, rx) = watch::channel(None);
        let source = self.source.clone();
        tokio::spawn(async move {
            // Inner task so a panicking source surfaces as a JoinError here
            let computed = tokio::spawn(async move { source.compute().await }).await;
            let visitor_id = match computed {
                Ok(Ok(id)) => {
                    debug!("visitor fingerprint resolved");
                    id
                }
                Ok(Err(e)) => {
                    let fallback = fallback_visitor_id();
                    warn!("fingerprint failed, using {}: {}", fallback, e);
                    fallback
                }
                Err(e) => {
                    let fallback = fallback_visitor_id();
                    warn!("fingerprint task aborted, using {}: {}", fallback, e);
                    fallback
                }
            };
            let _ = tx.send(Some(visitor_id));
        });
        rx
    }

    /// Never fails. Resolves whenever the underlying computation finishes.
    pub async fn visitor_id(&self) -> String {
        let mut rx = self.slot.get_or_init(|| self.start()).clone();
        let resolved = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        match resolved {
            Some(id) => id,
            None => {
                // Publisher dropped without sending, e.g. runtime shutting down
                warn!("fingerprint task ended without a result");
                self.orphaned.get_or_init(fallback_visitor_id).clone()
            }
        }
    }

    /// The resolved id, if the computation has already finished.
    pub fn peek(&self) -> Option<String> {
        self.slot.get().and_then(|rx| rx.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::context::StaticContextProvider;

    #[test]
    fn device_fingerprint_is_stable_for_same_signals() {
        let provider: Arc<dyn PlatformContextProvider> =
            Arc::new(StaticContextProvider::with_user_agent("UA/1.0"));
        let a = DeviceFingerprint::new(provider.clone()).derive().unwrap();
        let b = DeviceFingerprint::new(provider).derive().unwrap();
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn device_fingerprint_differs_across_devices() {
        let a = DeviceFingerprint::new(Arc::new(StaticContextProvider::with_user_agent("UA/1.0")))
            .derive()
            .unwrap();
        let b = DeviceFingerprint::new(Arc::new(StaticContextProvider::with_user_agent("UA/2.0")))
            .derive()
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn device_fingerprint_needs_some_signal() {
        let fp = DeviceFingerprint::new(Arc::new(StaticContextProvider::default()));
        assert!(fp.derive().is_err());
    }

    #[tokio::test]
    async fn peek_is_empty_before_first_call() {
        let resolver =
            IdentityResolver::for_device(Arc::new(StaticContextProvider::with_user_agent("UA/1.0")));
        assert!(resolver.peek().is_none());
        let id = resolver.visitor_id().await;
        assert_eq!(resolver.peek(), Some(id));
    }
}
