use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Screen geometry as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenDimensions {
    pub width: u32,
    pub height: u32,
    pub color_depth: Option<u32>,
}

/// Ambient platform signals. Every capability is optional; an implementation
/// that cannot observe a signal returns `None` and the snapshot omits it.
pub trait PlatformContextProvider: Send + Sync {
    fn user_agent(&self) -> Option<String>;
    fn language(&self) -> Option<String>;
    fn platform(&self) -> Option<String>;
    fn screen_dimensions(&self) -> Option<ScreenDimensions>;
    fn timezone(&self) -> Option<String>;
    /// Approximate RAM in GiB.
    fn device_memory(&self) -> Option<f64>;
    fn hardware_concurrency(&self) -> Option<u32>;
}

/// Provider for a native process. The user agent comes from configuration
/// because there is no browser to ask.
#[derive(Debug, Clone)]
pub struct SystemContextProvider {
    user_agent: String,
}

impl SystemContextProvider {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl PlatformContextProvider for SystemContextProvider {
    fn user_agent(&self) -> Option<String> {
        Some(self.user_agent.clone()).filter(|ua| !ua.is_empty())
    }

    fn language(&self) -> Option<String> {
        ["LC_ALL", "LANG"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|v| !v.is_empty() && v != "C" && v != "POSIX")
            // "en_US.UTF-8" -> "en-US"
            .map(|v| v.split('.').next().unwrap_or_default().replace('_', "-"))
    }

    fn platform(&self) -> Option<String> {
        Some(format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH))
    }

    fn screen_dimensions(&self) -> Option<ScreenDimensions> {
        None
    }

    fn timezone(&self) -> Option<String> {
        std::env::var("TZ").ok().filter(|tz| !tz.is_empty())
    }

    fn device_memory(&self) -> Option<f64> {
        None
    }

    fn hardware_concurrency(&self) -> Option<u32> {
        std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u32)
    }
}

/// Fixed signals, for embedders that already hold browser values and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
    pub screen: Option<ScreenDimensions>,
    pub timezone: Option<String>,
    pub device_memory: Option<f64>,
    pub hardware_concurrency: Option<u32>,
}

impl StaticContextProvider {
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            ..Self::default()
        }
    }
}

impl PlatformContextProvider for StaticContextProvider {
    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }
    fn language(&self) -> Option<String> {
        self.language.clone()
    }
    fn platform(&self) -> Option<String> {
        self.platform.clone()
    }
    fn screen_dimensions(&self) -> Option<ScreenDimensions> {
        self.screen
    }
    fn timezone(&self) -> Option<String> {
        self.timezone.clone()
    }
    fn device_memory(&self) -> Option<f64> {
        self.device_memory
    }
    fn hardware_concurrency(&self) -> Option<u32> {
        self.hardware_concurrency
    }
}

/// Device snapshot attached to every event as `encoded_info`.
/// Field names are camelCase on the wire; missing signals are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_memory: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_concurrency: Option<u32>,
}

pub const UNKNOWN_LABEL: &str = "Unknown";

/// First match wins. "Mac" precedes "like Mac", so iOS user agents land on
/// MacOS. Downstream reports depend on these labels; keep the order.
pub const OS_PATTERNS: &[(&str, &str)] = &[
    ("Win", "Windows"),
    ("Mac", "MacOS"),
    ("Linux", "Linux"),
    ("Android", "Android"),
    ("like Mac", "iOS"),
];

/// First match wins. Chromium Edge sends "Edg/" alongside "Chrome", so it is
/// reported as Chrome. Legacy labels, keep the order.
pub const BROWSER_PATTERNS: &[(&str, &str)] = &[
    ("Chrome", "Chrome"),
    ("Firefox", "Firefox"),
    ("Safari", "Safari"),
    ("Edge", "Edge"),
];

fn first_match(user_agent: &str, table: &[(&str, &'static str)]) -> &'static str {
    table
        .iter()
        .find(|(pattern, _)| user_agent.contains(pattern))
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN_LABEL)
}

pub fn classify_os(user_agent: &str) -> &'static str {
    first_match(user_agent, OS_PATTERNS)
}

pub fn classify_browser(user_agent: &str) -> &'static str {
    first_match(user_agent, BROWSER_PATTERNS)
}

/// Reads every capability once. Never fails.
pub fn get_device_info(provider: &dyn PlatformContextProvider) -> ContextSnapshot {
    let user_agent = provider.user_agent();
    let screen = provider.screen_dimensions();

    ContextSnapshot {
        os: user_agent.as_deref().map(|ua| classify_os(ua).to_string()),
        browser: user_agent.as_deref().map(|ua| classify_browser(ua).to_string()),
        user_agent,
        language: provider.language(),
        platform: provider.platform(),
        screen_width: screen.map(|s| s.width),
        screen_height: screen.map(|s| s.height),
        color_depth: screen.and_then(|s| s.color_depth),
        timezone: provider.timezone(),
        // NaN/inf would not survive JSON; treat as unavailable
        device_memory: provider.device_memory().filter(|m| m.is_finite()),
        hardware_concurrency: provider.hardware_concurrency(),
    }
}

/// Base64 of the JSON form. Empty string if serialization fails.
pub fn encode_context(snapshot: &ContextSnapshot) -> String {
    match serde_json::to_vec(snapshot) {
        Ok(json) => BASE64.encode(json),
        Err(e) => {
            tracing::warn!("context encoding failed: {}", e);
            String::new()
        }
    }
}

/// Inverse of `encode_context`, for operator display. `None` on any damage.
pub fn decode_context(encoded: &str) -> Option<ContextSnapshot> {
    if encoded.is_empty() {
        return None;
    }
    let bytes = BASE64.decode(encoded.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}
