use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dashboard::segment_url;
use super::ConsoleError;
use crate::config::ClientConfig;

/// The subset of the ipapi.co response the console displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country_name: Option<String>,
    pub org: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Read-only IP geolocation lookup, `GET {base}/{ip}/json/`.
#[derive(Clone)]
pub struct GeoLocator {
    client: Client,
    base_url: String,
}

impl GeoLocator {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent(config.user_agent.clone())
                .timeout(config.http_timeout)
                .build()
                .unwrap_or_default(),
            base_url: config.geo_base.clone(),
        }
    }

    pub async fn locate(&self, ip: &str) -> Result<GeoLocation, ConsoleError> {
        let ip = ip.trim();
        if ip.is_empty() {
            return Err(ConsoleError::Geolocation("no ip address on record".to_string()));
        }

        let response = self
            .client
            .get(segment_url(&self.base_url, &[ip, "json", ""])?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ConsoleError::Geolocation(format!("lookup failed: {}", response.status())));
        }

        // ipapi answers reserved or malformed addresses with 200 and {"error": true}
        let body: Value = response.json().await?;
        if body.get("error").and_then(Value::as_bool).unwrap_or(false) {
            let reason = body
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("lookup refused");
            return Err(ConsoleError::Geolocation(reason.to_string()));
        }
        Ok(serde_json::from_value(body)?)
    }
}
