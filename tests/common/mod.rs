#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use visitgate::client::{EventEmitter, IdentityResolver, PlatformContextProvider, StaticContextProvider};
use visitgate::config::{ClientConfig, ServerConfig};
use visitgate::registry::VisitorRegistry;
use visitgate::server::{self, AppState};

pub const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
pub const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct TestServer {
    pub base_url: String,
    pub state: Arc<AppState>,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn spawn_registry(admin_token: Option<&str>) -> TestServer {
    let config = ServerConfig {
        admin_token: admin_token.map(str::to_string),
        ..ServerConfig::default()
    };
    let state = Arc::new(AppState::new(VisitorRegistry::in_memory(), &config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();

    tokio::spawn(server::serve(listener, state.clone(), shutdown.clone()));

    TestServer {
        base_url,
        state,
        shutdown,
    }
}

/// Serves a canned ipapi-style body for any `/{ip}/json/`.
pub async fn spawn_geo_stub(body: Value) -> String {
    let app = Router::new().route(
        "/:ip/json/",
        get(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    base_url
}

/// A base URL nothing is listening on.
pub async fn dead_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn client_config(api_base: &str) -> ClientConfig {
    ClientConfig {
        api_base: api_base.to_string(),
        http_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

pub fn emitter_for(config: &ClientConfig, user_agent: &str) -> (EventEmitter, Arc<IdentityResolver>) {
    let context: Arc<dyn PlatformContextProvider> = Arc::new(StaticContextProvider {
        user_agent: Some(user_agent.to_string()),
        language: Some("en-US".to_string()),
        timezone: Some("Asia/Kolkata".to_string()),
        ..StaticContextProvider::default()
    });
    let identity = Arc::new(IdentityResolver::for_device(context.clone()));
    (EventEmitter::new(config, identity.clone(), context), identity)
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
