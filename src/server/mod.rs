//! HTTP surface of the registry: the ingestion endpoint the emitter posts to
//! and the dashboard routes the admin console consumes.

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::registry::VisitorRegistry;
use handlers::*;

pub struct AppState {
    pub registry: VisitorRegistry,
    pub admin_token: Option<String>,
    pub recent_events: usize,
}

impl AppState {
    pub fn new(registry: VisitorRegistry, config: &ServerConfig) -> Self {
        Self {
            registry,
            admin_token: config.admin_token.clone(),
            recent_events: config.recent_events,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let dashboard = Router::new()
        .route("/tracking/dashboard/visitors/", get(list_visitors))
        .route(
            "/tracking/dashboard/visitors/:id/",
            get(visitor_detail).patch(update_visitor),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/tracking/track/", post(ingest))
        .merge(dashboard)
        .with_state(state)
}

/// Serves until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("registry listening on http://{}", addr);
    }
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
