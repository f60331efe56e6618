use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use visitgate::config::ServerConfig;
use visitgate::registry::VisitorRegistry;
use visitgate::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    visitgate::logging::init();
    tracing::info!("visitgate registry booting...");

    let config = ServerConfig::from_env()?;
    let registry = match &config.snapshot_path {
        Some(path) => VisitorRegistry::open(path)?,
        None => {
            tracing::warn!("VISITGATE_SNAPSHOT unset, registry is in-memory only");
            VisitorRegistry::in_memory()
        }
    };
    if config.admin_token.is_none() {
        tracing::warn!("VISITGATE_ADMIN_TOKEN unset, dashboard routes are open");
    }

    let state = Arc::new(AppState::new(registry, &config));
    let listener = TcpListener::bind(config.bind).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        signal.cancel();
    });

    server::serve(listener, state, shutdown).await?;
    tracing::info!("visitgate registry stopped");
    Ok(())
}
