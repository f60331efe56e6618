use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::AppError;
use super::AppState;
use crate::client::emitter::TrackingPayload;
use crate::registry::{StatusUpdate, VisitorDetail, VisitorIdentity};

pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "visitors": state.registry.visitor_count(),
        "events": state.registry.event_count(),
    }))
}

/// First `X-Forwarded-For` hop, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<TrackingPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(payload) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    state.registry.ingest(payload, ip)?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "ok" }))))
}

pub async fn list_visitors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VisitorIdentity>>, AppError> {
    Ok(Json(state.registry.list()?))
}

pub async fn visitor_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VisitorDetail>, AppError> {
    Ok(Json(state.registry.detail(&id, state.recent_events)?))
}

pub async fn update_visitor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<VisitorIdentity>, AppError> {
    let Json(update) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let (visitor, transition) = state.registry.set_access_status(&id, update.access_status)?;
    if !transition.is_change() {
        info!("visitor {} already {}", visitor.visitor_id, visitor.access_status);
    }
    Ok(Json(visitor))
}

pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if presented != Some(expected) {
        warn!("rejected dashboard request to {}", request.uri().path());
        return Err(AppError::Unauthorized("admin token required".to_string()));
    }
    Ok(next.run(request).await)
}
