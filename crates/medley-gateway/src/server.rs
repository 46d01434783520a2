//! Axum-based HTTP front end.
//!
//! Two gateway-local endpoints are served directly; every other request is
//! converted into a [`GatewayRequest`] and handed to the [`Gateway`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, always `200 OK`. |
//! | `GET`  | `/gateway/breakers` | Circuit breaker state per backend. |
//! | `ANY`  | everything else | Filter pipeline, then proxy to the routed backend. |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use medley_kernel::gateway::{GatewayRequest, GatewayResponse, HttpMethod, RequestError};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::error_response;
use crate::proxy::Gateway;

/// Largest request body the gateway buffers before forwarding.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
}

/// Build the axum [`Router`] serving `gateway`.
pub fn build_app(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/gateway/breakers", get(breakers_handler))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { gateway })
}

/// Bind `listen` and serve until Ctrl-C.
pub async fn serve(gateway: Arc<Gateway>, listen: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listen, "medley gateway listening");
    axum::serve(
        listener,
        build_app(gateway).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline = state.gateway.pipeline();
    Json(json!({
        "status": "ok",
        "service": "medley-gateway",
        "gateway": pipeline.config().id,
    }))
}

/// `GET /gateway/breakers`: breaker snapshots sorted by backend.
async fn breakers_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "breakers": state.gateway.breaker_snapshot() }))
}

/// Everything else goes through the gateway pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    // Preserve the query string; the router splits it off again.
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let request_id = Uuid::new_v4().to_string();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "failed to buffer request body");
            let resp = error_response(
                &RequestError::PayloadTooLarge {
                    limit: MAX_BODY_BYTES,
                },
                parts.uri.path(),
                0,
            );
            return build_axum_response(resp.with_header("x-request-id", request_id));
        }
    };

    let mut req = GatewayRequest::new(request_id, path, HttpMethod::parse(parts.method.as_str()));
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            req = req.with_header(name.as_str(), v);
        }
    }
    req.client_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    req = req.with_body(body.to_vec());

    build_axum_response(state.gateway.handle(req).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_axum_response(resp: GatewayResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = Response::new(Body::from(resp.body));
    *out.status_mut() = status;

    let headers = out.headers_mut();
    for (k, v) in resp.headers.iter() {
        if k == "content-length" {
            continue;
        }
        match (
            HeaderName::from_bytes(k.as_bytes()),
            HeaderValue::from_bytes(v.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %k, "dropping response header that is not valid HTTP"),
        }
    }
    out
}
