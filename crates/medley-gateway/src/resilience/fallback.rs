//! Degraded responses for unavailable backends.
//!
//! The most specific configured payload wins: route, then backend, then the
//! gateway default. Without any, the answer is a `503` describing the
//! unavailable service.

use axum::http::StatusCode;
use medley_kernel::gateway::{BackendConfig, FallbackSpec, GatewayResponse, RouteConfig};
use serde_json::json;

use crate::error::timestamp;

/// Marks responses produced by a fallback rather than a backend.
pub const FALLBACK_HEADER: &str = "x-gateway-fallback";

pub fn select<'a>(
    route: &'a RouteConfig,
    backend: Option<&'a BackendConfig>,
    default: Option<&'a FallbackSpec>,
) -> Option<&'a FallbackSpec> {
    route
        .fallback
        .as_ref()
        .or_else(|| backend.and_then(|b| b.fallback.as_ref()))
        .or(default)
}

/// Build the fallback answer for `route`. `reason` ends up in the default
/// body's `message`.
pub fn render(
    route: &RouteConfig,
    backend: Option<&BackendConfig>,
    default: Option<&FallbackSpec>,
    reason: &str,
    now_ms: u64,
) -> GatewayResponse {
    let spec = select(route, backend, default);
    let status = spec.map_or(503, |s| s.status);

    let body = match spec.and_then(|s| s.body.as_ref()) {
        Some(body) => body.clone(),
        None => json!({
            "error": StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Service Unavailable"),
            "message": reason,
            "service": route.backend,
            "timestamp": timestamp(now_ms),
        }),
    };

    let mut resp = GatewayResponse::json(status, &body).with_header(FALLBACK_HEADER, "true");
    resp.backend_id = route.backend.clone();
    resp
}
