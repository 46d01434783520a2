//! Gateway error rendering.
//!
//! Every [`RequestError`] becomes a JSON response. Auth failures carry the
//! request path and a timestamp so clients can correlate them with logs;
//! internal failures never expose their cause.

use chrono::{DateTime, SecondsFormat};
use medley_kernel::config::ConfigError;
use medley_kernel::gateway::{GatewayError, GatewayResponse, RequestError};
use serde_json::json;
use thiserror::Error;

/// Failure to turn a config file into a running pipeline.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid gateway configuration: {0}")]
    Invalid(#[from] GatewayError),
}

/// RFC 3339 timestamp with millisecond precision.
pub fn timestamp(now_ms: u64) -> String {
    i64::try_from(now_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render the JSON answer for a request the gateway refused or could not
/// complete.
pub fn error_response(err: &RequestError, path: &str, now_ms: u64) -> GatewayResponse {
    let status = err.status();
    let body = match err {
        RequestError::RouteNotFound { .. } => json!({
            "error": err.title(),
            "message": err.to_string(),
            "path": path,
            "timestamp": timestamp(now_ms),
        }),
        RequestError::Unauthenticated(_) | RequestError::Forbidden(_) => json!({
            "error": err.title(),
            "message": err.to_string(),
            "status": status,
            "timestamp": timestamp(now_ms),
            "path": path,
        }),
        RequestError::Internal(_) => json!({
            "error": err.title(),
            "message": "An unexpected error occurred",
        }),
        _ => json!({
            "error": err.title(),
            "message": err.to_string(),
        }),
    };

    let resp = GatewayResponse::json(status, &body);
    match err {
        RequestError::Unauthenticated(_) => resp.with_header("www-authenticate", "Bearer"),
        RequestError::RateLimited { .. } => resp.with_header("retry-after", "1"),
        _ => resp,
    }
}
