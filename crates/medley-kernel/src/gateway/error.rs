//! Gateway error types for `medley-kernel`.
//!
//! Two families live here:
//!
//! - [`GatewayError`] covers failures detected at *definition time*, before
//!   any request is served: empty ids, ambiguous routes, routes pointing at
//!   undeclared backends and so on. A config that fails validation never
//!   becomes a live pipeline.
//! - [`RequestError`] is the terminal outcome of a single request that did not
//!   reach (or did not get a usable answer from) a backend. Each variant maps
//!   to exactly one HTTP status.

use thiserror::Error;

/// Configuration error type for the gateway kernel contract.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    // ── Identity ────────────────────────────────────────────────────────────
    /// The gateway configuration `id` field is empty or whitespace-only.
    #[error("gateway id cannot be empty")]
    EmptyGatewayId,

    // ── Routes ───────────────────────────────────────────────────────────────
    /// The configuration contains no routes.
    #[error("gateway config must define at least one route")]
    NoRoutes,

    /// A route `id` field is empty or whitespace-only.
    #[error("route id cannot be empty")]
    EmptyRouteId,

    /// A route with this id has already been registered.
    #[error("route '{0}' is already registered")]
    DuplicateRoute(String),

    /// Two routes declare the same prefix for overlapping methods, so one of
    /// them could never be selected.
    #[error("route '{0}' shadows route '{1}': same path prefix and overlapping methods")]
    AmbiguousRoute(String, String),

    /// No route with this id is currently registered.
    #[error("route '{0}' is not registered")]
    RouteNotFound(String),

    /// A route references a backend name that is not present in the backend list.
    #[error("route '{0}' references unknown backend '{1}'")]
    UnknownBackend(String, String),

    /// A route path pattern is syntactically invalid.
    #[error("route '{0}' has an invalid path pattern: {1}")]
    InvalidPathPattern(String, String),

    /// `strip_prefix` removes more segments than the pattern has.
    #[error("route '{0}' strips {1} segment(s) but its prefix only has {2}")]
    InvalidStripPrefix(String, usize, usize),

    // ── Backends ─────────────────────────────────────────────────────────────
    /// The configuration contains no backends.
    #[error("gateway config must define at least one backend")]
    NoBackends,

    /// A backend `name` field is empty or whitespace-only.
    #[error("backend name cannot be empty")]
    EmptyBackendName,

    /// A backend with this name has already been registered.
    #[error("backend '{0}' is already registered")]
    DuplicateBackend(String),

    /// No backend with this name is known to the resolver.
    #[error("backend '{0}' is not registered")]
    BackendNotFound(String),

    /// A backend address is syntactically invalid.
    #[error("backend '{0}' has an invalid address: {1}")]
    InvalidAddress(String, String),

    // ── Policies ─────────────────────────────────────────────────────────────
    /// A rate limit with zero capacity or a non-positive refill rate.
    #[error("route '{0}' has an invalid rate limit: {1}")]
    InvalidRateLimit(String, String),

    /// A retry spec whose backoff bounds are inverted.
    #[error("route '{0}' has an invalid retry policy: {1}")]
    InvalidRetry(String, String),

    /// A circuit breaker with a zero failure threshold or open duration.
    #[error("backend '{0}' has an invalid circuit breaker: {1}")]
    InvalidCircuitBreaker(String, String),

    /// A fallback status outside 100..=599.
    #[error("fallback for '{0}' has an invalid status code {1}")]
    InvalidFallback(String, u16),

    // ── Auth ─────────────────────────────────────────────────────────────────
    /// An authentication configuration block is missing a required field.
    #[error("authentication config is invalid: {0}")]
    InvalidAuthConfig(String),

    // ── Timeouts ─────────────────────────────────────────────────────────────
    /// `request_timeout_ms` is zero, which would fail every backend call.
    #[error("request timeout must be greater than 0 ms")]
    InvalidTimeout,
}

/// Terminal outcome of a request that the gateway answers itself.
///
/// Produced by filters or by the forward step (`UpstreamTimeout`,
/// `UpstreamFailed`). An open circuit is *not* an error: it is answered with
/// the configured fallback payload instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestError {
    /// No configured route matches the path.
    #[error("no route matches '{path}'")]
    RouteNotFound { path: String },

    /// The request body exceeds the gateway's buffering limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Missing, malformed, expired, forged or wrong-kind token.
    #[error("{0}")]
    Unauthenticated(String),

    /// Valid token without any of the roles the route requires.
    #[error("{0}")]
    Forbidden(String),

    /// Browser origin not on the CORS allow-list.
    #[error("origin '{0}' is not allowed")]
    CorsRejected(String),

    /// The route's token bucket is empty.
    #[error("rate limit exceeded for route '{route}'")]
    RateLimited { route: String },

    /// The final attempt ran past its deadline.
    #[error("backend '{backend}' timed out after {attempts} attempt(s)")]
    UpstreamTimeout { backend: String, attempts: u32 },

    /// The final attempt failed with a connection error or a 5xx.
    #[error("backend '{backend}' failed after {attempts} attempt(s): {reason}")]
    UpstreamFailed {
        backend: String,
        reason: String,
        attempts: u32,
    },

    /// Unexpected failure inside the gateway (panic, misconfiguration at
    /// request time). Never carries internal detail to the client.
    #[error("{0}")]
    Internal(String),
}

impl RequestError {
    /// HTTP status code this outcome is answered with.
    pub fn status(&self) -> u16 {
        match self {
            RequestError::RouteNotFound { .. } => 404,
            RequestError::PayloadTooLarge { .. } => 413,
            RequestError::Unauthenticated(_) => 401,
            RequestError::Forbidden(_) | RequestError::CorsRejected(_) => 403,
            RequestError::RateLimited { .. } => 429,
            RequestError::UpstreamTimeout { .. } => 504,
            RequestError::UpstreamFailed { .. } => 502,
            RequestError::Internal(_) => 500,
        }
    }

    /// Reason phrase used as the `error` field of the JSON body.
    pub fn title(&self) -> &'static str {
        match self.status() {
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            413 => "Payload Too Large",
            429 => "Too Many Requests",
            502 => "Bad Gateway",
            504 => "Gateway Timeout",
            _ => "Internal Server Error",
        }
    }
}
