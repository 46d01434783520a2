//! Per-route and per-backend resilience policy.
//!
//! These are plain configuration records. The state machines that enforce
//! them live in the runtime crate and are rebuilt from these specs whenever
//! the configuration is (re)loaded.

use super::error::GatewayError;
use super::types::HttpMethod;
use serde::{Deserialize, Serialize};

/// Token bucket parameters for one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    /// Maximum burst; the bucket starts full.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_second: f64,
}

impl RateLimitSpec {
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    pub(crate) fn validate(&self, route_id: &str) -> Result<(), GatewayError> {
        if self.capacity == 0 {
            return Err(GatewayError::InvalidRateLimit(
                route_id.to_string(),
                "capacity must be greater than 0".to_string(),
            ));
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second <= 0.0 {
            return Err(GatewayError::InvalidRateLimit(
                route_id.to_string(),
                "refill_per_second must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySpec {
    /// Extra attempts after the first one.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Randomize each delay within `[delay/2, delay]`.
    #[serde(default)]
    pub jitter: bool,
    /// Non-safe methods that may still be retried on this route.
    #[serde(default)]
    pub retry_methods: Vec<HttpMethod>,
}

fn default_min_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    500
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            max_retries: 0,
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: false,
            retry_methods: Vec::new(),
        }
    }
}

impl RetrySpec {
    pub fn new(max_retries: u32, min_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            min_backoff_ms,
            max_backoff_ms,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retry_methods(mut self, methods: Vec<HttpMethod>) -> Self {
        self.retry_methods = methods;
        self
    }

    /// `GET`, `HEAD` and `OPTIONS` always; anything else only if allow-listed.
    pub fn is_retryable(&self, method: &HttpMethod) -> bool {
        method.is_safe() || self.retry_methods.contains(method)
    }

    pub(crate) fn validate(&self, route_id: &str) -> Result<(), GatewayError> {
        if self.min_backoff_ms > self.max_backoff_ms {
            return Err(GatewayError::InvalidRetry(
                route_id.to_string(),
                format!(
                    "min_backoff_ms ({}) exceeds max_backoff_ms ({})",
                    self.min_backoff_ms, self.max_backoff_ms
                ),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker thresholds for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSpec {
    /// When `false` the breaker never opens and records nothing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Consecutive failures that trip the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Time spent OPEN before a trial call is allowed.
    #[serde(default = "default_open_duration_ms")]
    pub open_duration_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_duration_ms() -> u64 {
    30_000
}

impl Default for CircuitBreakerSpec {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            failure_threshold: default_failure_threshold(),
            open_duration_ms: default_open_duration_ms(),
        }
    }
}

impl CircuitBreakerSpec {
    pub fn new(failure_threshold: u32, open_duration_ms: u64) -> Self {
        Self {
            enabled: true,
            failure_threshold,
            open_duration_ms,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self, backend: &str) -> Result<(), GatewayError> {
        if !self.enabled {
            return Ok(());
        }
        if self.failure_threshold == 0 {
            return Err(GatewayError::InvalidCircuitBreaker(
                backend.to_string(),
                "failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.open_duration_ms == 0 {
            return Err(GatewayError::InvalidCircuitBreaker(
                backend.to_string(),
                "open_duration_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Canned response served instead of contacting an unavailable backend.
///
/// Without a `body` the runtime renders the default
/// `{error, message, service, timestamp}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSpec {
    #[serde(default = "default_fallback_status")]
    pub status: u16,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

fn default_fallback_status() -> u16 {
    503
}

impl Default for FallbackSpec {
    fn default() -> Self {
        Self {
            status: default_fallback_status(),
            body: None,
        }
    }
}

impl FallbackSpec {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub(crate) fn validate(&self, owner: &str) -> Result<(), GatewayError> {
        if !(100..=599).contains(&self.status) {
            return Err(GatewayError::InvalidFallback(owner.to_string(), self.status));
        }
        Ok(())
    }
}
