//! Gateway router trait and route configuration.
//!
//! The [`GatewayRouter`] trait is the single kernel-level abstraction for
//! request routing. Implementations (the prefix router in `medley-gateway`)
//! are loaded with routes at startup and looked up on every inbound request.

use super::error::GatewayError;
use super::policy::{FallbackSpec, RateLimitSpec, RetrySpec};
use super::types::{HttpMethod, RouteMatch, TokenKind};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Route configuration
// ─────────────────────────────────────────────────────────────────────────────

/// A single routing rule mapping a path prefix + method set to a backend,
/// together with the access and resilience policy for that entry path.
///
/// Path patterns are prefixes matched on segment boundaries. A trailing
/// `/**` is accepted and ignored:
/// ```text
/// /api/users          matches /api/users, /api/users/7; not /api/usersX
/// /api/finance/**     same as /api/finance
/// /                   matches everything
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteConfig {
    /// Unique stable identifier for this route; also keys its rate limiter.
    pub id: String,
    /// Path prefix. Must begin with `/`.
    #[serde(alias = "path")]
    pub path_pattern: String,
    /// Name of the backend this route forwards to.
    pub backend: String,
    /// Accepted HTTP methods. Empty means *all* methods.
    #[serde(default)]
    pub methods: Vec<HttpMethod>,
    /// Leading path segments removed before forwarding.
    #[serde(default)]
    pub strip_prefix: usize,
    /// Roles allowed through; empty makes the route public.
    #[serde(default)]
    pub required_roles: Vec<String>,
    /// Token kind this route accepts.
    #[serde(default = "default_token_kind")]
    pub token_kind: TokenKind,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSpec>,
    #[serde(default)]
    pub retry: RetrySpec,
    /// Overrides the backend fallback for this route.
    #[serde(default)]
    pub fallback: Option<FallbackSpec>,
    /// Per-attempt deadline. `None` uses the gateway default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_token_kind() -> TokenKind {
    TokenKind::Access
}

impl RouteConfig {
    /// Create a minimal public route with just id, path_pattern, and backend.
    pub fn new(
        id: impl Into<String>,
        path_pattern: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path_pattern: path_pattern.into(),
            backend: backend.into(),
            methods: Vec::new(),
            strip_prefix: 0,
            required_roles: Vec::new(),
            token_kind: TokenKind::Access,
            rate_limit: None,
            retry: RetrySpec::default(),
            fallback: None,
            timeout_ms: None,
        }
    }

    /// Builder: restrict to specific HTTP methods.
    pub fn with_methods(mut self, methods: Vec<HttpMethod>) -> Self {
        self.methods = methods;
        self
    }

    /// Builder: strip leading segments before forwarding.
    pub fn with_strip_prefix(mut self, segments: usize) -> Self {
        self.strip_prefix = segments;
        self
    }

    /// Builder: require one of the given roles.
    pub fn with_required_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_token_kind(mut self, kind: TokenKind) -> Self {
        self.token_kind = kind;
        self
    }

    pub fn with_rate_limit(mut self, spec: RateLimitSpec) -> Self {
        self.rate_limit = Some(spec);
        self
    }

    pub fn with_retry(mut self, spec: RetrySpec) -> Self {
        self.retry = spec;
        self
    }

    pub fn with_fallback(mut self, spec: FallbackSpec) -> Self {
        self.fallback = Some(spec);
        self
    }

    /// Builder: set a per-route timeout.
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// `true` when no roles are required and token verification is skipped.
    pub fn is_public(&self) -> bool {
        self.required_roles.is_empty()
    }

    /// Whether this route accepts `method`.
    pub fn allows_method(&self, method: &HttpMethod) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// The prefix segments this route matches on, with any `/**` removed.
    pub fn prefix_segments(&self) -> Vec<&str> {
        let pattern = self
            .path_pattern
            .strip_suffix("/**")
            .unwrap_or(&self.path_pattern);
        pattern.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// `true` when both routes have the same prefix and at least one method
    /// in common, so the later-declared one could never be selected for it.
    pub fn overlaps(&self, other: &RouteConfig) -> bool {
        if self.prefix_segments() != other.prefix_segments() {
            return false;
        }
        if self.methods.is_empty() || other.methods.is_empty() {
            return true;
        }
        self.methods.iter().any(|m| other.methods.contains(m))
    }

    /// Basic sanity checks run during [`GatewayConfig::validate()`].
    ///
    /// [`GatewayConfig::validate()`]: super::validation::GatewayConfig::validate
    pub(crate) fn validate(&self) -> Result<(), GatewayError> {
        if self.id.trim().is_empty() {
            return Err(GatewayError::EmptyRouteId);
        }
        if !self.path_pattern.starts_with('/') {
            return Err(GatewayError::InvalidPathPattern(
                self.id.clone(),
                "path pattern must start with '/'".to_string(),
            ));
        }
        let segments = self.prefix_segments();
        if segments.iter().any(|s| s.contains('*')) {
            return Err(GatewayError::InvalidPathPattern(
                self.id.clone(),
                "wildcards are only allowed as a trailing '/**'".to_string(),
            ));
        }
        if self.strip_prefix > segments.len() {
            return Err(GatewayError::InvalidStripPrefix(
                self.id.clone(),
                self.strip_prefix,
                segments.len(),
            ));
        }
        if self.required_roles.iter().any(|r| r.trim().is_empty()) {
            return Err(GatewayError::InvalidPathPattern(
                self.id.clone(),
                "required role names cannot be empty".to_string(),
            ));
        }
        if let Some(rl) = &self.rate_limit {
            rl.validate(&self.id)?;
        }
        self.retry.validate(&self.id)?;
        if let Some(fb) = &self.fallback {
            fb.validate(&self.id)?;
        }
        if self.timeout_ms == Some(0) {
            return Err(GatewayError::InvalidTimeout);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for request routing.
///
/// Implementations receive [`RouteConfig`] entries at startup (via
/// [`register`](GatewayRouter::register)) and resolve incoming
/// (path, method) pairs to a [`RouteMatch`] at request time.
///
/// The trait is synchronous: lookups are in-memory with no I/O.
pub trait GatewayRouter: Send + Sync {
    /// Register a new route. Returns [`GatewayError::DuplicateRoute`] if a
    /// route with the same `id` is already registered, or
    /// [`GatewayError::AmbiguousRoute`] if it would shadow an existing one.
    fn register(&mut self, route: RouteConfig) -> Result<(), GatewayError>;

    /// Resolve a request `(path, method)` to the best matching route.
    /// Returns `None` when no route matches.
    fn resolve(&self, path: &str, method: &HttpMethod) -> Option<RouteMatch>;

    /// All registered routes in declaration order.
    fn routes(&self) -> Vec<&RouteConfig>;

    /// Remove a previously registered route.
    /// Returns [`GatewayError::RouteNotFound`] if the id is absent.
    fn deregister(&mut self, route_id: &str) -> Result<(), GatewayError>;
}
