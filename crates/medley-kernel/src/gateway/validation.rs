//! Gateway configuration container and load-time validation.
//!
//! [`GatewayConfig`] aggregates routes, backends, token settings and CORS
//! policy, and exposes a single [`validate()`](GatewayConfig::validate)
//! method that checks all structural invariants *before* any runtime
//! resources are allocated. A reload that fails validation is discarded.

use super::error::GatewayError;
use super::policy::FallbackSpec;
use super::resolver::BackendConfig;
use super::router::RouteConfig;
use super::types::HttpMethod;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;

/// Shortest accepted HMAC secret, in bytes (256 bits for HS256).
pub const MIN_SECRET_LEN: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// AuthConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Token verification settings shared with the identity service.
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret. Never logged.
    pub secret: SecretString,
    /// When set, tokens must carry a matching `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Lifetime of issued access tokens.
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,
    /// Lifetime of issued refresh tokens.
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,
}

fn default_access_ttl_secs() -> u64 {
    15 * 60
}

fn default_refresh_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            issuer: None,
            access_ttl_secs: default_access_ttl_secs(),
            refresh_ttl_secs: default_refresh_ttl_secs(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    fn validate(&self) -> Result<(), GatewayError> {
        if self.secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(GatewayError::InvalidAuthConfig(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.access_ttl_secs == 0 || self.refresh_ttl_secs == 0 {
            return Err(GatewayError::InvalidAuthConfig(
                "token TTLs must be greater than 0".to_string(),
            ));
        }
        if self.issuer.as_deref().is_some_and(|i| i.trim().is_empty()) {
            return Err(GatewayError::InvalidAuthConfig(
                "issuer cannot be blank".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CorsConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Browser cross-origin policy. An empty origin list disables CORS handling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CorsConfig {
    /// Exact origins, or `*` for any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<HttpMethod>,
    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
    #[serde(default = "default_cors_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_cors_methods() -> Vec<HttpMethod> {
    vec![
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Options,
    ]
}

fn default_cors_headers() -> Vec<String> {
    vec!["authorization".to_string(), "content-type".to_string()]
}

fn default_cors_max_age_secs() -> u64 {
    3600
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
            allow_credentials: false,
            max_age_secs: default_cors_max_age_secs(),
        }
    }
}

impl CorsConfig {
    pub fn allowing<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|o| o == "*" || o.eq_ignore_ascii_case(origin))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level gateway configuration.
///
/// Call [`validate()`](Self::validate) to check all structural invariants
/// before passing this config to the gateway runtime.
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    /// Identifier for this gateway instance; sent upstream as `X-Gateway`.
    pub id: String,
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Default per-attempt deadline in milliseconds (must be > 0).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Fallback used when neither the route nor the backend declares one.
    #[serde(default)]
    pub default_fallback: Option<FallbackSpec>,
    /// All backend declarations.
    pub backends: Vec<BackendConfig>,
    /// All route definitions, in declaration order.
    pub routes: Vec<RouteConfig>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl GatewayConfig {
    /// Construct a minimal config with a gateway id and token settings.
    pub fn new(id: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            id: id.into(),
            listen: default_listen(),
            request_timeout_ms: default_request_timeout_ms(),
            auth,
            cors: CorsConfig::default(),
            default_fallback: None,
            backends: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Builder: add a route.
    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    /// Builder: add a backend.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backends.push(backend);
        self
    }

    /// Builder: set the global request timeout.
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_default_fallback(mut self, spec: FallbackSpec) -> Self {
        self.default_fallback = Some(spec);
        self
    }

    /// Look up a backend declaration by name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate all structural invariants of this configuration.
    ///
    /// Returns the *first* detected [`GatewayError`]. Checks performed (in
    /// order):
    /// 1. Gateway id is non-empty.
    /// 2. At least one route and one backend are defined.
    /// 3. Global `request_timeout_ms` is non-zero.
    /// 4. Token settings are usable.
    /// 5. Each backend is valid and uniquely named.
    /// 6. Each route is valid, uniquely named and targets a declared backend.
    /// 7. No two routes share a prefix with overlapping methods.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.id.trim().is_empty() {
            return Err(GatewayError::EmptyGatewayId);
        }
        if self.routes.is_empty() {
            return Err(GatewayError::NoRoutes);
        }
        if self.backends.is_empty() {
            return Err(GatewayError::NoBackends);
        }
        if self.request_timeout_ms == 0 {
            return Err(GatewayError::InvalidTimeout);
        }
        self.auth.validate()?;
        if let Some(fb) = &self.default_fallback {
            fb.validate(&self.id)?;
        }

        let mut backend_names: HashSet<&str> = HashSet::new();
        for backend in &self.backends {
            backend.validate()?;
            if !backend_names.insert(backend.name.as_str()) {
                return Err(GatewayError::DuplicateBackend(backend.name.clone()));
            }
        }

        let mut route_ids: HashSet<&str> = HashSet::new();
        for (idx, route) in self.routes.iter().enumerate() {
            route.validate()?;
            if !route_ids.insert(route.id.as_str()) {
                return Err(GatewayError::DuplicateRoute(route.id.clone()));
            }
            if !backend_names.contains(route.backend.as_str()) {
                return Err(GatewayError::UnknownBackend(
                    route.id.clone(),
                    route.backend.clone(),
                ));
            }
            if let Some(earlier) = self.routes[..idx].iter().find(|r| r.overlaps(route)) {
                return Err(GatewayError::AmbiguousRoute(
                    route.id.clone(),
                    earlier.id.clone(),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
