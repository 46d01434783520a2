//! Core data types for the gateway kernel contract.
//!
//! These types are shared across all gateway traits
//! ([`GatewayRouter`](super::router::GatewayRouter),
//! [`GatewayFilter`](super::filter::GatewayFilter),
//! [`ServiceResolver`](super::resolver::ServiceResolver))
//! and carry no runtime dependencies beyond `serde` and `std`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::router::RouteConfig;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP primitives
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method. Standard verbs get their own variant; anything else is kept
/// verbatim in [`HttpMethod::Other`] so it can still be forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[non_exhaustive]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Other(String),
}

impl HttpMethod {
    /// Case-insensitive parse. Unknown verbs become [`HttpMethod::Other`]
    /// holding the uppercased name.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "PATCH" => HttpMethod::Patch,
            "DELETE" => HttpMethod::Delete,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            "TRACE" => HttpMethod::Trace,
            other => HttpMethod::Other(other.to_string()),
        }
    }

    /// Return the standard uppercase string representation.
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Other(name) => name,
        }
    }

    /// Methods that are always safe to repeat.
    pub fn is_safe(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }
}

impl From<String> for HttpMethod {
    fn from(s: String) -> Self {
        HttpMethod::parse(&s)
    }
}

impl From<HttpMethod> for String {
    fn from(m: HttpMethod) -> Self {
        m.as_str().to_string()
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound request flowing through the gateway.
///
/// All fields use owned types so the struct can be sent across async task
/// boundaries and replayed on retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Correlation id, echoed to the backend as `X-Request-Id`.
    pub id: String,
    /// Request path without the query string, e.g. `/api/users/42`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// HTTP method.
    pub method: HttpMethod,
    /// HTTP headers (header names are lowercased).
    pub headers: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// Remote peer address, when known.
    pub client_addr: Option<String>,
}

impl GatewayRequest {
    /// Construct a minimal request with the given id, path, and method.
    ///
    /// A `?query` suffix on `path` is split off into [`Self::query`].
    pub fn new(id: impl Into<String>, path: impl Into<String>, method: HttpMethod) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };
        Self {
            id: id.into(),
            path,
            query,
            method,
            headers: HashMap::new(),
            body: Vec::new(),
            client_addr: None,
        }
    }

    /// Builder helper: attach a header, replacing earlier values.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Builder helper: set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Bearer credential from the `Authorization` header, if present.
    ///
    /// The scheme is matched case-insensitively; an empty credential counts
    /// as absent.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    }
}

/// Ordered, multi-valued header list for responses.
///
/// Names are stored lowercased. A name may repeat (`set-cookie` is the usual
/// case) and [`Headers::append`] keeps every value in arrival order, while
/// [`Headers::insert`] replaces whatever was there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    /// Every value for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Add a value, keeping any existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into().to_lowercase(), value.into()));
    }

    /// Replace all values for `name` with a single one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.0.retain(|(k, _)| *k != name);
        self.0.push((name, value.into()));
    }

    /// Set `name` only when it has no value yet.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains_key(&name) {
            self.append(name, value);
        }
    }

    /// Remove every value for `name`; returns how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before - self.0.len()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.0.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of name/value pairs, counting repeats.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::ops::Index<&str> for Headers {
    type Output = String;

    /// First value for the name. Panics when absent, like `HashMap`.
    fn index(&self, name: &str) -> &String {
        match self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => v,
            None => panic!("no header named {name:?}"),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

/// An outbound response, either relayed from a backend or produced by the
/// gateway itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// HTTP status code (100..=599).
    pub status: u16,
    /// Response headers (names lowercased, repeats kept).
    pub headers: Headers,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// Name of the backend that generated this response; `"gateway"` for
    /// locally produced answers.
    pub backend_id: String,
    /// Round-trip latency in milliseconds (gateway → backend → gateway).
    pub latency_ms: u64,
}

impl GatewayResponse {
    /// Construct a minimal response.
    pub fn new(status: u16, backend_id: impl Into<String>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            backend_id: backend_id.into(),
            latency_ms: 0,
        }
    }

    /// A locally produced JSON response.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, "gateway")
            .with_header("content-type", "application/json")
            .with_body(body.to_string().into_bytes())
    }

    /// Builder helper: attach a header, replacing earlier values.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Builder helper: set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the backend reported a server-side failure.
    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Distinguishes short-lived access tokens from refresh tokens. Each route
/// names the kind it accepts through [`RouteConfig::token_kind`]; routes
/// default to access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity extracted from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
    pub email: String,
    /// Role names as carried by the token. Ordered so the injected
    /// `X-User-Roles` header is deterministic.
    pub roles: BTreeSet<String>,
}

impl Principal {
    /// Roles joined with `,` for header injection.
    pub fn roles_header(&self) -> String {
        self.roles.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Circuit admission
// ─────────────────────────────────────────────────────────────────────────────

/// How the circuit breaker admitted a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    /// Circuit closed; ordinary traffic.
    Normal,
    /// The single probe admitted while half-open. Gets exactly one attempt.
    Trial,
}

// ─────────────────────────────────────────────────────────────────────────────
// Route match
// ─────────────────────────────────────────────────────────────────────────────

/// The result of a successful route lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route with all of its policy.
    pub route: Arc<RouteConfig>,
    /// Path to send to the backend after `strip_prefix` has been applied.
    pub forward_path: String,
}

impl RouteMatch {
    /// Id of the matched route.
    pub fn route_id(&self) -> &str {
        &self.route.id
    }

    /// Name of the backend this route targets.
    pub fn backend_id(&self) -> &str {
        &self.route.backend
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request context
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable context that flows through the filter chain for a single request.
///
/// Filters read from and write to this context, so later filters see the
/// decisions of earlier ones: authorization reads the principal set by
/// authentication, the forward step reads the route and the call mode.
#[derive(Debug, Clone)]
pub struct GatewayContext {
    /// The inbound request.
    pub request: GatewayRequest,
    /// Populated by the routing filter.
    pub route_match: Option<RouteMatch>,
    /// Populated by the auth filter on protected routes.
    pub principal: Option<Principal>,
    /// Populated by the circuit breaker gate.
    pub call_mode: Option<CallMode>,
    /// Headers added to whatever response this request ends with.
    pub response_headers: HashMap<String, String>,
    /// Free-form attributes written and read by filters.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl GatewayContext {
    /// Create a fresh context from an inbound request.
    pub fn new(request: GatewayRequest) -> Self {
        Self {
            request,
            route_match: None,
            principal: None,
            call_mode: None,
            response_headers: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Convenience: read a typed attribute, returning `None` if absent or
    /// if deserialization fails.
    pub fn get_attr<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Convenience: write a serializable attribute.
    pub fn set_attr<T: serde::Serialize>(&mut self, key: impl Into<String>, val: &T) {
        if let Ok(v) = serde_json::to_value(val) {
            self.attributes.insert(key.into(), v);
        }
    }
}
