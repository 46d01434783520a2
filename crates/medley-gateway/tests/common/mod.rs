//! Shared fixtures for the `medley-gateway` integration tests.
//!
//! Declared with `mod common;` inside each test binary that needs it.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use medley_gateway::auth::TokenIssuer;
use medley_gateway::gateway::{
    AuthConfig, BackendConfig, CircuitBreakerSpec, GatewayConfig, GatewayRequest,
    GatewayResponse, HttpMethod, Principal, RateLimitSpec, RouteConfig, TokenKind,
};
use medley_gateway::proxy::Gateway;
use medley_gateway::testing::{ManualClock, MockUpstream};

pub const SECRET: &str = "medley-integration-secret-0123456789abcdef";
pub const START_MS: u64 = 1_700_000_000_000;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn auth() -> AuthConfig {
    AuthConfig::new(SECRET)
}

/// The hospital layout used across the suites: a public auth route, a
/// user route and three role-gated departments.
pub fn hospital_config() -> GatewayConfig {
    GatewayConfig::new("medley-test", auth())
        .with_backend(BackendConfig::new("users-service", ["http://users:8081"]))
        .with_backend(
            BackendConfig::new("finance-service", ["http://finance:8082"])
                .with_circuit_breaker(CircuitBreakerSpec::new(5, 30_000)),
        )
        .with_backend(BackendConfig::new("planning-service", ["http://planning:8083"]))
        .with_backend(BackendConfig::new(
            "medical-service",
            ["http://medical-a:8084", "http://medical-b:8084"],
        ))
        .with_route(RouteConfig::new("auth", "/api/auth/**", "users-service"))
        .with_route(
            RouteConfig::new("users", "/api/users/**", "users-service")
                .with_required_roles(["USER", "ADMIN"]),
        )
        .with_route(
            RouteConfig::new("finance", "/api/finance/**", "finance-service")
                .with_required_roles(["FINANCE", "ADMIN"]),
        )
        .with_route(
            RouteConfig::new("planning", "/api/planning/**", "planning-service")
                .with_required_roles(["PLANNING", "ADMIN"])
                .with_strip_prefix(1)
                .with_rate_limit(RateLimitSpec::new(10, 1.0)),
        )
        .with_route(
            RouteConfig::new("medical", "/api/medical/**", "medical-service")
                .with_required_roles(["MEDICAL", "ADMIN"]),
        )
        .with_route(
            RouteConfig::new("admin", "/api/admin/**", "users-service")
                .with_required_roles(["ADMIN"]),
        )
}

pub struct Harness {
    pub gateway: Arc<Gateway>,
    pub upstream: Arc<MockUpstream>,
    pub clock: Arc<ManualClock>,
    pub issuer: TokenIssuer,
}

impl Harness {
    pub fn new(config: GatewayConfig, upstream: MockUpstream) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let upstream = upstream.shared();
        let gateway = Gateway::from_config(config, upstream.clone(), clock.clone())
            .expect("test config is valid");
        Self {
            gateway: Arc::new(gateway),
            upstream,
            issuer: TokenIssuer::new(&auth(), clock.clone()),
            clock,
        }
    }

    pub fn hospital(upstream: MockUpstream) -> Self {
        Self::new(hospital_config(), upstream)
    }

    pub fn token(&self, roles: &[&str]) -> String {
        self.token_of_kind(roles, TokenKind::Access)
    }

    pub fn token_of_kind(&self, roles: &[&str], kind: TokenKind) -> String {
        self.issuer
            .issue(&principal(roles), kind)
            .expect("token signs")
    }

    pub async fn send(&self, req: GatewayRequest) -> GatewayResponse {
        self.gateway.handle(req).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> GatewayResponse {
        self.send(request(HttpMethod::Get, path, token)).await
    }
}

pub fn principal(roles: &[&str]) -> Principal {
    Principal {
        user_id: "42".to_string(),
        username: "ana".to_string(),
        email: "ana@medley.test".to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn request(method: HttpMethod, path: &str, token: Option<&str>) -> GatewayRequest {
    let id = format!("req-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed));
    let req = GatewayRequest::new(id, path, method);
    match token {
        Some(t) => req.with_header("Authorization", format!("Bearer {t}")),
        None => req,
    }
}

pub fn json_body(resp: &GatewayResponse) -> serde_json::Value {
    serde_json::from_slice(&resp.body).expect("response body is JSON")
}
