//! End-to-end tests for the gateway request pipeline.
//!
//! Every test drives [`Gateway::handle`] with a scripted
//! [`MockUpstream`] and a [`ManualClock`], so token expiry, refill and
//! breaker timing are fully deterministic.
//!
//! ```bash
//! cargo test -p medley-gateway --test gateway_e2e
//! ```

mod common;

use std::sync::Arc;

use common::{Harness, hospital_config, json_body, request};
use medley_gateway::backend::StaticServiceResolver;
use medley_gateway::gateway::{
    BackendConfig, CorsConfig, FallbackSpec, GatewayConfig, GatewayError, GatewayResponse,
    HttpMethod, RetrySpec, RouteConfig, TokenKind,
};
use medley_gateway::proxy::Gateway;
use medley_gateway::resilience::CircuitState;
use medley_gateway::resilience::fallback::FALLBACK_HEADER;
use medley_gateway::testing::{ManualClock, MockReply, MockUpstream};
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// § 1  Authentication and authorization
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn public_route_forwards_without_a_token() {
    let h = Harness::hospital(MockUpstream::default());

    let resp = h
        .send(request(HttpMethod::Post, "/api/auth/login", None).with_body(r#"{"u":"ana"}"#))
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(h.upstream.calls(), 1);
    let sent = h.upstream.last_request().unwrap();
    assert_eq!(sent.path_and_query, "/api/auth/login");
    assert_eq!(sent.body, br#"{"u":"ana"}"#.to_vec());
    assert!(sent.headers.keys().all(|k| !k.starts_with("x-user-")));
}

#[tokio::test]
async fn missing_token_is_401_and_never_reaches_the_backend() {
    let h = Harness::hospital(MockUpstream::default());

    let resp = h.get("/api/users/7", None).await;

    assert_eq!(resp.status, 401);
    assert_eq!(resp.headers["www-authenticate"], "Bearer");
    let body = json_body(&resp);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["path"], "/api/users/7");
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn expired_token_is_401() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["USER"]);

    h.clock.advance_ms(15 * 60 * 1000 + 1000);
    let resp = h.get("/api/users/7", Some(&token)).await;

    assert_eq!(resp.status, 401);
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn refresh_token_is_rejected_on_an_access_route() {
    let h = Harness::hospital(MockUpstream::default());
    let refresh = h.token_of_kind(&["USER"], TokenKind::Refresh);

    let resp = h.get("/api/users/7", Some(&refresh)).await;

    assert_eq!(resp.status, 401);
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn forged_token_is_401() {
    let h = Harness::hospital(MockUpstream::default());
    let mut token = h.token(&["ADMIN"]);
    token.push('x');

    let resp = h.get("/api/admin/settings", Some(&token)).await;

    assert_eq!(resp.status, 401);
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn user_token_on_admin_route_is_403() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["USER"]);

    let resp = h.get("/api/admin/settings", Some(&token)).await;

    assert_eq!(resp.status, 403);
    let body = json_body(&resp);
    assert_eq!(body["error"], "Forbidden");
    assert!(body["message"].as_str().unwrap().contains("ADMIN"));
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn prefixed_and_lowercase_roles_are_accepted() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["role_finance"]);

    let resp = h.get("/api/finance/invoices", Some(&token)).await;

    assert_eq!(resp.status, 200);
    assert_eq!(h.upstream.calls(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// § 2  Routing and header rewriting
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_path_is_404() {
    let h = Harness::hospital(MockUpstream::default());

    let resp = h.get("/api/unknown/thing", None).await;

    assert_eq!(resp.status, 404);
    let body = json_body(&resp);
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["path"], "/api/unknown/thing");
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn dot_segments_cannot_climb_out_of_a_public_route() {
    let h = Harness::hospital(MockUpstream::default());

    for path in [
        "/api/auth/../admin/users",
        "/api/auth/%2e%2e/admin/users",
        "/api/auth/.%2E/admin/users",
    ] {
        let resp = h.get(path, None).await;
        assert_eq!(resp.status, 401, "{path}");
    }
    assert_eq!(h.upstream.calls(), 0);

    let admin = h.token(&["ADMIN"]);
    let resp = h.get("/api/auth/../admin/users", Some(&admin)).await;
    assert_eq!(resp.status, 200);
    let sent = h.upstream.last_request().unwrap();
    assert_eq!(sent.path_and_query, "/api/admin/users");
}

#[tokio::test]
async fn path_above_the_root_is_404() {
    let h = Harness::hospital(MockUpstream::default());

    let resp = h.get("/api/../../etc/passwd", None).await;

    assert_eq!(resp.status, 404);
    assert_eq!(json_body(&resp)["path"], "/api/../../etc/passwd");
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn identity_headers_are_injected_and_spoofs_dropped() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["USER", "MEDICAL"]);
    let req = request(HttpMethod::Get, "/api/users/7?expand=roles", Some(&token))
        .with_header("X-User-Id", "1")
        .with_header("X-User-Roles", "ADMIN")
        .with_header("Accept", "application/json");
    let request_id = req.id.clone();

    let resp = h.send(req).await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.headers["x-request-id"], request_id);
    assert_eq!(resp.backend_id, "users-service");

    let (base, sent) = h.upstream.requests().pop().unwrap();
    assert_eq!(base, "http://users:8081");
    assert_eq!(sent.path_and_query, "/api/users/7?expand=roles");
    assert_eq!(sent.headers["x-user-id"], "42");
    assert_eq!(sent.headers["x-user-username"], "ana");
    assert_eq!(sent.headers["x-user-email"], "ana@medley.test");
    assert_eq!(sent.headers["x-user-roles"], "MEDICAL,USER");
    assert_eq!(sent.headers["x-gateway"], "medley-test");
    assert_eq!(sent.headers["x-request-id"], request_id);
    assert_eq!(sent.headers["accept"], "application/json");
}

#[tokio::test]
async fn strip_prefix_rewrites_the_forwarded_path() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["PLANNING"]);

    let resp = h.get("/api/planning/shifts?week=3", Some(&token)).await;

    assert_eq!(resp.status, 200);
    let sent = h.upstream.last_request().unwrap();
    assert_eq!(sent.path_and_query, "/planning/shifts?week=3");
}

#[tokio::test]
async fn instances_are_picked_round_robin() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["MEDICAL"]);

    for _ in 0..4 {
        assert_eq!(h.get("/api/medical/records", Some(&token)).await.status, 200);
    }

    let bases: Vec<String> = h.upstream.requests().into_iter().map(|(b, _)| b).collect();
    assert_eq!(bases.len(), 4);
    assert_ne!(bases[0], bases[1]);
    assert_eq!(bases[0], bases[2]);
    assert_eq!(bases[1], bases[3]);
}

#[tokio::test]
async fn repeated_backend_headers_are_relayed_in_order() {
    let mut login = GatewayResponse::new(200, "")
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true}"#);
    login.headers.append("Set-Cookie", "session=abc; HttpOnly");
    login.headers.append("Set-Cookie", "csrf=xyz; Secure");
    login.headers.append("Connection", "close");
    let h = Harness::hospital(MockUpstream::default().with_script([MockReply::Response(login)]));

    let resp = h.send(request(HttpMethod::Post, "/api/auth/login", None)).await;

    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.headers.get_all("set-cookie").collect::<Vec<_>>(),
        vec!["session=abc; HttpOnly", "csrf=xyz; Secure"]
    );
    assert!(!resp.headers.contains_key("connection"));
    assert_eq!(resp.backend_id, "users-service");
}

#[tokio::test]
async fn filters_run_in_documented_order() {
    let h = Harness::hospital(MockUpstream::default());
    assert_eq!(
        h.gateway.filter_names(),
        vec![
            "cors",
            "routing",
            "auth",
            "authorize",
            "rate-limit",
            "circuit-breaker",
            "access-log"
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// § 3  Rate limiting
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_burst_admits_exactly_the_bucket_capacity() {
    let h = Arc::new(Harness::hospital(MockUpstream::default()));
    let token = Arc::new(h.token(&["PLANNING"]));

    let handles: Vec<_> = (0..15)
        .map(|_| {
            let h = h.clone();
            let token = token.clone();
            tokio::spawn(async move { h.get("/api/planning/shifts", Some(&token)).await })
        })
        .collect();

    let mut ok = 0;
    let mut limited = 0;
    for handle in handles {
        let resp = handle.await.unwrap();
        match resp.status {
            200 => ok += 1,
            429 => {
                assert_eq!(resp.headers["retry-after"], "1");
                assert_eq!(resp.headers["x-ratelimit-remaining"], "0");
                limited += 1;
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!((ok, limited), (10, 5));
    assert_eq!(h.upstream.calls(), 10);
}

#[tokio::test]
async fn bucket_refills_with_time() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["PLANNING"]);

    for _ in 0..10 {
        assert_eq!(h.get("/api/planning/shifts", Some(&token)).await.status, 200);
    }
    assert_eq!(h.get("/api/planning/shifts", Some(&token)).await.status, 429);

    h.clock.advance_ms(1_000);
    let resp = h.get("/api/planning/shifts", Some(&token)).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.headers["x-ratelimit-limit"], "10");
}

// ─────────────────────────────────────────────────────────────────────────────
// § 4  Circuit breaking and fallback
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn five_failures_open_the_circuit_and_the_sixth_gets_the_fallback() {
    let upstream = MockUpstream::default().with_script(vec![MockReply::status(503); 5]);
    let h = Harness::hospital(upstream);
    let token = h.token(&["FINANCE"]);

    for _ in 0..5 {
        assert_eq!(h.get("/api/finance/invoices", Some(&token)).await.status, 502);
    }
    assert_eq!(h.upstream.calls(), 5);

    let resp = h.get("/api/finance/invoices", Some(&token)).await;
    assert_eq!(resp.status, 503);
    assert_eq!(resp.headers[FALLBACK_HEADER], "true");
    assert_eq!(json_body(&resp)["service"], "finance-service");
    assert_eq!(h.upstream.calls(), 5);

    let finance = h
        .gateway
        .breaker_snapshot()
        .into_iter()
        .find(|s| s.backend == "finance-service")
        .unwrap();
    assert_eq!(finance.state, CircuitState::Open);
    assert_eq!(finance.rejected, 1);
}

#[tokio::test]
async fn successful_trial_closes_the_circuit() {
    let upstream = MockUpstream::default().with_script(vec![MockReply::status(500); 5]);
    let h = Harness::hospital(upstream);
    let token = h.token(&["FINANCE"]);

    for _ in 0..5 {
        h.get("/api/finance/invoices", Some(&token)).await;
    }
    h.clock.advance_ms(30_000);

    let resp = h.get("/api/finance/invoices", Some(&token)).await;
    assert_eq!(resp.status, 200);
    assert_eq!(h.upstream.calls(), 6);

    let finance = h
        .gateway
        .breaker_snapshot()
        .into_iter()
        .find(|s| s.backend == "finance-service")
        .unwrap();
    assert_eq!(finance.state, CircuitState::Closed);
    assert_eq!(finance.consecutive_failures, 0);
}

#[tokio::test]
async fn route_fallback_overrides_backend_fallback() {
    let config = GatewayConfig::new("medley-test", common::auth())
        .with_backend(
            BackendConfig::new("reports-service", ["http://reports:9000"])
                .with_fallback(FallbackSpec::new(503, json!({ "from": "backend" }))),
        )
        .with_route(
            RouteConfig::new("reports", "/api/reports/**", "reports-service")
                .with_fallback(FallbackSpec::new(200, json!({ "reports": [] }))),
        );
    let clock = Arc::new(ManualClock::new(common::START_MS));
    let resolver = Arc::new(StaticServiceResolver::from_backends(&config.backends));
    let upstream = MockUpstream::default().shared();
    let gateway = Gateway::builder(config, upstream.clone())
        .clock(clock)
        .resolver(resolver.clone())
        .build()
        .unwrap();

    resolver.update("reports-service", Vec::<String>::new());
    let resp = gateway
        .handle(request(HttpMethod::Get, "/api/reports/daily", None))
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(json_body(&resp), json!({ "reports": [] }));
    assert_eq!(upstream.calls(), 0);
    assert_eq!(gateway.breaker_snapshot()[0].consecutive_failures, 1);
}

#[tokio::test]
async fn no_live_instance_serves_the_default_fallback() {
    let config = hospital_config();
    let resolver = Arc::new(StaticServiceResolver::from_backends(&config.backends));
    let upstream = MockUpstream::default().shared();
    let gateway = Gateway::builder(config, upstream.clone())
        .resolver(resolver.clone())
        .build()
        .unwrap();

    resolver.update("users-service", Vec::<String>::new());
    let resp = gateway
        .handle(request(HttpMethod::Get, "/api/auth/me", None))
        .await;

    assert_eq!(resp.status, 503);
    let body = json_body(&resp);
    assert_eq!(body["error"], "Service Unavailable");
    assert_eq!(body["service"], "users-service");
    assert_eq!(upstream.calls(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// § 5  Retry and timeouts
// ─────────────────────────────────────────────────────────────────────────────

fn retrying_config() -> GatewayConfig {
    GatewayConfig::new("medley-test", common::auth())
        .with_backend(BackendConfig::new("inventory-service", ["http://inventory:9100"]))
        .with_route(
            RouteConfig::new("inventory", "/api/inventory/**", "inventory-service")
                .with_retry(RetrySpec::new(2, 10, 100))
                .with_timeout_ms(200),
        )
}

#[tokio::test(start_paused = true)]
async fn get_is_retried_until_it_succeeds() {
    let upstream = MockUpstream::default()
        .with_script([MockReply::status(500), MockReply::status(500)]);
    let h = Harness::new(retrying_config(), upstream);

    let resp = h.get("/api/inventory/items", None).await;

    assert_eq!(resp.status, 200);
    assert_eq!(h.upstream.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn post_is_not_retried() {
    let upstream = MockUpstream::default().with_script([MockReply::status(500)]);
    let h = Harness::new(retrying_config(), upstream);

    let resp = h
        .send(request(HttpMethod::Post, "/api/inventory/items", None))
        .await;

    assert_eq!(resp.status, 502);
    assert_eq!(json_body(&resp)["error"], "Bad Gateway");
    assert_eq!(h.upstream.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_backend_times_out_with_504() {
    let h = Harness::new(retrying_config(), MockUpstream::new(MockReply::Hang));

    let resp = h.get("/api/inventory/items", None).await;

    assert_eq!(resp.status, 504);
    assert_eq!(json_body(&resp)["error"], "Gateway Timeout");
    assert_eq!(h.upstream.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn connect_errors_exhaust_into_502() {
    let h = Harness::new(retrying_config(), MockUpstream::new(MockReply::ConnectError));

    let resp = h.get("/api/inventory/items", None).await;

    assert_eq!(resp.status, 502);
    assert_eq!(h.upstream.calls(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// § 6  CORS
// ─────────────────────────────────────────────────────────────────────────────

fn cors_harness() -> Harness {
    Harness::new(
        hospital_config().with_cors(CorsConfig::allowing(["https://app.medley.test"])),
        MockUpstream::default(),
    )
}

#[tokio::test]
async fn preflight_is_answered_by_the_gateway() {
    let h = cors_harness();
    let req = request(HttpMethod::Options, "/api/users/7", None)
        .with_header("Origin", "https://app.medley.test")
        .with_header("Access-Control-Request-Method", "GET");

    let resp = h.send(req).await;

    assert_eq!(resp.status, 204);
    assert_eq!(
        resp.headers["access-control-allow-origin"],
        "https://app.medley.test"
    );
    assert!(resp.headers["access-control-allow-methods"].contains("GET"));
    assert_eq!(resp.headers["access-control-max-age"], "3600");
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn disallowed_origin_is_403() {
    let h = cors_harness();
    let req = request(HttpMethod::Get, "/api/auth/me", None)
        .with_header("Origin", "https://evil.test");

    let resp = h.send(req).await;

    assert_eq!(resp.status, 403);
    assert_eq!(h.upstream.calls(), 0);
}

#[tokio::test]
async fn allowed_origin_is_echoed_on_proxied_responses() {
    let h = cors_harness();
    let req = request(HttpMethod::Get, "/api/auth/me", None)
        .with_header("Origin", "https://app.medley.test");

    let resp = h.send(req).await;

    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.headers["access-control-allow-origin"],
        "https://app.medley.test"
    );
    assert_eq!(resp.headers["vary"], "Origin");
}

// ─────────────────────────────────────────────────────────────────────────────
// § 7  Failure isolation and reload
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn panic_becomes_500_and_the_gateway_keeps_serving() {
    let h = Harness::hospital(MockUpstream::default().with_script([MockReply::Panic]));

    let resp = h.get("/api/auth/me", None).await;
    assert_eq!(resp.status, 500);
    assert_eq!(json_body(&resp)["message"], "An unexpected error occurred");
    assert!(resp.headers.contains_key("x-request-id"));

    assert_eq!(h.get("/api/auth/me", None).await.status, 200);
}

#[tokio::test]
async fn valid_reload_swaps_routes() {
    let h = Harness::hospital(MockUpstream::default());
    assert_eq!(h.get("/api/reports/daily", None).await.status, 404);

    let next = hospital_config()
        .with_backend(BackendConfig::new("reports-service", ["http://reports:9000"]))
        .with_route(RouteConfig::new("reports", "/api/reports/**", "reports-service"));
    h.gateway.reload(next).unwrap();

    let resp = h.get("/api/reports/daily", None).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.backend_id, "reports-service");
}

#[tokio::test]
async fn invalid_reload_keeps_the_running_configuration() {
    let h = Harness::hospital(MockUpstream::default());

    let broken = hospital_config()
        .with_route(RouteConfig::new("dup", "/api/users", "users-service"));
    let err = h.gateway.reload(broken).unwrap_err();
    assert!(matches!(err, GatewayError::AmbiguousRoute(..)));

    let empty = GatewayConfig::new("medley-test", common::auth())
        .with_backend(BackendConfig::new("users-service", ["http://users:8081"]));
    assert_eq!(h.gateway.reload(empty).unwrap_err(), GatewayError::NoRoutes);

    assert_eq!(h.get("/api/auth/me", None).await.status, 200);
    assert_eq!(h.gateway.pipeline().config().routes.len(), 6);
}

#[tokio::test]
async fn reload_starts_rate_limits_afresh() {
    let h = Harness::hospital(MockUpstream::default());
    let token = h.token(&["PLANNING"]);
    for _ in 0..10 {
        h.get("/api/planning/shifts", Some(&token)).await;
    }
    assert_eq!(h.get("/api/planning/shifts", Some(&token)).await.status, 429);

    h.gateway.reload(hospital_config()).unwrap();

    assert_eq!(h.get("/api/planning/shifts", Some(&token)).await.status, 200);
}
