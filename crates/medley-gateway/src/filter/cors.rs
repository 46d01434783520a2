//! CORS allow-list and preflight handling.
//!
//! A preflight is an `OPTIONS` request carrying
//! `Access-Control-Request-Method`; it is answered here with `204` and never
//! reaches routing. Requests from an origin outside the allow-list get `403`.
//! With an empty allow-list the filter does nothing.

use async_trait::async_trait;
use medley_kernel::gateway::{
    CorsConfig, FilterAction, FilterOrder, GatewayContext, GatewayFilter, GatewayResponse,
    HttpMethod, RequestError,
};
use tracing::debug;

pub struct CorsFilter {
    cors: CorsConfig,
}

impl CorsFilter {
    pub fn new(cors: CorsConfig) -> Self {
        Self { cors }
    }

    fn is_preflight(ctx: &GatewayContext) -> bool {
        ctx.request.method == HttpMethod::Options
            && ctx.request.header("access-control-request-method").is_some()
    }

    fn preflight_response(&self) -> GatewayResponse {
        let methods = self
            .cors
            .allowed_methods
            .iter()
            .map(HttpMethod::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        GatewayResponse::new(204, "gateway")
            .with_header("access-control-allow-methods", methods)
            .with_header(
                "access-control-allow-headers",
                self.cors.allowed_headers.join(", "),
            )
            .with_header("access-control-max-age", self.cors.max_age_secs.to_string())
    }
}

#[async_trait]
impl GatewayFilter for CorsFilter {
    fn name(&self) -> &str {
        "cors"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::PRE_AUTH
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        if !self.cors.is_enabled() {
            return FilterAction::Continue;
        }
        let Some(origin) = ctx.request.header("origin") else {
            return FilterAction::Continue;
        };
        if !self.cors.allows_origin(origin) {
            debug!(request_id = %ctx.request.id, origin, "origin not allowed");
            return FilterAction::Reject(RequestError::CorsRejected(origin.to_string()));
        }
        if Self::is_preflight(ctx) {
            return FilterAction::Respond(self.preflight_response());
        }
        FilterAction::Continue
    }

    async fn on_response(&self, ctx: &GatewayContext, resp: &mut GatewayResponse) {
        if !self.cors.is_enabled() {
            return;
        }
        let Some(origin) = ctx.request.header("origin") else {
            return;
        };
        if !self.cors.allows_origin(origin) {
            return;
        }
        resp.headers.insert("access-control-allow-origin", origin);
        resp.headers.append("vary", "Origin");
        if self.cors.allow_credentials {
            resp.headers.insert("access-control-allow-credentials", "true");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_kernel::gateway::GatewayRequest;

    fn filter() -> CorsFilter {
        CorsFilter::new(CorsConfig::allowing(["https://app.medley.test"]))
    }

    fn ctx(method: HttpMethod, origin: Option<&str>, preflight: bool) -> GatewayContext {
        let mut req = GatewayRequest::new("r", "/api/users", method);
        if let Some(o) = origin {
            req = req.with_header("Origin", o);
        }
        if preflight {
            req = req.with_header("Access-Control-Request-Method", "POST");
        }
        GatewayContext::new(req)
    }

    #[tokio::test]
    async fn preflight_from_allowed_origin_gets_204() {
        let f = filter();
        let mut c = ctx(HttpMethod::Options, Some("https://app.medley.test"), true);
        let FilterAction::Respond(mut resp) = f.on_request(&mut c).await else {
            panic!("expected preflight response");
        };
        f.on_response(&c, &mut resp).await;
        assert_eq!(resp.status, 204);
        assert!(resp.headers["access-control-allow-methods"].contains("POST"));
        assert_eq!(resp.headers["access-control-max-age"], "3600");
        assert_eq!(
            resp.headers["access-control-allow-origin"],
            "https://app.medley.test"
        );
    }

    #[tokio::test]
    async fn disallowed_origin_is_rejected() {
        let f = filter();
        let mut c = ctx(HttpMethod::Options, Some("https://evil.test"), true);
        assert!(matches!(
            f.on_request(&mut c).await,
            FilterAction::Reject(RequestError::CorsRejected(_))
        ));
        let mut c = ctx(HttpMethod::Get, Some("https://evil.test"), false);
        assert!(matches!(f.on_request(&mut c).await, FilterAction::Reject(_)));
    }

    #[tokio::test]
    async fn requests_without_origin_pass_untouched() {
        let f = filter();
        let mut c = ctx(HttpMethod::Options, None, true);
        assert!(f.on_request(&mut c).await.is_continue());
        let mut resp = GatewayResponse::new(200, "svc");
        f.on_response(&c, &mut resp).await;
        assert!(resp.headers.is_empty());
    }

    #[tokio::test]
    async fn plain_options_from_allowed_origin_is_forwarded() {
        let f = filter();
        let mut c = ctx(HttpMethod::Options, Some("https://app.medley.test"), false);
        assert!(f.on_request(&mut c).await.is_continue());
    }

    #[tokio::test]
    async fn empty_allow_list_disables_cors() {
        let f = CorsFilter::new(CorsConfig::default());
        let mut c = ctx(HttpMethod::Get, Some("https://anything.test"), false);
        assert!(f.on_request(&mut c).await.is_continue());
    }
}
