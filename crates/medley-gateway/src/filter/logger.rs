//! Structured access-logging filter.
//!
//! Records inbound requests that passed every gate and every outbound
//! response, with route, status, backend and latency.

use std::sync::Arc;

use async_trait::async_trait;
use medley_kernel::Clock;
use medley_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayFilter, GatewayResponse,
};
use tracing::{error, info, warn};

/// Context attribute holding the request's start time in clock millis.
pub const STARTED_AT_ATTR: &str = "gateway.started_at_ms";

/// Records inbound requests and outbound responses.
pub struct LoggingFilter {
    clock: Arc<dyn Clock>,
}

impl LoggingFilter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl GatewayFilter for LoggingFilter {
    fn name(&self) -> &str {
        "access-log"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::LOGGING
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        info!(
            request_id = %ctx.request.id,
            method     = ctx.request.method.as_str(),
            path       = %ctx.request.path,
            route      = ctx.route_match.as_ref().map(|m| m.route_id()),
            user       = ctx.principal.as_ref().map(|p| p.username.as_str()),
            "inbound request"
        );
        FilterAction::Continue
    }

    async fn on_response(&self, ctx: &GatewayContext, resp: &mut GatewayResponse) {
        let started: u64 = ctx
            .get_attr(STARTED_AT_ATTR)
            .unwrap_or_else(|| self.clock.now_millis());
        let elapsed = self.clock.now_millis().saturating_sub(started);
        let route = ctx.route_match.as_ref().map(|m| m.route_id());

        if resp.status >= 500 {
            error!(
                request_id = %ctx.request.id,
                path       = %ctx.request.path,
                route,
                status     = resp.status,
                backend    = %resp.backend_id,
                latency_ms = elapsed,
                "outbound error response"
            );
        } else if resp.status >= 400 {
            warn!(
                request_id = %ctx.request.id,
                path       = %ctx.request.path,
                route,
                status     = resp.status,
                backend    = %resp.backend_id,
                latency_ms = elapsed,
                "outbound client error"
            );
        } else {
            info!(
                request_id = %ctx.request.id,
                path       = %ctx.request.path,
                route,
                status     = resp.status,
                backend    = %resp.backend_id,
                latency_ms = elapsed,
                "outbound response"
            );
        }
        resp.latency_ms = elapsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use medley_kernel::gateway::{GatewayRequest, HttpMethod};

    #[tokio::test]
    async fn latency_is_measured_from_start_attribute() {
        let clock = Arc::new(ManualClock::new(5_000));
        let filter = LoggingFilter::new(clock.clone());
        let mut ctx = GatewayContext::new(GatewayRequest::new("r", "/", HttpMethod::Get));
        ctx.set_attr(STARTED_AT_ATTR, &5_000_u64);

        assert!(filter.on_request(&mut ctx).await.is_continue());
        clock.advance_ms(42);
        let mut resp = GatewayResponse::new(200, "svc");
        filter.on_response(&ctx, &mut resp).await;
        assert_eq!(resp.latency_ms, 42);
    }
}
