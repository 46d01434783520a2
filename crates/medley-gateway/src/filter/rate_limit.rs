//! Per-route token-bucket admission filter.
//!
//! Runs after authentication, so rejected credentials never consume tokens,
//! and before the breaker gate, so throttled requests are not counted as
//! backend failures.

use std::sync::Arc;

use async_trait::async_trait;
use medley_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayFilter, RequestError,
};
use tracing::warn;

use crate::resilience::RateLimiterRegistry;

pub struct RateLimitFilter {
    limiters: Arc<RateLimiterRegistry>,
}

impl RateLimitFilter {
    pub fn new(limiters: Arc<RateLimiterRegistry>) -> Self {
        Self { limiters }
    }
}

#[async_trait]
impl GatewayFilter for RateLimitFilter {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::RATE_LIMIT
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        let Some(route_id) = ctx.route_match.as_ref().map(|m| m.route_id().to_string()) else {
            return FilterAction::Continue;
        };
        let Some(admission) = self.limiters.try_acquire(&route_id) else {
            return FilterAction::Continue;
        };

        ctx.response_headers
            .insert("x-ratelimit-limit".into(), admission.limit.to_string());
        ctx.response_headers
            .insert("x-ratelimit-remaining".into(), admission.remaining.to_string());

        if admission.allowed {
            FilterAction::Continue
        } else {
            warn!(request_id = %ctx.request.id, route = %route_id, "rate limit exceeded");
            FilterAction::Reject(RequestError::RateLimited { route: route_id })
        }
    }
}
