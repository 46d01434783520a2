//! Circuit breaker gate.
//!
//! Asks the backend's breaker for admission and records how the call was
//! admitted. An open circuit is answered with the fallback payload; the
//! backend is not contacted.

use std::sync::Arc;

use async_trait::async_trait;
use medley_kernel::Clock;
use medley_kernel::gateway::{
    CallMode, FilterAction, FilterOrder, GatewayConfig, GatewayContext, GatewayFilter,
    RequestError,
};
use tracing::info;

use crate::resilience::{CircuitBreakerRegistry, fallback};

pub struct CircuitBreakerFilter {
    breakers: Arc<CircuitBreakerRegistry>,
    config: Arc<GatewayConfig>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerFilter {
    pub fn new(
        breakers: Arc<CircuitBreakerRegistry>,
        config: Arc<GatewayConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            breakers,
            config,
            clock,
        }
    }
}

#[async_trait]
impl GatewayFilter for CircuitBreakerFilter {
    fn name(&self) -> &str {
        "circuit-breaker"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::CIRCUIT
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        let Some(route) = ctx.route_match.as_ref().map(|m| m.route.clone()) else {
            return FilterAction::Reject(RequestError::Internal(
                "circuit gate ran before routing".to_string(),
            ));
        };
        let Some(breaker) = self.breakers.get(&route.backend) else {
            ctx.call_mode = Some(CallMode::Normal);
            return FilterAction::Continue;
        };

        match breaker.try_acquire() {
            Ok(mode) => {
                ctx.call_mode = Some(mode);
                FilterAction::Continue
            }
            Err(open) => {
                info!(
                    request_id = %ctx.request.id,
                    backend = %open.backend,
                    "circuit open, serving fallback"
                );
                FilterAction::Respond(fallback::render(
                    &route,
                    self.config.backend(&route.backend),
                    self.config.default_fallback.as_ref(),
                    &format!("Service '{}' is temporarily unavailable", route.backend),
                    self.clock.now_millis(),
                ))
            }
        }
    }
}
