//! Filter module.
//!
//! Every gate a request passes before being forwarded is a
//! [`GatewayFilter`]. [`FilterPipeline`] sorts them by their declared
//! [`FilterOrder`](medley_kernel::gateway::FilterOrder) and runs them.

mod auth;
mod authorize;
mod circuit;
mod cors;
mod logger;
mod rate_limit;
mod routing;

pub use auth::AuthFilter;
pub use authorize::AuthorizeFilter;
pub use circuit::CircuitBreakerFilter;
pub use cors::CorsFilter;
pub use logger::{LoggingFilter, STARTED_AT_ATTR};
pub use rate_limit::RateLimitFilter;
pub use routing::RoutingFilter;

use medley_kernel::gateway::{FilterAction, GatewayContext, GatewayFilter, GatewayResponse};
use std::sync::Arc;

/// Ordered list of boxed filters executed as a pipeline.
///
/// Filters are sorted by their order in ascending order (lowest value runs
/// first on the request path). The sort is stable, so filters sharing a slot
/// keep the order they were given in.
pub struct FilterPipeline {
    filters: Vec<Arc<dyn GatewayFilter>>,
}

impl FilterPipeline {
    /// Build a pipeline from a list of filters, sorted by their declared order.
    pub fn new(mut filters: Vec<Arc<dyn GatewayFilter>>) -> Self {
        filters.sort_by_key(|f| f.order());
        Self { filters }
    }

    /// Run all filters' `on_request` hooks in ascending order.
    ///
    /// Short-circuits on the first action that is not `Continue`.
    pub async fn run_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        for filter in &self.filters {
            match filter.on_request(ctx).await {
                FilterAction::Continue => {}
                other => return other,
            }
        }
        FilterAction::Continue
    }

    /// Run all filters' `on_response` hooks in descending order
    /// (outermost filter last, so it sees the final response).
    pub async fn run_response(&self, ctx: &GatewayContext, resp: &mut GatewayResponse) {
        for filter in self.filters.iter().rev() {
            filter.on_response(ctx, resp).await;
        }
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medley_kernel::gateway::{FilterOrder, GatewayRequest, HttpMethod, RequestError};
    use parking_lot::Mutex;

    struct Probe {
        name: &'static str,
        order: u32,
        action: FilterAction,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl GatewayFilter for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn order(&self) -> FilterOrder {
            FilterOrder(self.order)
        }

        async fn on_request(&self, _ctx: &mut GatewayContext) -> FilterAction {
            self.log.lock().push(format!("req:{}", self.name));
            self.action.clone()
        }

        async fn on_response(&self, _ctx: &GatewayContext, _resp: &mut GatewayResponse) {
            self.log.lock().push(format!("resp:{}", self.name));
        }
    }

    fn recording(
        name: &'static str,
        order: u32,
        action: FilterAction,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn GatewayFilter> {
        Arc::new(Probe {
            name,
            order,
            action,
            log: log.clone(),
        })
    }

    fn ctx() -> GatewayContext {
        GatewayContext::new(GatewayRequest::new("r", "/", HttpMethod::Get))
    }

    #[tokio::test]
    async fn sorted_by_order_and_reversed_on_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = FilterPipeline::new(vec![
            recording("c", 300, FilterAction::Continue, &log),
            recording("a", 0, FilterAction::Continue, &log),
            recording("b", 100, FilterAction::Continue, &log),
        ]);
        assert_eq!(pipeline.names(), vec!["a", "b", "c"]);

        let mut c = ctx();
        assert!(pipeline.run_request(&mut c).await.is_continue());
        let mut resp = GatewayResponse::new(200, "svc");
        pipeline.run_response(&c, &mut resp).await;

        assert_eq!(
            *log.lock(),
            vec!["req:a", "req:b", "req:c", "resp:c", "resp:b", "resp:a"]
        );
    }

    #[tokio::test]
    async fn first_rejection_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = FilterPipeline::new(vec![
            recording("gate", 10, FilterAction::Reject(RequestError::Forbidden("no".into())), &log),
            recording("after", 20, FilterAction::Continue, &log),
        ]);
        let action = pipeline.run_request(&mut ctx()).await;
        assert!(matches!(action, FilterAction::Reject(RequestError::Forbidden(_))));
        assert_eq!(*log.lock(), vec!["req:gate"]);
    }
}
