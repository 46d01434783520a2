//! Route table lookup.

use std::sync::Arc;

use async_trait::async_trait;
use medley_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayFilter, GatewayRouter, RequestError,
};
use tracing::debug;

use crate::router::PrefixRouter;

/// Resolves the request against the route table and records the match in
/// the context. No match is a `404` and nothing further runs.
pub struct RoutingFilter {
    router: Arc<PrefixRouter>,
}

impl RoutingFilter {
    pub fn new(router: Arc<PrefixRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl GatewayFilter for RoutingFilter {
    fn name(&self) -> &str {
        "routing"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::ROUTING
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        let target = match &ctx.request.query {
            Some(q) => format!("{}?{}", ctx.request.path, q),
            None => ctx.request.path.clone(),
        };
        match self.router.resolve(&target, &ctx.request.method) {
            Some(m) => {
                debug!(
                    request_id = %ctx.request.id,
                    route = m.route_id(),
                    backend = m.backend_id(),
                    forward_path = %m.forward_path,
                    "route matched"
                );
                ctx.route_match = Some(m);
                FilterAction::Continue
            }
            None => FilterAction::Reject(RequestError::RouteNotFound {
                path: ctx.request.path.clone(),
            }),
        }
    }
}
