//! Role check against the matched route.

use async_trait::async_trait;
use medley_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayFilter, RequestError,
};
use tracing::warn;

use crate::auth::authorize;

#[derive(Default)]
pub struct AuthorizeFilter;

impl AuthorizeFilter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayFilter for AuthorizeFilter {
    fn name(&self) -> &str {
        "authorize"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTHORIZE
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        let Some(route) = ctx.route_match.as_ref().map(|m| &m.route) else {
            return FilterAction::Reject(RequestError::Internal(
                "authorization ran before routing".to_string(),
            ));
        };
        if authorize(ctx.principal.as_ref(), route) {
            return FilterAction::Continue;
        }
        warn!(
            request_id = %ctx.request.id,
            route = %route.id,
            user = ctx.principal.as_ref().map(|p| p.username.as_str()),
            "access denied"
        );
        FilterAction::Reject(RequestError::Forbidden(format!(
            "Access denied: requires one of roles [{}]",
            route.required_roles.join(", ")
        )))
    }
}
