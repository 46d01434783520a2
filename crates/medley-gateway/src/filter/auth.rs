//! Bearer token authentication.
//!
//! Public routes skip verification entirely; a token sent to one is
//! ignored. On protected routes the token must verify and be of the kind
//! the route expects, otherwise the request ends with `401`.

use async_trait::async_trait;
use medley_kernel::gateway::{
    FilterAction, FilterOrder, GatewayContext, GatewayFilter, RequestError,
};
use tracing::warn;

use crate::auth::TokenVerifier;

pub struct AuthFilter {
    verifier: TokenVerifier,
}

impl AuthFilter {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl GatewayFilter for AuthFilter {
    fn name(&self) -> &str {
        "auth"
    }

    fn order(&self) -> FilterOrder {
        FilterOrder::AUTH
    }

    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction {
        let Some(route) = ctx.route_match.as_ref().map(|m| m.route.clone()) else {
            return FilterAction::Reject(RequestError::Internal(
                "authentication ran before routing".to_string(),
            ));
        };
        if route.is_public() {
            return FilterAction::Continue;
        }

        let Some(token) = ctx.request.bearer_token() else {
            warn!(request_id = %ctx.request.id, route = %route.id, "missing bearer token");
            return FilterAction::Reject(RequestError::Unauthenticated(
                "Missing or invalid Authorization header".to_string(),
            ));
        };

        match self.verifier.verify(token, route.token_kind) {
            Ok(claims) => {
                ctx.principal = Some(claims.principal());
                FilterAction::Continue
            }
            Err(err) => {
                warn!(
                    request_id = %ctx.request.id,
                    route = %route.id,
                    error = %err,
                    "token rejected"
                );
                FilterAction::Reject(RequestError::Unauthenticated(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIssuer;
    use crate::testing::ManualClock;
    use medley_kernel::gateway::{
        AuthConfig, GatewayRequest, HttpMethod, Principal, RouteConfig, RouteMatch, TokenKind,
    };
    use std::sync::Arc;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn setup() -> (AuthFilter, TokenIssuer) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = AuthConfig::new(SECRET);
        (
            AuthFilter::new(TokenVerifier::new(&config, clock.clone())),
            TokenIssuer::new(&config, clock),
        )
    }

    fn ctx(route: RouteConfig, auth: Option<String>) -> GatewayContext {
        let mut req = GatewayRequest::new("r", "/api/users", HttpMethod::Get);
        if let Some(a) = auth {
            req = req.with_header("Authorization", a);
        }
        let mut ctx = GatewayContext::new(req);
        ctx.route_match = Some(RouteMatch {
            route: Arc::new(route),
            forward_path: "/api/users".into(),
        });
        ctx
    }

    fn protected() -> RouteConfig {
        RouteConfig::new("users", "/api/users", "users-service").with_required_roles(["USER"])
    }

    fn ana() -> Principal {
        Principal {
            user_id: "7".into(),
            username: "ana".into(),
            email: "ana@medley.test".into(),
            roles: ["USER".to_string()].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn valid_token_sets_principal() {
        let (filter, issuer) = setup();
        let token = issuer.issue(&ana(), TokenKind::Access).unwrap();
        let mut c = ctx(protected(), Some(format!("Bearer {token}")));
        assert!(filter.on_request(&mut c).await.is_continue());
        assert_eq!(c.principal, Some(ana()));
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated() {
        let (filter, _) = setup();
        let mut c = ctx(protected(), None);
        assert!(matches!(
            filter.on_request(&mut c).await,
            FilterAction::Reject(RequestError::Unauthenticated(_))
        ));
        assert!(c.principal.is_none());
    }

    #[tokio::test]
    async fn refresh_token_on_access_route_is_unauthenticated() {
        let (filter, issuer) = setup();
        let token = issuer.issue(&ana(), TokenKind::Refresh).unwrap();
        let mut c = ctx(protected(), Some(format!("Bearer {token}")));
        assert!(matches!(
            filter.on_request(&mut c).await,
            FilterAction::Reject(RequestError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn public_route_ignores_garbage_token() {
        let (filter, _) = setup();
        let public = RouteConfig::new("login", "/api/auth", "users-service");
        let mut c = ctx(public, Some("Bearer not-a-token".into()));
        assert!(filter.on_request(&mut c).await.is_continue());
        assert!(c.principal.is_none());
    }
}
