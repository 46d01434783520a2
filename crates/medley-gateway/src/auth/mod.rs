//! Authentication and role-based authorization.
//!
//! [`TokenVerifier`] turns a bearer credential into [`Claims`]; [`authorize`]
//! decides whether the resulting [`Principal`] may use a route.

mod token;

pub use token::{Claims, TokenError, TokenIssuer, TokenVerifier, UserId};

use medley_kernel::gateway::{Principal, RouteConfig};

/// Canonical form used for role comparison: uppercase, without a `ROLE_`
/// prefix. `role_admin`, `ADMIN` and `ROLE_ADMIN` are the same role.
pub fn normalize_role(role: &str) -> String {
    let upper = role.trim().to_ascii_uppercase();
    match upper.strip_prefix("ROLE_") {
        Some(rest) => rest.to_string(),
        None => upper,
    }
}

/// `true` when the route is public or the principal holds at least one of
/// its required roles.
pub fn authorize(principal: Option<&Principal>, route: &RouteConfig) -> bool {
    if route.is_public() {
        return true;
    }
    let Some(principal) = principal else {
        return false;
    };
    principal.roles.iter().any(|held| {
        let held = normalize_role(held);
        route
            .required_roles
            .iter()
            .any(|required| normalize_role(required) == held)
    })
}
