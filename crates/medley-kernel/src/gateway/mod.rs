//! Gateway kernel contract.
//!
//! This module defines the *trait interfaces and configuration types* for
//! the Medley API gateway. No concrete implementations live here; those
//! belong in `medley-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              medley-kernel  (this module)                   │
//! │  GatewayRouter trait    ServiceResolver trait               │
//! │  GatewayFilter trait    GatewayConfig + validate()          │
//! │  GatewayRequest/Response/Context  GatewayError/RequestError │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              medley-gateway  (runtime crate)                │
//! │  PrefixRouter: impl GatewayRouter                           │
//! │  StaticServiceResolver: impl ServiceResolver                │
//! │  Cors / Routing / Auth / Authorize / RateLimit / Circuit    │
//! │  Gateway core (retry + forward)  axum server                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use medley_kernel::gateway::{AuthConfig, BackendConfig, GatewayConfig, RouteConfig};
//!
//! let config = GatewayConfig::new("medley", AuthConfig::new("0123456789abcdef0123456789abcdef"))
//!     .with_backend(BackendConfig::new("users-service", ["http://127.0.0.1:8081"]))
//!     .with_route(RouteConfig::new("login", "/api/auth/**", "users-service"))
//!     .with_route(
//!         RouteConfig::new("users", "/api/users/**", "users-service")
//!             .with_required_roles(["USER", "ADMIN"]),
//!     );
//!
//! config.validate().expect("gateway config is valid");
//! ```

pub mod error;
pub mod filter;
pub mod policy;
pub mod resolver;
pub mod router;
pub mod validation;

// ── Flat re-exports ────────────────────────────────────────────────────────

pub use error::{GatewayError, RequestError};
pub use filter::{FilterAction, FilterOrder, GatewayFilter};
pub use policy::{CircuitBreakerSpec, FallbackSpec, RateLimitSpec, RetrySpec};
pub use resolver::{BackendConfig, ServiceResolver};
pub use router::{GatewayRouter, RouteConfig};
pub use validation::{AuthConfig, CorsConfig, GatewayConfig};

// types module is pub so implementors in medley-gateway can use the structs
pub mod types;
pub use types::{
    CallMode, GatewayContext, GatewayRequest, GatewayResponse, Headers, HttpMethod, Principal,
    RouteMatch, TokenKind,
};
