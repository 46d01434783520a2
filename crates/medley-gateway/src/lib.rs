//! `medley-gateway`: Medley API Gateway runtime.
//!
//! This crate provides the concrete implementations of the gateway kernel
//! contracts defined in `medley-kernel::gateway`:
//!
//! | Kernel contract | Implementation |
//! |----------------|----------------|
//! | [`GatewayRouter`](gateway::GatewayRouter) | [`router::PrefixRouter`] |
//! | [`ServiceResolver`](gateway::ServiceResolver) | [`backend::StaticServiceResolver`] |
//! | [`GatewayFilter`](gateway::GatewayFilter) | [`filter::CorsFilter`], [`filter::RoutingFilter`], [`filter::AuthFilter`], [`filter::AuthorizeFilter`], [`filter::RateLimitFilter`], [`filter::CircuitBreakerFilter`], [`filter::LoggingFilter`] |
//!
//! [`proxy::Gateway`] runs the filters and forwards admitted requests with
//! retry and circuit breaking; [`server`] puts it behind axum.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use medley_gateway::backend::HttpUpstream;
//! use medley_gateway::proxy::Gateway;
//! use medley_gateway::gateway::{AuthConfig, BackendConfig, GatewayConfig, RouteConfig};
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let config = GatewayConfig::new("medley", AuthConfig::new(std::env::var("JWT_SECRET")?))
//!         .with_backend(BackendConfig::new("users-service", ["http://127.0.0.1:8081"]))
//!         .with_route(RouteConfig::new("auth", "/api/auth/**", "users-service"))
//!         .with_route(
//!             RouteConfig::new("users", "/api/users/**", "users-service")
//!                 .with_required_roles(["USER", "ADMIN"]),
//!         );
//!
//!     let upstream = Arc::new(HttpUpstream::new(Duration::from_secs(5))?);
//!     let gateway = Arc::new(Gateway::builder(config, upstream).build()?);
//!     medley_gateway::server::serve(gateway, "0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backend;
pub mod error;
pub mod filter;
pub mod proxy;
pub mod resilience;
pub mod router;
pub mod server;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export the kernel gateway types for convenience.
pub use medley_kernel::gateway;
