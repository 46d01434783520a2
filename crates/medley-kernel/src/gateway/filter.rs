//! Gateway filter trait and ordering slots.
//!
//! A filter pipeline is an ordered list of [`GatewayFilter`] instances applied
//! to every request and response. Filters are sorted by their declared
//! [`FilterOrder`] and executed in ascending order on the request path
//! (lowest value first) and descending order on the response path.
//!
//! ```text
//! Request  ──► Cors ──► Routing ──► Auth ──► Authorize ──► RateLimit ──► Circuit ──► Logging
//!                  (resolver + retry-wrapped forward happen here)
//! Response ◄── Cors ◄── ... ◄── Logging
//! ```
//!
//! The response path runs for *every* response, including those produced by
//! a short-circuiting filter, so CORS and rate-limit headers are attached to
//! rejections too.

use super::error::RequestError;
use super::types::{GatewayContext, GatewayResponse};
use async_trait::async_trait;

// ─────────────────────────────────────────────────────────────────────────────
// Filter ordering
// ─────────────────────────────────────────────────────────────────────────────

/// Numeric ordering slot for a filter in the pipeline.
///
/// Filters with equal order values keep their registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FilterOrder(pub u32);

impl FilterOrder {
    /// CORS and preflight handling; runs before routing.
    pub const PRE_AUTH: FilterOrder = FilterOrder(0);
    /// Route table lookup.
    pub const ROUTING: FilterOrder = FilterOrder(50);
    /// Token verification.
    pub const AUTH: FilterOrder = FilterOrder(100);
    /// Role check against the matched route.
    pub const AUTHORIZE: FilterOrder = FilterOrder(150);
    /// Per-route admission control.
    pub const RATE_LIMIT: FilterOrder = FilterOrder(200);
    /// Per-backend circuit breaker gate.
    pub const CIRCUIT: FilterOrder = FilterOrder(300);
    /// Access logging, after every gate has passed.
    pub const LOGGING: FilterOrder = FilterOrder(400);
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter action
// ─────────────────────────────────────────────────────────────────────────────

/// Instruction returned by [`GatewayFilter::on_request`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FilterAction {
    /// Pass the (possibly modified) context to the next filter or the backend.
    Continue,
    /// Short-circuit with an error response rendered from the outcome.
    Reject(RequestError),
    /// Short-circuit with a ready-made response (preflight, fallback).
    Respond(GatewayResponse),
}

impl FilterAction {
    pub fn is_continue(&self) -> bool {
        matches!(self, FilterAction::Continue)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayFilter trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for a single filter in the gateway pipeline.
///
/// Implementations must be `Send + Sync` so they can be shared across Tokio
/// tasks without additional synchronization by the caller.
#[async_trait]
pub trait GatewayFilter: Send + Sync {
    /// Stable, human-readable identifier for this filter (used in logs).
    fn name(&self) -> &str;

    /// Position in the pipeline. Lower values execute first on the request
    /// path.
    fn order(&self) -> FilterOrder;

    /// Called with the inbound request *before* it is forwarded.
    ///
    /// Implementations may mutate `ctx` (set the route match or principal,
    /// remove sensitive headers). Return [`FilterAction::Continue`] to
    /// proceed or another variant to short-circuit.
    async fn on_request(&self, ctx: &mut GatewayContext) -> FilterAction;

    /// Called with the final response *before* it is returned to the caller.
    async fn on_response(&self, _ctx: &GatewayContext, _resp: &mut GatewayResponse) {}
}
