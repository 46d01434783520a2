//! `medley-kernel`: contracts for the Medley API gateway.
//!
//! The kernel owns the *shape* of the request pipeline: traits, request and
//! response types, route policy and the gateway configuration with its
//! validation rules. Concrete behaviour (token verification, rate limiting,
//! circuit breaking, forwarding) lives in `medley-gateway`.

pub mod clock;

#[cfg(feature = "config")]
pub mod config;

pub mod gateway;

pub use clock::{Clock, SystemClock};
