//! Rate limiting, circuit breaking, retry and fallback.

pub mod circuit_breaker;
pub mod fallback;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{
    BreakerOpen, BreakerSnapshot, CircuitBreaker, CircuitBreakerRegistry, CircuitState,
};
pub use rate_limiter::{Admission, RateLimiterRegistry, TokenBucket};
