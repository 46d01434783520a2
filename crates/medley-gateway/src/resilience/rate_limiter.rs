//! Per-route token buckets.
//!
//! Token counts are integers in millionths of a token. The bucket remembers
//! its level at an anchor instant and derives the current level from the
//! time since that anchor, so frequent polling never accumulates rounding
//! error. Only a successful acquire moves the anchor. Refill and consume
//! happen under the bucket's own lock, so concurrent callers on the same
//! route never over-admit and different routes never contend.

use std::collections::HashMap;
use std::sync::Arc;

use medley_kernel::Clock;
use medley_kernel::gateway::{RateLimitSpec, RouteConfig};
use parking_lot::Mutex;

/// Fixed-point units per whole token.
const SCALE: u64 = 1_000_000;

/// Result of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Bucket capacity, for `x-ratelimit-limit`.
    pub limit: u32,
    /// Whole tokens left after this attempt.
    pub remaining: u32,
}

struct BucketState {
    /// Level at `anchor_ms`, in units of `1 / SCALE` tokens.
    units: u64,
    anchor_ms: u64,
}

/// A single token bucket. Starts full.
pub struct TokenBucket {
    capacity: u32,
    /// Refill rate in units per second, at least one.
    refill_units_per_second: u64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    pub fn new(spec: &RateLimitSpec, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        let refill = (spec.refill_per_second * SCALE as f64).round();
        Self {
            capacity: spec.capacity,
            refill_units_per_second: (refill as u64).max(1),
            state: Mutex::new(BucketState {
                units: u64::from(spec.capacity) * SCALE,
                anchor_ms: now,
            }),
            clock,
        }
    }

    fn max_units(&self) -> u64 {
        u64::from(self.capacity) * SCALE
    }

    /// Level at `now_ms`, capped at capacity.
    fn level(&self, state: &BucketState, now_ms: u64) -> u64 {
        let elapsed = u128::from(now_ms.saturating_sub(state.anchor_ms));
        let refilled = elapsed * u128::from(self.refill_units_per_second) / 1_000;
        let level = u128::from(state.units) + refilled;
        level.min(u128::from(self.max_units())) as u64
    }

    /// Refill, then take one token if at least one is available.
    pub fn try_acquire(&self) -> Admission {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        let level = self.level(&state, now);
        let allowed = level >= SCALE;
        let left = if allowed {
            state.units = level - SCALE;
            state.anchor_ms = now;
            state.units
        } else {
            level
        };
        Admission {
            allowed,
            limit: self.capacity,
            remaining: (left / SCALE) as u32,
        }
    }

    /// Current token count, including refill accrued since the last acquire.
    pub fn available(&self) -> f64 {
        let state = self.state.lock();
        self.level(&state, self.clock.now_millis()) as f64 / SCALE as f64
    }
}

/// Buckets for every rate-limited route, built once per configuration.
#[derive(Default)]
pub struct RateLimiterRegistry {
    buckets: HashMap<String, TokenBucket>,
}

impl RateLimiterRegistry {
    pub fn from_routes<'a, I>(routes: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = &'a RouteConfig>,
    {
        let buckets = routes
            .into_iter()
            .filter_map(|route| {
                let spec = route.rate_limit.as_ref()?;
                Some((route.id.clone(), TokenBucket::new(spec, clock.clone())))
            })
            .collect();
        Self { buckets }
    }

    /// `None` when the route has no limit.
    pub fn try_acquire(&self, route_id: &str) -> Option<Admission> {
        self.buckets.get(route_id).map(TokenBucket::try_acquire)
    }

    pub fn bucket(&self, route_id: &str) -> Option<&TokenBucket> {
        self.buckets.get(route_id)
    }
}
