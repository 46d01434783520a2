//! Per-backend circuit breaker.
//!
//! ```text
//!            failures >= threshold              open_duration elapsed
//!  CLOSED ─────────────────────────► OPEN ──────────────────────────► HALF_OPEN
//!    ▲                                 ▲                                  │
//!    │          trial succeeded        │        trial failed              │
//!    └─────────────────────────────────┼──────────────────────────────────┤
//!                                      └──────────────────────────────────┘
//! ```
//!
//! While HALF_OPEN exactly one caller holds the trial; everyone else is
//! answered with the fallback. Results of normal calls that complete after
//! the breaker left CLOSED are ignored so only the trial decides. A trial
//! that never reports is considered stale after one `open_duration` and the
//! next caller becomes the new trial.

use std::collections::HashMap;
use std::sync::Arc;

use medley_kernel::Clock;
use medley_kernel::gateway::{BackendConfig, CallMode, CircuitBreakerSpec};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Returned by [`CircuitBreaker::try_acquire`] when the call must not reach
/// the backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit for backend '{backend}' is {state:?}")]
pub struct BreakerOpen {
    pub backend: String,
    pub state: CircuitState,
}

/// Serializable view for the `/gateway/breakers` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub backend: String,
    pub enabled: bool,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub rejected: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at_ms: u64,
    trial_started_at_ms: Option<u64>,
    rejected: u64,
}

pub struct CircuitBreaker {
    backend: String,
    spec: CircuitBreakerSpec,
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(backend: impl Into<String>, spec: CircuitBreakerSpec, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: backend.into(),
            spec,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at_ms: 0,
                trial_started_at_ms: None,
                rejected: 0,
            }),
            clock,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Gate a call. `Ok(CallMode::Trial)` means the caller is the single
    /// half-open probe and must make exactly one attempt.
    pub fn try_acquire(&self) -> Result<CallMode, BreakerOpen> {
        if !self.spec.enabled {
            return Ok(CallMode::Normal);
        }
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Ok(CallMode::Normal),
            CircuitState::Open => {
                if now.saturating_sub(inner.opened_at_ms) >= self.spec.open_duration_ms {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started_at_ms = Some(now);
                    info!(backend = %self.backend, "circuit half-open, admitting trial call");
                    Ok(CallMode::Trial)
                } else {
                    inner.rejected += 1;
                    Err(self.open_error(CircuitState::Open))
                }
            }
            CircuitState::HalfOpen => {
                let stale = inner
                    .trial_started_at_ms
                    .is_none_or(|t| now.saturating_sub(t) >= self.spec.open_duration_ms);
                if stale {
                    inner.trial_started_at_ms = Some(now);
                    info!(backend = %self.backend, "previous trial went stale, admitting new trial");
                    Ok(CallMode::Trial)
                } else {
                    inner.rejected += 1;
                    Err(self.open_error(CircuitState::HalfOpen))
                }
            }
        }
    }

    /// 2xx, 3xx or 4xx from the backend.
    pub fn record_success(&self, mode: CallMode) {
        if !self.spec.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        match (inner.state, mode) {
            (CircuitState::Closed, CallMode::Normal) => inner.consecutive_failures = 0,
            (CircuitState::HalfOpen, CallMode::Trial) => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.trial_started_at_ms = None;
                info!(backend = %self.backend, "trial succeeded, circuit closed");
            }
            _ => {}
        }
    }

    /// Connection error, timeout, missing address or 5xx.
    pub fn record_failure(&self, mode: CallMode) {
        if !self.spec.enabled {
            return;
        }
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();
        match (inner.state, mode) {
            (CircuitState::Closed, CallMode::Normal) => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.spec.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at_ms = now;
                    warn!(
                        backend = %self.backend,
                        failures = inner.consecutive_failures,
                        open_ms = self.spec.open_duration_ms,
                        "circuit opened"
                    );
                }
            }
            (CircuitState::HalfOpen, CallMode::Trial) => {
                inner.state = CircuitState::Open;
                inner.opened_at_ms = now;
                inner.trial_started_at_ms = None;
                warn!(backend = %self.backend, "trial failed, circuit re-opened");
            }
            _ => {}
        }
    }

    /// Current state. An OPEN breaker whose timer has run out still reads
    /// OPEN until the next `try_acquire`.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            backend: self.backend.clone(),
            enabled: self.spec.enabled,
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            rejected: inner.rejected,
        }
    }

    fn open_error(&self, state: CircuitState) -> BreakerOpen {
        BreakerOpen {
            backend: self.backend.clone(),
            state,
        }
    }
}

/// One breaker per configured backend.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn from_backends<'a, I>(backends: I, clock: Arc<dyn Clock>) -> Self
    where
        I: IntoIterator<Item = &'a BackendConfig>,
    {
        let breakers = backends
            .into_iter()
            .map(|b| {
                let breaker = CircuitBreaker::new(&b.name, b.circuit_breaker.clone(), clock.clone());
                (b.name.clone(), Arc::new(breaker))
            })
            .collect();
        Self { breakers }
    }

    pub fn get(&self, backend: &str) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(backend)
    }

    /// Snapshots sorted by backend name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut out: Vec<_> = self.breakers.values().map(|b| b.snapshot()).collect();
        out.sort_by(|a, b| a.backend.cmp(&b.backend));
        out
    }
}
