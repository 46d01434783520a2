//! Bounded retry with exponential backoff.
//!
//! Each attempt's outcome is reported to the backend's breaker. A breaker
//! that leaves CLOSED mid-sequence ends the retries, and a half-open trial is
//! never retried.

use std::future::Future;
use std::time::Duration;

use medley_kernel::gateway::{CallMode, GatewayResponse, HttpMethod, RequestError, RetrySpec};
use rand::Rng;
use tracing::{debug, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::backend::UpstreamError;

/// Delay before retry number `retry` (0-based):
/// `min(max_backoff, min_backoff * 2^retry)`. With jitter the delay is drawn
/// uniformly from `[d/2, d]`.
pub fn backoff_delay(spec: &RetrySpec, retry: u32) -> Duration {
    let base = spec
        .min_backoff_ms
        .saturating_mul(2u64.saturating_pow(retry))
        .min(spec.max_backoff_ms);
    let ms = if spec.jitter && base > 1 {
        let half = base / 2;
        half + rand::thread_rng().gen_range(0..=base - half)
    } else {
        base
    };
    Duration::from_millis(ms)
}

/// How many attempts a call gets.
pub fn attempt_budget(mode: CallMode, spec: &RetrySpec, method: &HttpMethod) -> u32 {
    match mode {
        CallMode::Trial => 1,
        CallMode::Normal if spec.is_retryable(method) => spec.max_retries.saturating_add(1),
        CallMode::Normal => 1,
    }
}

enum Failure {
    Timeout,
    Failed(String),
}

/// Run `attempt` until it yields a non-5xx response or the budget runs out.
///
/// `attempt` receives the 0-based attempt number. The final failure maps to
/// [`RequestError::UpstreamTimeout`] or [`RequestError::UpstreamFailed`].
pub async fn execute<F, Fut>(
    backend: &str,
    mode: CallMode,
    spec: &RetrySpec,
    method: &HttpMethod,
    breaker: Option<&CircuitBreaker>,
    mut attempt: F,
) -> Result<GatewayResponse, RequestError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<GatewayResponse, UpstreamError>>,
{
    let budget = attempt_budget(mode, spec, method);
    let mut made = 0;
    let mut last = Failure::Failed("no attempt was made".to_string());

    while made < budget {
        if made > 0 {
            let delay = backoff_delay(spec, made - 1);
            debug!(backend, attempt = made + 1, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::time::sleep(delay).await;
        }

        let outcome = attempt(made).await;
        made += 1;

        match outcome {
            Ok(resp) if !resp.is_server_error() => {
                if let Some(b) = breaker {
                    b.record_success(mode);
                }
                return Ok(resp);
            }
            Ok(resp) => {
                last = Failure::Failed(format!("backend responded with status {}", resp.status));
            }
            Err(UpstreamError::Timeout(after)) => {
                last = Failure::Timeout;
                debug!(backend, after_ms = after.as_millis() as u64, "attempt timed out");
            }
            Err(err) => {
                last = Failure::Failed(err.to_string());
            }
        }

        if let Some(b) = breaker {
            b.record_failure(mode);
            if mode == CallMode::Normal && b.state() != CircuitState::Closed {
                break;
            }
        }
    }

    warn!(backend, attempts = made, "upstream call failed");
    Err(match last {
        Failure::Timeout => RequestError::UpstreamTimeout {
            backend: backend.to_string(),
            attempts: made,
        },
        Failure::Failed(reason) => RequestError::UpstreamFailed {
            backend: backend.to_string(),
            reason,
            attempts: made,
        },
    })
}
