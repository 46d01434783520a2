//! Test doubles: a hand-driven clock and a scripted upstream.
//!
//! Compiled for unit tests and behind the `testing` feature, so integration
//! tests and downstream crates can drive the gateway without a network or
//! wall-clock waits.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use medley_kernel::Clock;
use medley_kernel::gateway::GatewayResponse;
use parking_lot::Mutex;

use crate::backend::{UpstreamClient, UpstreamError, UpstreamRequest};

/// A [`Clock`] that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.advance_ms(u64::try_from(by.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn set_ms(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// One scripted upstream behaviour.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this status and body.
    Status(u16, String),
    /// Answer with this exact response, headers included.
    Response(GatewayResponse),
    /// Fail as if the connection was refused.
    ConnectError,
    /// Never answer; only the gateway's deadline ends the call.
    Hang,
    /// Panic inside the upstream call.
    Panic,
}

impl MockReply {
    pub fn ok(body: impl Into<String>) -> Self {
        MockReply::Status(200, body.into())
    }

    pub fn status(status: u16) -> Self {
        MockReply::Status(status, String::new())
    }
}

/// [`UpstreamClient`] that plays back queued replies, then the default one,
/// and remembers every call.
pub struct MockUpstream {
    script: Mutex<VecDeque<MockReply>>,
    default: MockReply,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, UpstreamRequest)>>,
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new(MockReply::ok("{\"ok\":true}"))
    }
}

impl MockUpstream {
    pub fn new(default: MockReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies served before falling back to the default.
    pub fn with_script<I>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = MockReply>,
    {
        self.script.lock().extend(replies);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(base_url, request)` for every call, in order.
    pub fn requests(&self) -> Vec<(String, UpstreamRequest)> {
        self.seen.lock().clone()
    }

    pub fn last_request(&self) -> Option<UpstreamRequest> {
        self.seen.lock().last().map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn send(
        &self,
        base_url: &str,
        req: &UpstreamRequest,
    ) -> Result<GatewayResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push((base_url.to_string(), req.clone()));
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match reply {
            MockReply::Status(status, body) => Ok(GatewayResponse::new(status, "")
                .with_header("content-type", "application/json")
                .with_body(body.into_bytes())),
            MockReply::Response(resp) => Ok(resp),
            MockReply::ConnectError => Err(UpstreamError::Connect("connection refused".into())),
            MockReply::Hang => {
                std::future::pending::<()>().await;
                Err(UpstreamError::Connect("unreachable".into()))
            }
            MockReply::Panic => panic!("mock upstream panicked"),
        }
    }
}
