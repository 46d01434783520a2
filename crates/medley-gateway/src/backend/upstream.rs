//! Outbound HTTP to backend services.
//!
//! [`HttpUpstream`] relays a request to `{base_url}{path_and_query}` and
//! returns the backend's answer verbatim, 5xx included. Deciding what counts
//! as a failure is left to the retry executor.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use medley_kernel::gateway::{GatewayResponse, Headers, HttpMethod};
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Connection-level headers that must not be relayed by a proxy.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Drop hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut Headers) {
    headers.retain(|name, _| !is_hop_by_hop(name));
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connection to backend failed: {0}")]
    Connect(String),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("invalid upstream request: {0}")]
    Request(String),

    #[error("failed to read backend response body: {0}")]
    Body(String),
}

/// A request ready to be sent to one backend address.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: HttpMethod,
    /// Path after prefix stripping, with the query string.
    pub path_and_query: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Transport used by the gateway core. Tests substitute a scripted mock.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(
        &self,
        base_url: &str,
        req: &UpstreamRequest,
    ) -> Result<GatewayResponse, UpstreamError>;
}

/// reqwest-backed [`UpstreamClient`].
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(connect_timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    #[instrument(skip(self, req), fields(method = %req.method, path = %req.path_and_query))]
    async fn send(
        &self,
        base_url: &str,
        req: &UpstreamRequest,
    ) -> Result<GatewayResponse, UpstreamError> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), req.path_and_query);
        debug!(url = %url, "forwarding to backend");

        let method = Method::from_bytes(req.method.as_str().as_bytes())
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let start = Instant::now();
        let mut builder = self.client.request(method, &url);
        for (key, value) in &req.headers {
            builder = builder.header(key, value);
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        let upstream_resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(start.elapsed())
            } else {
                UpstreamError::Connect(e.to_string())
            }
        })?;

        let status = upstream_resp.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in upstream_resp.headers() {
            match std::str::from_utf8(value.as_bytes()) {
                Ok(v) => headers.append(name.as_str(), v),
                Err(_) => warn!(header = %name, "dropping backend header with a non-UTF-8 value"),
            }
        }
        strip_hop_by_hop(&mut headers);

        let body = upstream_resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::Body(e.to_string()))?;

        let mut resp = GatewayResponse::new(status, "");
        resp.headers = headers;
        resp.body = body.to_vec();
        resp.latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers: Headers = [
            ("connection", "keep-alive"),
            ("Transfer-Encoding", "chunked"),
            ("content-type", "application/json"),
            ("set-cookie", "a=1"),
            ("set-cookie", "b=2"),
        ]
        .into_iter()
        .collect();

        strip_hop_by_hop(&mut headers);
        let names: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["content-type", "set-cookie", "set-cookie"]);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_connect_error() {
        let upstream = HttpUpstream::new(Duration::from_millis(200)).unwrap();
        let req = UpstreamRequest {
            method: HttpMethod::Get,
            path_and_query: "/health".into(),
            headers: HashMap::new(),
            body: Vec::new(),
        };
        // Port 9 (discard) on loopback is closed in test environments.
        let err = upstream.send("http://127.0.0.1:9", &req).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connect(_) | UpstreamError::Timeout(_)));
    }
}
