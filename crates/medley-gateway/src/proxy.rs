//! Gateway core.
//!
//! A [`Gateway`] owns the live [`Pipeline`] (route table, filters, limiter
//! and breaker state built from one validated config) behind an
//! [`ArcSwap`], so a reload replaces all of it atomically while in-flight
//! requests finish on the pipeline they started with.
//!
//! Request flow:
//!
//! ```text
//! filters (cors → routing → auth → authorize → rate-limit → circuit → log)
//!     │ Continue
//!     ▼
//! resolve backend → round-robin pick → retry-wrapped forward → response
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::FutureExt;
use medley_kernel::gateway::{
    CallMode, FilterAction, GatewayConfig, GatewayContext, GatewayError, GatewayFilter,
    GatewayRequest, GatewayResponse, RequestError, ServiceResolver,
};
use medley_kernel::{Clock, SystemClock};
use tracing::{debug, error, info, warn};

use crate::auth::TokenVerifier;
use crate::backend::{
    RoundRobin, StaticServiceResolver, UpstreamClient, UpstreamError, UpstreamRequest,
    is_hop_by_hop, strip_hop_by_hop,
};
use crate::error::{LoadError, error_response};
use crate::filter::{
    AuthFilter, AuthorizeFilter, CircuitBreakerFilter, CorsFilter, FilterPipeline, LoggingFilter,
    RateLimitFilter, RoutingFilter, STARTED_AT_ATTR,
};
use crate::resilience::{
    BreakerSnapshot, CircuitBreakerRegistry, RateLimiterRegistry, fallback, retry,
};
use crate::router::PrefixRouter;

/// Request headers never relayed to a backend. Identity and tracing headers
/// are re-issued by the gateway.
const DROPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "x-gateway",
    "x-request-id",
    "x-forwarded-for",
];

/// Read a gateway config file (with `${VAR}` substitution and `MEDLEY__*`
/// overrides) and validate it.
pub fn load_config(path: impl AsRef<Path>) -> Result<GatewayConfig, LoadError> {
    let config: GatewayConfig = medley_kernel::config::load_with_env(path, "MEDLEY")?;
    config.validate()?;
    Ok(config)
}

/// Everything built from one configuration.
pub struct Pipeline {
    config: Arc<GatewayConfig>,
    router: Arc<PrefixRouter>,
    filters: FilterPipeline,
    breakers: Arc<CircuitBreakerRegistry>,
    resolver: Arc<dyn ServiceResolver>,
}

impl Pipeline {
    /// Validate `config` and build fresh limiter and breaker state for it.
    pub fn build(
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
        resolver: Option<Arc<dyn ServiceResolver>>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let router = Arc::new(PrefixRouter::from_routes(config.routes.iter().cloned())?);
        let limiters = Arc::new(RateLimiterRegistry::from_routes(
            &config.routes,
            clock.clone(),
        ));
        let breakers = Arc::new(CircuitBreakerRegistry::from_backends(
            &config.backends,
            clock.clone(),
        ));
        let resolver = resolver.unwrap_or_else(|| {
            Arc::new(StaticServiceResolver::from_backends(&config.backends)) as Arc<dyn ServiceResolver>
        });
        let verifier = TokenVerifier::new(&config.auth, clock.clone());
        let config = Arc::new(config);

        let filters: Vec<Arc<dyn GatewayFilter>> = vec![
            Arc::new(CorsFilter::new(config.cors.clone())),
            Arc::new(RoutingFilter::new(router.clone())),
            Arc::new(AuthFilter::new(verifier)),
            Arc::new(AuthorizeFilter::new()),
            Arc::new(RateLimitFilter::new(limiters)),
            Arc::new(CircuitBreakerFilter::new(
                breakers.clone(),
                config.clone(),
                clock.clone(),
            )),
            Arc::new(LoggingFilter::new(clock)),
        ];

        Ok(Self {
            config,
            router,
            filters: FilterPipeline::new(filters),
            breakers,
            resolver,
        })
    }

    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    pub fn router(&self) -> &PrefixRouter {
        &self.router
    }

    pub fn filters(&self) -> &FilterPipeline {
        &self.filters
    }
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    upstream: Arc<dyn UpstreamClient>,
    clock: Arc<dyn Clock>,
    resolver: Option<Arc<dyn ServiceResolver>>,
}

impl GatewayBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use an external resolver instead of the static table built from the
    /// configured backend addresses. It is kept across reloads.
    pub fn resolver(mut self, resolver: Arc<dyn ServiceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<Gateway, GatewayError> {
        let pipeline = Pipeline::build(self.config, self.clock.clone(), self.resolver.clone())?;
        info!(
            gateway = %pipeline.config.id,
            routes = pipeline.router.len(),
            backends = pipeline.config.backends.len(),
            "gateway pipeline ready"
        );
        Ok(Gateway {
            pipeline: ArcSwap::from_pointee(pipeline),
            upstream: self.upstream,
            clock: self.clock,
            balancer: RoundRobin::new(),
            external_resolver: self.resolver,
        })
    }
}

pub struct Gateway {
    pipeline: ArcSwap<Pipeline>,
    upstream: Arc<dyn UpstreamClient>,
    clock: Arc<dyn Clock>,
    balancer: RoundRobin,
    external_resolver: Option<Arc<dyn ServiceResolver>>,
}

impl Gateway {
    pub fn builder(config: GatewayConfig, upstream: Arc<dyn UpstreamClient>) -> GatewayBuilder {
        GatewayBuilder {
            config,
            upstream,
            clock: Arc::new(SystemClock),
            resolver: None,
        }
    }

    pub fn from_config(
        config: GatewayConfig,
        upstream: Arc<dyn UpstreamClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        Self::builder(config, upstream).clock(clock).build()
    }

    /// Swap in a new configuration. On error the current pipeline stays.
    pub fn reload(&self, config: GatewayConfig) -> Result<(), GatewayError> {
        let current = self.pipeline.load();
        if config.listen != current.config.listen {
            warn!(
                current = %current.config.listen,
                requested = %config.listen,
                "listen address changes need a restart, keeping the current one"
            );
        }
        let next = Pipeline::build(config, self.clock.clone(), self.external_resolver.clone())?;
        info!(
            gateway = %next.config.id,
            routes = next.router.len(),
            "gateway configuration reloaded"
        );
        self.pipeline.store(Arc::new(next));
        Ok(())
    }

    /// The pipeline serving new requests.
    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.load_full()
    }

    pub fn breaker_snapshot(&self) -> Vec<BreakerSnapshot> {
        self.pipeline.load().breakers.snapshot()
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.pipeline
            .load()
            .filters
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Answer one request. Never fails: every outcome, including a panic
    /// inside the pipeline, becomes a response.
    pub async fn handle(&self, req: GatewayRequest) -> GatewayResponse {
        let pipeline = self.pipeline.load_full();
        let request_id = req.id.clone();
        let path = req.path.clone();

        match AssertUnwindSafe(self.process(&pipeline, req))
            .catch_unwind()
            .await
        {
            Ok(resp) => resp,
            Err(_) => {
                error!(request_id = %request_id, path = %path, "request processing panicked");
                error_response(
                    &RequestError::Internal("request processing panicked".to_string()),
                    &path,
                    self.clock.now_millis(),
                )
                .with_header("x-request-id", request_id)
            }
        }
    }

    async fn process(&self, pipeline: &Pipeline, req: GatewayRequest) -> GatewayResponse {
        let mut ctx = GatewayContext::new(req);
        ctx.set_attr(STARTED_AT_ATTR, &self.clock.now_millis());

        let mut resp = match pipeline.filters.run_request(&mut ctx).await {
            FilterAction::Continue => match self.forward(pipeline, &ctx).await {
                Ok(resp) => resp,
                Err(err) => self.render(&err, &ctx),
            },
            FilterAction::Reject(err) => self.render(&err, &ctx),
            FilterAction::Respond(resp) => resp,
            _ => self.render(
                &RequestError::Internal("unsupported filter action".to_string()),
                &ctx,
            ),
        };

        for (name, value) in &ctx.response_headers {
            resp.headers.insert_if_absent(name.as_str(), value.as_str());
        }
        resp.headers.insert("x-request-id", ctx.request.id.as_str());

        pipeline.filters.run_response(&ctx, &mut resp).await;
        resp
    }

    fn render(&self, err: &RequestError, ctx: &GatewayContext) -> GatewayResponse {
        error_response(err, &ctx.request.path, self.clock.now_millis())
    }

    async fn forward(
        &self,
        pipeline: &Pipeline,
        ctx: &GatewayContext,
    ) -> Result<GatewayResponse, RequestError> {
        let route_match = ctx
            .route_match
            .as_ref()
            .ok_or_else(|| RequestError::Internal("forward without a route".to_string()))?;
        let route = &route_match.route;
        let mode = ctx.call_mode.unwrap_or(CallMode::Normal);
        let breaker = pipeline.breakers.get(&route.backend);

        let addresses = match pipeline.resolver.resolve(&route.backend).await {
            Ok(addresses) if !addresses.is_empty() => addresses,
            outcome => {
                let reason = match outcome {
                    Err(err) => err.to_string(),
                    Ok(_) => "no live instance".to_string(),
                };
                warn!(
                    request_id = %ctx.request.id,
                    backend = %route.backend,
                    reason = %reason,
                    "backend unavailable, serving fallback"
                );
                if let Some(b) = breaker {
                    b.record_failure(mode);
                }
                return Ok(fallback::render(
                    route,
                    pipeline.config.backend(&route.backend),
                    pipeline.config.default_fallback.as_ref(),
                    &format!("Service '{}' has no available instances", route.backend),
                    self.clock.now_millis(),
                ));
            }
        };

        let outbound = upstream_request(&pipeline.config.id, ctx, &route_match.forward_path);
        let deadline = Duration::from_millis(
            route
                .timeout_ms
                .unwrap_or(pipeline.config.request_timeout_ms),
        );
        let upstream = &self.upstream;
        let balancer = &self.balancer;
        let outbound = &outbound;
        let addresses = &addresses;
        let backend = route.backend.as_str();
        let request_id = ctx.request.id.as_str();

        let mut resp = retry::execute(
            backend,
            mode,
            &route.retry,
            &ctx.request.method,
            breaker.map(Arc::as_ref),
            |attempt| {
                let base = balancer
                    .pick(backend, addresses)
                    .unwrap_or_default()
                    .to_string();
                debug!(request_id, backend, attempt, address = %base, "forwarding");
                async move {
                    match tokio::time::timeout(deadline, upstream.send(&base, outbound)).await {
                        Ok(result) => result,
                        Err(_) => Err(UpstreamError::Timeout(deadline)),
                    }
                }
            },
        )
        .await?;

        strip_hop_by_hop(&mut resp.headers);
        resp.backend_id = route.backend.clone();
        Ok(resp)
    }
}

/// Outbound copy of the client request: connection-level, tracing and
/// client-supplied identity headers removed, gateway identity headers added.
fn upstream_request(gateway_id: &str, ctx: &GatewayContext, forward_path: &str) -> UpstreamRequest {
    let req = &ctx.request;
    let mut headers: HashMap<String, String> = req
        .headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name)
                && !DROPPED_REQUEST_HEADERS.contains(&name.as_str())
                && !name.starts_with("x-user-")
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if let Some(p) = &ctx.principal {
        headers.insert("x-user-id".into(), p.user_id.clone());
        headers.insert("x-user-username".into(), p.username.clone());
        headers.insert("x-user-email".into(), p.email.clone());
        headers.insert("x-user-roles".into(), p.roles_header());
    }
    headers.insert("x-gateway".into(), gateway_id.to_string());
    headers.insert("x-request-id".into(), req.id.clone());

    let forwarded_for = match (req.header("x-forwarded-for"), &req.client_addr) {
        (Some(prev), Some(addr)) => Some(format!("{prev}, {addr}")),
        (Some(prev), None) => Some(prev.to_string()),
        (None, Some(addr)) => Some(addr.clone()),
        (None, None) => None,
    };
    if let Some(xff) = forwarded_for {
        headers.insert("x-forwarded-for".into(), xff);
    }

    UpstreamRequest {
        method: req.method.clone(),
        path_and_query: forward_path.to_string(),
        headers,
        body: req.body.clone(),
    }
}
