//! Backend declarations and the service-resolver contract.
//!
//! A backend is a logical service name (`finance-service`) behind which any
//! number of network addresses may live. The [`ServiceResolver`] trait maps a
//! name to its current live addresses. Concrete resolvers (a static table,
//! a discovery registry client) live in `medley-gateway` or plugin crates.

use super::error::GatewayError;
use super::policy::{CircuitBreakerSpec, FallbackSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// BackendConfig
// ─────────────────────────────────────────────────────────────────────────────

/// A logical backend service and its failure-isolation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Logical service name; also keys the circuit breaker.
    pub name: String,
    /// Base URLs, e.g. `http://10.0.0.5:8081`. May be empty when addresses
    /// are only known to an external resolver.
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSpec,
    /// Response served while this backend is unavailable.
    #[serde(default)]
    pub fallback: Option<FallbackSpec>,
}

impl BackendConfig {
    /// Construct a backend with the default breaker policy.
    pub fn new<I, S>(name: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            addresses: addresses.into_iter().map(Into::into).collect(),
            circuit_breaker: CircuitBreakerSpec::default(),
            fallback: None,
        }
    }

    pub fn with_circuit_breaker(mut self, spec: CircuitBreakerSpec) -> Self {
        self.circuit_breaker = spec;
        self
    }

    pub fn with_fallback(mut self, spec: FallbackSpec) -> Self {
        self.fallback = Some(spec);
        self
    }

    /// Basic sanity checks run during [`GatewayConfig::validate()`].
    ///
    /// [`GatewayConfig::validate()`]: super::validation::GatewayConfig::validate
    pub(crate) fn validate(&self) -> Result<(), GatewayError> {
        if self.name.trim().is_empty() {
            return Err(GatewayError::EmptyBackendName);
        }
        for address in &self.addresses {
            validate_address(&self.name, address)?;
        }
        self.circuit_breaker.validate(&self.name)?;
        if let Some(fb) = &self.fallback {
            fb.validate(&self.name)?;
        }
        Ok(())
    }
}

/// An address must be an absolute `http://` or `https://` base URL.
pub fn validate_address(backend: &str, address: &str) -> Result<(), GatewayError> {
    let rest = address
        .strip_prefix("http://")
        .or_else(|| address.strip_prefix("https://"));
    match rest {
        Some(host) if !host.trim().is_empty() => Ok(()),
        Some(_) => Err(GatewayError::InvalidAddress(
            backend.to_string(),
            format!("address '{address}' has no host"),
        )),
        None => Err(GatewayError::InvalidAddress(
            backend.to_string(),
            format!("address '{address}' must start with http:// or https://"),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServiceResolver trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for name → address resolution.
///
/// Resolution is async because real implementations query a registry. The
/// returned set may be empty; the caller treats that as "no live address".
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Current live addresses of `backend`.
    ///
    /// Returns [`GatewayError::BackendNotFound`] for names the resolver has
    /// never heard of.
    async fn resolve(&self, backend: &str) -> Result<Vec<String>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_scheme_is_checked() {
        assert!(validate_address("b", "http://127.0.0.1:8081").is_ok());
        assert!(validate_address("b", "https://users.internal").is_ok());
        assert!(matches!(
            validate_address("b", "ftp://x"),
            Err(GatewayError::InvalidAddress(..))
        ));
        assert!(matches!(
            validate_address("b", "http://"),
            Err(GatewayError::InvalidAddress(..))
        ));
    }

    #[test]
    fn backend_without_addresses_is_valid() {
        assert!(BackendConfig::new("planning-service", Vec::<String>::new())
            .validate()
            .is_ok());
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(
            BackendConfig::new(" ", ["http://a"]).validate(),
            Err(GatewayError::EmptyBackendName)
        );
    }

    #[test]
    fn deserializes_with_breaker_defaults() {
        let b: BackendConfig = serde_json::from_value(serde_json::json!({
            "name": "finance-service",
            "addresses": ["http://10.0.0.7:8082"]
        }))
        .unwrap();
        assert_eq!(b.circuit_breaker, CircuitBreakerSpec::default());
        assert!(b.fallback.is_none());
    }
}
