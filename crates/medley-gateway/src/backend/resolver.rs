//! Static name → address table implementing [`ServiceResolver`].
//!
//! Seeded from the configured backends. [`StaticServiceResolver::update`]
//! replaces one backend's live set at runtime, which is how a discovery
//! refresh feeds into the gateway.

use std::collections::HashMap;

use async_trait::async_trait;
use medley_kernel::gateway::{BackendConfig, GatewayError, ServiceResolver};
use parking_lot::RwLock;
use tracing::info;

/// [`ServiceResolver`] backed by an in-memory table.
#[derive(Default)]
pub struct StaticServiceResolver {
    table: RwLock<HashMap<String, Vec<String>>>,
}

impl StaticServiceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_backends<'a, I>(backends: I) -> Self
    where
        I: IntoIterator<Item = &'a BackendConfig>,
    {
        let table = backends
            .into_iter()
            .map(|b| (b.name.clone(), b.addresses.clone()))
            .collect();
        Self {
            table: RwLock::new(table),
        }
    }

    /// Replace the live addresses of `backend`. An empty list marks every
    /// instance as down.
    pub fn update<I, S>(&self, backend: &str, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addresses: Vec<String> = addresses.into_iter().map(Into::into).collect();
        info!(backend, live = addresses.len(), "resolver table updated");
        self.table.write().insert(backend.to_string(), addresses);
    }
}

#[async_trait]
impl ServiceResolver for StaticServiceResolver {
    async fn resolve(&self, backend: &str) -> Result<Vec<String>, GatewayError> {
        self.table
            .read()
            .get(backend)
            .cloned()
            .ok_or_else(|| GatewayError::BackendNotFound(backend.to_string()))
    }
}
