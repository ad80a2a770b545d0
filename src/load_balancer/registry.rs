//! Endpoint registry.
//!
//! # Responsibilities
//! - Hold the fixed, ordered set of candidate endpoints
//! - Expose health transitions (probe results, observed transport failures)
//!
//! # Design Decisions
//! - The endpoint set is immutable after construction; only flags change
//! - Flags are atomics, so every selection observes the latest value
//! - Never empty: construction fails without at least one endpoint

use std::sync::Arc;
use thiserror::Error;

use crate::load_balancer::endpoint::Endpoint;
use crate::observability::metrics;

/// Errors building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no endpoints configured")]
    Empty,

    #[error("invalid endpoint address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
}

/// The fixed set of endpoints and their health flags.
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: Vec<Arc<Endpoint>>,
}

impl EndpointRegistry {
    /// Build a registry from ordered base addresses.
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Result<Self, RegistryError> {
        if addresses.is_empty() {
            return Err(RegistryError::Empty);
        }

        let endpoints = addresses
            .iter()
            .map(|a| {
                Endpoint::new(a.as_ref())
                    .map(Arc::new)
                    .map_err(|source| RegistryError::InvalidAddress {
                        address: a.as_ref().to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { endpoints })
    }

    /// Number of configured endpoints (always > 0).
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// The first configured endpoint, used as the all-unhealthy fallback.
    pub fn first(&self) -> &Arc<Endpoint> {
        &self.endpoints[0]
    }

    /// Look up an endpoint by address.
    pub fn get(&self, address: &str) -> Option<&Arc<Endpoint>> {
        let address = address.trim_end_matches('/');
        self.endpoints.iter().find(|e| e.address == address)
    }

    /// All endpoints in configuration order.
    pub fn list_all(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Healthy endpoints in configuration order.
    pub fn list_healthy(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .iter()
            .filter(|e| e.is_healthy())
            .cloned()
            .collect()
    }

    pub fn mark_healthy(&self, endpoint: &Endpoint) {
        self.set_health(endpoint, true);
    }

    pub fn mark_unhealthy(&self, endpoint: &Endpoint) {
        self.set_health(endpoint, false);
    }

    fn set_health(&self, endpoint: &Endpoint, healthy: bool) {
        // Endpoints outside this registry are ignored.
        let Some(known) = self.get(&endpoint.address) else {
            tracing::debug!(endpoint = %endpoint.address, "Health update for unknown endpoint");
            return;
        };

        let was_healthy = known.set_healthy(healthy);
        if was_healthy != healthy {
            if healthy {
                tracing::info!(endpoint = %known.address, "Endpoint marked healthy");
            } else {
                tracing::warn!(endpoint = %known.address, "Endpoint marked unhealthy");
            }
        }
        metrics::record_endpoint_health(&known.address, healthy);
    }
}
