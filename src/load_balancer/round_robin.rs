//! Round-robin load balancing strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::{LoadBalancer, endpoint::Endpoint, registry::EndpointRegistry};

/// Round-robin selector.
/// Stores the shared cursor used to rotate through endpoints.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position, always in `[0, N)` for the registry it serves.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Advance the cursor by one modulo `len`, returning the previous position.
    fn advance(&self, len: usize) -> usize {
        match self.cursor.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
            Some((c + 1) % len)
        }) {
            Ok(prev) | Err(prev) => prev % len,
        }
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, registry: &EndpointRegistry) -> Arc<Endpoint> {
        let endpoints = registry.list_all();
        let len = endpoints.len();

        // The cursor moves once per call whatever the outcome.
        let start = self.advance(len);

        for i in 0..len {
            let endpoint = &endpoints[(start + i) % len];
            if endpoint.is_healthy() {
                return endpoint.clone();
            }
        }
        registry.first().clone()
    }
}
