//! Endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single candidate replica
//! - Track in-flight requests (for Least Connections LB)
//! - Track the health flag

use url::Url;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::ops::Deref;

/// A single candidate replica. Identity is the address.
#[derive(Debug)]
pub struct Endpoint {
    /// Normalized base address, without trailing slash.
    pub address: String,
    /// Parsed form of `address`.
    pub base_url: Url,
    /// Current health belief. Starts healthy.
    healthy: AtomicBool,
    /// Number of requests currently routed through this endpoint.
    in_flight: AtomicUsize,
}

impl Endpoint {
    /// Create a new endpoint from a base address.
    pub fn new(address: &str) -> Result<Self, url::ParseError> {
        let address = address.trim_end_matches('/').to_string();
        let base_url = Url::parse(&address)?;
        Ok(Self {
            address,
            base_url,
            healthy: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Set the health flag, returning the previous value.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::Relaxed)
    }

    /// Get the current number of in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Create a guard that counts one in-flight request until dropped.
    pub fn acquire(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            endpoint: self.clone(),
        }
    }
}

/// A RAII guard that manages the in-flight count.
#[derive(Debug)]
pub struct InFlightGuard {
    pub endpoint: Arc<Endpoint>,
}

impl Deref for InFlightGuard {
    type Target = Endpoint;
    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.endpoint.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
