//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Logical request under the API prefix
//!     → context.rs (read current strategy)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through endpoints from the shared cursor)
//!         - least_conn.rs (pick endpoint with fewest in-flight requests)
//!     → registry.rs (health flags consulted, never cached)
//!     → endpoint.rs (in-flight guard held for the call)
//! ```
//!
//! # Design Decisions
//! - Selection is pure: no I/O, only registry state plus the cursor
//! - Unhealthy endpoints are skipped but never removed
//! - When nothing is healthy the first configured endpoint is returned,
//!   so selection always makes forward progress
//! - The router context is an owned value; tests build isolated instances

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

pub mod context;
pub mod endpoint;
pub mod least_conn;
pub mod registry;
pub mod round_robin;

pub use context::RouterContext;
pub use endpoint::Endpoint;
pub use registry::EndpointRegistry;

/// A selection policy over the endpoint registry.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Pick an endpoint. Always returns one: the first configured endpoint
    /// when none is healthy.
    fn next_server(&self, registry: &EndpointRegistry) -> Arc<Endpoint>;
}

/// Load-balancing strategy preference.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin = 0,
    LeastConnections = 1,
}

impl From<u8> for Strategy {
    fn from(val: u8) -> Self {
        match val {
            1 => Strategy::LeastConnections,
            _ => Strategy::RoundRobin,
        }
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::LeastConnections => "least-connections",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Strategy::RoundRobin),
            "least-connections" => Ok(Strategy::LeastConnections),
            other => Err(format!(
                "unknown strategy '{}' (expected round-robin or least-connections)",
                other
            )),
        }
    }
}
