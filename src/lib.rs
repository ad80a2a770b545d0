//! Resilient client for a replicated backend cluster.
//!
//! HTTP calls are load balanced over health-checked replicas with failover;
//! a realtime STOMP session rotates between candidate servers and replays
//! its subscriptions after every reconnect.

pub mod client;
pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod realtime;
pub mod resilience;

pub use client::{ClientError, ClusterClient};
pub use config::ClientConfig;
pub use lifecycle::Shutdown;
pub use load_balancer::Strategy;
