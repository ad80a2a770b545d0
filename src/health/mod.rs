//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probes (prober.rs):
//!     Periodic timer
//!     → Probe each endpoint concurrently (own timeout each)
//!     → registry.mark_healthy / mark_unhealthy
//!
//! Passive evidence (http::pipeline):
//!     Transport failure observed → mark_unhealthy
//!     Successful call            → mark_healthy
//! ```
//!
//! # Design Decisions
//! - Active and passive signals are complementary
//! - One slow endpoint never delays probing of the others
//! - Probe failures are logged, never surfaced to callers

pub mod prober;

pub use prober::HealthProber;
