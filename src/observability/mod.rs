//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`endpoint`, `attempt`, `request_id`) on every event
//! - Request ID flows from the pipeline into the outbound header
//! - Metrics are cheap and no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
