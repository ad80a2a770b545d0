//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to endpoint:
//!     → timeouts.rs (enforce connect/request timeout)
//!     → On transport failure: retries.rs (classify, bound attempts)
//!     → backoff.rs (delay before the next attempt)
//!
//! Realtime connect attempt:
//!     → timeouts.rs (handshake deadline)
//!     → backoff.rs (fixed delay before the next candidate)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries move to another endpoint; they never repeat on the failed one
//! - Application errors pass through untouched

pub mod backoff;
pub mod retries;
pub mod timeouts;
