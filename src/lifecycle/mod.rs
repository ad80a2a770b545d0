//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (client.rs):
//!     Spawn prober → holds a shutdown receiver
//!
//! Shutdown (shutdown.rs):
//!     trigger() → background loops exit
//!
//! Signals (signals.rs):
//!     SIGINT → trigger()
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
