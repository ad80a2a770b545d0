//! Outbound HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! ApiRequest (method + logical path)
//!     → request.rs (API prefix? balanced : pass-through)
//!     → pipeline.rs:
//!         select endpoint (load_balancer)
//!         → rewrite to {endpoint}{path}
//!         → send with x-request-id
//!         → transport failure? flag endpoint, select again
//!     → Response returned unmodified
//! ```

pub mod pipeline;
pub mod request;

pub use pipeline::{RequestError, RequestPipeline};
pub use request::ApiRequest;
