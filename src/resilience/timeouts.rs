//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap probes and realtime handshakes with a deadline
//! - Configure the HTTP client's connect and request timeouts
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Exceeding a deadline is treated exactly like a transport failure

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::config::TimeoutConfig;

/// The operation did not finish before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {0:?}")]
pub struct TimedOut(pub Duration);

/// Run `fut` with a deadline.
pub async fn deadline<F: Future>(limit: Duration, fut: F) -> Result<F::Output, TimedOut> {
    tokio::time::timeout(limit, fut).await.map_err(|_| TimedOut(limit))
}

/// Build the outbound HTTP client with configured timeouts.
pub fn http_client(config: &TimeoutConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_secs))
        .timeout(Duration::from_secs(config.request_secs))
        .user_agent(concat!("replica-client/", env!("CARGO_PKG_VERSION")))
        .build()
}
