//! Retry logic.
//!
//! # Responsibilities
//! - Classify failures: transport-level (retry elsewhere) vs everything else
//! - Bound the number of attempts per logical request
//!
//! # Design Decisions
//! - Connection refused, unreachable and timeouts are transport failures
//! - A response with any status (including 4xx/5xx) is never retried here;
//!   that decision belongs to the caller
//! - One attempt per configured endpoint is the natural bound

use crate::config::RetryConfig;

/// Returns true if the error means the endpoint could not be talked to.
pub fn is_transport_failure(err: &reqwest::Error) -> bool {
    // A status error carries a valid response, so it is application-level.
    if err.status().is_some() {
        return false;
    }
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// Maximum attempts for one logical request.
pub fn attempt_budget(endpoint_count: usize, config: &RetryConfig) -> usize {
    let natural = endpoint_count.max(1);
    match config.max_attempts {
        Some(cap) => natural.min(cap.max(1)),
        None => natural,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_defaults_to_endpoint_count() {
        let config = RetryConfig::default();
        assert_eq!(attempt_budget(3, &config), 3);
        assert_eq!(attempt_budget(1, &config), 1);
    }

    #[test]
    fn test_budget_cap_never_exceeds_endpoints() {
        let mut config = RetryConfig::default();
        config.max_attempts = Some(2);
        assert_eq!(attempt_budget(3, &config), 2);
        config.max_attempts = Some(10);
        assert_eq!(attempt_budget(3, &config), 3);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::new()
            .get(format!("http://{}/api/x", addr))
            .send()
            .await
            .unwrap_err();
        assert!(is_transport_failure(&err));
    }
}
