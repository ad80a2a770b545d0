//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the replica client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Load-balanced HTTP endpoints and routing rules.
    pub http: HttpConfig,

    /// Health probe settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Realtime (STOMP over WebSocket) session settings.
    pub realtime: RealtimeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Ordered candidate base addresses (e.g., "http://localhost:8081").
    pub endpoints: Vec<String>,

    /// Paths starting with this prefix are load balanced.
    pub api_prefix: String,

    /// Base used for relative paths outside the API prefix.
    pub passthrough_base: Option<String>,

    /// File holding the persisted strategy preference.
    pub preference_path: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "http://localhost:8081".to_string(),
                "http://localhost:8082".to_string(),
                "http://localhost:8083".to_string(),
            ],
            api_prefix: "/api/".to_string(),
            passthrough_base: None,
            preference_path: None,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic health probes.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Probe timeout in seconds.
    pub timeout_secs: u64,

    /// Status path probed on each endpoint.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/api/auctions/status".to_string(),
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Optional cap on attempts per request.
    /// When unset, one attempt per configured endpoint is made.
    pub max_attempts: Option<usize>,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay_ms: 50,
            max_delay_ms: 500,
        }
    }
}

/// Realtime session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Ordered candidate WebSocket addresses.
    pub endpoints: Vec<String>,

    /// Number of full passes over `endpoints` before a connect is rejected.
    pub max_reconnect_attempts: u32,

    /// Fixed delay between connection attempts in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Timeout for the WebSocket handshake plus STOMP CONNECTED, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Interval at which we send heart-beats (0 disables).
    pub heartbeat_outgoing_ms: u64,

    /// Interval at which we expect server heart-beats (0 disables).
    pub heartbeat_incoming_ms: u64,

    /// Capacity of the session command queue.
    pub command_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "ws://localhost:8081/ws".to_string(),
                "ws://localhost:8082/ws".to_string(),
                "ws://localhost:8083/ws".to_string(),
            ],
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2000,
            connect_timeout_ms: 5000,
            heartbeat_outgoing_ms: 4000,
            heartbeat_incoming_ms: 4000,
            command_buffer: 64,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.http.endpoints.len(), 3);
        assert_eq!(config.http.api_prefix, "/api/");
        assert_eq!(config.health_check.interval_secs, 30);
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_partial_section_override() {
        let config: ClientConfig = toml::from_str(
            r#"
            [http]
            endpoints = ["http://10.0.0.1:8080"]

            [realtime]
            reconnect_delay_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.http.endpoints, vec!["http://10.0.0.1:8080"]);
        assert_eq!(config.http.api_prefix, "/api/");
        assert_eq!(config.realtime.reconnect_delay_ms, 100);
        assert_eq!(config.realtime.endpoints.len(), 3);
    }
}
