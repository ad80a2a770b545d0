//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate endpoint addresses (parsable, right scheme, no duplicates)
//! - Validate value ranges (intervals and timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{section}: at least one endpoint is required")]
    NoEndpoints { section: &'static str },

    #[error("{section}: invalid endpoint '{address}': {reason}")]
    InvalidEndpoint {
        section: &'static str,
        address: String,
        reason: String,
    },

    #[error("{section}: duplicate endpoint '{address}'")]
    DuplicateEndpoint {
        section: &'static str,
        address: String,
    },

    #[error("http.api_prefix must start with '/', got '{0}'")]
    InvalidPrefix(String),

    #[error("http.passthrough_base is not a valid URL: '{0}'")]
    InvalidPassthrough(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_endpoints("http.endpoints", &config.http.endpoints, &["http", "https"], &mut errors);
    check_endpoints("realtime.endpoints", &config.realtime.endpoints, &["ws", "wss"], &mut errors);

    if !config.http.api_prefix.starts_with('/') {
        errors.push(ValidationError::InvalidPrefix(config.http.api_prefix.clone()));
    }

    if let Some(base) = &config.http.passthrough_base {
        if Url::parse(base).is_err() {
            errors.push(ValidationError::InvalidPassthrough(base.clone()));
        }
    }

    let ranges = [
        ("health_check.interval_secs", config.health_check.interval_secs),
        ("health_check.timeout_secs", config.health_check.timeout_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("realtime.connect_timeout_ms", config.realtime.connect_timeout_ms),
        ("realtime.max_reconnect_attempts", u64::from(config.realtime.max_reconnect_attempts)),
        ("realtime.command_buffer", config.realtime.command_buffer as u64),
    ];
    for (field, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if config.retries.max_attempts == Some(0) {
        errors.push(ValidationError::Zero("retries.max_attempts"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_endpoints(
    section: &'static str,
    endpoints: &[String],
    schemes: &[&str],
    errors: &mut Vec<ValidationError>,
) {
    if endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints { section });
        return;
    }

    let mut seen = HashSet::new();
    for address in endpoints {
        match Url::parse(address) {
            Ok(url) if !schemes.contains(&url.scheme()) => {
                errors.push(ValidationError::InvalidEndpoint {
                    section,
                    address: address.clone(),
                    reason: format!("scheme must be one of {}", schemes.join(", ")),
                });
            }
            Ok(_) => {}
            Err(e) => {
                errors.push(ValidationError::InvalidEndpoint {
                    section,
                    address: address.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if !seen.insert(address.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicateEndpoint {
                section,
                address: address.clone(),
            });
        }
    }
}
