//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity > 0, buffer sizes sane)
//! - Validate addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{SocketAddr, SocketAddrV4};

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Smallest head limit that still fits a minimal request line.
const MIN_HEAD_BYTES: usize = 64;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not an IPv4 socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than 0")]
    ZeroCapacity,

    #[error("limits.buffer_size must be greater than 0")]
    ZeroBufferSize,

    #[error("limits.max_request_head_bytes must be at least 64")]
    HeadLimitTooSmall,

    #[error("observability.log_format {0:?} must be \"text\" or \"json\"")]
    InvalidLogFormat(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check every rule and collect all violations.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddrV4>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }
    if config.limits.buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize);
    }
    if config.limits.max_request_head_bytes < MIN_HEAD_BYTES {
        errors.push(ValidationError::HeadLimitTooSmall);
    }
    if !matches!(config.observability.log_format.as_str(), "text" | "json") {
        errors.push(ValidationError::InvalidLogFormat(
            config.observability.log_format.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "[::]:3918".into();
        config.listener.max_connections = 0;
        config.limits.buffer_size = 0;
        config.observability.log_format = "yaml".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroCapacity));
        assert!(errors.contains(&ValidationError::InvalidLogFormat("yaml".into())));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidMetricsAddress("nowhere".into())]
        );
    }
}
