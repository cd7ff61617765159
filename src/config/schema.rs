//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay::RelayOptions;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3918;

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, capacity).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size and buffer limits.
    pub limits: LimitsConfig,

    /// Plain HTTP relay behaviour.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3918").
    pub bind_address: String,

    /// Maximum concurrent connections. Connections beyond this get a 503.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: 1000,
        }
    }
}

impl ListenerConfig {
    /// Replace the port of `bind_address`, keeping the host part.
    pub fn set_port(&mut self, port: u16) {
        let host = self
            .bind_address
            .rsplit_once(':')
            .map_or(self.bind_address.as_str(), |(host, _)| host);
        self.bind_address = format!("{host}:{port}");
    }
}

/// Timeout configuration. Zero disables a timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for the client to send its request, in seconds.
    pub request_read_secs: u64,

    /// Upstream resolution and per-address connect timeout, in seconds.
    pub connect_secs: u64,

    /// Longest silence on any relay read, in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_read_secs: 30,
            connect_secs: 10,
            idle_secs: 300,
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl TimeoutConfig {
    pub fn request_read(&self) -> Option<Duration> {
        non_zero_secs(self.request_read_secs)
    }

    pub fn connect(&self) -> Option<Duration> {
        non_zero_secs(self.connect_secs)
    }

    pub fn idle(&self) -> Option<Duration> {
        non_zero_secs(self.idle_secs)
    }
}

/// Request size and buffer limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted request line plus headers, in bytes.
    pub max_request_head_bytes: usize,

    /// Largest request body buffered before forwarding, in bytes.
    pub max_request_body_bytes: usize,

    /// Relay read chunk size, in bytes.
    pub buffer_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_head_bytes: 16 * 1024,
            max_request_body_bytes: 1024 * 1024, // 1MB
            buffer_size: 8 * 1024,
        }
    }
}

/// Plain HTTP relay behaviour.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HttpConfig {
    /// Send `Connection: close` upstream instead of the client's value.
    pub force_connection_close: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format ("text" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Relay tuning derived from limits and timeouts.
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            buffer_size: self.limits.buffer_size,
            idle_timeout: self.timeouts.idle(),
        }
    }
}
