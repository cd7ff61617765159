//! Startup orchestration.
//!
//! # Responsibilities
//! - Load configuration and apply command-line overrides
//! - Initialize logging and metrics
//! - Bind the listener, install signal handlers, run until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last (traffic only when ready)

use std::path::Path;

use crate::config::{load_config, validate_config, ConfigError, ProxyConfig};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{init_logging, init_metrics};
use crate::proxy::ProxyServer;

/// Lowest port accepted on the command line (exclusive).
const RESERVED_PORTS: u16 = 1024;

/// Values given on the command line, each overriding the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

/// Parse a listen port: decimal digits only, above 1024.
pub fn parse_port(value: &str) -> Result<u16, String> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{value:?} is not a port number"));
    }
    let port: u32 = value
        .parse()
        .map_err(|_| format!("port {value} is out of range"))?;
    if port <= u32::from(RESERVED_PORTS) {
        return Err(format!("unable to use reserved port {port}"));
    }
    u16::try_from(port).map_err(|_| format!("port {port} is out of range"))
}

/// Load the config file (or defaults), apply overrides, validate.
pub fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(port) = overrides.port {
        config.listener.set_port(port);
    }
    if let Some(max) = overrides.max_connections {
        config.listener.max_connections = max;
    }
    if let Some(level) = &overrides.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &overrides.log_format {
        config.observability.log_format = format.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Bring the proxy up and run it until a shutdown signal.
pub async fn run(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "forward-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_read_secs = config.timeouts.request_read_secs,
        connect_secs = config.timeouts.connect_secs,
        idle_secs = config.timeouts.idle_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let server = ProxyServer::bind(config)?;
    let shutdown = Shutdown::new();
    signals::install(&shutdown)?;

    server.run(shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("8080"), Ok(8080));
        assert_eq!(parse_port("1025"), Ok(1025));
        assert_eq!(parse_port("65535"), Ok(65535));
    }

    #[test]
    fn test_parse_port_rejects() {
        assert!(parse_port("1024").unwrap_err().contains("reserved"));
        assert!(parse_port("80").unwrap_err().contains("reserved"));
        assert!(parse_port("65536").unwrap_err().contains("out of range"));
        assert!(parse_port("99999999999").unwrap_err().contains("out of range"));
        assert!(parse_port("").is_err());
        assert!(parse_port("-1").is_err());
        assert!(parse_port("80a").is_err());
        assert!(parse_port("+8080").is_err());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[listener]\nbind_address = \"127.0.0.1:4000\"\nmax_connections = 2\n\n[observability]\nlog_level = \"warn\""
        )
        .unwrap();

        let overrides = Overrides {
            port: Some(5000),
            max_connections: Some(9),
            log_format: Some("json".into()),
            ..Default::default()
        };
        let config = resolve_config(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:5000");
        assert_eq!(config.listener.max_connections, 9);
        assert_eq!(config.observability.log_level, "warn");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_overrides_are_validated() {
        let overrides = Overrides {
            max_connections: Some(0),
            ..Default::default()
        };
        let err = resolve_config(None, &overrides).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
