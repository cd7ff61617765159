//! Forward HTTP proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::listener ──▶ net::connection ──▶ proxy::session
//!                (accept)          (admit or 503)       (read, parse)
//!                                                           │
//!                                                           ▼
//!                                                   upstream::connector
//!                                                   (resolve, fallback)
//!                                                           │
//!                          ┌────────────────────────────────┴──────┐
//!                          ▼                                       ▼
//!                   relay::http                             relay::tunnel
//!              (rewrite, one response)               (CONNECT, both directions)
//!                          │                                       │
//!     Client ◀─────────────┴───────────────────────────────────────┘
//!
//!     Cross-cutting: config, lifecycle (signals, shutdown), observability
//! ```

use std::path::PathBuf;

use clap::Parser;

use forward_proxy::lifecycle::startup::{self, parse_port, Overrides};

#[derive(Parser)]
#[command(name = "forward-proxy", about = "A forward HTTP proxy with CONNECT tunneling", version)]
struct Cli {
    /// Listen port (1025-65535)
    #[arg(value_parser = parse_port)]
    port: Option<u16>,

    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(short, long)]
    max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = Overrides {
        port: cli.port,
        max_connections: cli.max_connections,
        log_level: cli.log_level,
        log_format: cli.log_format,
    };
    let config = startup::resolve_config(cli.config.as_deref(), &overrides)?;

    startup::run(config).await
}
