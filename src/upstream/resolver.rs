//! Hostname resolution.
//!
//! # Responsibilities
//! - Turn a hostname and port into an ordered list of candidate addresses
//! - Classify lookup failures (temporary, unknown name, name without
//!   addresses, other)
//!
//! # Design Decisions
//! - Resolution sits behind a trait so the connector can be driven with a
//!   fixed address list in tests
//! - The system resolver only exposes getaddrinfo failures as text, so the
//!   classification matches on the well-known gai_strerror messages

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

/// DNS lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The resolver could not answer right now; retrying may help.
    #[error("temporary failure resolving {host}: {reason}")]
    Temporary { host: String, reason: String },

    /// The resolver itself is failing.
    #[error("DNS server failure resolving {host}: {reason}")]
    ServerFailure { host: String, reason: String },

    /// The name does not exist.
    #[error("unknown host {host}")]
    NotFound { host: String },

    /// The name exists but has no address records.
    #[error("no address associated with {host}")]
    NoData { host: String },

    #[error("failed to resolve {host}: {reason}")]
    Other { host: String, reason: String },
}

/// Resolves a host to candidate socket addresses, in preference order.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError>;
}

/// Resolver backed by the operating system (getaddrinfo).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| classify_lookup_error(host, &e))?
            .collect();

        if addrs.is_empty() {
            return Err(ResolveError::NoData {
                host: host.to_string(),
            });
        }
        Ok(addrs)
    }
}

/// Map a lookup error onto [`ResolveError`].
pub fn classify_lookup_error(host: &str, err: &io::Error) -> ResolveError {
    let host = host.to_string();
    let reason = err.to_string();
    let lower = reason.to_ascii_lowercase();

    if lower.contains("temporary failure") || lower.contains("try again") {
        ResolveError::Temporary { host, reason }
    } else if lower.contains("non-recoverable") {
        ResolveError::ServerFailure { host, reason }
    } else if lower.contains("no address associated") {
        ResolveError::NoData { host }
    } else if lower.contains("not known") || lower.contains("no such host") {
        ResolveError::NotFound { host }
    } else {
        ResolveError::Other { host, reason }
    }
}
