//! Upstream connection establishment.
//!
//! # Responsibilities
//! - Resolve the target host through a [`Resolve`] implementation
//! - Try each candidate address in order until one connects
//! - Report only the last candidate's failure
//!
//! # Design Decisions
//! - Socket creation and connect are separate steps so a local socket
//!   failure (500) is distinguishable from a refused connect (502)
//! - Every resolve and connect attempt is bounded by the connect timeout

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};

use crate::http::Protocol;
use crate::upstream::resolver::{Resolve, ResolveError, SystemResolver};

/// Failure to reach the upstream server.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to create socket for {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    Timeout { addr: SocketAddr, timeout: Duration },
}

/// Opens TCP connections to upstream servers.
#[derive(Clone)]
pub struct Connector {
    resolver: Arc<dyn Resolve>,
    connect_timeout: Option<Duration>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(Arc::new(SystemResolver))
    }
}

impl Connector {
    pub fn new(resolver: Arc<dyn Resolve>) -> Self {
        Self {
            resolver,
            connect_timeout: None,
        }
    }

    /// Bound each resolution and each connect attempt. `None` waits forever.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connect to `hostname` on the protocol's well-known port (80 or 443).
    ///
    /// Equivalent to `connect_to(hostname, protocol, None)`. Sessions call
    /// [`connect_to`](Self::connect_to) directly because the request may name
    /// an explicit port.
    pub async fn connect(&self, hostname: &str, protocol: Protocol) -> Result<TcpStream, ConnectError> {
        self.connect_to(hostname, protocol, None).await
    }

    /// Connect to `hostname`, on `port` if given, else the protocol default.
    pub async fn connect_to(
        &self,
        hostname: &str,
        protocol: Protocol,
        port: Option<u16>,
    ) -> Result<TcpStream, ConnectError> {
        let port = port.unwrap_or_else(|| protocol.default_port());
        let candidates = self.resolve(hostname, port).await?;

        let mut candidates = candidates.into_iter().peekable();
        while let Some(addr) = candidates.next() {
            let has_next = candidates.peek().is_some();
            match self.try_connect(addr).await {
                Ok(stream) => {
                    tracing::debug!(host = %hostname, %addr, "Upstream connected");
                    return Ok(stream);
                }
                Err(e) if has_next => {
                    tracing::debug!(host = %hostname, %addr, error = %e, "Candidate failed, trying next address");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ResolveError::NoData {
            host: hostname.to_string(),
        }
        .into())
    }

    async fn resolve(&self, hostname: &str, port: u16) -> Result<Vec<SocketAddr>, ResolveError> {
        let lookup = self.resolver.resolve(hostname, port);
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, lookup)
                .await
                .map_err(|_| ResolveError::Temporary {
                    host: hostname.to_string(),
                    reason: format!("lookup timed out after {limit:?}"),
                })?,
            None => lookup.await,
        }
    }

    async fn try_connect(&self, addr: SocketAddr) -> Result<TcpStream, ConnectError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|source| ConnectError::Socket { addr, source })?;

        let connecting = socket.connect(addr);
        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .map_err(|_| ConnectError::Timeout { addr, timeout: limit })?,
            None => connecting.await,
        };
        result.map_err(|source| ConnectError::Connect { addr, source })
    }
}
