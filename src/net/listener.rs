//! TCP listener for client connections.
//!
//! # Responsibilities
//! - Bind an IPv4 socket with `SO_REUSEADDR`
//! - Size the accept backlog to the connection capacity + 1
//! - Accept incoming TCP connections
//!
//! # Design Decisions
//! - Capacity is enforced by the connection registry, not here: an
//!   over-capacity client still gets accepted so it can be told 503
//! - Failing to create, bind or listen is the only process-fatal network error

use std::net::{SocketAddr, SocketAddrV4};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to create, bind or listen.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
        }
    }
}

/// The proxy's listening socket.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Backlog passed to listen(2).
    backlog: u32,
}

impl Listener {
    /// Bind to the configured address. Must be called inside a Tokio runtime.
    pub fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddrV4 = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let socket = TcpSocket::new_v4().map_err(ListenerError::Bind)?;
        socket.set_reuseaddr(true).map_err(ListenerError::Bind)?;
        socket.bind(SocketAddr::V4(addr)).map_err(ListenerError::Bind)?;

        let backlog = u32::try_from(config.max_connections.saturating_add(1)).unwrap_or(u32::MAX);
        let inner = socket.listen(backlog).map_err(ListenerError::Bind)?;

        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %local_addr,
            backlog,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self { inner, backlog })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }
}
