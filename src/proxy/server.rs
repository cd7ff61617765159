//! Proxy server: accept loop and shutdown sequencing.
//!
//! # Responsibilities
//! - Accept client connections and admit them into the registry
//! - Refuse over-capacity clients with 503
//! - Spawn one tracked session task per admitted connection
//! - On shutdown: stop accepting, cancel and drain sessions, then close
//!   the listening socket

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionRegistry, Listener, ListenerError};
use crate::observability::metrics;
use crate::proxy::session::{reject_over_capacity, Session, SessionContext};
use crate::upstream::Connector;

/// Pause after a failed accept, so a persistent error (EMFILE) cannot spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Forward proxy bound to its listening socket.
#[derive(Debug)]
pub struct ProxyServer {
    listener: Listener,
    registry: Arc<ConnectionRegistry>,
    context: Arc<SessionContext>,
    config: ProxyConfig,
}

impl ProxyServer {
    /// Bind the listener and size the registry from config.
    pub fn bind(config: ProxyConfig) -> Result<Self, ListenerError> {
        let listener = Listener::bind(&config.listener)?;
        let registry = ConnectionRegistry::new(config.listener.max_connections);
        let context = Arc::new(SessionContext::new(&config, Connector::default()));
        Ok(Self {
            listener,
            registry,
            context,
            config,
        })
    }

    /// Replace the upstream connector (the connect timeout from config still applies).
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.context = Arc::new(SessionContext::new(&self.config, connector));
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` is triggered, then drain.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ListenerError> {
        let token = shutdown.subscribe();
        let address = self.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            %address,
            max_connections = self.registry.capacity(),
            "Proxy server accepting connections"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer, &shutdown),
                    Err(e) => {
                        tracing::error!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.drain(&shutdown).await;
        drop(self.listener);
        tracing::info!("Proxy server stopped");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, shutdown: &Shutdown) {
        metrics::record_accepted();
        match self.registry.admit(peer, shutdown.token()) {
            Some(slot) => {
                let session = Session::new(slot, stream, peer, Arc::clone(&self.context));
                shutdown.spawn(session.run());
            }
            None => {
                shutdown.spawn(reject_over_capacity(stream, peer));
            }
        }
    }

    async fn drain(&self, shutdown: &Shutdown) {
        let live = self.registry.snapshot();
        tracing::info!(sessions = live.len(), "Shutting down, cancelling sessions");
        for info in &live {
            tracing::debug!(
                conn = %info.id,
                peer = %info.peer,
                state = ?info.state,
                age_ms = info.age.as_millis() as u64,
                "Cancelling session"
            );
        }

        shutdown.trigger();
        shutdown.drain().await;

        let remaining = self.registry.live_count();
        if remaining > 0 {
            tracing::warn!(remaining, "Sessions still registered after drain");
        } else {
            tracing::info!("All sessions closed");
        }
    }
}
