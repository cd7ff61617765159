//! Per-connection request handling.
//!
//! # Responsibilities
//! - Read one request head (plus any declared body) within limits
//! - Parse it and resolve/connect to the upstream it names
//! - Hand the connection to the tunnel or the HTTP relay
//! - Answer failures with the mapped error page
//!
//! # Data Flow
//! ```text
//! Accepted → Parsing (read_request, ProxyRequest::parse)
//!          → Resolving (Connector::connect_to)
//!          → Relaying (run_tunnel | relay_http)
//!          → Closed (SlotGuard dropped)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

use crate::config::{LimitsConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::http::request::find_head_end;
use crate::http::{ProxyRequest, ProxyResponse, RewriteOptions};
use crate::net::{ConnectionState, SlotGuard};
use crate::observability::metrics;
use crate::relay::{relay_http, run_tunnel, RelayError, RelayOptions, RelayStats};
use crate::upstream::Connector;

/// Upper bound on writing an error page to a client that stopped reading.
const ERROR_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 4096;

/// Settings and collaborators shared by every session.
#[derive(Debug)]
pub struct SessionContext {
    pub limits: LimitsConfig,
    pub request_timeout: Option<Duration>,
    pub relay: RelayOptions,
    pub rewrite: RewriteOptions,
    pub connector: Connector,
}

impl SessionContext {
    /// Build from config. The connector gets the configured connect timeout.
    pub fn new(config: &ProxyConfig, connector: Connector) -> Self {
        Self {
            limits: config.limits.clone(),
            request_timeout: config.timeouts.request_read(),
            relay: config.relay_options(),
            rewrite: RewriteOptions {
                force_connection_close: config.http.force_connection_close,
            },
            connector: connector.with_connect_timeout(config.timeouts.connect()),
        }
    }
}

/// One admitted client connection.
pub struct Session<S> {
    slot: SlotGuard,
    client: S,
    peer: SocketAddr,
    context: Arc<SessionContext>,
    /// Client's HTTP version once parsed, echoed in error replies.
    version: Option<String>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(slot: SlotGuard, client: S, peer: SocketAddr, context: Arc<SessionContext>) -> Self {
        Self {
            slot,
            client,
            peer,
            context,
            version: None,
        }
    }

    /// Serve the connection to completion. Never fails; errors end here.
    pub async fn run(mut self) {
        let span = tracing::info_span!("session", conn = %self.slot.id(), peer = %self.peer);
        async move {
            let started = Instant::now();
            tracing::debug!("Session started");

            match self.serve().await {
                Ok(stats) => {
                    metrics::record_relay_bytes(&stats);
                    tracing::debug!(bytes_up = stats.bytes_up, bytes_down = stats.bytes_down, "Session closed");
                }
                Err(err) => self.fail(err).await,
            }

            if let Err(e) = self.client.shutdown().await {
                tracing::trace!(error = %e, "Client shutdown failed");
            }
            metrics::record_session_duration(started);
        }
        .instrument(span)
        .await
    }

    async fn serve(&mut self) -> Result<RelayStats, ProxyError> {
        let cancel = self.slot.cancel_token().clone();

        self.slot.set_state(ConnectionState::Parsing);
        let raw = tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled.into()),
            raw = self.read_request() => raw?,
        };

        let request = ProxyRequest::parse(&raw)?;
        self.version = Some(request.version().to_string());
        metrics::record_request(if request.is_connect() { "connect" } else { "http" });

        let hostname = request.hostname()?;
        let protocol = request.protocol();
        let port = request.port();
        tracing::info!(
            method = request.method(),
            target = request.url(),
            %protocol,
            host = %hostname,
            "Proxying request"
        );

        let outbound = if request.is_connect() {
            None
        } else {
            Some(request.to_upstream_request_with(self.context.rewrite)?)
        };

        self.slot.set_state(ConnectionState::Resolving);
        let upstream = tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled.into()),
            upstream = self.context.connector.connect_to(&hostname, protocol, port) => upstream?,
        };

        self.slot.set_state(ConnectionState::Relaying);
        let options = self.context.relay;
        let stats = match outbound {
            Some(bytes) => relay_http(&mut self.client, upstream, &bytes, &options, &cancel).await?,
            None => {
                let early_data = find_head_end(&raw).map_or(&[][..], |end| &raw[end.body_start..]);
                run_tunnel(&mut self.client, upstream, request.version(), early_data, &options, &cancel).await?
            }
        };
        Ok(stats)
    }

    async fn read_request(&mut self) -> Result<Vec<u8>, ProxyError> {
        let read = read_request(&mut self.client, &self.context.limits);
        match self.context.request_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ProxyError::RequestTimeout(limit))?,
            None => read.await,
        }
    }

    async fn fail(&mut self, err: ProxyError) {
        let status = err.status();
        metrics::record_error(err.kind(), status);

        match &err {
            ProxyError::RelayIo(RelayError::Cancelled) => tracing::debug!("Session cancelled"),
            ProxyError::RelayIo(_) | ProxyError::ClientRead(_) | ProxyError::RequestTimeout(_) => {
                tracing::debug!(error = %err, "Session ended")
            }
            _ => tracing::warn!(error = %err, status = ?status, "Request failed"),
        }

        let Some(status) = status else {
            return;
        };
        let response = ProxyResponse::error(self.version.as_deref(), status, err.description());
        match tokio::time::timeout(ERROR_WRITE_TIMEOUT, self.client.write_all(&response.to_wire())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Failed to send error response"),
            Err(_) => tracing::debug!("Timed out sending error response"),
        }
    }
}

/// Read until the head is complete and any `Content-Length` body has arrived.
///
/// Bytes past the head are kept: for CONNECT they are early tunnel data.
/// If the client closes early, whatever arrived is handed to the parser.
pub async fn read_request<S>(client: &mut S, limits: &LimitsConfig) -> Result<Vec<u8>, ProxyError>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let mut wanted: Option<usize> = None;

    loop {
        if wanted.is_none() {
            match find_head_end(&buf) {
                Some(end) if end.head_len > limits.max_request_head_bytes => {
                    return Err(ProxyError::RequestTooLarge {
                        limit: limits.max_request_head_bytes,
                    });
                }
                Some(end) => {
                    let head = ProxyRequest::parse(&buf[..end.body_start])?;
                    let body_len = if head.is_connect() {
                        0
                    } else {
                        head.content_length()?.unwrap_or(0)
                    };
                    if body_len > limits.max_request_body_bytes {
                        return Err(ProxyError::RequestTooLarge {
                            limit: limits.max_request_body_bytes,
                        });
                    }
                    wanted = Some(end.body_start + body_len);
                }
                None if buf.len() > limits.max_request_head_bytes => {
                    return Err(ProxyError::RequestTooLarge {
                        limit: limits.max_request_head_bytes,
                    });
                }
                None => {}
            }
        }

        if wanted.is_some_and(|total| buf.len() >= total) {
            return Ok(buf);
        }

        let n = client.read(&mut chunk).await.map_err(ProxyError::ClientRead)?;
        if n == 0 {
            if buf.is_empty() {
                return Err(ProxyError::ClientRead(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "client closed before sending a request",
                )));
            }
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Tell an over-capacity client 503 and drop it.
pub async fn reject_over_capacity<S>(mut client: S, peer: SocketAddr)
where
    S: AsyncWrite + Unpin,
{
    let err = ProxyError::CapacityExceeded;
    let status = err.status().unwrap_or(503);
    metrics::record_rejected();
    metrics::record_error(err.kind(), Some(status));
    tracing::warn!(peer = %peer, "Connection limit reached, rejecting");

    let response = ProxyResponse::error(None, status, None);
    let write = async {
        client.write_all(&response.to_wire()).await?;
        client.shutdown().await
    };
    match tokio::time::timeout(ERROR_WRITE_TIMEOUT, write).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(peer = %peer, error = %e, "Failed to send 503"),
        Err(_) => tracing::debug!(peer = %peer, "Timed out sending 503"),
    }
}
