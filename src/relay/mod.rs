//! Byte relaying between client and upstream.
//!
//! # Data Flow
//! ```text
//! HTTP (http.rs):
//!     SendRequest → StreamResponse → Closed
//!
//! CONNECT (tunnel.rs):
//!     Acknowledge → Relay (client→upstream ‖ upstream→client) → Closed
//! ```
//!
//! # Design Decisions
//! - Every read observes the session's cancellation token and the idle timeout
//! - Generic over `AsyncRead + AsyncWrite` so the engine runs on in-memory pipes in tests
//! - No retries: the first I/O failure ends the relay

pub mod http;
pub mod tunnel;

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

pub use http::relay_http;
pub use tunnel::run_tunnel;

/// Which peer an I/O operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Upstream => f.write_str("upstream"),
        }
    }
}

/// I/O failure while relaying.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("read from {side} failed: {source}")]
    Read {
        side: Side,
        #[source]
        source: io::Error,
    },

    #[error("write to {side} failed: {source}")]
    Write {
        side: Side,
        #[source]
        source: io::Error,
    },

    #[error("{side} idle for {timeout:?}")]
    Idle { side: Side, timeout: Duration },

    #[error("relay cancelled")]
    Cancelled,
}

/// Tuning shared by both relay strategies.
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    /// Size of each read chunk.
    pub buffer_size: usize,
    /// Longest wait for a single read; `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            idle_timeout: None,
        }
    }
}

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client → upstream.
    pub bytes_up: u64,
    /// Upstream → client.
    pub bytes_down: u64,
}

/// Read one chunk. `Ok(0)` means end of stream.
pub(crate) async fn read_chunk<R>(
    reader: &mut R,
    buf: &mut [u8],
    side: Side,
    options: &RelayOptions,
    cancel: &CancellationToken,
) -> Result<usize, RelayError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let read = async {
        let result = match options.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, reader.read(buf))
                .await
                .map_err(|_| RelayError::Idle { side, timeout })?,
            None => reader.read(buf).await,
        };
        result.map_err(|source| RelayError::Read { side, source })
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        result = read => result,
    }
}

/// Write the whole buffer unless cancelled first.
pub(crate) async fn write_all<W>(
    writer: &mut W,
    buf: &[u8],
    side: Side,
    cancel: &CancellationToken,
) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        writer.write_all(buf).await?;
        writer.flush().await
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        result = write => result.map_err(|source| RelayError::Write { side, source }),
    }
}
