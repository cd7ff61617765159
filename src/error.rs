//! Connection-level error taxonomy.
//!
//! Every failure is local to one connection. [`ProxyError::status`] says
//! which error page, if any, the client should receive.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::http::ParseError;
use crate::relay::RelayError;
use crate::upstream::{ConnectError, ResolveError};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed request: {0}")]
    MalformedRequest(#[from] ParseError),

    #[error("request head exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("client sent no complete request within {0:?}")]
    RequestTimeout(Duration),

    #[error("failed to read request from client: {0}")]
    ClientRead(#[source] io::Error),

    #[error("resolution failed: {0}")]
    Resolution(#[source] ResolveError),

    #[error("upstream connect failed: {0}")]
    Connect(#[source] ConnectError),

    #[error("relay failed: {0}")]
    RelayIo(#[from] RelayError),

    #[error("connection capacity exceeded")]
    CapacityExceeded,
}

impl From<ConnectError> for ProxyError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Resolve(e) => ProxyError::Resolution(e),
            other => ProxyError::Connect(other),
        }
    }
}

impl From<ResolveError> for ProxyError {
    fn from(err: ResolveError) -> Self {
        ProxyError::Resolution(err)
    }
}

const DNS_RETRY_HINT: &str =
    "<p>DNS server fails to do lookup temporarily. Please refresh the webpage or try again later.</p>\n";
const DNS_BROKEN_HINT: &str = "<p>DNS server fails to do lookup. Your DNS server may be broken.</p>\n";

impl ProxyError {
    /// Status code to answer with, or `None` when nothing should be written.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProxyError::MalformedRequest(ParseError::UnsupportedTransferEncoding(_)) => Some(501),
            ProxyError::MalformedRequest(_) | ProxyError::RequestTooLarge { .. } => Some(400),
            ProxyError::RequestTimeout(_) | ProxyError::ClientRead(_) => None,
            ProxyError::Resolution(e) => Some(match e {
                ResolveError::Temporary { .. } | ResolveError::ServerFailure { .. } => 503,
                ResolveError::NotFound { .. } => 404,
                ResolveError::NoData { .. } => 502,
                ResolveError::Other { .. } => 500,
            }),
            ProxyError::Connect(e) => Some(match e {
                ConnectError::Socket { .. } => 500,
                ConnectError::Connect { .. } | ConnectError::Timeout { .. } => 502,
                ConnectError::Resolve(_) => 500,
            }),
            // Part of the response may already be on the wire.
            ProxyError::RelayIo(_) => None,
            ProxyError::CapacityExceeded => Some(503),
        }
    }

    /// HTML description replacing the error table default.
    pub fn description(&self) -> Option<&'static str> {
        match self {
            ProxyError::Resolution(ResolveError::Temporary { .. }) => Some(DNS_RETRY_HINT),
            ProxyError::Resolution(ResolveError::ServerFailure { .. }) => Some(DNS_BROKEN_HINT),
            _ => None,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MalformedRequest(_) => "malformed_request",
            ProxyError::RequestTooLarge { .. } => "request_too_large",
            ProxyError::RequestTimeout(_) => "request_timeout",
            ProxyError::ClientRead(_) => "client_read",
            ProxyError::Resolution(_) => "resolution",
            ProxyError::Connect(_) => "connect",
            ProxyError::RelayIo(_) => "relay_io",
            ProxyError::CapacityExceeded => "capacity_exceeded",
        }
    }
}
