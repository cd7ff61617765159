//! Proxy request parsing and rewriting.
//!
//! # Responsibilities
//! - Parse the raw bytes a client sends to the proxy
//! - Derive the upstream protocol, hostname, port and relative URI
//! - Rewrite the request into the exact bytes sent upstream
//!
//! # Design Decisions
//! - Only an allow-list of headers crosses the proxy (Host, Connection,
//!   Authorization, and the payload headers for body-carrying methods)
//! - The body is every byte after the blank line, capped to Content-Length
//! - Header lookups try an exact match first, then ignore ASCII case

use std::fmt::Write as _;

use thiserror::Error;

use crate::http::header::{self, Header};

/// Errors produced while parsing or rewriting a proxy request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty request")]
    Empty,

    #[error("request line has no method")]
    MissingMethod,

    #[error("request line has no target URL")]
    MissingUrl,

    #[error("request line has no HTTP version")]
    MissingVersion,

    #[error("unsupported protocol version: {0}")]
    InvalidVersion(String),

    #[error("request has no Host header")]
    MissingHost,

    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("request head contains a bare CR or NUL byte")]
    ControlCharacter,

    #[error("unsupported Transfer-Encoding: {0}")]
    UnsupportedTransferEncoding(String),
}

/// Protocol spoken with the upstream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Well-known port of the service name.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs applied while rewriting a request for upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOptions {
    /// Send `Connection: close` regardless of what the client asked for.
    pub force_connection_close: bool,
}

/// A parsed client-to-proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    method: String,
    url: String,
    version: String,
    headers: Vec<Header>,
    body: Option<Vec<u8>>,
}

const CONNECT: &str = "CONNECT";

impl ProxyRequest {
    /// Parse a raw request.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let (head, rest) = match find_head_end(raw) {
            Some(head_end) => (&raw[..head_end.head_len], &raw[head_end.body_start..]),
            None => (raw, &raw[raw.len()..]),
        };
        let head = String::from_utf8_lossy(head);
        let mut lines = head.lines();

        let request_line = lines.next().unwrap_or_default();
        if has_control_character(request_line) {
            return Err(ParseError::ControlCharacter);
        }
        let mut tokens = request_line.split_whitespace();
        let method = tokens.next().ok_or(ParseError::MissingMethod)?;
        let url = tokens.next().ok_or(ParseError::MissingUrl)?;
        let version = tokens.next().ok_or(ParseError::MissingVersion)?;
        if !version.starts_with("HTTP/") {
            return Err(ParseError::InvalidVersion(version.to_string()));
        }

        let mut headers = Vec::new();
        for line in lines {
            if has_control_character(line) {
                return Err(ParseError::ControlCharacter);
            }
            if header::is_header_line(line) {
                headers.push(Header::parse_line(line));
            } else if !line.trim().is_empty() {
                tracing::debug!(line = %line, "Ignoring non-header line in request head");
            }
        }

        let mut request = Self {
            method: method.to_string(),
            url: url.to_string(),
            version: version.to_string(),
            headers,
            body: None,
        };

        if let Some(te) = request.header("Transfer-Encoding") {
            return Err(ParseError::UnsupportedTransferEncoding(te.value().to_string()));
        }

        // Only Content-Length frames a body; anything else would depend on
        // how the client's segments happened to arrive.
        if let Some(cl) = request.content_length()? {
            let len = cl.min(rest.len());
            if len > 0 {
                request.body = Some(rest[..len].to_vec());
            }
        }

        Ok(request)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn is_connect(&self) -> bool {
        self.method == CONNECT
    }

    /// Header lookup: exact name first, then ASCII case-insensitive.
    pub fn header(&self, name: &str) -> Option<&Header> {
        header::find(&self.headers, name).or_else(|| header::find_ignore_case(&self.headers, name))
    }

    /// Declared body length, if any.
    pub fn content_length(&self) -> Result<Option<usize>, ParseError> {
        match self.header("Content-Length") {
            Some(h) => h
                .value()
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| ParseError::InvalidContentLength(h.value().to_string())),
            None => Ok(None),
        }
    }

    /// `https` for CONNECT, `http` for everything else.
    pub fn protocol(&self) -> Protocol {
        if self.is_connect() {
            Protocol::Https
        } else {
            Protocol::Http
        }
    }

    /// Upstream hostname without any port.
    ///
    /// CONNECT takes it from the authority-form target; other methods take it
    /// from the Host header.
    pub fn hostname(&self) -> Result<String, ParseError> {
        let authority = self.authority()?;
        let (host, _) = split_authority(authority);
        if host.is_empty() {
            return Err(ParseError::MissingHost);
        }
        Ok(host.to_string())
    }

    /// Explicit upstream port, if the client named one.
    pub fn port(&self) -> Option<u16> {
        self.authority().ok().and_then(|a| split_authority(a).1)
    }

    fn authority(&self) -> Result<&str, ParseError> {
        if self.is_connect() {
            Ok(self.url.trim())
        } else {
            self.header("Host")
                .map(|h| h.value().trim())
                .ok_or(ParseError::MissingHost)
        }
    }

    /// Path and query of the target, or the authority form for CONNECT.
    pub fn relative_uri(&self) -> String {
        if self.is_connect() {
            return self.url.clone();
        }
        let Some(scheme_end) = self.url.find("://") else {
            return self.url.clone();
        };
        let after_scheme = &self.url[scheme_end + 3..];
        match after_scheme.find(['/', '?']) {
            Some(idx) if after_scheme[idx..].starts_with('/') => after_scheme[idx..].to_string(),
            Some(idx) => format!("/{}", &after_scheme[idx..]),
            None => "/".to_string(),
        }
    }

    /// Rewrite into the byte stream sent upstream.
    pub fn to_upstream_request(&self) -> Result<Vec<u8>, ParseError> {
        self.to_upstream_request_with(RewriteOptions::default())
    }

    pub fn to_upstream_request_with(&self, options: RewriteOptions) -> Result<Vec<u8>, ParseError> {
        let hostname = self.hostname()?;
        let connection = if options.force_connection_close {
            Some("close")
        } else {
            self.header("Proxy-Connection")
                .or_else(|| self.header("Connection"))
                .map(Header::value)
        };

        let mut head = String::with_capacity(256);
        // Infallible: writing into a String.
        let _ = write!(
            head,
            "{} {} {}\r\nHost: {}\r\n",
            self.method,
            self.relative_uri(),
            self.version,
            hostname
        );
        if let Some(value) = connection {
            head.push_str(&Header::new("Connection", value).to_wire(true));
        }

        if self.is_connect() {
            head.push_str("\r\n");
            return Ok(head.into_bytes());
        }

        if let Some(auth) = self.header("Authorization") {
            head.push_str(&Header::new("Authorization", auth.value()).to_wire(true));
        }

        if !carries_payload(&self.method) {
            head.push_str("\r\n");
            return Ok(head.into_bytes());
        }

        for name in ["Content-Type", "Content-Length"] {
            if let Some(h) = self.header(name) {
                head.push_str(&Header::new(name, h.value()).to_wire(true));
            }
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
        Ok(out)
    }
}

/// `str::lines` strips the CRLF terminator; any CR or NUL left could split
/// a forwarded header on a lenient upstream.
fn has_control_character(line: &str) -> bool {
    line.contains(['\r', '\0'])
}

fn carries_payload(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH")
}

/// Split `host[:port]` or `[v6][:port]`.
fn split_authority(authority: &str) -> (&str, Option<u16>) {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':').and_then(|p| p.parse().ok())),
            None => (rest, None),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, port.parse().ok())
        }
        _ => (authority, None),
    }
}

/// Position of the blank line ending a request head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadEnd {
    /// Length of the head, excluding the terminator.
    pub head_len: usize,
    /// Offset of the first body byte.
    pub body_start: usize,
}

/// Locate the end of the request head (`\r\n\r\n`, or a bare `\n\n`).
pub fn find_head_end(buf: &[u8]) -> Option<HeadEnd> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| HeadEnd {
        head_len: pos,
        body_start: pos + 4,
    });
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|pos| HeadEnd {
        head_len: pos,
        body_start: pos + 2,
    });
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.head_len <= b.head_len { a } else { b }),
        (a, b) => a.or(b),
    }
}
