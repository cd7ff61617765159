//! Responses synthesized by the proxy.
//!
//! # Responsibilities
//! - Build the CONNECT acknowledgment
//! - Build protocol-level error replies with an HTML body
//! - Serialize both to wire bytes
//!
//! # Design Decisions
//! - Stateless value type, built fresh per use
//! - Error replies always carry `Connection: close`; the proxy handles
//!   one request per connection

use crate::http::error_doc::{render_error_document, ErrorStatus};
use crate::http::header::Header;

/// Version used when the client's version is unknown.
pub const DEFAULT_VERSION: &str = "HTTP/1.0";

/// A status line plus optional headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    version: String,
    status: String,
    phrase: String,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ProxyResponse {
    pub fn new(version: impl Into<String>, status: impl Into<String>, phrase: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            status: status.into(),
            phrase: phrase.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// `<version> 200 Connection Established`, no headers, no body.
    pub fn connection_established(version: &str) -> Self {
        Self::new(version, "200", "Connection Established")
    }

    /// An error reply carrying the HTML error document for `status`.
    ///
    /// `version` defaults to HTTP/1.0; `description` defaults to the table text.
    pub fn error(version: Option<&str>, status: u16, description: Option<&str>) -> Self {
        let status = ErrorStatus::from_code(status);
        let body = render_error_document(status, description).into_bytes();
        Self::new(version.unwrap_or(DEFAULT_VERSION), status.code().to_string(), status.phrase())
            .with_header("Content-Type", "text/html; charset=UTF-8")
            .with_header("Content-Length", body.len().to_string())
            .with_header("Connection", "close")
            .with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Status line and headers, terminated by the blank line.
    pub fn head(&self) -> String {
        let mut head = format!("{} {} {}\r\n", self.version, self.status, self.phrase);
        for header in &self.headers {
            head.push_str(&header.to_wire(true));
        }
        head.push_str("\r\n");
        head
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = self.head().into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_established() {
        let response = ProxyResponse::connection_established("HTTP/1.1");
        assert_eq!(response.to_wire(), b"HTTP/1.1 200 Connection Established\r\n\r\n".to_vec());
    }

    #[test]
    fn test_error_response() {
        let response = ProxyResponse::error(None, 502, None);
        assert_eq!(response.status(), "502");
        assert_eq!(response.phrase(), "Bad Gateway");

        let wire = String::from_utf8(response.to_wire()).unwrap();
        assert!(wire.starts_with("HTTP/1.0 502 Bad Gateway\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.contains(&format!("Content-Length: {}\r\n", response.body().len())));
        assert!(wire.contains("<h1>502 Bad Gateway</h1>"));
    }

    #[test]
    fn test_error_response_unknown_code_maps_to_500() {
        let response = ProxyResponse::error(Some("HTTP/1.1"), 504, Some("<p>slow</p>"));
        let wire = String::from_utf8(response.to_wire()).unwrap();
        assert!(wire.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(wire.contains("<p>slow</p>"));
    }
}
