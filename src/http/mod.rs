//! HTTP/1.x wire handling for the proxy.
//!
//! # Data Flow
//! ```text
//! raw client bytes
//!     → request.rs (parse, derive host/protocol, rewrite)
//!     → [upstream connector + relay]
//!     → response.rs (CONNECT acknowledgment, error replies)
//!     → error_doc.rs (status table, HTML body)
//! ```

pub mod error_doc;
pub mod header;
pub mod request;
pub mod response;

pub use error_doc::ErrorStatus;
pub use header::Header;
pub use request::{ParseError, Protocol, ProxyRequest, RewriteOptions};
pub use response::ProxyResponse;
