//! Forward HTTP proxy library.
//!
//! Plain requests are rewritten to origin form and relayed once; CONNECT
//! requests become an opaque two-way tunnel.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod relay;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
