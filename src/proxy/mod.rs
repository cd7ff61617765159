//! Connection manager: accept loop plus per-connection sessions.
//!
//! # Data Flow
//! ```text
//! server.rs (accept, admit or 503)
//!     → session.rs (read, parse, connect)
//!     → relay::{relay_http, run_tunnel}
//! ```

pub mod server;
pub mod session;

pub use server::ProxyServer;
pub use session::{Session, SessionContext};
