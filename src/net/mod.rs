//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, SO_REUSEADDR, backlog)
//!     → connection.rs (slot admission, lifecycle tracking)
//!     → Hand off to proxy session
//!
//! Connection States:
//!     Accepted → Parsing → Resolving → Relaying → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded registry prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, ConnectionInfo, ConnectionRegistry, ConnectionState, SlotGuard};
pub use listener::{Listener, ListenerError};
