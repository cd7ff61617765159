//! Upstream server resolution and connection.
//!
//! # Data Flow
//! ```text
//! (hostname, protocol, optional port)
//!     → resolver.rs (candidate addresses, failure classification)
//!     → connector.rs (ordered connect attempts, first success wins)
//!     → TcpStream handed to the relay engine
//! ```

pub mod connector;
pub mod resolver;

pub use connector::{ConnectError, Connector};
pub use resolver::{Resolve, ResolveError, SystemResolver};
