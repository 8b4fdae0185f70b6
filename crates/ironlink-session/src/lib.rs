//! Connection state for ironlink.
//!
//! - [`Connection`] — one live socket: outbound queues, the writer task,
//!   handler-defined attributes and the stop signal.
//! - [`ConnectionManager`] — the registry of live connections used for
//!   lookup, attribute filtering, broadcast and bulk teardown.
//!
//! # How it fits in the stack
//!
//! ```text
//! Worker layer (above)   ← handlers reply through Connection
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol layer (below) ← frames every outbound message
//! ```

mod connection;
mod error;
mod manager;

pub use connection::{Connection, SessionConfig};
pub use error::SessionError;
pub use manager::ConnectionManager;
