//! # ironlink
//!
//! A TCP server engine for framed command/response services such as IoT
//! gateways.
//!
//! Clients speak a fixed 24-byte header followed by a JSON body carrying
//! a command envelope (`cmd`, `seqno`, ...). The server frames the
//! stream, looks the command up in a route table, and runs the matching
//! [`Router`](ironlink_worker::Router) on a worker pool that keeps each
//! connection's requests in order. Connection limits, per-connection
//! outbound backpressure and broadcast are handled by the engine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ironlink::prelude::*;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl Router for Ping {
//!     async fn handle(&self, req: &Request) -> Result<(), HandlerError> {
//!         req.reply(&Envelope::ok("pong", req.seqno())).await
//!     }
//! }
//!
//! # async fn start() -> Result<(), IronlinkError> {
//! let config = ServerConfig::load("ironlink.toml")?;
//! let server = Server::builder().config(config).route("ping", Ping).build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod connection;
mod error;
pub mod logging;
mod server;

pub use async_trait::async_trait;
pub use config::{ConfigError, ServerConfig};
pub use error::IronlinkError;
pub use server::{Server, ServerBuilder, ServerHandle};

pub use ironlink_protocol as protocol;
pub use ironlink_session as session;
pub use ironlink_transport as transport;
pub use ironlink_worker as worker;

/// Everything a typical service needs in one import.
pub mod prelude {
    pub use crate::{
        ConfigError, IronlinkError, Server, ServerBuilder, ServerConfig, ServerHandle, async_trait,
    };
    pub use ironlink_protocol::{Envelope, FrameHeader, Message};
    pub use ironlink_session::{Connection, ConnectionManager, SessionError};
    pub use ironlink_transport::ConnectionId;
    pub use ironlink_worker::{HandlerError, Request, Router};
}
