//! Transport abstraction layer for ironlink.
//!
//! Provides the [`Transport`] trait that the server's accept loop is
//! written against, the [`TcpTransport`] implementation, and the
//! [`ConnectionId`] handed to every accepted socket.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::TcpTransport;

use std::fmt;
use std::net::SocketAddr;

/// Identifier assigned to a connection by the server's accept loop.
///
/// Ids are handed out monotonically and wrap at `u32::MAX`. The worker
/// pool shards on this value, so it is deliberately a plain `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u32`.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying `u32` value.
    pub fn into_inner(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming byte streams.
pub trait Transport: Send + Sync + 'static {
    /// The stream type produced by this transport.
    type Stream: Send + 'static;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming stream.
    async fn accept(
        &mut self,
    ) -> Result<(Self::Stream, SocketAddr), Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}
