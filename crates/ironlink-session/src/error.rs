//! Error types for the session layer.

use ironlink_protocol::ProtocolError;
use ironlink_transport::ConnectionId;

/// Errors raised by connections and the connection registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection has been stopped; nothing more can be sent on it.
    /// Callers should treat this as a fire-and-forget failure.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// No live connection is registered under this id.
    #[error("connection {0} not found")]
    NotFound(ConnectionId),

    /// The connection carries no attribute with this key.
    #[error("no attribute found for key {0:?}")]
    AttributeNotFound(String),

    /// The outbound message could not be framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
