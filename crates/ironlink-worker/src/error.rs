//! Error types for routing and dispatch.

use ironlink_protocol::ProtocolError;
use ironlink_session::SessionError;
use ironlink_transport::ConnectionId;

/// Errors raised while handing a request to a handler.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request's connection was stopped before dispatch.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    /// The worker's queue is gone (the worker task exited).
    #[error("worker {0} is unavailable")]
    WorkerUnavailable(usize),

    /// The pool is configured with zero workers, or was never started.
    #[error("no worker pool is running")]
    NoWorkerPool,
}

/// What a [`Router`](crate::Router) returns when it cannot handle a request.
///
/// The display text becomes the `msg` of the error envelope sent back to
/// the client.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Failed`].
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_displays_bare_message() {
        assert_eq!(HandlerError::failed("bad token").to_string(), "bad token");
    }

    #[test]
    fn test_session_error_converts_transparently() {
        let err: HandlerError =
            SessionError::ConnectionClosed(ConnectionId::new(4)).into();
        assert!(matches!(err, HandlerError::Session(_)));
        assert_eq!(err.to_string(), "connection conn-4 is closed");
    }

    #[test]
    fn test_dispatch_error_display() {
        assert_eq!(
            DispatchError::WorkerUnavailable(3).to_string(),
            "worker 3 is unavailable"
        );
    }
}
