//! Unified error type for ironlink.

use ironlink_protocol::ProtocolError;
use ironlink_session::SessionError;
use ironlink_transport::TransportError;
use ironlink_worker::{DispatchError, HandlerError};

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// Each variant has a `From` impl, so `?` lifts sub-crate errors into
/// this one.
#[derive(Debug, thiserror::Error)]
pub enum IronlinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The server was stopped; it no longer accepts work.
    #[error("server has been stopped")]
    ServerStopped,
}
