//! TCP transport implementation using `tokio::net`.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::{Transport, TransportError};

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            TransportError::BindFailed {
                addr: addr.to_string(),
                source: e,
            }
        })?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Error = TransportError;

    async fn accept(
        &mut self,
    ) -> Result<(TcpStream, SocketAddr), Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        // Frames are small request/response pairs; Nagle only adds latency.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "set_nodelay failed");
        }
        tracing::debug!(%addr, "accepted TCP connection");

        Ok((stream, addr))
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener.local_addr().map_err(TransportError::LocalAddr)
    }
}
