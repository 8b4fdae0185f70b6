//! Per-connection reader loop.
//!
//! Each accepted socket gets one task running [`serve`]. It reads frames
//! until the peer goes away, the framing breaks, or the connection is
//! stopped, and hands every frame to the dispatcher. The flow is:
//!   1. `read_frame` → `Message`
//!   2. decode the body → `Envelope` (default envelope if undecodable)
//!   3. `Dispatcher::dispatch` → worker queue or a fresh task
//!
//! Teardown happens here and only here, once, after the loop exits.

use std::sync::Arc;

use ironlink_protocol::{Codec, Envelope, read_frame};
use ironlink_session::Connection;
use ironlink_worker::Request;
use tokio::io::AsyncRead;

use crate::server::ServerState;

pub(crate) async fn serve<R>(conn: Arc<Connection>, reader: R, state: Arc<ServerState>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tracing::debug!(conn_id = %conn.id(), peer = %conn.peer_addr(), "reader started");

    read_loop(&conn, reader, &state).await;

    // The reader half drops here; the writer shuts down the write half
    // when it sees the stop.
    conn.stop();
    state.connections.remove(conn.id());
    state.hooks.disconnected(&conn);

    tracing::debug!(conn_id = %conn.id(), "reader exited");
}

async fn read_loop<R>(conn: &Arc<Connection>, mut reader: R, state: &ServerState)
where
    R: AsyncRead + Unpin,
{
    let conn_id = conn.id();
    let max_body = state.config.max_packet_size;

    loop {
        let frame = tokio::select! {
            biased;
            _ = conn.stopped() => {
                tracing::debug!(%conn_id, "connection stopped");
                break;
            }
            frame = read_frame(&mut reader, max_body) => frame,
        };

        let message = match frame {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::info!(%conn_id, "peer closed connection");
                break;
            }
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "framing error, closing connection");
                break;
            }
        };

        let envelope = state
            .codec
            .decode::<Envelope>(message.body())
            .unwrap_or_else(|e| {
                tracing::debug!(%conn_id, error = %e, "undecodable envelope");
                Envelope::default()
            });
        tracing::trace!(%conn_id, cmd = %envelope.cmd, seqno = %envelope.seqno, "request received");

        // A full worker queue blocks here, so stop must be able to win.
        let request = Request::new(Arc::clone(conn), message, envelope);
        let dispatched = tokio::select! {
            biased;
            _ = conn.stopped() => {
                tracing::debug!(%conn_id, "connection stopped while dispatching");
                break;
            }
            dispatched = state.dispatcher.dispatch(request) => dispatched,
        };
        if let Err(e) = dispatched {
            tracing::debug!(%conn_id, error = %e, "dispatch failed");
            break;
        }
    }
}
