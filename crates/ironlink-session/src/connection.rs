//! A live client connection: its outbound queues, writer task, attribute
//! map and stop signal.
//!
//! The reading half of the socket is owned by the server's reader loop;
//! everything that goes *out* flows through this type. The writer task
//! spawned by [`Connection::spawn`] is the only code that ever writes to
//! the socket.
//!
//! ```text
//!   send_msg ──────► priority (cap 1) ──┐
//!                                       ├──► writer task ──► socket
//!   send_buff_msg ─► buffered (cap N) ──┘        ▲
//!                                                │
//!   stop() ─────────► watch<bool> ───────────────┘  (exits without draining)
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use bytes::Bytes;
use ironlink_protocol::{Message, pack};
use ironlink_transport::ConnectionId;
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Per-connection tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the buffered outbound queue used by
    /// [`Connection::send_buff_msg`]. Values below 1 are treated as 1.
    pub max_msg_chan_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_msg_chan_len: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One accepted socket, seen from the sending side.
///
/// Shared as `Arc<Connection>` between the registry, the reader loop,
/// handlers and the broadcast fan-out. `closed` only ever moves from
/// `false` to `true`.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    closed: AtomicBool,
    attributes: RwLock<HashMap<String, Value>>,
    /// tokio has no zero-capacity channel; capacity 1 is the closest
    /// rendezvous, and the writer always polls it first.
    priority_tx: mpsc::Sender<Bytes>,
    buffered_tx: mpsc::Sender<Bytes>,
    stop_tx: watch::Sender<bool>,
}

/// Receiving ends handed to the writer task.
struct Outbound {
    priority: mpsc::Receiver<Bytes>,
    buffered: mpsc::Receiver<Bytes>,
    stop: watch::Receiver<bool>,
}

impl Connection {
    /// Creates the connection and spawns its writer task over `writer`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<W>(
        id: ConnectionId,
        peer_addr: SocketAddr,
        writer: W,
        config: &SessionConfig,
    ) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (priority_tx, priority) = mpsc::channel(1);
        let (buffered_tx, buffered) =
            mpsc::channel(config.max_msg_chan_len.max(1));
        let (stop_tx, stop) = watch::channel(false);

        let conn = Arc::new(Self {
            id,
            peer_addr,
            closed: AtomicBool::new(false),
            attributes: RwLock::new(HashMap::new()),
            priority_tx,
            buffered_tx,
            stop_tx,
        });

        let outbound = Outbound {
            priority,
            buffered,
            stop,
        };
        tokio::spawn(write_loop(Arc::downgrade(&conn), id, writer, outbound));

        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the connection closed and tells the writer to exit.
    ///
    /// Returns `true` only for the call that actually closed it; every
    /// later call is a no-op returning `false`.
    pub fn stop(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.stop_tx.send_replace(true);
        tracing::info!(
            conn_id = %self.id,
            peer = %self.peer_addr,
            "connection stopping"
        );
        true
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        let mut rx = self.stop_tx.subscribe();
        // Only fails if the sender is gone, which means we're gone too.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    // -- Sending ----------------------------------------------------------

    /// Frames `body` with the default header and queues it on the
    /// priority path. Waits while the writer is busy.
    ///
    /// # Errors
    /// [`SessionError::ConnectionClosed`] if the connection is (or becomes)
    /// closed.
    pub async fn send_msg(
        &self,
        body: impl Into<Bytes>,
    ) -> Result<(), SessionError> {
        self.send_message(&Message::new(body)).await
    }

    /// Frames `body` with the default header and queues it on the buffered
    /// path. Waits only when the buffer is full.
    ///
    /// # Errors
    /// [`SessionError::ConnectionClosed`] if the connection is (or becomes)
    /// closed.
    pub async fn send_buff_msg(
        &self,
        body: impl Into<Bytes>,
    ) -> Result<(), SessionError> {
        self.send_buff_message(&Message::new(body)).await
    }

    /// Like [`send_msg`](Self::send_msg) for a caller-built message.
    pub async fn send_message(
        &self,
        message: &Message,
    ) -> Result<(), SessionError> {
        let frame = self.frame(message)?;
        self.priority_tx
            .send(frame)
            .await
            .map_err(|_| SessionError::ConnectionClosed(self.id))
    }

    /// Like [`send_buff_msg`](Self::send_buff_msg) for a caller-built
    /// message.
    pub async fn send_buff_message(
        &self,
        message: &Message,
    ) -> Result<(), SessionError> {
        let frame = self.frame(message)?;
        self.buffered_tx
            .send(frame)
            .await
            .map_err(|_| SessionError::ConnectionClosed(self.id))
    }

    fn frame(&self, message: &Message) -> Result<Bytes, SessionError> {
        if self.is_closed() {
            return Err(SessionError::ConnectionClosed(self.id));
        }
        Ok(pack(message)?)
    }

    // -- Attributes -------------------------------------------------------

    /// Sets (or replaces) a handler-defined attribute.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Returns a copy of the attribute stored under `key`.
    ///
    /// # Errors
    /// [`SessionError::AttributeNotFound`] if the key is absent.
    pub fn attribute(&self, key: &str) -> Result<Value, SessionError> {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| SessionError::AttributeNotFound(key.to_string()))
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// `None` matches any non-null value under `key`; `Some(v)` matches
    /// only a value equal to `v`.
    pub(crate) fn matches_attribute(
        &self,
        key: &str,
        expected: Option<&Value>,
    ) -> bool {
        let attributes =
            self.attributes.read().unwrap_or_else(PoisonError::into_inner);
        match (attributes.get(key), expected) {
            (Some(Value::Null) | None, _) => false,
            (Some(_), None) => true,
            (Some(value), Some(expected)) => value == expected,
        }
    }
}

/// The writer task: sole owner of the socket's write half.
///
/// Holds only a `Weak` so a forgotten connection doesn't keep itself
/// alive through its own writer.
async fn write_loop<W>(
    conn: Weak<Connection>,
    id: ConnectionId,
    mut writer: W,
    mut outbound: Outbound,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tracing::debug!(conn_id = %id, "writer started");

    loop {
        let frame = tokio::select! {
            biased;
            _ = outbound.stop.wait_for(|stopped| *stopped) => break,
            Some(frame) = outbound.priority.recv() => frame,
            Some(frame) = outbound.buffered.recv() => frame,
            else => break,
        };

        let written = tokio::select! {
            biased;
            _ = outbound.stop.wait_for(|stopped| *stopped) => break,
            result = writer.write_all(&frame) => result,
        };

        if let Err(e) = written {
            tracing::warn!(conn_id = %id, error = %e, "write failed, writer exiting");
            if let Some(conn) = conn.upgrade() {
                conn.stop();
            }
            break;
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!(conn_id = %id, "writer exited");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ironlink_protocol::{FrameHeader, read_frame};
    use serde_json::json;
    use tokio::io::DuplexStream;

    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn connection(chan_len: usize, pipe: usize) -> (Arc<Connection>, DuplexStream) {
        let (server, client) = tokio::io::duplex(pipe);
        let config = SessionConfig {
            max_msg_chan_len: chan_len,
        };
        let conn = Connection::spawn(ConnectionId::new(1), addr(), server, &config);
        (conn, client)
    }

    #[tokio::test]
    async fn test_send_msg_writes_framed_body() {
        let (conn, mut client) = connection(8, 1024);

        conn.send_msg(&b"{\"cmd\":\"pong\"}"[..]).await.unwrap();

        let msg = read_frame(&mut client, 0).await.unwrap().unwrap();
        assert_eq!(&msg.body()[..], b"{\"cmd\":\"pong\"}");
        assert_eq!(msg.header(), &FrameHeader::default());
    }

    #[tokio::test]
    async fn test_send_buff_msg_preserves_order() {
        let (conn, mut client) = connection(8, 4096);

        for i in 0..5 {
            conn.send_buff_msg(format!("m{i}")).await.unwrap();
        }

        for i in 0..5 {
            let msg = read_frame(&mut client, 0).await.unwrap().unwrap();
            assert_eq!(&msg.body()[..], format!("m{i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn test_send_message_keeps_custom_header() {
        let (conn, mut client) = connection(8, 1024);
        let header = FrameHeader {
            client_type: 3,
            ..FrameHeader::default()
        };

        conn.send_message(&Message::with_header(header, &b"x"[..]))
            .await
            .unwrap();

        let msg = read_frame(&mut client, 0).await.unwrap().unwrap();
        assert_eq!(msg.client_type(), 3);
    }

    #[tokio::test]
    async fn test_send_on_closed_connection_fails_fast() {
        let (conn, _client) = connection(8, 1024);
        conn.stop();

        let err = conn.send_msg(&b"late"[..]).await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionClosed(id) if id == conn.id()));

        let err = conn.send_buff_msg(&b"late"[..]).await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (conn, _client) = connection(8, 1024);

        assert!(!conn.is_closed());
        assert!(conn.stop(), "first stop closes");
        assert!(!conn.stop(), "second stop is a no-op");
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let (conn, _client) = connection(8, 1024);

        let waiter = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.stopped().await })
        };
        conn.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stopped() should resolve")
            .unwrap();
        // And immediately for late callers.
        tokio::time::timeout(Duration::from_secs(1), conn.stopped())
            .await
            .expect("already stopped");
    }

    #[tokio::test]
    async fn test_stop_closes_write_side() {
        let (conn, mut client) = connection(8, 1024);
        conn.stop();

        let end = tokio::time::timeout(
            Duration::from_secs(1),
            read_frame(&mut client, 0),
        )
        .await
        .expect("writer should shut down");
        assert!(end.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_full_buffer_blocks_sender_until_drained() {
        // Pipe smaller than one frame: the writer blocks mid-write on the
        // first message, so the buffered queue (cap 2) fills behind it.
        let (conn, mut client) = connection(2, 16);
        let body = Bytes::from_static(b"0123456789");

        conn.send_buff_msg(body.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.send_buff_msg(body.clone()).await.unwrap();
        conn.send_buff_msg(body.clone()).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            conn.send_buff_msg(body.clone()),
        )
        .await;
        assert!(blocked.is_err(), "send into a full buffer should wait");

        let pending = {
            let conn = Arc::clone(&conn);
            let body = body.clone();
            tokio::spawn(async move { conn.send_buff_msg(body).await })
        };

        for _ in 0..4 {
            let msg = read_frame(&mut client, 0).await.unwrap().unwrap();
            assert_eq!(msg.body(), &body);
        }
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_stops_connection() {
        let (conn, client) = connection(8, 1024);
        drop(client);

        // The first write hits a closed pipe; later sends see the stop.
        let _ = conn.send_msg(&b"into the void"[..]).await;
        tokio::time::timeout(Duration::from_secs(1), conn.stopped())
            .await
            .expect("write error should stop the connection");
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_attributes_set_get_remove() {
        let (conn, _client) = connection(8, 1024);

        conn.set_attribute("mid", "123");
        conn.set_attribute("product_type", 169);
        assert_eq!(conn.attribute("mid").unwrap(), json!("123"));
        assert_eq!(conn.attribute("product_type").unwrap(), json!(169));

        assert_eq!(conn.remove_attribute("mid"), Some(json!("123")));
        assert!(matches!(
            conn.attribute("mid"),
            Err(SessionError::AttributeNotFound(key)) if key == "mid"
        ));
    }

    #[tokio::test]
    async fn test_matches_attribute_rules() {
        let (conn, _client) = connection(8, 1024);
        conn.set_attribute("group", "north");
        conn.set_attribute("cleared", Value::Null);

        assert!(conn.matches_attribute("group", None));
        assert!(conn.matches_attribute("group", Some(&json!("north"))));
        assert!(!conn.matches_attribute("group", Some(&json!("south"))));
        assert!(!conn.matches_attribute("cleared", None));
        assert!(!conn.matches_attribute("missing", None));
    }
}
