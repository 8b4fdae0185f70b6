//! The connection registry: every live connection, keyed by id.
//!
//! A connection is in the registry exactly from "added after accept" to
//! "removed at teardown". The map sits behind one `RwLock` that is never
//! held across an `.await` and never while a connection's own attribute
//! lock is taken, so no lock ordering is needed.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ironlink_transport::ConnectionId;
use serde_json::Value;

use crate::{Connection, SessionError};

/// Tracks all live connections for one server.
///
/// Think of this as the server's phone book: broadcasts, the connection
/// limit and attribute queries all start from it.
///
/// ## Lifecycle
///
/// ```text
///  accept ──→ add() ──→ [registered] ──→ remove() ──→ [gone]
///                            │                ▲
///                            │ clear()        │ reader teardown
///                            ▼                │
///                        stop() each ─────────┘
/// ```
///
/// - `add` runs once per accepted socket, before its reader starts.
/// - `remove` runs once, from the reader's teardown, whatever ended it
///   (peer EOF, a framing error or a stop).
/// - `clear` is used by server shutdown. It empties the map first and
///   only then stops each connection, so no registry lock is held while
///   connections log and wake their writers. Their teardowns still call
///   `remove`, which is then a no-op.
///
/// ## Snapshots
///
/// [`get_all`](Self::get_all) and the attribute queries return owned
/// `Vec<Arc<Connection>>` snapshots. Callers may `.await` while iterating
/// them (a broadcast does) without blocking `add` or `remove`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, replacing any stale entry with the same id.
    pub fn add(&self, conn: Arc<Connection>) {
        let count = {
            let mut map = self.write();
            map.insert(conn.id(), conn.clone());
            map.len()
        };
        tracing::info!(conn_id = %conn.id(), count, "connection registered");
    }

    /// Unregisters a connection. Removing an absent id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let (removed, count) = {
            let mut map = self.write();
            let removed = map.remove(&id);
            (removed, map.len())
        };
        if removed.is_some() {
            tracing::info!(conn_id = %id, count, "connection unregistered");
        }
        removed
    }

    /// Looks up a live connection.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] if no connection has this id.
    pub fn get(&self, id: ConnectionId) -> Result<Arc<Connection>, SessionError> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// A snapshot of every live connection, ordered by id.
    ///
    /// The registry can change as soon as this returns; the snapshot
    /// won't.
    pub fn get_all(&self) -> Vec<Arc<Connection>> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by_key(|conn| conn.id());
        all
    }

    /// Connections whose attribute `key` matches.
    ///
    /// With `None`, any connection holding a non-null value under `key`
    /// matches. With `Some(v)`, the stored value must equal `v`.
    pub fn get_by_attribute(
        &self,
        key: &str,
        value: Option<&Value>,
    ) -> Vec<Arc<Connection>> {
        // Filter the snapshot so the registry lock and the per-connection
        // attribute locks are never held together.
        self.get_all()
            .into_iter()
            .filter(|conn| conn.matches_attribute(key, value))
            .collect()
    }

    /// Stops and forgets every connection. Returns how many were cleared.
    ///
    /// Drains the map under the lock, then stops each connection outside
    /// it. A connection's own teardown calls [`remove`](Self::remove),
    /// which is then a harmless no-op.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.write().drain().map(|(_, c)| c).collect();
        for conn in &drained {
            conn.stop();
        }
        tracing::info!(cleared = drained.len(), "all connections cleared");
        drained.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }
}
