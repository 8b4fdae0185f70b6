//! `Server` builder, accept loop and broadcast fan-out.
//!
//! This is the entry point for running an ironlink service. It ties the
//! layers together: transport → protocol → session → worker.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use ironlink_protocol::JsonCodec;
use ironlink_session::{Connection, ConnectionManager};
use ironlink_transport::{ConnectionId, TcpTransport, Transport};
use ironlink_worker::{Dispatcher, Router};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::connection::serve;
use crate::{IronlinkError, ServerConfig};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) doesn't spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type ConnectionHook = Box<dyn Fn(&Arc<Connection>) + Send + Sync>;
type StartedHook = Box<dyn Fn(&ServerHandle) + Send + Sync>;

/// Lifecycle callbacks. Each one is a no-op unless set.
#[derive(Default)]
pub(crate) struct Hooks {
    on_connect: Option<ConnectionHook>,
    on_disconnect: Option<ConnectionHook>,
    on_started: Option<StartedHook>,
}

impl Hooks {
    pub(crate) fn connected(&self, conn: &Arc<Connection>) {
        if let Some(hook) = &self.on_connect {
            hook(conn);
        }
    }

    pub(crate) fn disconnected(&self, conn: &Arc<Connection>) {
        if let Some(hook) = &self.on_disconnect {
            hook(conn);
        }
    }

    fn started(&self, handle: &ServerHandle) {
        if let Some(hook) = &self.on_started {
            hook(handle);
        }
    }
}

/// Shared server state, one per server, handed to every connection task.
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) connections: ConnectionManager,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) hooks: Hooks,
    pub(crate) codec: JsonCodec,
    next_id: AtomicU32,
    broadcast_tx: mpsc::Sender<Bytes>,
    shutdown: watch::Sender<bool>,
}

impl ServerState {
    fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`Server`].
///
/// # Example
///
/// ```rust,no_run
/// use ironlink::prelude::*;
///
/// struct Ping;
///
/// #[async_trait]
/// impl Router for Ping {
///     async fn handle(&self, req: &Request) -> Result<(), HandlerError> {
///         req.reply(&Envelope::ok("pong", req.seqno())).await
///     }
/// }
///
/// # async fn start() -> Result<(), IronlinkError> {
/// let server = Server::builder()
///     .bind("127.0.0.1:8090")
///     .route("ping", Ping)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    bind_addr: Option<String>,
    routes: Vec<(String, Arc<dyn Router>)>,
    hooks: Hooks,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Listens on `addr` instead of the configured `host:port`.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    /// Routes requests whose `cmd` is `cmd` to `router`.
    ///
    /// Registering the same command twice makes [`build`](Self::build)
    /// panic.
    pub fn route(mut self, cmd: impl Into<String>, router: impl Router) -> Self {
        let router: Arc<dyn Router> = Arc::new(router);
        self.routes.push((cmd.into(), router));
        self
    }

    /// Called once per connection, after it is registered and before its
    /// first frame is read.
    pub fn on_connect(mut self, hook: impl Fn(&Arc<Connection>) + Send + Sync + 'static) -> Self {
        self.hooks.on_connect = Some(Box::new(hook));
        self
    }

    /// Called once per connection, after it is stopped and unregistered.
    pub fn on_disconnect(
        mut self,
        hook: impl Fn(&Arc<Connection>) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_disconnect = Some(Box::new(hook));
        self
    }

    /// Called once when [`Server::run`] starts accepting.
    pub fn on_started(mut self, hook: impl Fn(&ServerHandle) + Send + Sync + 'static) -> Self {
        self.hooks.on_started = Some(Box::new(hook));
        self
    }

    /// Binds the listener and freezes the route table.
    ///
    /// # Panics
    /// If two routes were registered for the same command.
    pub async fn build(self) -> Result<Server, IronlinkError> {
        let addr = self.bind_addr.unwrap_or_else(|| self.config.addr());
        let transport = TcpTransport::bind(&addr).await?;
        let local_addr = transport.local_addr()?;

        let mut dispatcher = Dispatcher::new(self.config.worker_config());
        for (cmd, router) in self.routes {
            dispatcher.add_router(cmd, router);
        }

        let (broadcast_tx, broadcast_rx) = mpsc::channel(self.config.max_msg_chan_len.max(1));
        let (shutdown, _) = watch::channel(false);

        let state = Arc::new(ServerState {
            config: self.config,
            connections: ConnectionManager::new(),
            dispatcher: Arc::new(dispatcher),
            hooks: self.hooks,
            codec: JsonCodec,
            next_id: AtomicU32::new(0),
            broadcast_tx,
            shutdown,
        });

        Ok(Server {
            transport,
            state,
            broadcast_rx,
            local_addr,
        })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound, not yet running ironlink server.
///
/// Take a [`handle`](Self::handle) before calling [`run`](Self::run) if
/// something else needs to broadcast or stop it.
pub struct Server {
    transport: TcpTransport,
    state: Arc<ServerState>,
    broadcast_rx: mpsc::Receiver<Bytes>,
    local_addr: SocketAddr,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            state: Arc::clone(&self.state),
            local_addr: self.local_addr,
        }
    }

    /// Starts the worker pool and the broadcast loop, then accepts
    /// connections until [`ServerHandle::stop`] is called.
    pub async fn run(self) -> Result<(), IronlinkError> {
        let handle = self.handle();
        let Server {
            mut transport,
            state,
            broadcast_rx,
            local_addr,
        } = self;

        if state.is_stopped() {
            return Err(IronlinkError::ServerStopped);
        }

        state.dispatcher.start_worker_pool();
        tokio::spawn(broadcast_loop(Arc::clone(&state), broadcast_rx));

        tracing::info!(
            name = %state.config.name,
            addr = %local_addr,
            max_conn = state.config.max_conn,
            workers = state.config.worker_pool_size,
            "server running"
        );
        state.hooks.started(&handle);

        let mut shutdown = state.shutdown.subscribe();
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stopped| *stopped) => break,
                accepted = transport.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => admit(&state, stream, peer),
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        tracing::info!(name = %state.config.name, "server stopped");
        Ok(())
    }
}

/// Registers an accepted socket, or closes it if the server is full.
fn admit(state: &Arc<ServerState>, stream: TcpStream, peer: SocketAddr) {
    let max_conn = state.config.max_conn;
    if state.is_stopped() || state.connections.len() >= max_conn {
        tracing::warn!(%peer, max_conn, "connection rejected");
        drop(stream);
        return;
    }

    let id = ConnectionId::new(state.next_id.fetch_add(1, Ordering::Relaxed));
    let (reader, writer) = stream.into_split();
    let conn = Connection::spawn(id, peer, writer, &state.config.session_config());

    state.connections.add(Arc::clone(&conn));
    // `stop` may have cleared the registry between the check above and
    // the add. Its flag is set before the clear, so re-reading it here
    // catches every such connection; `serve` still runs the teardown.
    if state.is_stopped() {
        conn.stop();
    }
    state.hooks.connected(&conn);
    tokio::spawn(serve(conn, reader, Arc::clone(state)));
}

async fn broadcast_loop(state: Arc<ServerState>, mut rx: mpsc::Receiver<Bytes>) {
    let mut shutdown = state.shutdown.subscribe();

    loop {
        let data = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopped| *stopped) => break,
            data = rx.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        let targets = state.connections.get_all();
        let mut delivered = 0usize;
        for conn in &targets {
            match conn.send_buff_msg(data.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(conn_id = %conn.id(), error = %e, "broadcast send failed");
                }
            }
        }
        tracing::info!(delivered, targets = targets.len(), "broadcast sent");
    }

    tracing::debug!("broadcast loop stopped");
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A cheap, cloneable reference to a server for broadcasting, inspecting
/// connections and stopping it.
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<ServerState>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Queues `data` to be sent to every live connection on its buffered
    /// path, framed with the default header.
    ///
    /// # Errors
    /// [`IronlinkError::ServerStopped`] once the server is stopped.
    pub async fn broadcast(&self, data: impl Into<Bytes>) -> Result<(), IronlinkError> {
        if self.state.is_stopped() {
            return Err(IronlinkError::ServerStopped);
        }
        self.state
            .broadcast_tx
            .send(data.into())
            .await
            .map_err(|_| IronlinkError::ServerStopped)
    }

    /// Stops accepting, ends the broadcast loop and stops every live
    /// connection. Later calls do nothing.
    pub fn stop(&self) {
        if self.state.shutdown.send_replace(true) {
            return;
        }
        tracing::info!(name = %self.state.config.name, "server stopping");
        self.state.connections.clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.state.connections
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
