//! The route table and the worker pool.
//!
//! Each worker is a Tokio task draining its own bounded queue. A request
//! always lands on worker `conn_id % pool_size`, so one connection's
//! requests are handled in the order they arrived. With a pool size of
//! zero every request gets its own task instead and no ordering holds.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use ironlink_protocol::{Envelope, UNKNOWN_ACTION};
use ironlink_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::{DispatchError, Request, Router};

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker tasks. Zero disables the pool.
    pub worker_pool_size: usize,
    /// Queue depth per worker. Values below 1 are treated as 1.
    pub max_worker_task_len: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 10,
            max_worker_task_len: 1024,
        }
    }
}

/// Routes requests to handlers by command.
///
/// Routes are added through `&mut self`, so the table is fixed by the time
/// the dispatcher is wrapped in an `Arc` and shared with connections.
pub struct Dispatcher {
    config: WorkerConfig,
    routes: HashMap<String, Arc<dyn Router>>,
    task_queues: OnceLock<Vec<mpsc::Sender<Request>>>,
}

impl Dispatcher {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            routes: HashMap::new(),
            task_queues: OnceLock::new(),
        }
    }

    /// Registers `router` for `cmd`.
    ///
    /// # Panics
    /// If `cmd` already has a router. Registering the same command twice
    /// is a wiring bug and must surface before any traffic arrives.
    pub fn add_router(&mut self, cmd: impl Into<String>, router: impl Router) {
        match self.routes.entry(cmd.into()) {
            Entry::Occupied(entry) => {
                panic!("duplicate route for cmd {:?}", entry.key())
            }
            Entry::Vacant(entry) => {
                tracing::debug!(cmd = %entry.key(), "route registered");
                entry.insert(Arc::new(router));
            }
        }
    }

    pub fn has_route(&self, cmd: &str) -> bool {
        self.routes.contains_key(cmd)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The worker that owns connection `id`, or `None` without a pool.
    pub fn worker_index(&self, id: ConnectionId) -> Option<usize> {
        match self.config.worker_pool_size {
            0 => None,
            size => Some(id.into_inner() as usize % size),
        }
    }

    /// Spawns the worker tasks. Later calls do nothing.
    ///
    /// Workers hold only a weak reference back to the dispatcher and exit
    /// once it is dropped.
    pub fn start_worker_pool(self: &Arc<Self>) {
        let size = self.config.worker_pool_size;
        if size == 0 {
            tracing::info!("worker pool disabled, requests run on their own tasks");
            return;
        }

        self.task_queues.get_or_init(|| {
            let depth = self.config.max_worker_task_len.max(1);
            let queues = (0..size)
                .map(|worker_id| {
                    let (tx, rx) = mpsc::channel(depth);
                    let worker = Worker {
                        worker_id,
                        queue: rx,
                        dispatcher: Arc::downgrade(self),
                    };
                    tokio::spawn(worker.run());
                    tx
                })
                .collect();
            tracing::info!(workers = size, queue_depth = depth, "worker pool started");
            queues
        });
    }

    /// Hands a request to a handler.
    ///
    /// With a pool, waits for room in the owning worker's queue. Without
    /// one, spawns a task and returns at once.
    ///
    /// # Errors
    /// [`DispatchError::ConnectionClosed`] if the connection is already
    /// stopped, or whatever [`send_to_task_queue`](Self::send_to_task_queue)
    /// returns.
    pub async fn dispatch(self: &Arc<Self>, request: Request) -> Result<(), DispatchError> {
        let conn = request.connection();
        if conn.is_closed() {
            return Err(DispatchError::ConnectionClosed(conn.id()));
        }

        if self.config.worker_pool_size > 0 {
            return self.send_to_task_queue(request).await;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.do_msg_handler(request).await });
        Ok(())
    }

    /// Enqueues a request on its connection's worker.
    ///
    /// # Errors
    /// - [`DispatchError::NoWorkerPool`] if the pool size is zero or the
    ///   pool hasn't been started.
    /// - [`DispatchError::WorkerUnavailable`] if that worker has exited.
    pub async fn send_to_task_queue(&self, request: Request) -> Result<(), DispatchError> {
        let (Some(index), Some(queues)) = (
            self.worker_index(request.connection().id()),
            self.task_queues.get(),
        ) else {
            return Err(DispatchError::NoWorkerPool);
        };

        tracing::trace!(
            conn_id = %request.connection().id(),
            worker_id = index,
            cmd = request.command(),
            "request queued"
        );
        queues[index]
            .send(request)
            .await
            .map_err(|_| DispatchError::WorkerUnavailable(index))
    }

    /// Runs the matching router's `pre_handle`, `handle` and `post_handle`.
    ///
    /// An unknown command, or a failing `handle`, is answered with an error
    /// envelope; `post_handle` only runs after a successful `handle`.
    pub async fn do_msg_handler(&self, request: Request) {
        let conn_id = request.connection().id();

        let Some(router) = self.routes.get(request.command()) else {
            tracing::warn!(%conn_id, cmd = request.command(), "no handler for command");
            let reply = Envelope::error(
                UNKNOWN_ACTION,
                request.seqno(),
                format!("handler cmd = {} is not found", request.command()),
            );
            send_error_reply(&request, &reply).await;
            return;
        };

        router.pre_handle(&request).await;
        match router.handle(&request).await {
            Ok(()) => router.post_handle(&request).await,
            Err(e) => {
                tracing::warn!(%conn_id, cmd = request.command(), error = %e, "handler failed");
                let reply = Envelope::error(request.command(), request.seqno(), e.to_string());
                send_error_reply(&request, &reply).await;
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<_> = self.routes.keys().collect();
        routes.sort();
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("routes", &routes)
            .field("started", &self.task_queues.get().is_some())
            .finish()
    }
}

async fn send_error_reply(request: &Request, reply: &Envelope) {
    if let Err(e) = request.reply(reply).await {
        tracing::debug!(
            conn_id = %request.connection().id(),
            error = %e,
            "error reply not delivered"
        );
    }
}

struct Worker {
    worker_id: usize,
    queue: mpsc::Receiver<Request>,
    dispatcher: Weak<Dispatcher>,
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!(worker_id = self.worker_id, "worker started");

        while let Some(request) = self.queue.recv().await {
            let Some(dispatcher) = self.dispatcher.upgrade() else {
                break;
            };
            dispatcher.do_msg_handler(request).await;
        }

        tracing::debug!(worker_id = self.worker_id, "worker stopped");
    }
}
