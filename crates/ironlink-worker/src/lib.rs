//! Command routing for ironlink.
//!
//! Decoded requests are matched on their envelope `cmd` against a table of
//! [`Router`]s and run either on a fixed pool of worker tasks or, with a
//! pool size of zero, on a fresh task each.
//!
//! # Key types
//!
//! - [`Router`] — the trait applications implement per command
//! - [`Request`] — connection + frame + decoded envelope
//! - [`Dispatcher`] — the route table and the worker pool
//! - [`WorkerConfig`] — pool size and per-worker queue depth

mod dispatcher;
mod error;
mod request;
mod router;

pub use dispatcher::{Dispatcher, WorkerConfig};
pub use error::{DispatchError, HandlerError};
pub use request::Request;
pub use router::Router;
