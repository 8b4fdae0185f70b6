//! The handler trait applications implement, one per command.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{HandlerError, Request};

/// Handles every request whose envelope `cmd` it is registered under.
///
/// `pre_handle` and `post_handle` default to no-ops, so most routers only
/// implement [`handle`](Router::handle). Handlers reply through
/// [`Request::reply`] or the connection's send methods; nothing is sent on
/// their behalf unless `handle` fails.
///
/// ```rust
/// use async_trait::async_trait;
/// use ironlink_protocol::Envelope;
/// use ironlink_worker::{HandlerError, Request, Router};
///
/// struct Ping;
///
/// #[async_trait]
/// impl Router for Ping {
///     async fn handle(&self, req: &Request) -> Result<(), HandlerError> {
///         req.reply(&Envelope::ok("pong", req.seqno())).await
///     }
/// }
/// ```
#[async_trait]
pub trait Router: Send + Sync + 'static {
    async fn pre_handle(&self, _request: &Request) {}

    /// Processes the request. An error is reported back to the client as
    /// an error envelope, and `post_handle` is skipped.
    async fn handle(&self, request: &Request) -> Result<(), HandlerError>;

    async fn post_handle(&self, _request: &Request) {}
}

#[async_trait]
impl<R: Router + ?Sized> Router for Arc<R> {
    async fn pre_handle(&self, request: &Request) {
        (**self).pre_handle(request).await
    }

    async fn handle(&self, request: &Request) -> Result<(), HandlerError> {
        (**self).handle(request).await
    }

    async fn post_handle(&self, request: &Request) {
        (**self).post_handle(request).await
    }
}
