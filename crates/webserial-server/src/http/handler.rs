//! Handler trait and closure adapter.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Request, Response};

/// A request handler.
///
/// The transport calls [`before_body`](Handler::before_body) before it
/// decides between a websocket upgrade and a normal response, then
/// [`handle`](Handler::handle) for non-upgrade requests. Middleware forwards
/// both calls to the handler it wraps.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Return `Some` to answer the request without going further.
    fn before_body(&self, _req: &mut Request) -> Option<Response> {
        None
    }

    async fn handle(&self, req: &mut Request) -> Response;
}

/// Handlers are shared: one handler may sit behind several routes.
pub type SharedHandler = Arc<dyn Handler>;

/// Adapter for synchronous closures.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    async fn handle(&self, req: &mut Request) -> Response {
        (self.f)(req)
    }
}

pub fn handler_fn<F>(f: F) -> SharedHandler
where
    F: Fn(&Request) -> Response + Send + Sync + 'static,
{
    Arc::new(FnHandler { f })
}
