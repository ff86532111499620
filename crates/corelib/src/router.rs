//! Route table mapping request routes to async handlers.

use crate::message::{Request, Response};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Type-erased route handler.
pub type Handler<C> = Arc<dyn Fn(Request<C>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Exact-match route table.
///
/// Routes can be added while requests are being dispatched; the lock is
/// only held to look a handler up, never while it runs.
pub struct Router<C> {
    routes: RwLock<HashMap<String, Handler<C>>>,
}

impl<C: Send + 'static> Router<C> {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` for `route`, replacing any previous handler.
    pub fn add_route<F, Fut>(&self, route: impl Into<String>, handler: F)
    where
        F: Fn(Request<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: Handler<C> = Arc::new(move |request| handler(request).boxed());
        self.routes.write().insert(route.into(), handler);
    }

    pub fn contains(&self, route: &str) -> bool {
        self.routes.read().contains_key(route)
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Run the handler registered for `request.route`.
    ///
    /// Unregistered routes get `404 Not Found` with body `route not found`.
    pub async fn dispatch(&self, request: Request<C>) -> Response {
        let handler = self.routes.read().get(&request.route).cloned();
        match handler {
            Some(handler) => handler(request).await,
            None => {
                debug!(route = %request.route, "no handler registered");
                Response::not_found()
            }
        }
    }
}

impl<C: Send + 'static> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.routes.read();
        let mut names: Vec<&String> = routes.keys().collect();
        names.sort();
        f.debug_struct("Router").field("routes", &names).finish()
    }
}
