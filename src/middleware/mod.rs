//! Middleware layer.
//!
//! Middleware intercepts requests on their way to a handler and responses
//! on their way back. Each unit receives the request plus a [`Next`] that
//! runs the rest of the chain, and either awaits `next` or short-circuits
//! by returning a response of its own.
//!
//! Built-in middleware:
//! - [`RecoveryLogger`]: request ID, started/completed entries, panic recovery
//! - [`AppLogger`]: the same entries, without recovery
//! - [`Authentication`]: attaches an authenticator and user manager
//! - [`RequireAccess`]: role-gated or authenticated-only access control
//!
//! Chains are assembled once at start-up with [`Chain`], outermost first:
//!
//! ```rust,no_run
//! use vigil::middleware::{Chain, RecoveryLogger, RequireAccess};
//! use vigil::{Request, Response};
//!
//! # async fn handler(_: Request) -> Response { Response::text("") }
//! let app = Chain::new()
//!     .with(RecoveryLogger::default())
//!     .with(RequireAccess::authenticated())
//!     .then(handler);
//! ```

mod access;
mod authentication;
mod logger;

use std::sync::Arc;

pub use access::RequireAccess;
pub use authentication::Authentication;
pub use logger::{AppLogger, RecoveryLogger};

use crate::handler::{private, BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;

// ── Middleware trait ──────────────────────────────────────────────────────────

/// One step of a request pipeline.
///
/// `handle` returns a `'static` future, so implementations clone whatever
/// configuration they need into it before boxing.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of the chain after the current middleware.
#[derive(Clone)]
pub struct Next(BoxedHandler);

impl Next {
    /// Runs the rest of the chain.
    pub fn run(self, req: Request) -> BoxFuture {
        self.0.call(req)
    }
}

/// A middleware bound to everything after it.
struct Layer {
    middleware: Arc<dyn Middleware>,
    next: BoxedHandler,
}

impl ErasedHandler for Layer {
    fn call(&self, req: Request) -> BoxFuture {
        self.middleware.handle(req, Next(Arc::clone(&self.next)))
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Ordered middleware registration.
///
/// The first middleware added sees the request first and the response last.
#[derive(Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` below the ones already registered.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Terminates the chain with `endpoint`, producing a runnable pipeline.
    pub fn then(self, endpoint: impl Handler) -> Pipeline {
        let mut next = endpoint.into_boxed_handler();
        for middleware in self.layers.into_iter().rev() {
            next = Arc::new(Layer { middleware, next });
        }
        Pipeline(next)
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// A fully assembled chain. Cheap to clone; serve it with
/// [`Server::serve`](crate::Server::serve) or drive it directly.
#[derive(Clone)]
pub struct Pipeline(BoxedHandler);

impl Pipeline {
    /// Runs one request through the whole chain.
    pub fn call(&self, req: Request) -> BoxFuture {
        self.0.call(req)
    }
}

impl private::Sealed for Pipeline {}

impl Handler for Pipeline {
    fn into_boxed_handler(self) -> BoxedHandler {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use parking_lot::Mutex;

    use super::*;
    use crate::Response;

    struct Tag {
        name: &'static str,
        trail: Arc<Mutex<Vec<String>>>,
        stop: bool,
    }

    impl Middleware for Tag {
        fn handle(&self, req: Request, next: Next) -> BoxFuture {
            let name = self.name;
            let trail = Arc::clone(&self.trail);
            let stop = self.stop;
            Box::pin(async move {
                trail.lock().push(format!("{name}:in"));
                if stop {
                    return Response::status(StatusCode::FORBIDDEN);
                }
                let res = next.run(req).await;
                trail.lock().push(format!("{name}:out"));
                res
            })
        }
    }

    fn tag(name: &'static str, trail: &Arc<Mutex<Vec<String>>>, stop: bool) -> Tag {
        Tag { name, trail: Arc::clone(trail), stop }
    }

    #[tokio::test]
    async fn layers_run_in_registration_order() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&trail);

        let chain = Chain::new().with(tag("a", &trail, false)).with(tag("b", &trail, false));
        assert_eq!(chain.len(), 2);
        let app = chain.then(move |_req: Request| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().push("handler".to_owned());
                "ok"
            }
        });

        let res = app.call(Request::new(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(*trail.lock(), ["a:in", "b:in", "handler", "b:out", "a:out"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let app = Chain::new()
            .with(tag("a", &trail, false))
            .with(tag("gate", &trail, true))
            .with(tag("c", &trail, false))
            .then(|_req: Request| async { "unreachable" });

        let res = app.call(Request::new(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(*trail.lock(), ["a:in", "gate:in", "a:out"]);
    }

    #[tokio::test]
    async fn pipelines_nest() {
        let inner = Chain::new().then(|_req: Request| async { StatusCode::ACCEPTED });
        let outer = Chain::new().then(inner);
        let res = outer.call(Request::new(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    }
}
