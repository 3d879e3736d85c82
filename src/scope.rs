//! Request-scoped state.
//!
//! Every request that passes through the logger middleware carries one
//! [`RequestScope`] in its extensions: the request ID, when the request
//! started, the journaler to log to, the annotation map, and (once the
//! authentication middleware has run) the authenticator and user manager.
//!
//! The accessors here never fail. Outside a full chain, for example in a
//! unit test that calls a handler directly, they return zero/default values:
//! ID `0`, no start instant, the process-default journaler, no identity.
//!
//! # Annotations
//!
//! Handlers add key/value pairs with [`add_annotation`]; the logger merges
//! them into the request's completion entry. The map is an [`Annotations`]
//! handle (shared ownership, mutated in place). The logger installs one
//! before calling the rest of the chain and keeps a clone, so writes made
//! anywhere downstream are visible to it once `next` returns.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;

use crate::auth::{Authenticator, UserManager};
use crate::journal::{self, Fields, Journaler};
use crate::request::Request;

// ── Request IDs ───────────────────────────────────────────────────────────────

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hands out the next request ID. The first is `1`; `0` means "unassigned".
pub(crate) fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// The most recently assigned request ID (`0` before the first request).
pub fn last_request_id() -> u64 {
    REQUEST_COUNTER.load(Ordering::Relaxed)
}

// ── Annotations ───────────────────────────────────────────────────────────────

/// Shared handle to one request's annotation map.
///
/// Clones refer to the same map. Only the request's own task writes to it;
/// the lock exists so the handle is `Sync` and is never contended.
#[derive(Clone, Default)]
pub struct Annotations(Arc<Mutex<Fields>>);

impl Annotations {
    pub fn new() -> Self { Self::default() }

    /// Inserts or overwrites `key`.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.lock().insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize { self.0.lock().len() }
    pub fn is_empty(&self) -> bool { self.0.lock().is_empty() }

    pub fn snapshot(&self) -> Fields {
        self.0.lock().clone()
    }
}

impl fmt::Debug for Annotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Annotations").field(&*self.0.lock()).finish()
    }
}

// ── RequestScope ──────────────────────────────────────────────────────────────

/// Per-request identity, logging and annotation state.
#[derive(Clone, Default)]
pub struct RequestScope {
    id: u64,
    started_at: Option<Instant>,
    logger: Option<Arc<dyn Journaler>>,
    annotations: Option<Annotations>,
    authenticator: Option<Arc<dyn Authenticator>>,
    user_manager: Option<Arc<dyn UserManager>>,
}

impl RequestScope {
    /// A fresh scope for request `id`, started at `started_at`.
    pub fn new(id: u64, started_at: Instant) -> Self {
        Self { id, started_at: Some(started_at), ..Self::default() }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Journaler>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Attaches an identity pair, replacing any earlier one.
    pub fn with_identity(
        mut self,
        authenticator: Arc<dyn Authenticator>,
        user_manager: Arc<dyn UserManager>,
    ) -> Self {
        self.authenticator = Some(authenticator);
        self.user_manager = Some(user_manager);
        self
    }

    pub fn id(&self) -> u64 { self.id }
    pub fn started_at(&self) -> Option<Instant> { self.started_at }
    pub fn annotations(&self) -> Option<&Annotations> { self.annotations.as_ref() }

    /// The attached journaler, or the process default.
    pub fn logger(&self) -> Arc<dyn Journaler> {
        self.logger.clone().unwrap_or_else(journal::default_journaler)
    }

    pub fn authenticator(&self) -> Option<Arc<dyn Authenticator>> { self.authenticator.clone() }
    pub fn user_manager(&self) -> Option<Arc<dyn UserManager>> { self.user_manager.clone() }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("has_logger", &self.logger.is_some())
            .field("annotations", &self.annotations)
            .field("has_authenticator", &self.authenticator.is_some())
            .field("has_user_manager", &self.user_manager.is_some())
            .finish()
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Returns `req` carrying `scope`, replacing any scope it had.
pub fn attach(mut req: Request, scope: RequestScope) -> Request {
    req.extensions_mut().insert(scope);
    req
}

/// The scope attached to `req`, if any.
pub fn scope(req: &Request) -> Option<&RequestScope> {
    req.extensions().get::<RequestScope>()
}

/// The request's ID, or `0` outside the logger middleware.
pub fn request_id(req: &Request) -> u64 {
    scope(req).map_or(0, RequestScope::id)
}

/// When the logger middleware started processing `req`.
pub fn started_at(req: &Request) -> Option<Instant> {
    scope(req).and_then(RequestScope::started_at)
}

/// The journaler for `req`, falling back to the process default.
pub fn logger(req: &Request) -> Arc<dyn Journaler> {
    match scope(req) {
        Some(scope) => scope.logger(),
        None => journal::default_journaler(),
    }
}

pub fn authenticator(req: &Request) -> Option<Arc<dyn Authenticator>> {
    scope(req).and_then(RequestScope::authenticator)
}

pub fn user_manager(req: &Request) -> Option<Arc<dyn UserManager>> {
    scope(req).and_then(RequestScope::user_manager)
}

/// Adds `key → value` to the request's annotation map, overwriting an
/// existing value for `key`.
///
/// Creates the map on first use when no logger middleware installed one;
/// later reads through `req` observe it.
///
/// ```rust
/// use vigil::{Request, scope};
/// use http::Method;
///
/// let mut req = Request::new(Method::GET, "/");
/// scope::add_annotation(&mut req, "tenant", "acme");
/// assert_eq!(scope::annotations(&req)["tenant"], "acme");
/// ```
pub fn add_annotation(req: &mut Request, key: impl Into<String>, value: impl Into<Value>) {
    let extensions = req.extensions_mut();
    if let Some(scope) = extensions.get_mut::<RequestScope>() {
        scope
            .annotations
            .get_or_insert_with(Annotations::new)
            .insert(key, value);
        return;
    }

    let annotations = Annotations::new();
    annotations.insert(key, value);
    extensions.insert(RequestScope::default().with_annotations(annotations));
}

/// Snapshot of the request's annotations; empty when there are none.
pub fn annotations(req: &Request) -> Fields {
    scope(req)
        .and_then(RequestScope::annotations)
        .map(Annotations::snapshot)
        .unwrap_or_default()
}
