//! Request lifecycle logging.
//!
//! Both loggers give the request an ID, attach a fresh scope, and log one
//! entry when the request starts and one when it ends. [`RecoveryLogger`]
//! also catches panics from everything below it:
//!
//! | outcome | terminal entry | response |
//! |---|---|---|
//! | handler returned | info `request completed` | the handler's |
//! | handler panicked | error `hit unhandled panic` | `500` |
//! | handler called [`abort()`](crate::panic::abort) | debug `hit suppressed abort panic` | none; unwind continues |
//!
//! The terminal entry carries the request's annotations, with the fixed
//! fields (`request`, `duration`, `status`, ...) taking precedence on a
//! key collision.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{self, FutureExt};
use http::StatusCode;
use serde_json::Value;

use crate::handler::BoxFuture;
use crate::journal::{self, Fields, Journaler, MESSAGE_KEY};
use crate::middleware::{Middleware, Next};
use crate::panic::{clear_stack, install_stack_hook, Caught};
use crate::request::Request;
use crate::response::Response;
use crate::scope::{self, Annotations, RequestScope};

// ── Shared bookkeeping ────────────────────────────────────────────────────────

/// What the logger remembers about a request while the chain runs.
struct Started {
    id: u64,
    at: Instant,
    method: String,
    path: String,
    remote: String,
    annotations: Annotations,
}

impl Started {
    /// Assigns the request its ID and scope.
    ///
    /// An identity attached by an outer layer survives; everything else in
    /// the scope is new.
    fn begin(req: Request, journaler: &Arc<dyn Journaler>) -> (Request, Self) {
        let started = Self {
            id: scope::next_request_id(),
            at: Instant::now(),
            method: req.method().to_string(),
            path: req.path().to_owned(),
            remote: req.remote_string(),
            annotations: Annotations::new(),
        };

        let mut fresh = RequestScope::new(started.id, started.at)
            .with_logger(Arc::clone(journaler))
            .with_annotations(started.annotations.clone());
        if let (Some(authenticator), Some(users)) = (scope::authenticator(&req), scope::user_manager(&req)) {
            fresh = fresh.with_identity(authenticator, users);
        }

        (scope::attach(req, fresh), started)
    }

    fn entry(&self, message: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(MESSAGE_KEY.to_owned(), Value::from(message));
        fields.insert("request".to_owned(), Value::from(self.id));
        fields.insert("method".to_owned(), Value::from(self.method.as_str()));
        fields.insert("path".to_owned(), Value::from(self.path.as_str()));
        fields.insert("remote".to_owned(), Value::from(self.remote.as_str()));
        fields
    }

    fn terminal(&self, message: &str, status: StatusCode) -> Fields {
        let elapsed = self.at.elapsed();
        let mut fields = self.annotations.snapshot();
        fields.extend(self.entry(message));
        fields.insert(
            "duration".to_owned(),
            Value::from(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)),
        );
        fields.insert("span".to_owned(), Value::from(format!("{elapsed:?}")));
        fields.insert("status".to_owned(), Value::from(status.as_u16()));
        fields.insert(
            "outcome".to_owned(),
            Value::from(status.canonical_reason().unwrap_or_default()),
        );
        fields
    }
}

// ── RecoveryLogger ────────────────────────────────────────────────────────────

/// Outermost middleware: request logging plus panic recovery.
///
/// Put it first in the chain; only this layer catches panics.
#[derive(Clone)]
pub struct RecoveryLogger {
    journaler: Arc<dyn Journaler>,
}

impl RecoveryLogger {
    /// Logs to `journaler` and makes it the scope logger for every request.
    ///
    /// Installs vigil's stack-capturing panic hook on first use.
    pub fn new(journaler: Arc<dyn Journaler>) -> Self {
        install_stack_hook();
        Self { journaler }
    }
}

impl Default for RecoveryLogger {
    /// Logs to the process-default journaler.
    fn default() -> Self {
        Self::new(journal::default_journaler())
    }
}

impl Middleware for RecoveryLogger {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let journaler = Arc::clone(&self.journaler);
        Box::pin(async move {
            let (req, started) = Started::begin(req, &journaler);
            journaler.info(started.entry("request started"));

            // Each poll starts from an empty stack slot, so the hook's
            // capture for this request is the only one classify can see.
            let mut guarded = AssertUnwindSafe(next.run(req)).catch_unwind();
            let outcome = future::poll_fn(|cx| {
                clear_stack();
                guarded.poll_unpin(cx)
            })
            .await;

            match outcome {
                Ok(res) => {
                    journaler.info(started.terminal("request completed", res.status_code()));
                    res
                }
                Err(payload) => match Caught::classify(payload) {
                    Caught::Abort(payload) => {
                        journaler.debug(started.entry("hit suppressed abort panic"));
                        panic::resume_unwind(payload)
                    }
                    Caught::Failure { value, stack } => {
                        let status = StatusCode::INTERNAL_SERVER_ERROR;
                        let mut fields = started.terminal("hit unhandled panic", status);
                        fields.insert("panic".to_owned(), Value::from(value));
                        fields.insert("stack".to_owned(), Value::from(stack));
                        journaler.error(fields);
                        Response::status(status)
                    }
                },
            }
        })
    }
}

// ── AppLogger ─────────────────────────────────────────────────────────────────

/// Request logging without recovery.
///
/// A panic below this layer propagates untouched and the request gets no
/// terminal entry. Use it when something further out already recovers.
#[derive(Clone)]
pub struct AppLogger {
    journaler: Arc<dyn Journaler>,
}

impl AppLogger {
    /// Logs to the process-default journaler.
    pub fn new() -> Self {
        Self::with_journaler(journal::default_journaler())
    }

    pub fn with_journaler(journaler: Arc<dyn Journaler>) -> Self {
        Self { journaler }
    }
}

impl Default for AppLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for AppLogger {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let journaler = Arc::clone(&self.journaler);
        Box::pin(async move {
            let (req, started) = Started::begin(req, &journaler);
            journaler.info(started.entry("request started"));

            let res = next.run(req).await;
            journaler.info(started.terminal("request completed", res.status_code()));
            res
        })
    }
}
