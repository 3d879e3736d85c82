//! HTTP server and graceful shutdown.
//!
//! The server turns each hyper request into a [`Request`] (body collected,
//! peer address recorded) and hands it to one [`Handler`], usually a
//! middleware [`Pipeline`](crate::middleware::Pipeline).
//!
//! # Aborted requests
//!
//! A handler that calls [`abort()`](crate::panic::abort) unwinds past the
//! recovery logger on purpose. The unwind ends the connection's task, which
//! drops the connection without a response; the accept loop notices the
//! panicked task and keeps serving.
//!
//! That holds for HTTP/1, where requests are served inside the connection
//! task. HTTP/2 streams run as their own tasks on the connection's executor:
//! an abort there resets only its stream, and the accept loop never sees
//! the unwind, so the "connection dropped by handler unwind" line is
//! HTTP/1-only.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C (or the caller's own signal, see
//! [`Server::serve_with_shutdown`]) the server stops accepting, lets every
//! in-flight connection finish, and returns.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust,no_run
    /// use vigil::Server;
    /// let server = Server::bind(([0, 0, 0, 0], 3000).into());
    /// ```
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight requests.
    pub async fn serve(self, app: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `signal` resolves, then drains in-flight requests.
    pub async fn serve_with_shutdown(
        self,
        app: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, app, signal).await
    }
}

/// Serves `app` on an already-bound listener until `signal` resolves.
pub async fn serve_listener(
    listener: TcpListener,
    app: impl Handler,
    signal: impl Future<Output = ()>,
) -> Result<(), Error> {
    let app = app.into_boxed_handler();
    let addr = listener.local_addr()?;
    info!(%addr, "vigil listening");

    let mut tasks = JoinSet::new();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            // Check shutdown first so a signal stops accepting immediately,
            // even if more connections are queued.
            biased;

            () = &mut signal => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let app = Arc::clone(&app);
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { dispatch(app, req, remote_addr).await }
                    });

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(res) = tasks.join_next(), if !tasks.is_empty() => reap(res),
        }
    }

    while let Some(res) = tasks.join_next().await {
        reap(res);
    }

    info!("vigil stopped");
    Ok(())
}

fn reap(res: Result<(), JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            debug!("connection dropped by handler unwind");
        } else {
            error!("connection task failed: {e}");
        }
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: one hyper request in, one response out.
///
/// Failures become status codes, so hyper never sees an error.
async fn dispatch(
    app: BoxedHandler,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let response = app.call(Request::from_parts(parts, body, remote_addr)).await;
    Ok(response.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On other platforms only Ctrl-C is available. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
