//! # vigil
//!
//! Request-scoped identity, access control and panic-safe request logging
//! for hyper services.
//!
//! ## The contract
//!
//! vigil owns three cross-cutting concerns and nothing else:
//!
//! - **Request lifecycle.** Every request gets a process-unique, increasing
//!   ID and a `request started` entry. It ends with exactly one terminal
//!   entry carrying its duration, status and any annotations handlers
//!   attached along the way. Panics below the logger become a `500` plus an
//!   error entry with the panic-site stack, instead of a dead connection.
//! - **Identity.** An authenticator/user-manager pair is attached to the
//!   request scope for later layers to use.
//! - **Access control.** Role-gated or authenticated-only checks that
//!   answer `401` before the application runs.
//!
//! What vigil intentionally leaves to you:
//!
//! - **Credential checks:** implement [`auth::Authenticator`] over LDAP,
//!   Okta, a static table, whatever you have.
//! - **Log transport:** implement [`journal::Journaler`], or keep the
//!   default, which forwards to `tracing`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vigil::middleware::{Authentication, Chain, RecoveryLogger, RequireAccess};
//! use vigil::{Request, Response, Router, Server, scope};
//! # use vigil::auth::StaticProvider;
//!
//! # fn provider() -> StaticProvider { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let app = Chain::new()
//!         .with(RecoveryLogger::default())
//!         .with(Authentication::new(provider()))
//!         .with(RequireAccess::role("admin"))
//!         .then(Router::new().get("/reports/{id}", report));
//!
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(app).await.unwrap();
//! }
//!
//! async fn report(mut req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown").to_owned();
//!     // Lands in this request's `request completed` entry.
//!     scope::add_annotation(&mut req, "report", id.as_str());
//!     Response::text(id)
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod auth;
pub mod journal;
pub mod middleware;
pub mod panic;
pub mod scope;

pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{serve_listener, Server};
