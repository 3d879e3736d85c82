//! Access control on top of the request scope's identity machinery.
//!
//! Both policies follow the same steps:
//!
//! 1. No authenticator or user manager in scope: `401`, nothing else runs.
//! 2. Resolve the user. A resolution error prepares a `401` whose body is
//!    the error text, but does **not** stop here: the predicate is still
//!    evaluated, against [`AnonymousUser`].
//! 3. Predicate false: `401` (with the resolution error body, if any).
//!    Predicate true: log `access granted` and run the next layer. If
//!    resolution had failed, the `401` head and error text are already
//!    committed: the next layer runs, its status and headers are dropped,
//!    and its body is appended after the error text.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;

use crate::auth::{AnonymousUser, Authenticator, User};
use crate::handler::BoxFuture;
use crate::journal::{Fields, MESSAGE_KEY};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::scope;

#[derive(Clone, Debug)]
enum Policy {
    Role(Arc<str>),
    Authenticated,
}

impl Policy {
    fn permits(&self, authenticator: &dyn Authenticator, user: &dyn User) -> bool {
        match self {
            Self::Role(role) => authenticator.check_group_access(user, role),
            Self::Authenticated => authenticator.check_authenticated(user),
        }
    }
}

/// Rejects requests whose user does not satisfy a policy.
///
/// Must sit below [`Authentication`](super::Authentication) in the chain.
#[derive(Clone)]
pub struct RequireAccess {
    policy: Policy,
}

impl RequireAccess {
    /// Only users in `role` get through.
    pub fn role(role: impl Into<Arc<str>>) -> Self {
        Self { policy: Policy::Role(role.into()) }
    }

    /// Any authenticated user gets through; roles are not checked.
    pub fn authenticated() -> Self {
        Self { policy: Policy::Authenticated }
    }
}

impl fmt::Debug for RequireAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequireAccess").field("policy", &self.policy).finish()
    }
}

fn unauthorized() -> Response {
    Response::status(StatusCode::UNAUTHORIZED)
}

impl Middleware for RequireAccess {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let policy = self.policy.clone();
        Box::pin(async move {
            let (Some(authenticator), Some(users)) = (scope::authenticator(&req), scope::user_manager(&req))
            else {
                return unauthorized();
            };

            let (user, rejection): (Arc<dyn User>, _) = match authenticator.user_from_request(&*users, &req) {
                Ok(user) => (user, None),
                Err(err) => (
                    Arc::new(AnonymousUser) as Arc<dyn User>,
                    Some(
                        Response::builder()
                            .status(StatusCode::UNAUTHORIZED)
                            .text(err.to_string()),
                    ),
                ),
            };

            if !policy.permits(&*authenticator, &*user) {
                return rejection.unwrap_or_else(unauthorized);
            }

            let mut fields = Fields::new();
            fields.insert(MESSAGE_KEY.to_owned(), Value::from("access granted"));
            fields.insert("path".to_owned(), Value::from(req.path()));
            fields.insert("remote".to_owned(), Value::from(req.remote_string()));
            fields.insert("request".to_owned(), Value::from(scope::request_id(&req)));
            fields.insert("user".to_owned(), Value::from(user.username()));
            fields.insert("user_roles".to_owned(), Value::from(user.roles()));
            if let Policy::Role(role) = &policy {
                fields.insert("required_roles".to_owned(), Value::from(&**role));
            }
            scope::logger(&req).info(fields);

            let res = next.run(req).await;
            match rejection {
                Some(committed) => committed.append_body(res.body()),
                None => res,
            }
        })
    }
}
