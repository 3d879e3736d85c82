//! Attaches identity machinery to the request scope.

use std::fmt;
use std::sync::Arc;

use crate::auth::Provider;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::scope;

/// Attaches the provider's authenticator and user manager to every request,
/// then always calls the next layer.
///
/// An application may use several providers, but one request carries only
/// one. If two `Authentication` layers are stacked, the inner one replaces
/// the outer one's pair; do not rely on that precedence.
#[derive(Clone)]
pub struct Authentication {
    provider: Arc<dyn Provider>,
}

impl Authentication {
    pub fn new(provider: impl Provider) -> Self {
        Self { provider: Arc::new(provider) }
    }

    /// Shares one provider between several chains.
    pub fn from_arc(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authentication").finish_non_exhaustive()
    }
}

impl Middleware for Authentication {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let current = scope::scope(&req).cloned().unwrap_or_default();
        let req = scope::attach(
            req,
            current.with_identity(self.provider.authenticator(), self.provider.user_manager()),
        );
        next.run(req)
    }
}
