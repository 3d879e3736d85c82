//! Identity capabilities consumed by the middleware.
//!
//! vigil does not verify credentials. It only knows how to *ask*: an
//! [`Authenticator`] resolves a [`User`] from a request with help from an
//! opaque [`UserManager`], and answers two yes/no questions about that user.
//! LDAP, Okta, static user tables and the like live behind these traits in
//! the application or in separate crates.

use std::any::Any;
use std::sync::Arc;

use crate::request::Request;

/// Failure to resolve a user from a request.
///
/// The `Display` text is sent to the client as the body of the `401`, so
/// keep it free of anything sensitive.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no credentials supplied")]
    MissingCredentials,

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication provider failure: {0}")]
    Provider(String),
}

/// A resolved identity.
pub trait User: Send + Sync {
    fn username(&self) -> &str;
    fn roles(&self) -> Vec<String>;
}

/// The user that failed resolution leaves behind: no name, no roles.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousUser;

impl User for AnonymousUser {
    fn username(&self) -> &str { "" }
    fn roles(&self) -> Vec<String> { Vec::new() }
}

/// User lookup/validation backend. Opaque to vigil; it is handed back to the
/// [`Authenticator`] that came with it.
pub trait UserManager: Send + Sync + 'static {
    /// Lets an authenticator recover its own concrete manager type.
    fn as_any(&self) -> &dyn Any;
}

/// Resolves users and evaluates access predicates.
pub trait Authenticator: Send + Sync + 'static {
    fn user_from_request(
        &self,
        users: &dyn UserManager,
        req: &Request,
    ) -> Result<Arc<dyn User>, AuthError>;

    /// Does `user` belong to `role`?
    fn check_group_access(&self, user: &dyn User, role: &str) -> bool;

    /// Is `user` a real, authenticated identity?
    fn check_authenticated(&self, user: &dyn User) -> bool;
}

/// A matched authenticator + user-manager pair.
///
/// [`Authentication`](crate::middleware::Authentication) asks the provider
/// for both on every request and attaches them to the request scope.
pub trait Provider: Send + Sync + 'static {
    fn authenticator(&self) -> Arc<dyn Authenticator>;
    fn user_manager(&self) -> Arc<dyn UserManager>;
}

/// A [`Provider`] over two fixed handles.
#[derive(Clone)]
pub struct StaticProvider {
    authenticator: Arc<dyn Authenticator>,
    users: Arc<dyn UserManager>,
}

impl StaticProvider {
    pub fn new(authenticator: Arc<dyn Authenticator>, users: Arc<dyn UserManager>) -> Self {
        Self { authenticator, users }
    }
}

impl Provider for StaticProvider {
    fn authenticator(&self) -> Arc<dyn Authenticator> { Arc::clone(&self.authenticator) }
    fn user_manager(&self) -> Arc<dyn UserManager> { Arc::clone(&self.users) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_user_is_empty() {
        assert_eq!(AnonymousUser.username(), "");
        assert!(AnonymousUser.roles().is_empty());
    }

    #[test]
    fn auth_error_text_is_client_safe() {
        assert_eq!(AuthError::UnknownUser("bob".into()).to_string(), "unknown user 'bob'");
        assert_eq!(AuthError::MissingCredentials.to_string(), "no credentials supplied");
    }
}
