//! Minimal vigil example: logged, access-controlled endpoints.
//!
//! Run with:
//!   RUST_LOG=vigil=debug,info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/whoami -H 'x-user: alice'
//!   curl -i http://localhost:3000/admin/reports/7 -H 'x-user: root'
//!   curl -i http://localhost:3000/admin/reports/7 -H 'x-user: alice'   # 401
//!   curl -i http://localhost:3000/whoami -H 'x-user: mallory'          # 401, unknown user
//!   curl -i http://localhost:3000/crash -H 'x-user: alice'             # 500, logged with stack

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vigil::auth::{AuthError, Authenticator, StaticProvider, User, UserManager};
use vigil::middleware::{Authentication, Chain, RecoveryLogger, RequireAccess};
use vigil::{scope, Request, Response, Router, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let provider = StaticProvider::new(Arc::new(HeaderAuthenticator), Arc::new(Roster::demo()));

    let admin = Chain::new()
        .with(RequireAccess::role("admin"))
        .then(Router::new().get("/admin/reports/{id}", report));

    let app = Chain::new()
        .with(RecoveryLogger::default())
        .with(Authentication::new(provider))
        .then(
            Router::new()
                .get("/admin/reports/{id}", admin)
                .get("/whoami", whoami)
                .get("/crash", crash),
        );

    Server::bind(([0, 0, 0, 0], 3000).into())
        .serve(app)
        .await
        .expect("server error");
}

// GET /whoami: any known user; no role check here, only resolution.
async fn whoami(req: Request) -> Response {
    let Some((auth, users)) = scope::authenticator(&req).zip(scope::user_manager(&req)) else {
        return Response::status(http::StatusCode::UNAUTHORIZED);
    };
    match auth.user_from_request(&*users, &req) {
        Ok(user) => Response::text(format!("{} {:?}", user.username(), user.roles())),
        Err(e) => Response::builder().status(http::StatusCode::UNAUTHORIZED).text(e.to_string()),
    }
}

// GET /admin/reports/{id}
async fn report(mut req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown").to_owned();
    scope::add_annotation(&mut req, "report", id.as_str());
    Response::json(format!(r#"{{"report":"{id}"}}"#))
}

// GET /crash
async fn crash(_req: Request) -> Response {
    let reports: Vec<u32> = Vec::new();
    Response::text(reports[3].to_string())
}

// ── Demo identity backend ─────────────────────────────────────────────────────

struct Account {
    name: String,
    roles: Vec<String>,
}

impl User for Account {
    fn username(&self) -> &str { &self.name }
    fn roles(&self) -> Vec<String> { self.roles.clone() }
}

struct Roster(HashMap<String, Arc<Account>>);

impl Roster {
    fn demo() -> Self {
        let mut accounts = HashMap::new();
        for (name, roles) in [("root", vec!["admin"]), ("alice", vec![])] {
            let account = Account {
                name: name.to_owned(),
                roles: roles.into_iter().map(str::to_owned).collect(),
            };
            accounts.insert(name.to_owned(), Arc::new(account));
        }
        Self(accounts)
    }
}

impl UserManager for Roster {
    fn as_any(&self) -> &dyn Any { self }
}

/// Trusts the `x-user` header. Only fit for a demo.
struct HeaderAuthenticator;

impl Authenticator for HeaderAuthenticator {
    fn user_from_request(&self, users: &dyn UserManager, req: &Request) -> Result<Arc<dyn User>, AuthError> {
        let roster = users
            .as_any()
            .downcast_ref::<Roster>()
            .ok_or_else(|| AuthError::Provider("unexpected user manager".to_owned()))?;
        let name = req.header("x-user").ok_or(AuthError::MissingCredentials)?;
        if name.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        match roster.0.get(name) {
            Some(account) => Ok(Arc::clone(account) as Arc<dyn User>),
            None => Err(AuthError::UnknownUser(name.to_owned())),
        }
    }

    fn check_group_access(&self, user: &dyn User, role: &str) -> bool {
        user.roles().iter().any(|r| r == role)
    }

    fn check_authenticated(&self, user: &dyn User) -> bool {
        !user.username().is_empty()
    }
}
