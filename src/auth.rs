//! Password hashing and session-backed login.
//!
//! Identity lives in the [`Session`](crate::session::Session) under
//! [`USER_KEY`]; [`require_login`] guards routes that need it.
//!
//! ```rust
//! use rota::{Chain, Failure, Request, Router};
//! use rota::auth;
//! use http::Method;
//!
//! async fn secret(req: Request) -> Result<String, Failure> {
//!     let user = auth::current_user(&req).unwrap_or_default();
//!     Ok(format!("THIS IS SECRET, {user}"))
//! }
//!
//! let router = Router::new()
//!     .guarded(Method::GET, "/secret", Chain::new().with(auth::require_login), secret);
//! ```

use async_trait::async_trait;
use tracing::{error, info};

use crate::failure::Failure;
use crate::handler::Outcome;
use crate::middleware::Next;
use crate::request::Request;
use crate::session::Session;

/// Session key holding the logged-in user's id.
pub const USER_KEY: &str = "user_id";

/// One-way credential digests.
#[async_trait]
pub trait PasswordHasher: Send + Sync + 'static {
    async fn hash(&self, plain: &str) -> Result<String, Failure>;

    /// Whether `plain` produces `digest`.
    async fn verify(&self, plain: &str, digest: &str) -> Result<bool, Failure>;
}

/// bcrypt with a fixed work factor. Hashing runs on the blocking pool.
#[derive(Clone, Copy, Debug)]
pub struct Bcrypt {
    cost: u32,
}

impl Bcrypt {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for Bcrypt {
    fn default() -> Self {
        Self::new(12)
    }
}

#[async_trait]
impl PasswordHasher for Bcrypt {
    async fn hash(&self, plain: &str) -> Result<String, Failure> {
        let (plain, cost) = (plain.to_owned(), self.cost);
        tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
            .await
            .map_err(|e| hashing_failed(&e))?
            .map_err(|e| hashing_failed(&e))
    }

    async fn verify(&self, plain: &str, digest: &str) -> Result<bool, Failure> {
        let (plain, digest) = (plain.to_owned(), digest.to_owned());
        tokio::task::spawn_blocking(move || bcrypt::verify(plain, &digest))
            .await
            .map_err(|e| hashing_failed(&e))?
            .map_err(|e| hashing_failed(&e))
    }
}

fn hashing_failed(e: &dyn std::fmt::Display) -> Failure {
    error!("password hashing failed: {e}");
    Failure::default()
}

/// Marks `user_id` as logged in for this session.
pub fn login(session: &Session, user_id: &str) {
    session.insert(USER_KEY, user_id);
    info!(user = user_id, "login");
}

/// Ends the session entirely; its cookie is expired on the way out.
pub fn logout(session: &Session) {
    if let Some(user) = session.get(USER_KEY) {
        info!(user, "logout");
    }
    session.destroy();
}

/// The logged-in user's id, if the request carries a session with one.
pub fn current_user(req: &Request) -> Option<String> {
    req.extension::<Session>()?.get(USER_KEY)
}

/// Fails with `401 Unauthorized` unless a user is logged in.
pub async fn require_login(req: Request, next: Next) -> Outcome {
    if current_user(&req).is_none() {
        return Err(Failure::unauthorized("You must be signed in"));
    }
    next.run(req).await
}
