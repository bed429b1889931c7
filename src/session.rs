//! Cookie-keyed sessions and flash messages.
//!
//! The [`sessions`] middleware resolves the caller's [`Session`] from the
//! `rota.sid` cookie (or starts a new one) and puts it in the request
//! extensions. A new session is only kept, and its cookie only sent, if the
//! request actually stored something in it. A session that ends up empty,
//! or is [destroyed](Session::destroy), is dropped from the store and its
//! cookie expired. Sessions idle for longer than the store's TTL expire.
//!
//! ```rust
//! use std::sync::Arc;
//! use rota::{App, Failure, Request, Response, Router};
//! use rota::session::{self, SessionStore};
//!
//! async fn create_farm(req: Request) -> Result<Response, Failure> {
//!     session::current(&req)?.flash("success", "Successfully made a farm");
//!     Ok(Response::redirect("/farms"))
//! }
//!
//! async fn farms(req: Request) -> Result<String, Failure> {
//!     let messages = session::current(&req)?.take_flash("success");
//!     Ok(messages.join("\n"))
//! }
//!
//! let app = App::new(Router::new().post("/farms", create_farm).get("/farms", farms))
//!     .layer(session::sessions(Arc::new(SessionStore::new())));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::failure::Failure;
use crate::middleware::{Cookies, Middleware, Next};
use crate::request::Request;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "rota.sid";

/// Idle time after which a session expires, unless the store sets its own.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Default)]
struct SessionData {
    values: HashMap<String, String>,
    flash: HashMap<String, Vec<String>>,
    destroyed: bool,
}

/// One client's session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    id: String,
    data: Arc<Mutex<SessionData>>,
}

impl Session {
    fn new() -> Self {
        Self { id: Uuid::new_v4().to_string(), data: Arc::default() }
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: impl Into<String>) {
        self.lock().values.insert(key.to_owned(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock().values.remove(key)
    }

    /// Queues a message for the next request that reads `kind`.
    pub fn flash(&self, kind: &str, message: impl Into<String>) {
        self.lock().flash.entry(kind.to_owned()).or_default().push(message.into());
    }

    /// Returns and clears every queued `kind` message.
    pub fn take_flash(&self, kind: &str) -> Vec<String> {
        self.lock().flash.remove(kind).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        let data = self.lock();
        data.values.is_empty() && data.flash.is_empty()
    }

    /// Clears the session and ends it once the current request completes.
    pub fn destroy(&self) {
        let mut data = self.lock();
        data.values.clear();
        data.flash.clear();
        data.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }
}

struct Entry {
    session: Session,
    touched: Instant,
}

/// Live sessions, keyed by id.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose sessions expire after `ttl` without a request.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { sessions: Mutex::default(), ttl }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live session for `id`, refreshing its idle timer.
    pub fn load(&self, id: &str) -> Option<Session> {
        let mut sessions = self.lock();
        let expired = match sessions.get_mut(id) {
            Some(entry) if entry.touched.elapsed() < self.ttl => {
                entry.touched = Instant::now();
                return Some(entry.session.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            sessions.remove(id);
            debug!(session = id, "session expired");
        }
        None
    }

    /// Keeps `session`, sweeping out any that have expired.
    fn save(&self, session: &Session) {
        let mut sessions = self.lock();
        let ttl = self.ttl;
        sessions.retain(|_, entry| entry.touched.elapsed() < ttl);
        sessions.insert(session.id.clone(), Entry { session: session.clone(), touched: Instant::now() });
    }

    /// Forgets the session for `id`. Returns whether it was present.
    pub fn destroy(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The session resolved by the [`sessions`] middleware.
///
/// Fails with a 500 when the middleware is not installed.
pub fn current(req: &Request) -> Result<&Session, Failure> {
    req.extension::<Session>()
        .ok_or_else(|| Failure::unhandled("session middleware is not installed"))
}

/// Resolves or starts the caller's session for every request.
pub fn sessions(store: Arc<SessionStore>) -> impl Middleware {
    move |mut req: Request, next: Next| {
        let store = Arc::clone(&store);
        async move {
            let existing = req.extension::<Cookies>()
                .cloned()
                .unwrap_or_else(|| Cookies::from_request(&req))
                .get(SESSION_COOKIE)
                .and_then(|id| store.load(id));
            let fresh = existing.is_none();
            let session = existing.unwrap_or_else(Session::new);
            req.extensions_mut().insert(session.clone());

            let outcome = next.run(req).await;
            let keep = !session.is_destroyed() && !session.is_empty();
            let cookie = match (fresh, keep) {
                (true, true) if outcome.is_ok() => {
                    store.save(&session);
                    debug!(session = session.id(), "session started");
                    Some(format!("{SESSION_COOKIE}={}; Path=/; HttpOnly", session.id()))
                }
                (false, false) => {
                    store.destroy(session.id());
                    debug!(session = session.id(), "session ended");
                    Some(format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0"))
                }
                _ => None,
            };

            let mut res = outcome?;
            if let Some(cookie) = cookie {
                res.append_header("set-cookie", &cookie);
            }
            Ok::<_, Failure>(res)
        }
    }
}
