//! Middleware chain.
//!
//! A middleware is any function or closure shaped like
//!
//! ```text
//! async fn step(req: Request, next: Next) -> impl IntoOutcome
//! ```
//!
//! and it does exactly one of three things:
//!
//! - **forward**: optionally mutate `req`, then `next.run(req).await`
//! - **short-circuit**: return a response without touching `next`; nothing
//!   registered after it runs
//! - **fail**: return a [`Failure`](crate::Failure); nothing registered after
//!   it runs and the failure goes to the reporter
//!
//! Steps run strictly in registration order. Because every step must return
//! an outcome, "forgot to call next and forgot to respond" cannot be written.
//! A step whose future never completes still leaves its request hanging
//! forever; that is a bug in the step, and the chain does not try to detect it.
//!
//! ```rust
//! use rota::middleware::Next;
//! use rota::{App, Failure, Outcome, Request, Router};
//!
//! async fn verify_password(req: Request, next: Next) -> Outcome {
//!     if req.query("password") == Some("chickens") {
//!         next.run(req).await
//!     } else {
//!         Err(Failure::unauthorized("Wrong password"))
//!     }
//! }
//!
//! let app = App::new(Router::new())
//!     .layer(rota::middleware::trace)
//!     .layer_at("/secret", verify_password);
//! ```

mod cookies;
mod method_override;
mod trace;

pub use cookies::{Cookies, cookies};
pub use method_override::method_override;
pub use trace::trace;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use http::StatusCode;

use crate::fault;
use crate::handler::{BoxFuture, BoxedHandler, IntoOutcome, Outcome};
use crate::request::Request;
use crate::response::Response;

// ── Type erasure ──────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, next: Next) -> BoxFuture<Outcome>;
}

#[doc(hidden)]
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

/// Implemented for every valid middleware step. Sealed, like
/// [`Handler`](crate::Handler).
pub trait Middleware: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut, R> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture<Outcome> {
        let fut = (self.0)(req, next);
        fault::guard(async move { fut.await.into_outcome() })
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// One registered step, optionally scoped to a path prefix.
#[derive(Clone)]
pub(crate) struct Layer {
    scope: Option<String>,
    middleware: BoxedMiddleware,
}

impl Layer {
    /// `/dogs` covers `/dogs` and `/dogs/…` but not `/dogsled`.
    fn applies_to(&self, path: &str) -> bool {
        match self.scope.as_deref() {
            None | Some("/") => true,
            Some(prefix) => match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// An ordered list of middleware steps.
///
/// Used for per-route guards with [`Router::guarded`](crate::Router::guarded);
/// the [`App`](crate::App) keeps one internally for application-wide steps.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Layer>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step that runs for every request reaching this chain.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Layer { scope: None, middleware: middleware.into_boxed_middleware() });
        self
    }

    /// Appends a step that runs only under `prefix`.
    pub fn with_at(mut self, prefix: &str, middleware: impl Middleware) -> Self {
        let prefix = match prefix.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        self.layers.push(Layer {
            scope: Some(prefix.to_owned()),
            middleware: middleware.into_boxed_middleware(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub(crate) fn freeze(self) -> Arc<[Layer]> {
        self.layers.into()
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The most recent successful response produced inside one request's chain.
///
/// Once a stage has produced a response, the request counts as answered: a
/// failure raised further up the chain afterwards must not produce a second
/// response.
#[derive(Default)]
pub(crate) struct Committed(Mutex<Option<Response>>);

impl Committed {
    fn record(&self, outcome: &Outcome) {
        if let Ok(res) = outcome {
            *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(res.clone());
        }
    }

    pub(crate) fn take(&self) -> Option<Response> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Status of the response that will be sent if the request fails now.
    pub(crate) fn status(&self) -> Option<StatusCode> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).as_ref().map(Response::status_code)
    }
}

/// The continuation handed to each middleware step.
///
/// Consumed by [`run`](Next::run), so a step can forward at most once.
pub struct Next {
    layers: Arc<[Layer]>,
    index: usize,
    endpoint: BoxedHandler,
    committed: Option<Arc<Committed>>,
}

impl Next {
    pub(crate) fn new(layers: Arc<[Layer]>, endpoint: BoxedHandler) -> Self {
        Self { layers, index: 0, endpoint, committed: None }
    }

    pub(crate) fn committed(&self) -> Option<Arc<Committed>> {
        self.committed.clone()
    }

    /// Records every successful outcome produced below this point in `slot`.
    pub(crate) fn committing(mut self, slot: Arc<Committed>) -> Self {
        self.committed = Some(slot);
        self
    }

    /// Runs the rest of the chain: the next applicable step, or the endpoint
    /// when none are left.
    pub async fn run(mut self, req: Request) -> Outcome {
        let committed = self.committed.clone();

        let outcome = loop {
            let Some(layer) = self.layers.get(self.index) else {
                break self.endpoint.call(req).await;
            };
            self.index += 1;
            if layer.applies_to(req.path()) {
                let middleware = Arc::clone(&layer.middleware);
                break middleware.call(req, self).await;
            }
        };

        if let Some(slot) = committed {
            slot.record(&outcome);
        }
        outcome
    }
}
