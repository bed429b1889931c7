//! Handler trait, outcomes and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one `Vec<Route>`, so
//! each one is hidden behind a trait object (`dyn ErasedHandler`) with a
//! single uniform signature:
//!
//! ```text
//! async fn show(req: Request) -> Result<Json<Record>, Failure> { … }   ← user writes this
//!        ↓ router.on(Method::GET, "/items/:id", show)
//! show.into_boxed_handler()                                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                                          ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time                                 ← one vtable dispatch
//!        ↓
//! fault::guard(async { show(req).await.into_outcome() })             ← BoxFuture<Outcome>
//! ```
//!
//! Whatever the handler returns is normalised into an [`Outcome`]: either a
//! response to send or a [`Failure`] for the reporter. Every call runs under
//! [`fault::guard`](crate::fault), so a panic in the handler body becomes a
//! failure too.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;

use crate::failure::Failure;
use crate::fault;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};

/// What one pipeline stage produced: a response, or a failure to report.
pub type Outcome = Result<Response, Failure>;

/// A heap-allocated, type-erased future.
///
/// `Pin<Box<…>>` because the runtime polls it in place; `Send + 'static` so
/// tokio can move it between worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// Conversion of a handler's return value into an [`Outcome`].
///
/// Anything that is a response is a successful outcome; a [`Failure`], or the
/// `Err` side of a `Result<_, Failure>`, goes to the reporter.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Response {
    fn into_outcome(self) -> Outcome { Ok(self) }
}

impl IntoOutcome for &'static str {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl IntoOutcome for String {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl IntoOutcome for StatusCode {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl<T: Serialize> IntoOutcome for Json<T> {
    fn into_outcome(self) -> Outcome { Ok(self.into_response()) }
}

impl IntoOutcome for Failure {
    fn into_outcome(self) -> Outcome { Err(self) }
}

impl<T: IntoResponse> IntoOutcome for Result<T, Failure> {
    fn into_outcome(self) -> Outcome { self.map(IntoResponse::into_response) }
}

// ── Internal types ────────────────────────────────────────────────────────────

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Outcome>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the shape:
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// The trait is sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Holds a concrete handler `F` and bridges it to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Outcome> {
        let fut = (self.0)(req);
        fault::guard(async move { fut.await.into_outcome() })
    }
}
