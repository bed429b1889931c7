//! Capturing faults raised inside asynchronous handler bodies.
//!
//! A handler's body may suspend (await the store, hash a password) before it
//! fails. Returning `Err(Failure)` after an `.await` already lands in the
//! normal failure channel because the handler's future resolves to an
//! [`Outcome`]. A *panic* after an `.await` is the case that would otherwise
//! escape: it unwinds out of the connection task, the client sees a dropped
//! connection, and the reporter never hears about it.
//!
//! [`guard`] closes that gap. It polls the future under `catch_unwind`; a
//! panic at any point, before or after a suspension point, resolves the
//! future to the default 500 [`Failure`] instead. Every handler and
//! middleware registered with the crate runs under it automatically.
//! [`catch_faults`] exposes the same adapter for handlers you call yourself.
//!
//! Wrapping twice is harmless: the inner guard already converted the panic,
//! so the outer one only ever sees an ordinary outcome, and the reporter still
//! runs at most once per request.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

use crate::failure::Failure;
use crate::handler::{BoxFuture, IntoOutcome, Outcome};
use crate::request::Request;

/// Runs `fut` so that a panic anywhere inside it becomes `Err(Failure::default())`.
pub(crate) fn guard<Fut>(fut: Fut) -> BoxFuture<Outcome>
where
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Box::pin(async move {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                error!(panic = %panic_message(payload.as_ref()), "handler panicked");
                Err(Failure::default())
            }
        }
    })
}

/// Adapts `handler` so that its outcome, including a panic raised after any
/// number of suspension points, is delivered as an [`Outcome`].
///
/// The result is itself a handler with the same external signature and can
/// be registered anywhere a handler is accepted.
///
/// ```rust
/// use rota::{fault, Failure, Request, Router};
/// use http::Method;
///
/// async fn flaky(_req: Request) -> Result<String, Failure> {
///     tokio::task::yield_now().await;
///     Err(Failure::unhandled("store went away"))
/// }
///
/// let router = Router::new().on(Method::GET, "/flaky", fault::catch_faults(flaky));
/// ```
pub fn catch_faults<F, Fut, R>(handler: F) -> impl Fn(Request) -> BoxFuture<Outcome> + Send + Sync + 'static
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    move |req| {
        let fut = handler(req);
        guard(async move { fut.await.into_outcome() })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
