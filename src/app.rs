//! The request pipeline: application middleware → dispatcher → reporter.
//!
//! ```text
//! request ─► layer 1 ─► layer 2 ─► … ─► dispatcher ─► route guards ─► handler
//!               │          │                 │                          │
//!               └──────────┴──── Failure ────┴──────────────────────────┘
//!                                   │
//!                                   ▼
//!                              ErrorReporter ─► one response
//! ```
//!
//! [`App::handle`] produces exactly one response per request: either the
//! pipeline's successful response or the reporter's rendering of the
//! failure, never both.

use std::sync::Arc;

use tracing::warn;

use crate::failure::Failure;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, Outcome};
use crate::middleware::{Chain, Committed, Layer, Middleware, Next};
use crate::reporter::{ErrorReporter, FailedRequest, PlainReporter};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// A complete application, ready to be served.
///
/// ```rust
/// use rota::{App, Router, Request};
/// use rota::middleware::{cookies, method_override, trace};
///
/// async fn home(_req: Request) -> &'static str { "Home!" }
///
/// let app = App::new(Router::new().get("/", home))
///     .layer(trace)
///     .layer(method_override)
///     .layer(cookies);
/// ```
pub struct App {
    layers: Arc<[Layer]>,
    router: Arc<Router>,
    fallback: BoxedHandler,
    reporter: Arc<dyn ErrorReporter>,
}

impl App {
    pub fn new(router: Router) -> Self {
        Self {
            layers: Arc::from(Vec::new()),
            router: Arc::new(router),
            fallback: not_found.into_boxed_handler(),
            reporter: Arc::new(PlainReporter),
        }
    }

    /// Appends an application-wide middleware step. Steps run in the order
    /// they are added, before routing.
    pub fn layer(self, middleware: impl Middleware) -> Self {
        self.push(Chain::new().with(middleware))
    }

    /// Appends a step that runs only for paths equal to `prefix` or below it.
    pub fn layer_at(self, prefix: &str, middleware: impl Middleware) -> Self {
        self.push(Chain::new().with_at(prefix, middleware))
    }

    fn push(mut self, chain: Chain) -> Self {
        let mut layers = self.layers.to_vec();
        layers.extend(chain.freeze().iter().cloned());
        self.layers = layers.into();
        self
    }

    /// Replaces the catch-all stage that runs when no route matches.
    ///
    /// The default fails with `404 Not Found`.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = handler.into_boxed_handler();
        self
    }

    /// Replaces the terminal error reporter. Defaults to [`PlainReporter`].
    pub fn reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Runs one request through the whole pipeline.
    pub async fn handle(&self, req: Request) -> Response {
        let failed = FailedRequest::of(&req);
        let committed = Arc::new(Committed::default());
        let endpoint: BoxedHandler = Arc::new(Dispatcher {
            router: Arc::clone(&self.router),
            fallback: Arc::clone(&self.fallback),
            committed: Arc::clone(&committed),
        });

        let outcome = Next::new(Arc::clone(&self.layers), endpoint)
            .committing(Arc::clone(&committed))
            .run(req)
            .await;

        match outcome {
            Ok(res) => res,
            Err(failure) => match committed.take() {
                Some(res) => {
                    warn!(
                        method = %failed.method,
                        path = %failed.path,
                        status = failure.status().as_u16(),
                        "failure raised after a response was produced; dropping it: {}",
                        failure.message(),
                    );
                    res
                }
                None => self.reporter.report(&failure, &failed),
            },
        }
    }
}

/// The default catch-all.
async fn not_found(_req: Request) -> Failure {
    Failure::not_found("Not Found")
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// The endpoint at the bottom of the application chain: route lookup,
/// parameter binding, then the route or the fallback.
struct Dispatcher {
    router: Arc<Router>,
    fallback: BoxedHandler,
    committed: Arc<Committed>,
}

impl ErasedHandler for Dispatcher {
    fn call(&self, mut req: Request) -> BoxFuture<Outcome> {
        let router = Arc::clone(&self.router);
        let fallback = Arc::clone(&self.fallback);
        let committed = Arc::clone(&self.committed);
        Box::pin(async move {
            match router.lookup(req.method(), req.path()) {
                Some((route, params)) => {
                    req.params = params;
                    route.dispatch(req, committed).await
                }
                None => fallback.call(req).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    fn get(path: &str) -> Request {
        Request::builder(Method::GET, path).build()
    }

    #[tokio::test]
    async fn unmatched_path_is_404_from_fallback() {
        let app = App::new(Router::new().get("/dogs", |_req: Request| async { "WOOF WOOF" }));
        let res = app.handle(get("/cats")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.text_body(), "Not Found");
    }

    #[tokio::test]
    async fn custom_fallback() {
        let app = App::new(Router::new())
            .fallback(|_req: Request| async {
                Response::builder().status(StatusCode::NOT_FOUND).text("NOT FOUND")
            });
        assert_eq!(app.handle(get("/nowhere")).await.text_body(), "NOT FOUND");
    }

    #[tokio::test]
    async fn params_reach_the_handler() {
        let app = App::new(Router::new().get("/products/:id", |req: Request| async move {
            format!("product {}", req.param("id").unwrap_or_default())
        }));
        assert_eq!(app.handle(get("/products/42")).await.text_body(), "product 42");
    }

    #[tokio::test]
    async fn reporter_runs_once_per_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = App::new(Router::new().get("/boom", |_req: Request| async {
            tokio::task::yield_now().await;
            Err::<String, _>(Failure::new(StatusCode::IM_A_TEAPOT, "short and stout"))
        }))
        .reporter(move |failure: &Failure, _req: &FailedRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            Response::builder().status(failure.status()).text(failure.message())
        });

        let res = app.handle(get("/boom")).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(res.text_body(), "short and stout");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        app.handle(get("/missing")).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panic_in_handler_is_reported_as_500() {
        let app = App::new(Router::new().get("/error", |_req: Request| async {
            tokio::task::yield_now().await;
            let missing: Option<&str> = None;
            missing.expect("chicken is not defined")
        }));
        let res = app.handle(get("/error")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.text_body(), "Something went wrong");
    }

    #[tokio::test]
    #[traced_test]
    async fn late_failure_is_dropped_not_double_written() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = App::new(Router::new().get("/", |_req: Request| async { "Home!" }))
            .layer(|req: Request, next: Next| async move {
                next.run(req).await?;
                Err::<Response, _>(Failure::unhandled("too late"))
            })
            .reporter(move |failure: &Failure, _req: &FailedRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                Response::builder().status(failure.status()).text(failure.message())
            });

        let res = app.handle(get("/")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.text_body(), "Home!");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(logs_contain("dropping it: too late"));
    }

    #[tokio::test]
    #[traced_test]
    async fn late_failure_in_route_guard_is_dropped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let late = |req: Request, next: Next| async move {
            next.run(req).await?;
            Err::<Response, _>(Failure::unhandled("too late"))
        };
        let router = Router::new()
            .guarded(Method::GET, "/guarded", Chain::new().with(late), |_req: Request| async { "Home!" });
        let app = App::new(router)
            .reporter(move |failure: &Failure, _req: &FailedRequest| {
                counter.fetch_add(1, Ordering::SeqCst);
                Response::builder().status(failure.status()).text(failure.message())
            });

        let res = app.handle(get("/guarded")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.text_body(), "Home!");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(logs_contain("dropping it: too late"));
    }

    #[tokio::test]
    async fn route_guards_run_after_app_layers() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let app_log = Arc::clone(&order);
        let guard_log = Arc::clone(&order);

        let guard = move |req: Request, next: Next| {
            let log = Arc::clone(&guard_log);
            async move {
                log.lock().unwrap().push("guard");
                if req.query("password") == Some("chickens") {
                    next.run(req).await
                } else {
                    Err(Failure::unauthorized("Wrong password"))
                }
            }
        };
        let router = Router::new().guarded(
            Method::GET,
            "/secret",
            Chain::new().with(guard),
            |_req: Request| async { "MY SECRET" },
        );
        let app = App::new(router).layer(move |req: Request, next: Next| {
            let log = Arc::clone(&app_log);
            async move {
                log.lock().unwrap().push("app");
                next.run(req).await
            }
        });

        let denied = app.handle(get("/secret")).await;
        assert_eq!(denied.status_code(), StatusCode::UNAUTHORIZED);
        let allowed = app.handle(get("/secret?password=chickens")).await;
        assert_eq!(allowed.text_body(), "MY SECRET");
        assert_eq!(*order.lock().unwrap(), vec!["app", "guard", "app", "guard"]);
    }

    #[tokio::test]
    async fn scoped_layer_skips_other_paths() {
        let app = App::new(Router::new()
            .get("/dogs", |_req: Request| async { "WOOF WOOF" })
            .get("/", |_req: Request| async { "Home!" }))
            .layer_at("/dogs", |_req: Request, _next: Next| async { "I LOVE DOGS!!" });

        assert_eq!(app.handle(get("/dogs")).await.text_body(), "I LOVE DOGS!!");
        assert_eq!(app.handle(get("/")).await.text_body(), "Home!");
    }
}
