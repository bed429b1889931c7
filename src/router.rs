//! Route table and dispatcher.
//!
//! Routes are kept in registration order and tried one after another. The
//! first route whose method is equal and whose template matches the path
//! wins. With
//!
//! ```text
//! GET /comments/new
//! GET /comments/:id
//! ```
//!
//! `/comments/new` reaches the first handler because it was registered
//! first. Swap the two lines and `/comments/new` becomes `id = "new"`.
//! There is no "most specific match" ranking.
//!
//! Each template is compiled into its own [`matchit`] matcher, so segment
//! matching and parameter extraction are matchit's; ordering is ours.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as Matcher;

use crate::handler::{BoxedHandler, Handler, Outcome};
use crate::middleware::{Chain, Committed, Layer, Next};
use crate::request::Request;

/// A registered `(method, path template)` pair and what runs for it.
pub(crate) struct Route {
    method: Method,
    template: String,
    matcher: Matcher<()>,
    guards: Arc<[Layer]>,
    handler: BoxedHandler,
}

impl Route {
    fn new(method: Method, template: &str, guards: Arc<[Layer]>, handler: BoxedHandler) -> Self {
        let mut matcher = Matcher::new();
        matcher
            .insert(to_matchit(template), ())
            .unwrap_or_else(|e| panic!("invalid route `{template}`: {e}"));
        Self { method, template: template.to_owned(), matcher, guards, handler }
    }

    fn matches(&self, method: &Method, path: &str) -> Option<HashMap<String, String>> {
        if self.method != *method {
            return None;
        }
        let matched = self.matcher.at(path).ok()?;
        Some(matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect())
    }

    /// Runs the route's guards, then its handler. Guard responses are
    /// recorded in the request's `committed` slot like application layers.
    pub(crate) async fn dispatch(&self, req: Request, committed: Arc<Committed>) -> Outcome {
        if self.guards.is_empty() {
            self.handler.call(req).await
        } else {
            Next::new(Arc::clone(&self.guards), Arc::clone(&self.handler))
                .committing(committed)
                .run(req)
                .await
        }
    }
}

/// The application's route table.
///
/// Build it once at startup and hand it to [`App::new`](crate::App::new);
/// the route set is fixed from then on. Every registration method returns
/// `self` so calls chain.
///
/// ```rust
/// use rota::{Request, Router};
/// use http::Method;
///
/// # async fn index(_: Request) -> &'static str { "" }
/// # async fn new_form(_: Request) -> &'static str { "" }
/// # async fn show(_: Request) -> &'static str { "" }
/// # async fn create(_: Request) -> &'static str { "" }
/// let router = Router::new()
///     .get("/products", index)
///     .get("/products/new", new_form)
///     .get("/products/:id", show)
///     .post("/products", create);
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` + `path`.
    ///
    /// Parameter segments are written `:name` or `{name}` and match exactly
    /// one non-empty segment; [`Request::param`] retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the template is malformed (startup configuration error).
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.guarded(method, path, Chain::new(), handler)
    }

    /// Registers `handler` behind a route-specific middleware chain. The
    /// guards run only after the route matched, in order, before the handler.
    pub fn guarded(mut self, method: Method, path: &str, guards: Chain, handler: impl Handler) -> Self {
        self.routes.push(Route::new(method, path, guards.freeze(), handler.into_boxed_handler()));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Appends every route of `other` under `prefix`, keeping their order.
    ///
    /// `Router::new().nest("/shelters", shelters)` turns `/:id` into
    /// `/shelters/:id`; a nested `/` becomes `/shelters` itself.
    pub fn nest(mut self, prefix: &str, other: Router) -> Self {
        let prefix = prefix.trim_end_matches('/');
        for route in other.routes {
            let template = match route.template.as_str() {
                "/" if !prefix.is_empty() => prefix.to_owned(),
                t => format!("{prefix}{t}"),
            };
            self.routes.push(Route::new(route.method, &template, route.guards, route.handler));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First registered route matching `method` and `path`, with its
    /// extracted parameters.
    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(&Route, HashMap<String, String>)> {
        self.routes.iter()
            .find_map(|route| route.matches(method, path).map(|params| (route, params)))
    }
}

/// `/items/:id` → `/items/{id}`. Segments already in braces pass through.
fn to_matchit(template: &str) -> String {
    template.split('/')
        .map(|seg| match seg.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => seg.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
