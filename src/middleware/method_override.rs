//! Method override for HTML forms.
//!
//! Browsers only submit forms as GET or POST. A form that means PUT, PATCH or
//! DELETE posts to `/products/42?_method=DELETE` and this step rewrites the
//! method before routing sees it.

use http::Method;
use tracing::debug;

use super::Next;
use crate::handler::Outcome;
use crate::request::Request;

/// Query key carrying the intended method.
pub const OVERRIDE_KEY: &str = "_method";

/// Rewrites a POST's method from `?_method=…` when it names PUT, PATCH or
/// DELETE (any case). Anything else is left untouched.
pub async fn method_override(mut req: Request, next: Next) -> Outcome {
    if *req.method() == Method::POST {
        let wanted = req.query(OVERRIDE_KEY).map(str::to_ascii_uppercase);
        let method = match wanted.as_deref() {
            Some("PUT") => Some(Method::PUT),
            Some("PATCH") => Some(Method::PATCH),
            Some("DELETE") => Some(Method::DELETE),
            _ => None,
        };
        if let Some(method) = method {
            debug!(path = req.path(), %method, "method override");
            req.set_method(method);
        }
    }
    next.run(req).await
}
