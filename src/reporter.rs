//! The terminal error-reporting stage.
//!
//! Every [`Failure`] that survives the pipeline ends here and becomes exactly
//! one response. The [`App`](crate::App) calls the reporter at most once per
//! request; reporters themselves hold no per-request state.

use tracing::{debug, error};

use crate::failure::Failure;
use crate::request::Request;
use crate::response::Response;

/// What the reporter is told about the request that failed.
#[derive(Clone, Debug)]
pub struct FailedRequest {
    pub method: http::Method,
    pub path: String,
}

impl FailedRequest {
    pub(crate) fn of(req: &Request) -> Self {
        Self { method: req.method().clone(), path: req.path().to_owned() }
    }
}

/// Maps a failure to the response the client receives.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, failure: &Failure, req: &FailedRequest) -> Response;
}

/// Logs a failure at `error` for server faults and `debug` for client faults.
pub(crate) fn log(failure: &Failure, req: &FailedRequest) {
    let status = failure.status().as_u16();
    if failure.status().is_server_error() {
        error!(method = %req.method, path = %req.path, status, kind = ?failure.kind(), "{}", failure.message());
    } else {
        debug!(method = %req.method, path = %req.path, status, kind = ?failure.kind(), "{}", failure.message());
    }
}

/// Status from the failure, message as a plain-text body. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainReporter;

impl ErrorReporter for PlainReporter {
    fn report(&self, failure: &Failure, req: &FailedRequest) -> Response {
        log(failure, req);
        Response::builder()
            .status(failure.status())
            .text(failure.message())
    }
}

/// Writes `{"error": message, "status": code}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonReporter;

impl ErrorReporter for JsonReporter {
    fn report(&self, failure: &Failure, req: &FailedRequest) -> Response {
        log(failure, req);
        let body = serde_json::json!({
            "error": failure.message(),
            "status": failure.status().as_u16(),
        });
        Response::builder()
            .status(failure.status())
            .json(body.to_string())
    }
}

/// Reporters can be plain closures.
impl<F> ErrorReporter for F
where
    F: Fn(&Failure, &FailedRequest) -> Response + Send + Sync + 'static,
{
    fn report(&self, failure: &Failure, req: &FailedRequest) -> Response {
        self(failure, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    fn failed() -> FailedRequest {
        FailedRequest { method: Method::GET, path: "/products/1".into() }
    }

    #[test]
    fn plain_uses_status_and_message() {
        let res = PlainReporter.report(&Failure::not_found("Product not found"), &failed());
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.text_body(), "Product not found");
    }

    #[test]
    fn plain_defaults() {
        let res = PlainReporter.report(&Failure::default(), &failed());
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.text_body(), "Something went wrong");
    }

    #[test]
    fn json_body_shape() {
        let res = JsonReporter.report(&Failure::unauthorized("log in first"), &failed());
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "log in first");
        assert_eq!(body["status"], 401);
    }
}
