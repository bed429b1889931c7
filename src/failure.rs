//! The request-terminating failure value.
//!
//! A [`Failure`] is what a handler or middleware returns when the request
//! cannot be answered normally. It carries exactly two things the client will
//! see: a status code and a message. Everything else (logging, the shape of
//! the body) is the [`ErrorReporter`](crate::ErrorReporter)'s business.
//!
//! ```rust
//! use rota::{Failure, FailureKind};
//! use http::StatusCode;
//!
//! let f = Failure::not_found("Product not found");
//! assert_eq!(f.status(), StatusCode::NOT_FOUND);
//! assert_eq!(f.kind(), FailureKind::NotFound);
//!
//! let f = Failure::default();
//! assert_eq!(f.status(), StatusCode::INTERNAL_SERVER_ERROR);
//! assert_eq!(f.message(), "Something went wrong");
//! ```

use http::StatusCode;
use thiserror::Error;

use crate::store::StoreError;

/// Message used when a failure carries no message of its own.
pub const DEFAULT_MESSAGE: &str = "Something went wrong";

/// Coarse classification of a [`Failure`], derived from its status code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// 404: the resource is absent.
    NotFound,
    /// Any other 4xx: malformed input rejected before mutation.
    Validation,
    /// 401 / 403: an access-control step declined the request.
    Unauthorized,
    /// Everything else. The default.
    Unhandled,
}

/// A structured `(status, message)` value that terminates a request.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{status}: {message}")]
pub struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// A 500 with a custom message.
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }

    pub fn kind(&self) -> FailureKind {
        match self.status.as_u16() {
            404             => FailureKind::NotFound,
            401 | 403       => FailureKind::Unauthorized,
            400..=499       => FailureKind::Validation,
            _               => FailureKind::Unhandled,
        }
    }
}

impl Default for Failure {
    fn default() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, DEFAULT_MESSAGE)
    }
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_)   => Self::not_found(e.to_string()),
            StoreError::Invalid(_)    => Self::validation(e.to_string()),
            StoreError::Closed        => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        }
    }
}

/// Malformed JSON bodies are the client's fault.
impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        Self::validation(format!("invalid JSON body: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_status() {
        assert_eq!(Failure::not_found("x").kind(), FailureKind::NotFound);
        assert_eq!(Failure::validation("x").kind(), FailureKind::Validation);
        assert_eq!(Failure::new(StatusCode::UNPROCESSABLE_ENTITY, "x").kind(), FailureKind::Validation);
        assert_eq!(Failure::unauthorized("x").kind(), FailureKind::Unauthorized);
        assert_eq!(Failure::forbidden("x").kind(), FailureKind::Unauthorized);
        assert_eq!(Failure::default().kind(), FailureKind::Unhandled);
        assert_eq!(Failure::new(StatusCode::BAD_GATEWAY, "x").kind(), FailureKind::Unhandled);
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let f: Failure = StoreError::NotFound("abc".into()).into();
        assert_eq!(f.status(), StatusCode::NOT_FOUND);
        assert!(f.message().contains("abc"));

        let f: Failure = StoreError::Invalid("name is required".into()).into();
        assert_eq!(f.status(), StatusCode::BAD_REQUEST);

        let f: Failure = StoreError::Closed.into();
        assert_eq!(f.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn bad_json_is_a_validation_failure() {
        let err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let f: Failure = err.into();
        assert_eq!(f.kind(), FailureKind::Validation);
    }
}
