//! Per-request span and access log.

use std::time::Instant;

use tracing::{Instrument, info, info_span};

use super::{Committed, Next};
use crate::handler::Outcome;
use crate::request::Request;

/// Wraps the rest of the chain in a `request` span and logs one line per
/// request with method, path, final status and latency.
///
/// Register it first so its span covers everything after it.
pub async fn trace(req: Request, next: Next) -> Outcome {
    let method = req.method().clone();
    let path = req.path().to_owned();
    let span = info_span!("request", %method, %path);
    let started = Instant::now();
    let committed = next.committed();

    let outcome = next.run(req).instrument(span.clone()).await;

    // A failure after a committed response is dropped by the app; the
    // client gets the committed status.
    let (status, failed) = match (&outcome, committed.as_deref().and_then(Committed::status)) {
        (Ok(res), _) => (res.status_code(), false),
        (Err(_), Some(sent)) => (sent, false),
        (Err(failure), None) => (failure.status(), true),
    };
    let _entered = span.enter();
    info!(
        status = status.as_u16(),
        latency_us = started.elapsed().as_micros() as u64,
        failed,
        "{method} {path}",
    );
    outcome
}
