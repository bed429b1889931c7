//! Liveness and readiness check handlers.
//!
//! | Check | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Is the database connection open? |
//!
//! ```rust
//! use std::sync::Arc;
//! use rota::{Router, health};
//! use rota::store::Database;
//!
//! # async fn demo() -> Result<(), rota::Error> {
//! let db = Arc::new(Database::connect("memory://farmStand").await?);
//! let router = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness(db));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use http::StatusCode;

use crate::handler::Handler;
use crate::request::Request;
use crate::response::Response;
use crate::store::Database;

/// Always `200 OK` with body `"ok"`.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"` while `db` is open, `503` after it closes.
pub fn readiness(db: Arc<Database>) -> impl Handler {
    move |_req: Request| {
        let open = db.is_open();
        async move {
            if open {
                Response::text("ready")
            } else {
                Response::status(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{App, Router};
    use http::Method;

    #[tokio::test]
    async fn readiness_follows_the_database() {
        let db = Arc::new(Database::connect("memory://health").await.unwrap());
        let app = App::new(Router::new()
            .get("/healthz", liveness)
            .get("/readyz", readiness(Arc::clone(&db))));

        let ready = app.handle(Request::builder(Method::GET, "/readyz").build()).await;
        assert_eq!(ready.text_body(), "ready");

        db.close();
        let ready = app.handle(Request::builder(Method::GET, "/readyz").build()).await;
        assert_eq!(ready.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let live = app.handle(Request::builder(Method::GET, "/healthz").build()).await;
        assert_eq!(live.status_code(), StatusCode::OK);
        assert_eq!(live.text_body(), "ok");
    }
}
