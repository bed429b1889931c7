//! # rota
//!
//! A small resource router for HTTP services: an ordered middleware chain,
//! first-match route dispatch, one error reporter for every failure, and a
//! record store behind CRUD routes.
//!
//! ## How a request flows
//!
//! - Application [middleware] runs in registration order. Each layer either
//!   answers, fails, or hands the request to the next one.
//! - The router picks the first route whose method and path template match.
//!   Unmatched requests go to the catch-all fallback (`404` by default).
//! - Handlers return anything implementing [`IntoOutcome`]. An `Err`, or a
//!   panic anywhere in a handler or middleware future, becomes a
//!   [`Failure`] (see [`fault`]).
//! - Every failure reaches the [`ErrorReporter`] exactly once, and each
//!   request gets exactly one response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rota::{App, Config, Failure, Request, Router, Server, resource};
//! use rota::middleware::{method_override, trace};
//! use rota::store::{Database, FieldKind, Schema};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rota::Error> {
//!     rota::telemetry::init();
//!     let config = Config::from_env()?;
//!     let db = Arc::new(Database::connect(&config.database_url).await?);
//!
//!     let products = db.collection("products", Schema::new().required("name", FieldKind::String));
//!     let router = resource::mount(Router::new(), "/products", products)
//!         .get("/dogs", dogs);
//!
//!     let app = App::new(router).layer(trace).layer(method_override);
//!     Server::bind(config.addr()?).serve(app).await
//! }
//!
//! async fn dogs(req: Request) -> Result<String, Failure> {
//!     match req.query("breed") {
//!         Some(breed) => Ok(format!("WOOF, {breed}")),
//!         None => Err(Failure::validation("breed is required")),
//!     }
//! }
//! ```

mod app;
mod error;
mod failure;
mod request;
mod response;
mod router;
mod server;

pub mod auth;
pub mod config;
pub mod fault;
pub mod handler;
pub mod health;
pub mod middleware;
pub mod reporter;
pub mod resource;
pub mod sequence;
pub mod session;
pub mod store;
pub mod telemetry;

pub use app::App;
pub use config::Config;
pub use error::Error;
pub use failure::{Failure, FailureKind};
pub use handler::{BoxFuture, Handler, IntoOutcome, Outcome};
pub use middleware::{Chain, Middleware, Next};
pub use reporter::{ErrorReporter, FailedRequest, JsonReporter, PlainReporter};
pub use request::{Request, RequestBuilder};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
