//! REST routes over a [`Store`].
//!
//! [`mount`] registers the conventional five operations for one resource:
//!
//! | Method | Path | Result |
//! |---|---|---|
//! | `GET` | `/items` | `200`, JSON array; query parameters filter by field |
//! | `POST` | `/items` | `302` to `/items/<id>`, body is the new record |
//! | `GET` | `/items/:id` | `200`, JSON record, or `404` |
//! | `PUT`, `PATCH` | `/items/:id` | `302` to `/items/<id>`, body is the merged record, or `404` |
//! | `DELETE` | `/items/:id` | `302` to `/items`; deleting twice is fine |
//!
//! Bodies may be JSON objects or urlencoded forms. Store errors become
//! failures (`404`, `400`, `503`) and go to the reporter like any other.
//!
//! [`mount_children`] nests one collection under another's records, e.g.
//! products under `/farms/:id/products`.

use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;
use tracing::info;

use crate::failure::Failure;
use crate::handler::{Handler, Outcome};
use crate::request::Request;
use crate::response::{Json, Response};
use crate::router::Router;
use crate::store::{Fields, Record, Store};

/// Adds the five resource routes for `base` to `router`.
///
/// ```rust
/// use std::sync::Arc;
/// use rota::{resource, Router};
/// use rota::store::{MemoryStore, Schema};
///
/// let products = Arc::new(MemoryStore::new("products", Schema::new()));
/// let router = resource::mount(Router::new(), "/products", products);
/// assert_eq!(router.len(), 6);
/// ```
pub fn mount(router: Router, base: &str, store: Arc<dyn Store>) -> Router {
    let base = base.trim_end_matches('/').to_owned();
    let item = format!("{base}/:id");
    router
        .get(&base, index(Arc::clone(&store)))
        .post(&base, create(Arc::clone(&store), base.clone()))
        .get(&item, show(Arc::clone(&store)))
        .put(&item, update(Arc::clone(&store), base.clone()))
        .patch(&item, update(Arc::clone(&store), base.clone()))
        .delete(&item, destroy(store, base))
}

/// Adds the nested routes for `child` records owned by `parent` records:
///
/// | Method | Path | Result |
/// |---|---|---|
/// | `GET` | `{base}/:id/{segment}` | `200`, the children whose `back_ref` is `:id`, or `404` for a missing parent |
/// | `POST` | `{base}/:id/{segment}` | `302` to `{base}/:id`, body is the new child |
///
/// A created child gets `back_ref` set to the parent's id, and its id is
/// appended to the parent's list field named `segment`.
///
/// ```rust
/// use std::sync::Arc;
/// use rota::{resource, Router};
/// use rota::store::{FieldKind, MemoryStore, Schema};
///
/// let farms = Arc::new(MemoryStore::new("farms", Schema::new().optional("products", FieldKind::RefList("products"))));
/// let products = Arc::new(MemoryStore::new("products", Schema::new().optional("farm", FieldKind::Ref("farms"))));
/// let router = resource::mount_children(Router::new(), "/farms", farms, "products", products, "farm");
/// assert_eq!(router.len(), 2);
/// ```
pub fn mount_children(
    router: Router,
    base: &str,
    parent: Arc<dyn Store>,
    segment: &str,
    child: Arc<dyn Store>,
    back_ref: &str,
) -> Router {
    let base = base.trim_end_matches('/').to_owned();
    let segment = segment.trim_matches('/').to_owned();
    let nested = format!("{base}/:id/{segment}");
    router
        .get(&nested, children(Arc::clone(&parent), Arc::clone(&child), back_ref.to_owned()))
        .post(&nested, adopt(parent, child, Nesting { base, segment, back_ref: back_ref.to_owned() }))
}

#[derive(Clone)]
struct Nesting {
    base: String,
    segment: String,
    back_ref: String,
}

fn children(parent: Arc<dyn Store>, child: Arc<dyn Store>, back_ref: String) -> impl Handler {
    move |req: Request| {
        let (parent, child) = (Arc::clone(&parent), Arc::clone(&child));
        let back_ref = back_ref.clone();
        async move {
            let owner = parent.get(id(&req)).await?;
            let mut filter = Fields::new();
            filter.insert(back_ref, Value::String(owner.id));
            Ok::<_, Failure>(Json(child.find(&filter).await?))
        }
    }
}

fn adopt(parent: Arc<dyn Store>, child: Arc<dyn Store>, nesting: Nesting) -> impl Handler {
    move |req: Request| {
        let (parent, child) = (Arc::clone(&parent), Arc::clone(&child));
        let Nesting { base, segment, back_ref } = nesting.clone();
        async move {
            let owner = parent.get(id(&req)).await?;
            let mut fields = req.fields()?;
            fields.insert(back_ref, Value::String(owner.id.clone()));
            let created = child.create(fields).await?;

            if let Err(e) = parent.push(&owner.id, &segment, Value::String(created.id.clone())).await {
                child.delete(&created.id).await?;
                return Err(e.into());
            }
            info!(parent = %owner.id, id = %created.id, "created {base}/{}/{segment}", owner.id);
            redirect_with(&format!("{base}/{}", owner.id), &created)
        }
    }
}

fn index(store: Arc<dyn Store>) -> impl Handler {
    move |req: Request| {
        let store = Arc::clone(&store);
        async move {
            let filter: Fields = req.query_pairs().iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            let records = store.find(&filter).await?;
            Ok::<_, Failure>(Json(records))
        }
    }
}

fn show(store: Arc<dyn Store>) -> impl Handler {
    move |req: Request| {
        let store = Arc::clone(&store);
        async move {
            let record = store.get(id(&req)).await?;
            Ok::<_, Failure>(Json(record))
        }
    }
}

fn create(store: Arc<dyn Store>, base: String) -> impl Handler {
    move |req: Request| {
        let store = Arc::clone(&store);
        let base = base.clone();
        async move {
            let record = store.create(req.fields()?).await?;
            info!(id = %record.id, "created {base}/{}", record.id);
            redirect_with(&format!("{base}/{}", record.id), &record)
        }
    }
}

fn update(store: Arc<dyn Store>, base: String) -> impl Handler {
    move |req: Request| {
        let store = Arc::clone(&store);
        let base = base.clone();
        async move {
            let record = store.update(id(&req), req.fields()?).await?;
            redirect_with(&format!("{base}/{}", record.id), &record)
        }
    }
}

fn destroy(store: Arc<dyn Store>, base: String) -> impl Handler {
    move |req: Request| {
        let store = Arc::clone(&store);
        let base = base.clone();
        async move {
            let removed = store.delete(id(&req)).await?;
            info!(id = id(&req), removed, "delete {base}");
            Ok::<_, Failure>(Response::redirect(&base))
        }
    }
}

fn id(req: &Request) -> &str {
    req.param("id").unwrap_or_default()
}

/// `302 Found` to `location`, carrying the record as JSON.
fn redirect_with(location: &str, record: &Record) -> Outcome {
    let body = serde_json::to_vec(record).map_err(|e| Failure::unhandled(e.to_string()))?;
    Ok(Response::builder()
        .status(StatusCode::FOUND)
        .header("location", location)
        .json(body))
}
