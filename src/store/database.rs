//! Process-wide database handle.
//!
//! Connected once at startup, shared by reference (`Arc<Database>`) with
//! every handler that needs it, and closed once at shutdown. A failed
//! connect is fatal: the caller is expected to log it and exit rather than
//! serve without a store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::info;

use super::{FieldKind, MemoryStore, Record, Schema, Store, StoreError};
use crate::error::Error;

const MEMORY_SCHEME: &str = "memory://";

/// Connection to the record database and owner of its collections.
///
/// Only `memory://<name>` URLs are served by the built-in driver.
///
/// ```rust
/// use rota::store::{Database, Schema, Store};
///
/// # async fn demo() -> Result<(), rota::Error> {
/// let db = Database::connect("memory://farmStand").await?;
/// let products = db.collection("products", Schema::new());
/// assert_eq!(products.count().await.unwrap(), 0);
/// db.close();
/// # Ok(())
/// # }
/// ```
pub struct Database {
    name: String,
    open: Arc<AtomicBool>,
    collections: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let name = url.strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| Error::Connect(format!("unsupported database url `{url}`")))?
            .trim_end_matches('/');
        if name.is_empty() {
            return Err(Error::Connect(format!("database url `{url}` names no database")));
        }

        info!(database = name, "database connection open");
        Ok(Self {
            name: name.to_owned(),
            open: Arc::new(AtomicBool::new(true)),
            collections: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// The collection called `name`, created with `schema` on first use.
    /// Later calls return the same instance and ignore `schema`.
    pub fn collection(&self, name: &str, schema: Schema) -> Arc<MemoryStore> {
        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let store = collections
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(MemoryStore::attached(name, schema, Arc::clone(&self.open))));
        Arc::clone(store)
    }

    /// Replaces the ids in `record`'s reference `field` with the records they
    /// point to. `record` must come from `from`, whose schema names the
    /// target collection.
    ///
    /// A dangling [`Ref`](FieldKind::Ref) becomes `null`; dangling entries of
    /// a [`RefList`](FieldKind::RefList) are left out.
    ///
    /// ```rust
    /// use rota::store::{Database, FieldKind, Schema, Store};
    /// use serde_json::json;
    ///
    /// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Database::connect("memory://farmStand").await?;
    /// let products = db.collection("products", Schema::new());
    /// let farms = db.collection("farms", Schema::new().optional("products", FieldKind::RefList("products")));
    ///
    /// let melon = products.create(json!({"name": "Melon"}).as_object().cloned().unwrap_or_default()).await?;
    /// let farm = farms.create(Default::default()).await?;
    /// let farm = farms.push(&farm.id, "products", json!(melon.id)).await?;
    ///
    /// let farm = db.populate(&farms, farm, "products").await?;
    /// assert_eq!(farm.fields["products"][0]["name"], "Melon");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn populate(&self, from: &MemoryStore, mut record: Record, field: &str) -> Result<Record, StoreError> {
        let kind = from.schema().reference(field)
            .ok_or_else(|| StoreError::Invalid(format!("`{field}` is not a reference")))?;
        let target = kind.target().unwrap_or_default();
        let store = self.collections.lock().unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .ok_or_else(|| StoreError::Invalid(format!("collection `{target}` does not exist")))?;

        let Some(ids) = record.fields.get(field).cloned() else {
            return Ok(record);
        };
        let populated = match (kind, ids) {
            (FieldKind::Ref(_), Value::String(id)) => resolve(&*store, &id).await?.unwrap_or(Value::Null),
            (FieldKind::RefList(_), Value::Array(ids)) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in ids.iter().filter_map(Value::as_str) {
                    found.extend(resolve(&*store, id).await?);
                }
                Value::Array(found)
            }
            (_, other) => other,
        };
        record.fields.insert(field.to_owned(), populated);
        Ok(record)
    }

    /// Closes the connection. Every collection handed out fails with
    /// [`StoreError::Closed`](super::StoreError::Closed) from then on.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            info!(database = %self.name, "database connection closed");
        }
    }
}

async fn resolve(store: &MemoryStore, id: &str) -> Result<Option<Value>, StoreError> {
    match store.get(id).await {
        Ok(record) => Ok(Some(record.into_value())),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
