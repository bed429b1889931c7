//! In-process store backed by a locked vector.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{Fields, Record, Schema, Store, StoreError};

/// A named collection of records held in memory.
///
/// One `RwLock` guards the whole collection: reads run concurrently, each
/// mutation holds the write lock for its full read-check-write cycle.
pub struct MemoryStore {
    name: String,
    schema: Schema,
    records: RwLock<Vec<Record>>,
    open: Arc<AtomicBool>,
}

impl MemoryStore {
    /// A standalone collection, open for its whole lifetime.
    pub fn new(name: &str, schema: Schema) -> Self {
        Self::attached(name, schema, Arc::new(AtomicBool::new(true)))
    }

    /// A collection whose availability follows a [`Database`](super::Database).
    pub(crate) fn attached(name: &str, schema: Schema, open: Arc<AtomicBool>) -> Self {
        Self {
            name: name.to_owned(),
            schema,
            records: RwLock::new(Vec::new()),
            open,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.open.load(Ordering::Acquire) { Ok(()) } else { Err(StoreError::Closed) }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list(&self) -> Result<Vec<Record>, StoreError> {
        self.ensure_open()?;
        Ok(self.records.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Record, StoreError> {
        self.ensure_open()?;
        self.records.read().await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    async fn create(&self, fields: Fields) -> Result<Record, StoreError> {
        self.ensure_open()?;
        let fields = self.schema.check_create(fields)?;
        let record = Record { id: Uuid::new_v4().to_string(), fields };

        self.records.write().await.push(record.clone());
        debug!(collection = %self.name, id = %record.id, "record created");
        Ok(record)
    }

    async fn update(&self, id: &str, fields: Fields) -> Result<Record, StoreError> {
        self.ensure_open()?;
        let fields = self.schema.check_update(fields)?;

        let mut records = self.records.write().await;
        let record = records.iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        record.fields.extend(fields);
        debug!(collection = %self.name, id, "record updated");
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = records.len() != before;
        debug!(collection = %self.name, id, removed, "record delete");
        Ok(removed)
    }

    async fn push(&self, id: &str, field: &str, value: Value) -> Result<Record, StoreError> {
        self.ensure_open()?;
        self.schema.check_element(field, &value)?;

        let mut records = self.records.write().await;
        let record = records.iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        let slot = record.fields.entry(field).or_insert_with(|| Value::Array(Vec::new()));
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => items.push(value),
            _ => return Err(StoreError::Invalid(format!("`{field}` is not a list"))),
        }
        debug!(collection = %self.name, id, field, "record push");
        Ok(record.clone())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldKind;
    use serde_json::{Value, json};
    use std::collections::HashSet;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new("products", Schema::new().required("name", FieldKind::String))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let s = store();
        let input = fields(json!({"name": "Mountain Bike", "price": 599, "tags": ["red"]}));
        let created = s.create(input.clone()).await.unwrap();
        let fetched = s.get(&created.id).await.unwrap();
        assert_eq!(fetched.fields, input);
        assert_eq!(fetched.id, created.id);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let s = store();
        let mut ids = HashSet::new();
        for i in 0..200 {
            let r = s.create(fields(json!({"name": format!("p{i}")}))).await.unwrap();
            assert!(ids.insert(r.id));
        }
    }

    #[tokio::test]
    async fn list_keeps_creation_order() {
        let s = store();
        for name in ["a", "b", "c"] {
            s.create(fields(json!({"name": name}))).await.unwrap();
        }
        let names: Vec<_> = s.list().await.unwrap().iter()
            .map(|r| r.fields["name"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn update_merges_partially() {
        let s = store();
        let r = s.create(fields(json!({"name": "Bike", "price": 599}))).await.unwrap();
        let updated = s.update(&r.id, fields(json!({"price": 499}))).await.unwrap();
        assert_eq!(updated.fields, fields(json!({"name": "Bike", "price": 499})));
        assert_eq!(s.get(&r.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let err = store().update("nope", Fields::new()).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("nope".into()));
    }

    #[tokio::test]
    async fn invalid_update_leaves_record_untouched() {
        let s = store();
        let r = s.create(fields(json!({"name": "Bike"}))).await.unwrap();
        assert!(s.update(&r.id, fields(json!({"name": 7}))).await.is_err());
        assert_eq!(s.get(&r.id).await.unwrap(), r);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let s = store();
        let keep = s.create(fields(json!({"name": "keep"}))).await.unwrap();
        let gone = s.create(fields(json!({"name": "gone"}))).await.unwrap();
        assert_eq!(s.count().await.unwrap(), 2);

        assert!(s.delete(&gone.id).await.unwrap());
        assert_eq!(s.count().await.unwrap(), 1);
        assert!(!s.delete(&gone.id).await.unwrap());
        assert_eq!(s.count().await.unwrap(), 1);
        assert!(s.get(&keep.id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_update_and_delete_never_half_apply() {
        let s = Arc::new(store());
        for _ in 0..50 {
            let r = s.create(fields(json!({"name": "x", "a": 0, "b": 0}))).await.unwrap();
            let (s1, s2) = (Arc::clone(&s), Arc::clone(&s));
            let (id1, id2) = (r.id.clone(), r.id.clone());
            let update = tokio::spawn(async move {
                s1.update(&id1, fields(json!({"a": 1, "b": 1}))).await
            });
            let delete = tokio::spawn(async move { s2.delete(&id2).await });
            let _ = update.await.unwrap();
            delete.await.unwrap().unwrap();

            assert_eq!(s.get(&r.id).await.unwrap_err(), StoreError::NotFound(r.id.clone()));
        }
        assert_eq!(s.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn push_appends_and_starts_lists() {
        let s = store();
        let r = s.create(fields(json!({"name": "farm"}))).await.unwrap();
        s.push(&r.id, "products", json!("p1")).await.unwrap();
        let r = s.push(&r.id, "products", json!("p2")).await.unwrap();
        assert_eq!(r.fields["products"], json!(["p1", "p2"]));
        assert_eq!(s.get(&r.id).await.unwrap(), r);
    }

    #[tokio::test]
    async fn push_onto_a_scalar_fails() {
        let s = store();
        let r = s.create(fields(json!({"name": "farm", "city": "Davis"}))).await.unwrap();
        let err = s.push(&r.id, "city", json!("x")).await.unwrap_err();
        assert_eq!(err, StoreError::Invalid("`city` is not a list".into()));
        assert_eq!(s.get(&r.id).await.unwrap(), r);
        assert!(matches!(s.push("nope", "tags", json!("x")).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pushes_all_land() {
        let s = Arc::new(store());
        let r = s.create(fields(json!({"name": "farm"}))).await.unwrap();
        let mut tasks = Vec::new();
        for i in 0..50 {
            let (s, id) = (Arc::clone(&s), r.id.clone());
            tasks.push(tokio::spawn(async move { s.push(&id, "tags", json!(i)).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(s.get(&r.id).await.unwrap().fields["tags"].as_array().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn find_filters() {
        let s = store();
        s.create(fields(json!({"name": "apple", "category": "fruit"}))).await.unwrap();
        s.create(fields(json!({"name": "milk", "category": "dairy"}))).await.unwrap();
        let fruit = s.find(&fields(json!({"category": "fruit"}))).await.unwrap();
        assert_eq!(fruit.len(), 1);
        assert_eq!(fruit[0].fields["name"], "apple");
    }
}
