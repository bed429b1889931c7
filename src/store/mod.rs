//! Resource store: records, schemas and the CRUD contract.
//!
//! The [`Store`] trait is what handlers talk to. [`MemoryStore`] is the
//! in-process implementation, and [`Database`] owns the process-wide set of
//! named collections and their open/closed lifecycle.

mod database;
mod memory;

pub use database::Database;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// A record's named fields.
pub type Fields = Map<String, Value>;

/// Reserved key holding a record's identifier.
pub const ID_KEY: &str = "id";

/// A stored domain entity.
///
/// Serialises flat: `{"id": "…", "name": "…", "price": 3}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The record as one flat JSON object, `id` included.
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert(ID_KEY.to_owned(), Value::String(self.id));
        Value::Object(fields)
    }

    /// True when every filter entry equals the record's field. Query strings
    /// only carry text, so a string filter also matches a number or boolean
    /// field with the same textual form.
    pub fn matches(&self, filter: &Fields) -> bool {
        filter.iter().all(|(key, wanted)| {
            if key == ID_KEY {
                return wanted.as_str() == Some(self.id.as_str());
            }
            match (self.fields.get(key), wanted) {
                (Some(have), wanted) if have == wanted => true,
                (Some(have @ (Value::Number(_) | Value::Bool(_))), Value::String(text)) => {
                    have.to_string() == *text
                }
                _ => false,
            }
        })
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum StoreError {
    #[error("record `{0}` not found")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("database is closed")]
    Closed,
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// The type a field must hold.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Any,
    /// The id of one record in the named collection.
    Ref(&'static str),
    /// Ids of records in the named collection.
    RefList(&'static str),
}

impl FieldKind {
    fn admits(self, value: &Value) -> bool {
        match self {
            Self::String | Self::Ref(_) => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool   => value.is_boolean(),
            Self::Any    => true,
            Self::RefList(_) => value.as_array().is_some_and(|ids| ids.iter().all(Value::is_string)),
        }
    }

    /// The collection this kind points into, for reference kinds.
    pub fn target(self) -> Option<&'static str> {
        match self {
            Self::Ref(target) | Self::RefList(target) => Some(target),
            _ => None,
        }
    }

    /// Form posts deliver every value as text; turn it into the declared kind
    /// when it parses cleanly.
    fn cast(self, value: Value) -> Value {
        match (self, value) {
            (Self::Number, Value::String(s)) => {
                let parsed = s.trim().parse::<i64>().ok().map(Number::from)
                    .or_else(|| s.trim().parse::<f64>().ok().and_then(Number::from_f64));
                parsed.map(Value::Number).unwrap_or(Value::String(s))
            }
            (Self::Bool, Value::String(s)) => match s.as_str() {
                "true" | "on" => Value::Bool(true),
                "false" | "off" => Value::Bool(false),
                _ => Value::String(s),
            },
            (Self::RefList(_), Value::String(s)) => Value::Array(vec![Value::String(s)]),
            (_, v) => v,
        }
    }
}

#[derive(Clone, Debug)]
struct FieldSpec {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// Field rules checked before any mutation.
///
/// Fields not mentioned in the schema are stored as given.
///
/// ```rust
/// use rota::store::{FieldKind, Schema};
///
/// let products = Schema::new()
///     .required("name", FieldKind::String)
///     .optional("price", FieldKind::Number)
///     .optional("category", FieldKind::String);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name: name.to_owned(), kind, required: true });
        self
    }

    pub fn optional(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec { name: name.to_owned(), kind, required: false });
        self
    }

    /// Casts and checks a full field set for a new record.
    pub fn check_create(&self, fields: Fields) -> Result<Fields, StoreError> {
        let fields = self.check(fields)?;
        for spec in self.fields.iter().filter(|s| s.required) {
            if fields.get(&spec.name).is_none_or(Value::is_null) {
                return Err(StoreError::Invalid(format!("`{}` is required", spec.name)));
            }
        }
        Ok(fields)
    }

    /// Casts and checks a partial field set for an update.
    pub fn check_update(&self, fields: Fields) -> Result<Fields, StoreError> {
        let fields = self.check(fields)?;
        for spec in self.fields.iter().filter(|s| s.required) {
            if fields.get(&spec.name).is_some_and(Value::is_null) {
                return Err(StoreError::Invalid(format!("`{}` is required", spec.name)));
            }
        }
        Ok(fields)
    }

    fn check(&self, fields: Fields) -> Result<Fields, StoreError> {
        if fields.contains_key(ID_KEY) {
            return Err(StoreError::Invalid(format!("`{ID_KEY}` cannot be set")));
        }
        let mut out = Map::with_capacity(fields.len());
        for (name, value) in fields {
            let value = match self.spec(&name) {
                Some(spec) => {
                    let value = spec.kind.cast(value);
                    if !value.is_null() && !spec.kind.admits(&value) {
                        return Err(StoreError::Invalid(format!(
                            "`{name}` must be {}", kind_name(spec.kind)
                        )));
                    }
                    value
                }
                None => value,
            };
            out.insert(name, value);
        }
        Ok(out)
    }

    /// The kind of `field` when it references another collection.
    pub fn reference(&self, field: &str) -> Option<FieldKind> {
        self.spec(field).map(|s| s.kind).filter(|kind| kind.target().is_some())
    }

    /// Checks one element about to be appended to the list `field`.
    pub fn check_element(&self, field: &str, value: &Value) -> Result<(), StoreError> {
        if field == ID_KEY {
            return Err(StoreError::Invalid(format!("`{ID_KEY}` cannot be set")));
        }
        match self.spec(field).map(|s| s.kind) {
            None | Some(FieldKind::Any) => Ok(()),
            Some(FieldKind::RefList(_)) if value.is_string() => Ok(()),
            Some(FieldKind::RefList(_)) => {
                Err(StoreError::Invalid(format!("`{field}` only holds record ids")))
            }
            Some(_) => Err(StoreError::Invalid(format!("`{field}` is not a list"))),
        }
    }

    fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|s| s.name == name)
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String     => "a string",
        FieldKind::Number     => "a number",
        FieldKind::Bool       => "a boolean",
        FieldKind::Any        => "any value",
        FieldKind::Ref(_)     => "a record id",
        FieldKind::RefList(_) => "a list of record ids",
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// CRUD over a collection of [`Record`]s.
///
/// Every method may suspend. Mutations are atomic per store: a concurrent
/// `update` and `delete` of the same record never leave it half-applied.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// All records in creation order.
    async fn list(&self) -> Result<Vec<Record>, StoreError>;

    /// The record with this id.
    async fn get(&self, id: &str) -> Result<Record, StoreError>;

    /// Stores a new record under a freshly generated id.
    async fn create(&self, fields: Fields) -> Result<Record, StoreError>;

    /// Merges `fields` into the record; unspecified fields keep their values.
    async fn update(&self, id: &str, fields: Fields) -> Result<Record, StoreError>;

    /// Removes the record. Returns whether anything was removed; a missing id
    /// is not an error.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Appends `value` to the list held in `field`, starting the list if the
    /// field is unset. The read-append-write is atomic.
    async fn push(&self, id: &str, field: &str, value: Value) -> Result<Record, StoreError>;

    /// Records matching every filter entry, in creation order.
    async fn find(&self, filter: &Fields) -> Result<Vec<Record>, StoreError> {
        let all = self.list().await?;
        Ok(all.into_iter().filter(|r| r.matches(filter)).collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.list().await?.len())
    }
}
