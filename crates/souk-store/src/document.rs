//! Documents, paths and field-level write instructions.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Slash-separated collection path, e.g. `listings` or
/// `threads/thread_a_b/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address a document inside this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collection + document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        CollectionPath::new(collection).doc(id)
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A sub-collection nested under this document.
    pub fn sub_collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.collection, self.id, name))
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A stored document as returned by reads, queries and snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocumentPath,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// String array field; non-string entries are skipped, a missing or
    /// non-array field yields an empty list.
    pub fn string_list(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Array field whose entries may be `null`; entries keep their positions.
    pub fn nullable_string_list(&self, field: &str) -> Vec<Option<String>> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Deserialize into `T`. The document id is injected as `id` when the
    /// stored fields do not carry one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut fields = self.fields.clone();
        let has_id = matches!(fields.get("id"), Some(Value::String(s)) if !s.is_empty());
        if !has_id {
            fields.insert("id".to_string(), Value::String(self.id().to_string()));
        }
        serde_json::from_value(Value::Object(fields)).map_err(|e| StoreError::Malformed {
            id: self.path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Render a timestamp the way the store persists server timestamps.
///
/// Fixed microsecond precision keeps lexicographic and chronological order
/// identical.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// A single field-level write instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Replace the field with a literal value.
    Set(Value),
    /// Replace the field with the store's commit timestamp.
    ServerTimestamp,
    /// Append each value not already present in the array field.
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value from the array field.
    ArrayRemove(Vec<Value>),
    /// Remove the field.
    Delete,
}

/// How `set` treats fields not mentioned in the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document.
    Overwrite,
    /// Keep untouched fields, create the document if missing.
    Merge,
}

/// An ordered set of field writes applied together to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: BTreeMap<String, FieldValue>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), FieldValue::Set(value.into()));
        self
    }

    pub fn server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldValue::ServerTimestamp);
        self
    }

    pub fn array_union<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.fields.insert(field.into(), FieldValue::ArrayUnion(values));
        self
    }

    pub fn array_remove<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.fields.insert(field.into(), FieldValue::ArrayRemove(values));
        self
    }

    pub fn delete_field(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldValue::Delete);
        self
    }

    /// Build a patch setting every top-level field of a serializable struct.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self {
                fields: map
                    .into_iter()
                    .map(|(k, v)| (k, FieldValue::Set(v)))
                    .collect(),
            }),
            other => Err(StoreError::InvalidArgument(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    /// Combine two patches; `other` wins on conflicting fields.
    pub fn merge(mut self, other: Patch) -> Self {
        self.fields.extend(other.fields);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Apply the patch to `fields`, resolving server timestamps to `now`.
    pub fn apply(&self, fields: &mut Fields, now: &Value) {
        for (name, write) in &self.fields {
            match write {
                FieldValue::Set(v) => {
                    fields.insert(name.clone(), v.clone());
                }
                FieldValue::ServerTimestamp => {
                    fields.insert(name.clone(), now.clone());
                }
                FieldValue::ArrayUnion(values) => {
                    let mut current = take_array(fields, name);
                    for v in values {
                        if !current.contains(v) {
                            current.push(v.clone());
                        }
                    }
                    fields.insert(name.clone(), Value::Array(current));
                }
                FieldValue::ArrayRemove(values) => {
                    let mut current = take_array(fields, name);
                    current.retain(|v| !values.contains(v));
                    fields.insert(name.clone(), Value::Array(current));
                }
                FieldValue::Delete => {
                    fields.remove(name);
                }
            }
        }
    }
}

fn take_array(fields: &mut Fields, name: &str) -> Vec<Value> {
    match fields.remove(name) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}
