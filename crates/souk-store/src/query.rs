//! Collection queries and their in-process evaluation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use souk_shared::constants::MAX_IN_VALUES;

use crate::cursor::PageCursor;
use crate::document::{CollectionPath, Document};
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    pub fn descending(descending: bool) -> Self {
        if descending {
            Direction::Descending
        } else {
            Direction::Ascending
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Ascending => f.write_str("asc"),
            Direction::Descending => f.write_str("desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq(String, Value),
    /// Array `field` contains `value`.
    ArrayContains(String, Value),
    /// `field` equals one of the values.
    In(String, Vec<Value>),
    /// Document id is one of the ids.
    IdIn(Vec<String>),
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::ArrayContains(field, value) => {
                matches!(doc.get(field), Some(Value::Array(items)) if items.contains(value))
            }
            Filter::In(field, values) => doc.get(field).is_some_and(|v| values.contains(v)),
            Filter::IdIn(ids) => ids.iter().any(|id| id == doc.id()),
        }
    }
}

/// A query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    collection: CollectionPath,
    filters: Vec<Filter>,
    order: Option<OrderBy>,
    limit: Option<usize>,
    limit_to_last: bool,
    start_after: Option<PageCursor>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order: None,
            limit: None,
            limit_to_last: false,
            start_after: None,
        }
    }

    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn order(&self) -> Option<&OrderBy> {
        self.order.as_ref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn array_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .push(Filter::ArrayContains(field.into(), value.into()));
        self
    }

    pub fn where_in<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filters.push(Filter::In(field.into(), values));
        self
    }

    pub fn id_in(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.filters.push(Filter::IdIn(ids.into_iter().collect()));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(OrderBy::new(field, direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self.limit_to_last = false;
        self
    }

    /// Keep the last `n` results of the ordering (returned in query order).
    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self.limit_to_last = true;
        self
    }

    pub fn start_after(mut self, cursor: PageCursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    /// Check the query is well formed before it is sent anywhere.
    pub fn validate(&self) -> Result<()> {
        for filter in &self.filters {
            let len = match filter {
                Filter::In(_, values) => values.len(),
                Filter::IdIn(ids) => ids.len(),
                _ => continue,
            };
            if len == 0 || len > MAX_IN_VALUES {
                return Err(StoreError::InvalidArgument(format!(
                    "'in' filters take 1..={MAX_IN_VALUES} values, got {len}"
                )));
            }
        }

        if self.limit_to_last && self.order.is_none() {
            return Err(StoreError::InvalidArgument(
                "limit_to_last requires an order_by clause".into(),
            ));
        }

        if let Some(cursor) = &self.start_after {
            let order = self.order.as_ref().ok_or_else(|| {
                StoreError::InvalidArgument("start_after requires an order_by clause".into())
            })?;
            cursor.check(&self.collection, order)?;
        }

        Ok(())
    }

    /// Evaluate the query against the documents of its collection.
    pub fn execute(&self, docs: impl IntoIterator<Item = Document>) -> Result<Vec<Document>> {
        self.validate()?;

        let mut matched: Vec<Document> = docs
            .into_iter()
            .filter(|d| self.filters.iter().all(|f| f.matches(d)))
            .collect();

        if let Some(order) = &self.order {
            // Documents without the ordering field never match an ordered query.
            matched.retain(|d| d.get(&order.field).is_some());
            matched.sort_by(|a, b| compare_docs(a, b, order));

            if let Some(cursor) = &self.start_after {
                let (value, id) = cursor.position();
                matched.retain(|d| {
                    compare_position(d.get(&order.field), d.id(), value, id, order.direction)
                        == Ordering::Greater
                });
            }
        }

        if let Some(n) = self.limit {
            if self.limit_to_last {
                let skip = matched.len().saturating_sub(n);
                matched.drain(..skip);
            } else {
                matched.truncate(n);
            }
        }

        Ok(matched)
    }
}

fn compare_docs(a: &Document, b: &Document, order: &OrderBy) -> Ordering {
    let b_value = b.get(&order.field).unwrap_or(&Value::Null);
    compare_position(a.get(&order.field), a.id(), b_value, b.id(), order.direction)
}

fn compare_position(
    value: Option<&Value>,
    id: &str,
    other_value: &Value,
    other_id: &str,
    direction: Direction,
) -> Ordering {
    let natural = compare_values(value.unwrap_or(&Value::Null), other_value)
        .then_with(|| id.cmp(other_id));
    match direction {
        Direction::Ascending => natural,
        Direction::Descending => natural.reverse(),
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}
