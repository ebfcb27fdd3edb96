//! Opaque pagination cursors.
//!
//! A [`PageCursor`] remembers the position of the last document of a page
//! (its ordering value plus its id as tie-breaker) together with the query
//! shape it belongs to. Callers can only obtain one from a page or by decoding
//! a token previously produced by [`PageCursor::encode`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{CollectionPath, Document};
use crate::error::{Result, StoreError};
use crate::query::{Direction, OrderBy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    collection: String,
    field: String,
    direction: Direction,
    value: Value,
    doc_id: String,
}

impl PageCursor {
    /// Cursor positioned on `doc` within a query ordered by `order`.
    pub(crate) fn at(collection: &CollectionPath, order: &OrderBy, doc: &Document) -> Self {
        Self {
            collection: collection.as_str().to_string(),
            field: order.field.clone(),
            direction: order.direction,
            value: doc.get(&order.field).cloned().unwrap_or(Value::Null),
            doc_id: doc.id().to_string(),
        }
    }

    /// Ordering value and document id of the position.
    pub(crate) fn position(&self) -> (&Value, &str) {
        (&self.value, &self.doc_id)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Reject use with any query other than the one the cursor came from.
    pub(crate) fn check(&self, collection: &CollectionPath, order: &OrderBy) -> Result<()> {
        if self.collection == collection.as_str()
            && self.field == order.field
            && self.direction == order.direction
        {
            return Ok(());
        }
        Err(StoreError::CursorMismatch {
            expected: describe(collection.as_str(), &order.field, order.direction),
            found: describe(&self.collection, &self.field, self.direction),
        })
    }

    /// Encode as a URL-safe token that can cross a UI / IPC boundary.
    pub fn encode(&self) -> String {
        // Serializing plain JSON values cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Decode a token produced by [`PageCursor::encode`].
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| StoreError::InvalidCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StoreError::InvalidCursor)
    }
}

fn describe(collection: &str, field: &str, direction: Direction) -> String {
    format!("{collection} ordered by {field} {direction}")
}
