//! Domain entities persisted in the document store.
//!
//! Field names are camelCase on the wire. Every optional or collection field
//! defaults when absent so documents written by older clients still decode.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::Result;

/// Entity types that can be decoded from a stored document.
pub trait FromDocument: Sized + Send + Sync + 'static {
    fn from_document(doc: &Document) -> Result<Self>;
}

impl<T> FromDocument for T
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    fn from_document(doc: &Document) -> Result<Self> {
        doc.decode()
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// An item offered for sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub asset_urls: Vec<String>,
    /// Parallel to `asset_urls`; entries may be null and the list may be
    /// shorter (or missing) for legacy listings.
    #[serde(default)]
    pub asset_ids: Vec<Option<String>>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub sold: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A two-party conversation, optionally scoped to a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationThread {
    pub id: String,
    /// Sorted party ids.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub last_text: Option<String>,
    #[serde(default)]
    pub last_at: Option<DateTime<Utc>>,
    /// Per-user unread counters written by older clients. Read only.
    #[serde(default)]
    pub unread_counts: HashMap<String, i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Mixed,
}

impl MessageKind {
    /// Kind implied by the message content.
    pub fn infer(has_text: bool, has_asset: bool) -> Self {
        match (has_text, has_asset) {
            (true, true) => MessageKind::Mixed,
            (false, true) => MessageKind::Image,
            _ => MessageKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Mixed => "mixed",
        }
    }
}

/// A message inside `threads/{id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub sender_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_by: Vec<String>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub avatar_id: Option<String>,
    /// Favorited listing ids; only ever changed with array union / remove.
    #[serde(default)]
    pub favorites: Vec<String>,
    #[serde(default)]
    pub push_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentPath, Fields};
    use crate::error::StoreError;
    use serde_json::json;

    fn doc(collection: &str, id: &str, value: serde_json::Value) -> Document {
        let fields: Fields = match value {
            serde_json::Value::Object(map) => map,
            _ => Fields::new(),
        };
        Document::new(DocumentPath::new(collection, id), fields)
    }

    #[test]
    fn legacy_listing_without_ids_decodes() {
        let d = doc(
            "listings",
            "L1",
            json!({
                "ownerId": "u1",
                "title": "Desk",
                "price": 40,
                "assetUrls": ["https://h/c/image/upload/v1/a.jpg"],
                "createdAt": "2026-03-01T10:00:00.000000Z"
            }),
        );
        let listing = ListingRecord::from_document(&d).unwrap();
        assert_eq!(listing.id, "L1");
        assert_eq!(listing.price, 40.0);
        assert!(listing.asset_ids.is_empty());
        assert!(listing.active);
        assert!(listing.created_at.is_some());
    }

    #[test]
    fn message_kind_wire_names() {
        let d = doc(
            "threads/t/messages",
            "m1",
            json!({"senderId": "u1", "assetUrl": "x", "type": "image", "readBy": ["u1"]}),
        );
        let msg = ConversationMessage::from_document(&d).unwrap();
        assert_eq!(msg.kind, MessageKind::Image);
        assert_eq!(MessageKind::infer(true, true).as_str(), "mixed");
        assert_eq!(MessageKind::infer(false, false), MessageKind::Text);
    }

    #[test]
    fn thread_tolerates_unread_counts() {
        let d = doc(
            "threads",
            "thread_a_b",
            json!({"participants": ["a", "b"], "unreadCounts": {"a": 2}}),
        );
        let thread = ConversationThread::from_document(&d).unwrap();
        assert_eq!(thread.unread_counts.get("a"), Some(&2));
        assert!(thread.last_text.is_none());
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let d = doc("listings", "L9", json!({"ownerId": 7}));
        assert!(matches!(
            ListingRecord::from_document(&d),
            Err(StoreError::Malformed { .. })
        ));
    }
}
