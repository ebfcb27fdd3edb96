//! Atomic multi-document writes.

use std::sync::Arc;

use serde_json::Value;
use souk_shared::constants::{CREATED_AT, IMAGE_PREVIEW_TEXT, MESSAGES, THREADS};
use souk_shared::ThreadId;
use souk_store::{CollectionPath, DocumentPath, DocumentStore, MessageKind, Patch, WriteBatch};
use tracing::debug;

use crate::error::{RepoError, Result};

/// A message about to be sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub text: Option<String>,
    pub asset_url: Option<String>,
    pub read_by: Vec<String>,
}

impl OutgoingMessage {
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        let sender_id = sender_id.into();
        Self {
            read_by: vec![sender_id.clone()],
            sender_id,
            text: Some(text.into()),
            asset_url: None,
        }
    }

    pub fn image(sender_id: impl Into<String>, asset_url: impl Into<String>) -> Self {
        let sender_id = sender_id.into();
        Self {
            read_by: vec![sender_id.clone()],
            sender_id,
            text: None,
            asset_url: Some(asset_url.into()),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    fn text_value(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn asset_value(&self) -> Option<&str> {
        self.asset_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::infer(self.text_value().is_some(), self.asset_value().is_some())
    }

    /// Text shown as the thread preview.
    pub fn preview(&self) -> Option<&str> {
        self.text_value()
            .or_else(|| self.asset_value().map(|_| IMAGE_PREVIEW_TEXT))
    }
}

pub fn thread_path(thread_id: &ThreadId) -> DocumentPath {
    DocumentPath::new(THREADS, thread_id.as_str())
}

pub fn messages_collection(thread_id: &ThreadId) -> CollectionPath {
    thread_path(thread_id).sub_collection(MESSAGES)
}

/// Writes that must land together or not at all.
pub struct ConsistencyBatchWriter {
    store: Arc<dyn DocumentStore>,
}

impl ConsistencyBatchWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create the message under the thread and refresh the thread preview
    /// in one atomic batch. The thread must exist: a missing thread rejects
    /// the batch and no message is stored. Returns the new message id.
    pub async fn write_message_and_update_thread(
        &self,
        thread_id: &ThreadId,
        message: &OutgoingMessage,
    ) -> Result<String> {
        if message.sender_id.trim().is_empty() {
            return Err(RepoError::InvalidArgument("message has no sender".to_string()));
        }
        if message.preview().is_none() {
            return Err(RepoError::InvalidArgument(
                "message has neither text nor asset".to_string(),
            ));
        }

        let message_id = self.store.new_id();
        let message_path = messages_collection(thread_id).doc(message_id.clone());

        let message_patch = Patch::new()
            .set("senderId", message.sender_id.as_str())
            .set("text", opt_value(message.text_value()))
            .set("assetUrl", opt_value(message.asset_value()))
            .set("type", message.kind().as_str())
            .set("readBy", message.read_by.clone())
            .server_timestamp(CREATED_AT);

        let thread_patch = Patch::new()
            .set("lastText", opt_value(message.preview()))
            .server_timestamp("lastAt");

        let mut batch = WriteBatch::new();
        batch
            .create(message_path, message_patch)
            .update(thread_path(thread_id), thread_patch);
        self.store.commit(batch).await?;

        debug!(thread = %thread_id, message = %message_id, kind = message.kind().as_str(), "message written");
        Ok(message_id)
    }
}

fn opt_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use souk_store::{MemoryStore, Query, SetMode, StoreError};

    fn thread() -> ThreadId {
        souk_shared::resolve("alice", "bob", None)
    }

    async fn store_with_thread() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(
                &thread_path(&thread()),
                Patch::new().set("participants", vec!["alice", "bob"]),
                SetMode::Overwrite,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn message_and_preview_land_together() {
        let store = store_with_thread().await;
        let writer = ConsistencyBatchWriter::new(Arc::new(store.clone()));

        let id = writer
            .write_message_and_update_thread(&thread(), &OutgoingMessage::text("alice", "hi"))
            .await
            .unwrap();

        let msg = store
            .get_required(&messages_collection(&thread()).doc(id))
            .await
            .unwrap();
        let thread_doc = store.get_required(&thread_path(&thread())).await.unwrap();
        assert_eq!(msg.get_str("type"), Some("text"));
        assert_eq!(thread_doc.get_str("lastText"), Some("hi"));
        // Both writes share the commit timestamp.
        assert_eq!(msg.get(CREATED_AT), thread_doc.get("lastAt"));
    }

    #[tokio::test]
    async fn image_only_message_uses_placeholder() {
        let store = store_with_thread().await;
        let writer = ConsistencyBatchWriter::new(Arc::new(store.clone()));
        writer
            .write_message_and_update_thread(&thread(), &OutgoingMessage::image("bob", "https://x/y.jpg"))
            .await
            .unwrap();

        let thread_doc = store.get_required(&thread_path(&thread())).await.unwrap();
        assert_eq!(thread_doc.get_str("lastText"), Some(IMAGE_PREVIEW_TEXT));
        let msgs = store.query(&Query::new(messages_collection(&thread()))).await.unwrap();
        assert_eq!(msgs[0].get_str("type"), Some("image"));
        assert_eq!(msgs[0].get("text"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn missing_thread_persists_no_message() {
        let store = MemoryStore::new();
        let writer = ConsistencyBatchWriter::new(Arc::new(store.clone()));
        let err = writer
            .write_message_and_update_thread(&thread(), &OutgoingMessage::text("alice", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Store(StoreError::NotFound(_))));
        assert_eq!(store.count(&messages_collection(&thread())).await, 0);
    }

    #[tokio::test]
    async fn failed_thread_update_persists_no_message() {
        let store = store_with_thread().await;
        store.fail_writes_to(
            thread_path(&thread()).to_string(),
            StoreError::Transport("connection reset".into()),
        );
        let writer = ConsistencyBatchWriter::new(Arc::new(store.clone()));
        let err = writer
            .write_message_and_update_thread(&thread(), &OutgoingMessage::text("alice", "hi"))
            .await
            .unwrap_err();
        assert!(err.kind().is_retryable());
        assert_eq!(store.count(&messages_collection(&thread())).await, 0);
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let store = store_with_thread().await;
        let writer = ConsistencyBatchWriter::new(Arc::new(store.clone()));
        let empty = OutgoingMessage::text("alice", "   ");
        assert!(matches!(
            writer.write_message_and_update_thread(&thread(), &empty).await,
            Err(RepoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn mixed_message_kind() {
        let m = OutgoingMessage::image("a", "https://x/y.jpg").with_text("look");
        assert_eq!(m.kind(), MessageKind::Mixed);
        assert_eq!(m.preview(), Some("look"));
    }
}
