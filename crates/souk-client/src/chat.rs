use std::sync::Arc;

use serde_json::Value;
use souk_assets::UploadFile;
use souk_shared::constants::{CHAT_FOLDER, CREATED_AT, DEFAULT_MESSAGE_WINDOW, THREADS};
use souk_shared::thread_id::validate_pair;
use souk_shared::{resolve, ThreadId};
use souk_store::{
    CollectionPath, ConversationMessage, ConversationThread, Direction, DocumentStore, Patch,
    Query, RealtimeSyncFlow, StoreError,
};
use tracing::{debug, info};

use crate::consistency::{messages_collection, thread_path, ConsistencyBatchWriter, OutgoingMessage};
use crate::error::{RepoError, Result};
use crate::lifecycle::AssetLifecycleManager;

pub struct ChatRepository {
    store: Arc<dyn DocumentStore>,
    writer: ConsistencyBatchWriter,
    lifecycle: Arc<AssetLifecycleManager>,
    message_window: usize,
}

impl ChatRepository {
    pub fn new(store: Arc<dyn DocumentStore>, lifecycle: Arc<AssetLifecycleManager>) -> Self {
        Self {
            writer: ConsistencyBatchWriter::new(Arc::clone(&store)),
            store,
            lifecycle,
            message_window: DEFAULT_MESSAGE_WINDOW,
        }
    }

    /// Number of messages kept by [`observe_recent_messages`](Self::observe_recent_messages).
    pub fn with_message_window(mut self, window: usize) -> Self {
        self.message_window = window.max(1);
        self
    }

    pub fn message_window(&self) -> usize {
        self.message_window
    }

    /// Return the id of the thread between `party_a` and `party_b` (scoped
    /// to `scope`, e.g. a listing), creating it if needed.
    ///
    /// The id is computed, not looked up, so concurrent callers converge on
    /// the same document; the creation is create-only and losing the race
    /// counts as success.
    pub async fn get_or_create_thread(
        &self,
        party_a: &str,
        party_b: &str,
        scope: Option<&str>,
    ) -> Result<ThreadId> {
        validate_pair(party_a, party_b)?;
        let id = resolve(party_a, party_b, scope);
        let path = thread_path(&id);

        if self.store.get(&path).await?.is_some() {
            return Ok(id);
        }

        let mut participants = vec![party_a.to_string(), party_b.to_string()];
        participants.sort();
        let scope = scope.map(str::trim).filter(|s| !s.is_empty());

        let patch = Patch::new()
            .set("participants", participants)
            .set("scopeId", scope.map_or(Value::Null, |s| Value::String(s.to_string())))
            .set("lastText", Value::Null)
            .server_timestamp("lastAt");

        match self.store.create(&path, patch).await {
            Ok(()) => {
                info!(thread = %id, "thread created");
                Ok(id)
            }
            Err(StoreError::AlreadyExists(_)) => {
                debug!(thread = %id, "thread created concurrently");
                Ok(id)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_thread(&self, thread_id: &ThreadId) -> Result<Option<ConversationThread>> {
        match self.store.get(&thread_path(thread_id)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub async fn send_text(&self, thread_id: &ThreadId, sender_id: &str, text: &str) -> Result<String> {
        self.writer
            .write_message_and_update_thread(thread_id, &OutgoingMessage::text(sender_id, text))
            .await
    }

    /// Upload the image, then write the message and thread preview together.
    pub async fn send_image(
        &self,
        thread_id: &ThreadId,
        sender_id: &str,
        file: UploadFile,
        caption: Option<&str>,
    ) -> Result<String> {
        let mut refs = self.lifecycle.upload_all(vec![file], CHAT_FOLDER).await?;
        let Some(asset) = refs.pop() else {
            return Err(RepoError::InvalidArgument("nothing uploaded".to_string()));
        };

        let mut message = OutgoingMessage::image(sender_id, asset.url);
        if let Some(caption) = caption.filter(|c| !c.trim().is_empty()) {
            message = message.with_text(caption);
        }
        self.writer
            .write_message_and_update_thread(thread_id, &message)
            .await
    }

    /// Record that `user_id` has read the message.
    pub async fn mark_read(&self, thread_id: &ThreadId, message_id: &str, user_id: &str) -> Result<()> {
        let path = messages_collection(thread_id).doc(message_id);
        self.store
            .update(&path, Patch::new().array_union("readBy", [user_id]))
            .await?;
        Ok(())
    }

    /// The last `limit` messages of the thread, oldest first.
    pub fn observe_messages(&self, thread_id: &ThreadId, limit: usize) -> RealtimeSyncFlow<ConversationMessage> {
        let query = Query::new(messages_collection(thread_id))
            .order_by(CREATED_AT, Direction::Ascending)
            .limit_to_last(limit.max(1));
        RealtimeSyncFlow::new(Arc::clone(&self.store), query)
    }

    /// The configured window of most recent messages, oldest first.
    pub fn observe_recent_messages(&self, thread_id: &ThreadId) -> RealtimeSyncFlow<ConversationMessage> {
        self.observe_messages(thread_id, self.message_window)
    }

    /// Threads `user_id` takes part in, most recently active first.
    pub fn observe_threads(&self, user_id: &str) -> RealtimeSyncFlow<ConversationThread> {
        let query = Query::new(CollectionPath::new(THREADS))
            .array_contains("participants", user_id)
            .order_by("lastAt", Direction::Descending);
        RealtimeSyncFlow::new(Arc::clone(&self.store), query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{creds, file, FakeAssets};
    use futures::StreamExt;
    use souk_shared::constants::IMAGE_PREVIEW_TEXT;
    use souk_store::{MemoryStore, MessageKind};

    fn repo() -> (MemoryStore, Arc<FakeAssets>, ChatRepository) {
        let store = MemoryStore::new();
        let assets = Arc::new(FakeAssets::new());
        let lifecycle = Arc::new(AssetLifecycleManager::new(
            Arc::new(store.clone()),
            assets.clone(),
            Some(creds()),
            2,
        ));
        let repo = ChatRepository::new(Arc::new(store.clone()), lifecycle);
        (store, assets, repo)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (store, _, repo) = repo();
        let first = repo.get_or_create_thread("bob", "alice", Some("L1")).await.unwrap();
        let second = repo.get_or_create_thread("alice", "bob", Some("L1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "thread_scoped_L1_alice_bob");
        assert_eq!(store.count(&CollectionPath::new(THREADS)).await, 1);

        let thread = repo.get_thread(&first).await.unwrap().unwrap();
        assert_eq!(thread.participants, vec!["alice", "bob"]);
        assert_eq!(thread.scope_id.as_deref(), Some("L1"));
        assert!(thread.last_text.is_none());
    }

    #[tokio::test]
    async fn concurrent_get_or_create_converges() {
        let (store, _, repo) = repo();
        let repo = Arc::new(repo);
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    let (a, b) = if i % 2 == 0 { ("u1", "u2") } else { ("u2", "u1") };
                    repo.get_or_create_thread(a, b, None).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(store.count(&CollectionPath::new(THREADS)).await, 1);
    }

    #[tokio::test]
    async fn invalid_parties_rejected() {
        let (_, _, repo) = repo();
        for (a, b) in [("", "bob"), ("a_b", "c"), ("same", "same"), ("x/y", "z")] {
            let err = repo.get_or_create_thread(a, b, None).await.unwrap_err();
            assert!(matches!(err, RepoError::InvalidArgument(_)), "{a} / {b}");
        }
    }

    #[tokio::test]
    async fn different_scopes_make_different_threads() {
        let (store, _, repo) = repo();
        let plain = repo.get_or_create_thread("a", "b", None).await.unwrap();
        let scoped = repo.get_or_create_thread("a", "b", Some("L9")).await.unwrap();
        let blank = repo.get_or_create_thread("a", "b", Some("  ")).await.unwrap();
        assert_ne!(plain, scoped);
        assert_eq!(plain, blank);
        assert_eq!(store.count(&CollectionPath::new(THREADS)).await, 2);
    }

    #[tokio::test]
    async fn send_image_uploads_then_writes() {
        let (store, assets, repo) = repo();
        let thread = repo.get_or_create_thread("a", "b", None).await.unwrap();
        repo.send_image(&thread, "a", file("pic.jpg"), None).await.unwrap();

        assert_eq!(assets.upload_count(), 1);
        let uploaded = assets.uploaded.lock().unwrap()[0].clone();
        assert!(uploaded.url.contains(CHAT_FOLDER));

        let t = repo.get_thread(&thread).await.unwrap().unwrap();
        assert_eq!(t.last_text.as_deref(), Some(IMAGE_PREVIEW_TEXT));
        assert_eq!(store.count(&messages_collection(&thread)).await, 1);
    }

    #[tokio::test]
    async fn failed_image_upload_sends_nothing() {
        let (store, assets, repo) = repo();
        let thread = repo.get_or_create_thread("a", "b", None).await.unwrap();
        assets.fail_upload_of("pic.jpg");
        let err = repo.send_image(&thread, "a", file("pic.jpg"), Some("hi")).await.unwrap_err();
        assert!(matches!(err, RepoError::UploadFailed { .. }));
        assert_eq!(store.count(&messages_collection(&thread)).await, 0);
    }

    #[tokio::test]
    async fn message_flow_keeps_last_window_in_order() {
        let (_, _, repo) = repo();
        let thread = repo.get_or_create_thread("a", "b", None).await.unwrap();
        for text in ["one", "two", "three"] {
            repo.send_text(&thread, "a", text).await.unwrap();
        }

        let flow = repo.observe_messages(&thread, 2);
        let mut sub = flow.subscribe().await.unwrap();
        let list = sub.next().await.unwrap().unwrap();
        let texts: Vec<_> = list.iter().filter_map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, vec!["two", "three"]);

        let id = repo.send_text(&thread, "b", "four").await.unwrap();
        let list = sub.next().await.unwrap().unwrap();
        assert_eq!(list.last().map(|m| m.id.as_str()), Some(id.as_str()));
        assert_eq!(list.last().map(|m| m.kind), Some(MessageKind::Text));

        repo.mark_read(&thread, &id, "a").await.unwrap();
        let list = sub.next().await.unwrap().unwrap();
        assert_eq!(list.last().unwrap().read_by, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn recent_messages_follow_configured_window() {
        let (store, _, repo) = repo();
        let repo = repo.with_message_window(2);
        let thread = repo.get_or_create_thread("a", "b", None).await.unwrap();
        for text in ["one", "two", "three"] {
            repo.send_text(&thread, "a", text).await.unwrap();
        }
        assert_eq!(store.count(&messages_collection(&thread)).await, 3);

        let mut sub = repo.observe_recent_messages(&thread).subscribe().await.unwrap();
        let list = sub.next().await.unwrap().unwrap();
        let texts: Vec<_> = list.iter().filter_map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn thread_flow_orders_by_activity() {
        let (_, _, repo) = repo();
        let older = repo.get_or_create_thread("me", "x", None).await.unwrap();
        let newer = repo.get_or_create_thread("me", "y", None).await.unwrap();
        repo.get_or_create_thread("other", "y", None).await.unwrap();

        let mut sub = repo.observe_threads("me").subscribe().await.unwrap();
        let ids: Vec<String> = sub.next().await.unwrap().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![newer.to_string(), older.to_string()]);

        repo.send_text(&older, "me", "ping").await.unwrap();
        let ids: Vec<String> = sub.next().await.unwrap().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![older.to_string(), newer.to_string()]);
    }
}
