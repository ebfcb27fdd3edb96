//! The document store contract.
//!
//! Every component talks to the remote store through [`DocumentStore`] so
//! the hosted backend can be swapped for [`crate::MemoryStore`] in tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::batch::WriteBatch;
use crate::document::{Document, DocumentPath, Patch, SetMode};
use crate::error::{Result, StoreError};
use crate::query::Query;

/// Result set delivered by a change subscription: the full current list of
/// matching documents, or the error that closed the subscription.
pub type Snapshot = Result<Vec<Document>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reserve a fresh document id (no write happens).
    fn new_id(&self) -> String;

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Apply every write of `batch` atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Open a change subscription on `query`.
    ///
    /// The first snapshot is the current result set; another follows every
    /// change affecting the query. An `Err` snapshot is terminal.
    async fn listen(&self, query: Query) -> Result<Listener>;

    async fn get_required(&self, path: &DocumentPath) -> Result<Document> {
        self.get(path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn set(&self, path: &DocumentPath, patch: Patch, mode: SetMode) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.set(path.clone(), patch, mode);
        self.commit(batch).await
    }

    async fn create(&self, path: &DocumentPath, patch: Patch) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.create(path.clone(), patch);
        self.commit(batch).await
    }

    async fn update(&self, path: &DocumentPath, patch: Patch) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.update(path.clone(), patch);
        self.commit(batch).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(path.clone());
        self.commit(batch).await
    }
}

/// An open change subscription.
pub struct Listener {
    pub snapshots: mpsc::UnboundedReceiver<Snapshot>,
    pub registration: ListenerRegistration,
}

/// Handle that detaches a change subscription from the store.
///
/// Removal runs at most once, whether triggered by [`remove`](Self::remove)
/// or by dropping the handle.
pub struct ListenerRegistration {
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerRegistration {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// Detach the listener. Returns `true` only for the call that actually
    /// detached it.
    pub fn remove(&self) -> bool {
        let detach = self
            .detach
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match detach {
            Some(f) => {
                f();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.detach
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}
