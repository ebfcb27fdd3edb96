//! Shared, cancellable change streams.
//!
//! A [`RealtimeSyncFlow`] is a cold description of a live query. The first
//! [`subscribe`](RealtimeSyncFlow::subscribe) opens one store listener that
//! every later subscriber shares; each subscriber sees the current result
//! list first and then every newer list. Dropping or cancelling the last
//! [`Subscription`] detaches the listener exactly once. A listener error is
//! delivered to every subscriber as its final item, after which the next
//! `subscribe` opens a fresh listener.
//!
//! Slow subscribers observe the latest list only; intermediate lists that
//! were superseded before they were polled are skipped.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::client::{DocumentStore, Listener, ListenerRegistration, Snapshot};
use crate::error::{Result, StoreError};
use crate::memory::lock;
use crate::models::FromDocument;
use crate::query::Query;

/// Value published to subscribers.
enum Emission<T> {
    /// Listener attached, first snapshot not delivered yet.
    Pending,
    Items(Arc<Vec<T>>),
    Failed(StoreError),
}

impl<T> Clone for Emission<T> {
    fn clone(&self) -> Self {
        match self {
            Emission::Pending => Emission::Pending,
            Emission::Items(items) => Emission::Items(Arc::clone(items)),
            Emission::Failed(e) => Emission::Failed(e.clone()),
        }
    }
}

/// The live listener and its bookkeeping.
struct Shared<T> {
    tx: Arc<watch::Sender<Emission<T>>>,
    subscribers: usize,
    registration: ListenerRegistration,
    pump: JoinHandle<()>,
    generation: u64,
}

struct FlowState<T> {
    slot: Mutex<Option<Shared<T>>>,
    generations: AtomicU64,
}

impl<T> FlowState<T> {
    /// Take the live listener out of the slot if it still belongs to
    /// `generation`, detach it and stop its pump.
    fn shutdown(&self, generation: u64, abort_pump: bool) {
        let shared = {
            let mut slot = lock(&self.slot);
            match slot.as_ref() {
                Some(s) if s.generation == generation => slot.take(),
                _ => None,
            }
        };
        if let Some(shared) = shared {
            if shared.registration.remove() {
                debug!(generation, "realtime listener detached");
            }
            if abort_pump {
                shared.pump.abort();
            }
        }
    }
}

/// A live query mapped into domain entities.
pub struct RealtimeSyncFlow<T> {
    store: Arc<dyn DocumentStore>,
    query: Query,
    state: Arc<FlowState<T>>,
}

impl<T> Clone for RealtimeSyncFlow<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            query: self.query.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: FromDocument + Clone> RealtimeSyncFlow<T> {
    pub fn new(store: Arc<dyn DocumentStore>, query: Query) -> Self {
        Self {
            store,
            query,
            state: Arc::new(FlowState {
                slot: Mutex::new(None),
                generations: AtomicU64::new(1),
            }),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Number of live subscriptions sharing the current listener.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state.slot)
            .as_ref()
            .map_or(0, |shared| shared.subscribers)
    }

    /// Whether a store listener is currently attached.
    pub fn is_listening(&self) -> bool {
        lock(&self.state.slot).is_some()
    }

    /// Attach to the shared listener, opening it if this is the first
    /// subscriber.
    pub async fn subscribe(&self) -> Result<Subscription<T>> {
        if let Some(subscription) = self.join_existing() {
            return Ok(subscription);
        }

        let listener = self.store.listen(self.query.clone()).await?;

        let mut slot = lock(&self.state.slot);
        let stale = discard_failed(&mut slot);
        if let Some(shared) = slot.as_mut() {
            // A concurrent first subscriber attached while we were opening
            // ours; share theirs and let ours detach on drop.
            shared.subscribers += 1;
            let subscription = self.attach(shared);
            drop(slot);
            drop(stale);
            drop(listener);
            return Ok(subscription);
        }

        let generation = self.state.generations.fetch_add(1, Ordering::SeqCst);
        let Listener {
            snapshots,
            registration,
        } = listener;
        let (tx, rx) = watch::channel(Emission::Pending);
        let tx = Arc::new(tx);
        let pump = tokio::spawn(pump::<T>(
            snapshots,
            Arc::clone(&tx),
            Arc::downgrade(&self.state),
            generation,
            self.query.collection().to_string(),
        ));

        *slot = Some(Shared {
            tx,
            subscribers: 1,
            registration,
            pump,
            generation,
        });
        drop(slot);
        drop(stale);
        debug!(collection = %self.query.collection(), generation, "realtime listener opened");

        Ok(Subscription {
            stream: WatchStream::new(rx),
            state: Arc::clone(&self.state),
            generation,
            attached: true,
            finished: false,
        })
    }

    fn join_existing(&self) -> Option<Subscription<T>> {
        let mut slot = lock(&self.state.slot);
        let stale = discard_failed(&mut slot);
        let joined = slot.as_mut().map(|shared| {
            shared.subscribers += 1;
            self.attach(shared)
        });
        drop(slot);
        drop(stale);
        joined
    }

    fn attach(&self, shared: &Shared<T>) -> Subscription<T> {
        Subscription {
            stream: WatchStream::new(shared.tx.subscribe()),
            state: Arc::clone(&self.state),
            generation: shared.generation,
            attached: true,
            finished: false,
        }
    }
}

/// Remove a listener that already failed but whose pump has not cleared it
/// yet. The caller drops the returned value once the slot lock is released.
fn discard_failed<T>(slot: &mut Option<Shared<T>>) -> Option<Shared<T>> {
    let failed = slot
        .as_ref()
        .is_some_and(|shared| matches!(*shared.tx.borrow(), Emission::Failed(_)));
    if failed {
        slot.take()
    } else {
        None
    }
}

/// Forward store snapshots to subscribers until the listener fails.
async fn pump<T: FromDocument>(
    mut snapshots: mpsc::UnboundedReceiver<Snapshot>,
    tx: Arc<watch::Sender<Emission<T>>>,
    state: Weak<FlowState<T>>,
    generation: u64,
    collection: String,
) {
    let error = loop {
        match snapshots.recv().await {
            Some(Ok(docs)) => {
                let total = docs.len();
                let items: Vec<T> = docs
                    .iter()
                    .filter_map(|doc| match T::from_document(doc) {
                        Ok(item) => Some(item),
                        Err(e) => {
                            warn!(id = %doc.path, error = %e, "skipping malformed document");
                            None
                        }
                    })
                    .collect();
                debug!(%collection, total, mapped = items.len(), "snapshot delivered");
                tx.send_replace(Emission::Items(Arc::new(items)));
            }
            Some(Err(e)) => break e,
            None => break StoreError::Listener("listener closed by store".into()),
        }
    };

    warn!(%collection, error = %error, "realtime listener failed");
    tx.send_replace(Emission::Failed(error));
    if let Some(state) = state.upgrade() {
        state.shutdown(generation, false);
    }
}

/// One subscriber's view of a [`RealtimeSyncFlow`].
///
/// Yields `Ok(list)` for each snapshot; an `Err` is always the last item.
pub struct Subscription<T> {
    stream: WatchStream<Emission<T>>,
    state: Arc<FlowState<T>>,
    generation: u64,
    attached: bool,
    finished: bool,
}

impl<T> Subscription<T> {
    /// Stop receiving snapshots. Safe to call more than once.
    pub fn cancel(&mut self) {
        self.finished = true;
        self.release();
    }

    pub fn is_cancelled(&self) -> bool {
        self.finished
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.attached, false) {
            return;
        }
        let last = {
            let mut slot = lock(&self.state.slot);
            match slot.as_mut() {
                Some(shared) if shared.generation == self.generation => {
                    shared.subscribers = shared.subscribers.saturating_sub(1);
                    shared.subscribers == 0
                }
                _ => false,
            }
        };
        if last {
            self.state.shutdown(self.generation, true);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Stream for Subscription<T> {
    type Item = Result<Vec<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        loop {
            match this.stream.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Emission::Pending)) => continue,
                Poll::Ready(Some(Emission::Items(items))) => {
                    return Poll::Ready(Some(Ok(items.as_ref().clone())));
                }
                Poll::Ready(Some(Emission::Failed(e))) => {
                    this.finished = true;
                    this.release();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.finished = true;
                    this.release();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CollectionPath, Patch, SetMode};
    use crate::memory::MemoryStore;
    use crate::query::Direction;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Item {
        id: String,
        n: i64,
    }

    fn items() -> CollectionPath {
        CollectionPath::new("items")
    }

    async fn put(store: &MemoryStore, id: &str, n: serde_json::Value) {
        store
            .set(
                &items().doc(id),
                Patch::new().set("n", n).server_timestamp("createdAt"),
                SetMode::Overwrite,
            )
            .await
            .unwrap();
    }

    fn flow(store: &MemoryStore) -> RealtimeSyncFlow<Item> {
        RealtimeSyncFlow::new(
            Arc::new(store.clone()),
            Query::new(items()).order_by("createdAt", Direction::Ascending),
        )
    }

    async fn next(sub: &mut Subscription<Item>) -> Option<Result<Vec<Item>>> {
        timeout(Duration::from_secs(2), sub.next())
            .await
            .expect("subscription stalled")
    }

    fn ids(list: &[Item]) -> Vec<&str> {
        list.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn subscribers_share_one_listener() {
        let store = MemoryStore::new();
        put(&store, "a", 1.into()).await;
        let flow = flow(&store);

        let mut first = flow.subscribe().await.unwrap();
        assert_eq!(ids(&next(&mut first).await.unwrap().unwrap()), vec!["a"]);

        let mut second = flow.subscribe().await.unwrap();
        assert_eq!(ids(&next(&mut second).await.unwrap().unwrap()), vec!["a"]);
        assert_eq!(store.listener_count(), 1);
        assert_eq!(flow.subscriber_count(), 2);

        put(&store, "b", 2.into()).await;
        assert_eq!(ids(&next(&mut first).await.unwrap().unwrap()), vec!["a", "b"]);
        assert_eq!(ids(&next(&mut second).await.unwrap().unwrap()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn last_cancel_detaches_once() {
        let store = MemoryStore::new();
        let flow = flow(&store);

        let mut first = flow.subscribe().await.unwrap();
        let second = flow.subscribe().await.unwrap();
        assert_eq!(store.listener_count(), 1);

        first.cancel();
        first.cancel();
        assert!(first.is_cancelled());
        assert!(next(&mut first).await.is_none());
        assert_eq!(store.listener_count(), 1);
        assert_eq!(flow.subscriber_count(), 1);

        drop(second);
        assert_eq!(store.listener_count(), 0);
        assert!(!flow.is_listening());
    }

    #[tokio::test]
    async fn malformed_documents_are_skipped() {
        let store = MemoryStore::new();
        put(&store, "a", 1.into()).await;
        put(&store, "bad", "not a number".into()).await;
        put(&store, "c", 3.into()).await;

        let mut sub = flow(&store).subscribe().await.unwrap();
        let list = next(&mut sub).await.unwrap().unwrap();
        assert_eq!(ids(&list), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn error_is_final_and_flow_restarts() {
        let store = MemoryStore::new();
        put(&store, "a", 1.into()).await;
        let flow = flow(&store);

        let mut first = flow.subscribe().await.unwrap();
        let mut second = flow.subscribe().await.unwrap();
        next(&mut first).await.unwrap().unwrap();
        next(&mut second).await.unwrap().unwrap();

        store.break_listeners(StoreError::Listener("permission denied".into()));

        for sub in [&mut first, &mut second] {
            let err = next(sub).await.unwrap().unwrap_err();
            assert_eq!(err, StoreError::Listener("permission denied".into()));
            assert!(next(sub).await.is_none());
        }

        let mut again = flow.subscribe().await.unwrap();
        assert_eq!(ids(&next(&mut again).await.unwrap().unwrap()), vec!["a"]);
        assert_eq!(store.listener_count(), 1);

        drop(first);
        drop(second);
        // Stale subscriptions from the failed listener do not affect the new one.
        assert_eq!(store.listener_count(), 1);
        drop(again);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn invalid_query_fails_to_subscribe() {
        let store = MemoryStore::new();
        let flow: RealtimeSyncFlow<Item> =
            RealtimeSyncFlow::new(Arc::new(store.clone()), Query::new(items()).limit_to_last(3));
        assert!(matches!(
            flow.subscribe().await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(!flow.is_listening());
    }
}
