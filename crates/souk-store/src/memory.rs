//! In-process [`DocumentStore`] implementation.
//!
//! [`MemoryStore`] honours the same contract as the hosted store: atomic
//! batches, strictly increasing server timestamps, create-only
//! preconditions and live change subscriptions. It backs local development
//! and every test in the workspace, and can inject faults to exercise the
//! failure paths of the layers above it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::batch::{WriteBatch, WriteOp};
use crate::client::{DocumentStore, Listener, ListenerRegistration, Snapshot};
use crate::document::{timestamp_value, CollectionPath, Document, DocumentPath, Fields, SetMode};
use crate::error::{Result, StoreError};
use crate::query::Query;

type Collections = BTreeMap<CollectionPath, BTreeMap<String, Fields>>;

struct Watcher {
    query: Query,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Faults {
    /// Commits touching a path starting with the prefix fail with the error.
    writes: Vec<(String, StoreError)>,
    /// Reads and queries fail with this error while set.
    reads: Option<StoreError>,
}

struct Inner {
    collections: RwLock<Collections>,
    watchers: Mutex<HashMap<u64, Watcher>>,
    next_watcher: AtomicU64,
    last_timestamp: Mutex<DateTime<Utc>>,
    faults: Mutex<Faults>,
    commits: AtomicU64,
}

/// Shared handle to an in-memory document store. Clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(BTreeMap::new()),
                watchers: Mutex::new(HashMap::new()),
                next_watcher: AtomicU64::new(1),
                last_timestamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
                faults: Mutex::new(Faults::default()),
                commits: AtomicU64::new(0),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Fail every commit that writes under `path_prefix` with `error`.
    pub fn fail_writes_to(&self, path_prefix: impl Into<String>, error: StoreError) {
        lock(&self.inner.faults)
            .writes
            .push((path_prefix.into(), error));
    }

    /// Fail reads and queries with `error` until cleared.
    pub fn fail_reads(&self, error: StoreError) {
        lock(&self.inner.faults).reads = Some(error);
    }

    pub fn clear_faults(&self) {
        *lock(&self.inner.faults) = Faults::default();
    }

    /// Close every open subscription with `error`, as a dropped upstream
    /// connection would.
    pub fn break_listeners(&self, error: StoreError) {
        let watchers: Vec<Watcher> = lock(&self.inner.watchers).drain().map(|(_, w)| w).collect();
        warn!(count = watchers.len(), error = %error, "breaking change listeners");
        for watcher in watchers {
            let _ = watcher.tx.send(Err(error.clone()));
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of subscriptions currently attached.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.watchers).len()
    }

    /// Number of successfully applied commits.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Number of documents stored in `collection`.
    pub async fn count(&self, collection: &CollectionPath) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Commit time strictly greater than any previous one.
    fn next_timestamp(&self) -> Value {
        let mut last = lock(&self.inner.last_timestamp);
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::microseconds(1);
        }
        *last = now;
        timestamp_value(now)
    }

    fn check_write_faults(&self, batch: &WriteBatch) -> Result<()> {
        let faults = lock(&self.inner.faults);
        for op in batch.ops() {
            let path = op.path().to_string();
            if let Some((_, error)) = faults.writes.iter().find(|(p, _)| path.starts_with(p)) {
                return Err(error.clone());
            }
        }
        Ok(())
    }

    fn check_read_faults(&self) -> Result<()> {
        match &lock(&self.inner.faults).reads {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn register(&self, query: Query, tx: mpsc::UnboundedSender<Snapshot>) -> ListenerRegistration {
        let id = self.inner.next_watcher.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.watchers).insert(id, Watcher { query, tx });

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                if lock(&inner.watchers).remove(&id).is_some() {
                    debug!(listener = id, "change listener detached");
                }
            }
        })
    }

    fn notify(&self, collections: &Collections, touched: &BTreeSet<CollectionPath>) {
        let mut watchers = lock(&self.inner.watchers);
        watchers.retain(|id, watcher| {
            if !touched.contains(watcher.query.collection()) {
                return true;
            }
            let snapshot = run_query(collections, &watcher.query);
            let failed = snapshot.is_err();
            // A closed receiver means the subscriber went away without detaching.
            let delivered = watcher.tx.send(snapshot).is_ok();
            if !delivered {
                debug!(listener = *id, "dropping listener with closed receiver");
            }
            delivered && !failed
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn new_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.check_read_faults()?;
        let collections = self.inner.collections.read().await;
        Ok(collections
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
            .map(|fields| Document::new(path.clone(), fields.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        self.check_read_faults()?;
        let collections = self.inner.collections.read().await;
        run_query(&collections, query)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.check_write_faults(&batch)?;

        let mut collections = self.inner.collections.write().await;
        let now = self.next_timestamp();

        // Stage every op against an overlay so a failing op leaves the
        // store untouched.
        let mut staged: BTreeMap<DocumentPath, Option<Fields>> = BTreeMap::new();
        let op_count = batch.len();
        for op in batch.into_ops() {
            let current = match staged.get(op.path()) {
                Some(state) => state.clone(),
                None => collections
                    .get(op.path().collection())
                    .and_then(|docs| docs.get(op.path().id()))
                    .cloned(),
            };

            let next = match &op {
                WriteOp::Set { patch, mode, .. } => {
                    let mut fields = match mode {
                        SetMode::Overwrite => Fields::new(),
                        SetMode::Merge => current.unwrap_or_default(),
                    };
                    patch.apply(&mut fields, &now);
                    Some(fields)
                }
                WriteOp::Create { path, patch } => {
                    if current.is_some() {
                        return Err(StoreError::AlreadyExists(path.to_string()));
                    }
                    let mut fields = Fields::new();
                    patch.apply(&mut fields, &now);
                    Some(fields)
                }
                WriteOp::Update { path, patch } => {
                    let mut fields =
                        current.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                    patch.apply(&mut fields, &now);
                    Some(fields)
                }
                WriteOp::Delete { .. } => None,
            };
            staged.insert(op.path().clone(), next);
        }

        let mut touched = BTreeSet::new();
        for (path, state) in staged {
            touched.insert(path.collection().clone());
            let docs = collections.entry(path.collection().clone()).or_default();
            match state {
                Some(fields) => {
                    docs.insert(path.id().to_string(), fields);
                }
                None => {
                    docs.remove(path.id());
                }
            }
        }

        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        debug!(ops = op_count, collections = touched.len(), "batch committed");

        self.notify(&collections, &touched);
        Ok(())
    }

    async fn listen(&self, query: Query) -> Result<Listener> {
        query.validate()?;

        // Hold the read lock so no commit slips between the initial
        // snapshot and registration.
        let collections = self.inner.collections.read().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let initial = run_query(&collections, &query);
        let registration = self.register(query, tx.clone());
        let _ = tx.send(initial);
        drop(collections);

        Ok(Listener {
            snapshots: rx,
            registration,
        })
    }
}

fn run_query(collections: &Collections, query: &Query) -> Result<Vec<Document>> {
    let docs = collections
        .get(query.collection())
        .into_iter()
        .flat_map(|docs| docs.iter())
        .map(|(id, fields)| Document::new(query.collection().doc(id.clone()), fields.clone()));
    query.execute(docs)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
