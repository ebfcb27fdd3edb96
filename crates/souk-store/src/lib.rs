//! # souk-store
//!
//! Document store access for the Souk marketplace.
//!
//! Components talk to the hosted realtime document database through the
//! [`DocumentStore`] trait: point reads, filtered/ordered queries, atomic
//! write batches and change subscriptions. On top of it the crate provides
//! cursor pagination ([`PaginationEngine`]) and shared, cancellable change
//! streams ([`RealtimeSyncFlow`]). [`MemoryStore`] implements the contract
//! in-process.

pub mod batch;
pub mod client;
pub mod cursor;
pub mod document;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod query;
pub mod realtime;

mod error;

pub use batch::{WriteBatch, WriteOp};
pub use client::{DocumentStore, Listener, ListenerRegistration, Snapshot};
pub use cursor::PageCursor;
pub use document::{
    timestamp_value, CollectionPath, Document, DocumentPath, FieldValue, Fields, Patch, SetMode,
};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::*;
pub use pagination::{Page, PaginationEngine};
pub use query::{Direction, Filter, OrderBy, Query};
pub use realtime::{RealtimeSyncFlow, Subscription};
