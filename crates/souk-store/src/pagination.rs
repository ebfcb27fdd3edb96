//! Cursor-based pagination over one collection.
//!
//! Pages are ordered by a single monotonic field with the document id as
//! tie-breaker, so a cursor taken from the last item of a page identifies a
//! unique position even when several documents share the ordering value.

use std::sync::Arc;

use souk_shared::constants::CREATED_AT;
use tracing::{debug, warn};

use crate::client::DocumentStore;
use crate::cursor::PageCursor;
use crate::document::{CollectionPath, Document};
use crate::error::{Result, StoreError};
use crate::models::FromDocument;
use crate::query::{Direction, Filter, OrderBy, Query};

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Position of the last fetched document; `None` when the page is empty.
    pub next_cursor: Option<PageCursor>,
    pub page_size: usize,
    /// Documents returned by the store, before any were skipped as malformed.
    fetched: usize,
}

impl<T> Page<T> {
    /// A short or empty page means there is nothing after it.
    pub fn is_last(&self) -> bool {
        self.fetched == 0 || self.fetched < self.page_size
    }

    /// Number of documents the store returned for this page.
    pub fn fetched(&self) -> usize {
        self.fetched
    }
}

/// Stateless pager; every call is an independent query.
#[derive(Clone)]
pub struct PaginationEngine {
    store: Arc<dyn DocumentStore>,
    collection: CollectionPath,
    order_field: String,
    filters: Vec<Filter>,
}

impl PaginationEngine {
    /// Pager over `collection` ordered by `createdAt`.
    pub fn new(store: Arc<dyn DocumentStore>, collection: CollectionPath) -> Self {
        Self {
            store,
            collection,
            order_field: CREATED_AT.to_string(),
            filters: Vec::new(),
        }
    }

    pub fn order_field(mut self, field: impl Into<String>) -> Self {
        self.order_field = field.into();
        self
    }

    /// Restrict every page to documents matching `filter`.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Fetch the page following `cursor` (or the first page).
    pub async fn page(
        &self,
        page_size: usize,
        cursor: Option<&PageCursor>,
        descending: bool,
    ) -> Result<Page<Document>> {
        if page_size == 0 {
            return Err(StoreError::InvalidArgument(
                "page size must be at least 1".into(),
            ));
        }

        let order = OrderBy::new(self.order_field.clone(), Direction::descending(descending));
        let mut query = self
            .filters
            .iter()
            .cloned()
            .fold(Query::new(self.collection.clone()), Query::filter)
            .order_by(order.field.clone(), order.direction)
            .limit(page_size);
        if let Some(cursor) = cursor {
            query = query.start_after(cursor.clone());
        }

        let items = self.store.query(&query).await?;
        let next_cursor = items
            .last()
            .map(|doc| PageCursor::at(&self.collection, &order, doc));

        debug!(
            collection = %self.collection,
            count = items.len(),
            page_size,
            "page fetched"
        );

        Ok(Page {
            fetched: items.len(),
            items,
            next_cursor,
            page_size,
        })
    }

    /// Like [`page`](Self::page) but decoded into `T`.
    ///
    /// Documents that fail to decode are skipped; the cursor still comes
    /// from the raw page so skipped documents are never revisited.
    pub async fn page_as<T: FromDocument>(
        &self,
        page_size: usize,
        cursor: Option<&PageCursor>,
        descending: bool,
    ) -> Result<Page<T>> {
        let raw = self.page(page_size, cursor, descending).await?;
        let items = raw
            .items
            .iter()
            .filter_map(|doc| match T::from_document(doc) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(id = %doc.path, error = %e, "skipping malformed document");
                    None
                }
            })
            .collect();

        Ok(Page {
            items,
            next_cursor: raw.next_cursor,
            page_size: raw.page_size,
            fetched: raw.fetched,
        })
    }
}
