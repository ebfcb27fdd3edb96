use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use souk_assets::UploadFile;
use souk_shared::constants::{
    CREATED_AT, DEFAULT_PAGE_SIZE, LISTINGS, LISTING_FOLDER, MAX_IN_VALUES,
};
use souk_shared::{AssetReference, ListingId};
use souk_store::{
    CollectionPath, Direction, Document, DocumentPath, DocumentStore, Filter, FromDocument,
    ListingRecord, Page, PageCursor, PaginationEngine, Patch, Query, RealtimeSyncFlow,
};
use tracing::{debug, warn};

use crate::error::Result;
use crate::lifecycle::{AssetLifecycleManager, CleanupReport};

/// Editable fields of a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub condition: String,
    pub price: f64,
}

/// Upper bound on listings scanned by [`ListingRepository::search`].
const SEARCH_SCAN_LIMIT: usize = 200;

pub struct ListingRepository {
    store: Arc<dyn DocumentStore>,
    lifecycle: Arc<AssetLifecycleManager>,
    pager: PaginationEngine,
    page_size: usize,
}

fn collection() -> CollectionPath {
    CollectionPath::new(LISTINGS)
}

fn listing_path(id: &ListingId) -> DocumentPath {
    collection().doc(id.as_str())
}

impl ListingRepository {
    pub fn new(store: Arc<dyn DocumentStore>, lifecycle: Arc<AssetLifecycleManager>) -> Self {
        let pager = PaginationEngine::new(Arc::clone(&store), collection())
            .with_filter(Filter::Eq("active".to_string(), true.into()));
        Self {
            store,
            lifecycle,
            pager,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size used by [`next_page`](Self::next_page).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Create a listing: reserve an id, upload the images, then write the
    /// document once.
    pub async fn create(
        &self,
        owner_id: &str,
        draft: &ListingDraft,
        files: Vec<UploadFile>,
    ) -> Result<ListingId> {
        let id = ListingId::new(self.store.new_id());
        let fields = Patch::from_serializable(draft)?
            .set("ownerId", owner_id)
            .set("active", true)
            .set("sold", false)
            .server_timestamp(CREATED_AT)
            .server_timestamp("updatedAt");

        self.lifecycle
            .create_with_assets(&listing_path(&id), fields, files, LISTING_FOLDER)
            .await?;
        Ok(id)
    }

    /// Apply `draft` and append `new_files` to the listing's images.
    pub async fn update(
        &self,
        id: &ListingId,
        draft: &ListingDraft,
        new_files: Vec<UploadFile>,
    ) -> Result<Vec<AssetReference>> {
        let fields = Patch::from_serializable(draft)?.server_timestamp("updatedAt");
        self.lifecycle
            .update_with_assets(&listing_path(id), fields, new_files, LISTING_FOLDER)
            .await
    }

    /// Remove one image from the listing. See
    /// [`AssetLifecycleManager::remove_single_asset`].
    pub async fn remove_image(
        &self,
        id: &ListingId,
        asset_id: Option<&str>,
        url: Option<&str>,
    ) -> Result<bool> {
        self.lifecycle
            .remove_single_asset(&listing_path(id), asset_id, url)
            .await
    }

    /// Delete the listing and, best effort, its images.
    pub async fn delete(&self, id: &ListingId) -> Result<CleanupReport> {
        self.lifecycle
            .delete_record_and_assets(&listing_path(id), None)
            .await
    }

    pub async fn get(&self, id: &ListingId) -> Result<Option<ListingRecord>> {
        match self.store.get(&listing_path(id)).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub async fn set_sold(&self, id: &ListingId, sold: bool) -> Result<()> {
        self.touch(id, Patch::new().set("sold", sold)).await
    }

    pub async fn set_active(&self, id: &ListingId, active: bool) -> Result<()> {
        self.touch(id, Patch::new().set("active", active)).await
    }

    async fn touch(&self, id: &ListingId, patch: Patch) -> Result<()> {
        self.store
            .update(&listing_path(id), patch.server_timestamp("updatedAt"))
            .await?;
        Ok(())
    }

    /// Live list of active listings, newest first.
    pub fn observe_active(&self) -> RealtimeSyncFlow<ListingRecord> {
        let query = Query::new(collection())
            .where_eq("active", true)
            .order_by(CREATED_AT, Direction::Descending);
        RealtimeSyncFlow::new(Arc::clone(&self.store), query)
    }

    /// One page of active listings, newest first.
    pub async fn page(
        &self,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<Page<ListingRecord>> {
        Ok(self.pager.page_as(page_size, cursor, true).await?)
    }

    /// Like [`page`](Self::page) with the configured page size.
    pub async fn next_page(&self, cursor: Option<&PageCursor>) -> Result<Page<ListingRecord>> {
        self.page(self.page_size, cursor).await
    }

    /// Listings of one owner, newest first.
    pub async fn by_owner(&self, owner_id: &str) -> Result<Vec<ListingRecord>> {
        let query = Query::new(collection())
            .where_eq("ownerId", owner_id)
            .order_by(CREATED_AT, Direction::Descending);
        let docs = self.store.query(&query).await?;
        Ok(decode_all(&docs))
    }

    /// Fetch listings by id, in the order of `ids`. Unknown ids are skipped.
    pub async fn by_ids(&self, ids: &[String]) -> Result<Vec<ListingRecord>> {
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !id.is_empty() && !unique.contains(id) {
                unique.push(id.clone());
            }
        }

        let mut found: HashMap<String, ListingRecord> = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(MAX_IN_VALUES) {
            let query = Query::new(collection()).id_in(chunk.to_vec());
            let docs = self.store.query(&query).await?;
            for listing in decode_all::<ListingRecord>(&docs) {
                found.insert(listing.id.clone(), listing);
            }
        }

        debug!(requested = unique.len(), found = found.len(), "listings fetched by id");
        Ok(unique.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// Case-insensitive substring search over title and description of the
    /// most recent active listings.
    pub async fn search(&self, term: &str) -> Result<Vec<ListingRecord>> {
        let needle = term.trim().to_lowercase();
        let query = Query::new(collection())
            .where_eq("active", true)
            .order_by(CREATED_AT, Direction::Descending)
            .limit(SEARCH_SCAN_LIMIT);
        let docs = self.store.query(&query).await?;

        Ok(decode_all::<ListingRecord>(&docs)
            .into_iter()
            .filter(|l| {
                needle.is_empty()
                    || l.title.to_lowercase().contains(&needle)
                    || l.description.to_lowercase().contains(&needle)
            })
            .collect())
    }
}

fn decode_all<T: FromDocument>(docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match T::from_document(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(id = %doc.path, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}
