//! Keeping document metadata and hosted assets consistent.
//!
//! Assets are always uploaded before the write that references them and are
//! deleted (best effort) after the reference is gone. Uploads that succeed
//! before a sibling fails are reported, not rolled back; failed deletes are
//! logged and never change the outcome of the mutation.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use souk_assets::{AssetStore, DeleteCredentials, UploadFile};
use souk_shared::constants::{ASSET_IDS, ASSET_URLS};
use souk_shared::{public_id_from_url, AssetReference};
use souk_store::{DocumentPath, DocumentStore, Patch, SetMode};
use tracing::{debug, info, warn};

use crate::error::{RepoError, Result};

/// Outcome of the best-effort asset deletions of
/// [`AssetLifecycleManager::delete_record_and_assets`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Ids the host confirmed as deleted.
    pub deleted: Vec<String>,
    /// Ids whose deletion failed, was refused or could not be attempted.
    pub failed: Vec<String>,
    /// URLs for which no id could be determined.
    pub unresolved: Vec<String>,
}

impl CleanupReport {
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unresolved.is_empty()
    }
}

pub struct AssetLifecycleManager {
    store: Arc<dyn DocumentStore>,
    assets: Arc<dyn AssetStore>,
    credentials: Option<DeleteCredentials>,
    upload_concurrency: usize,
}

impl AssetLifecycleManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        assets: Arc<dyn AssetStore>,
        credentials: Option<DeleteCredentials>,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            store,
            assets,
            credentials,
            upload_concurrency: upload_concurrency.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Upload `files` with bounded parallelism, keeping input order.
    ///
    /// Fails with [`RepoError::UploadFailed`] for the first failing file once
    /// every upload has settled.
    pub async fn upload_all(
        &self,
        files: Vec<UploadFile>,
        folder: &str,
    ) -> Result<Vec<AssetReference>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let total = files.len();

        let results: Vec<_> = stream::iter(files)
            .map(|file| self.assets.upload(file, folder))
            .buffered(self.upload_concurrency)
            .collect()
            .await;

        let mut uploaded = Vec::with_capacity(total);
        let mut first_failure = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(reference) => uploaded.push(reference),
                Err(e) if first_failure.is_none() => first_failure = Some((index, e)),
                Err(e) => warn!(index, error = %e, "additional upload failure"),
            }
        }

        match first_failure {
            None => {
                debug!(count = total, folder, "uploads complete");
                Ok(uploaded)
            }
            Some((index, source)) => {
                for orphan in &uploaded {
                    warn!(url = %orphan.url, id = ?orphan.id, "uploaded asset left unreferenced");
                }
                Err(RepoError::UploadFailed {
                    index,
                    source,
                    orphaned: uploaded,
                })
            }
        }
    }

    /// Upload `files`, then create the document at `path` with `fields` plus
    /// the full url/id lists. Nothing is written if any upload fails.
    pub async fn create_with_assets(
        &self,
        path: &DocumentPath,
        fields: Patch,
        files: Vec<UploadFile>,
        folder: &str,
    ) -> Result<Vec<AssetReference>> {
        let refs = self.upload_all(files, folder).await?;
        let patch = fields.merge(asset_lists(&refs));
        self.store.create(path, patch).await?;
        info!(path = %path, assets = refs.len(), "record created with assets");
        Ok(refs)
    }

    /// Upload `new_files` and append them to the document's existing asset
    /// lists, applying `fields` in the same write. Returns the full list.
    ///
    /// The read-merge-write is not atomic; a concurrent update of the same
    /// lists may be lost.
    pub async fn update_with_assets(
        &self,
        path: &DocumentPath,
        fields: Patch,
        new_files: Vec<UploadFile>,
        folder: &str,
    ) -> Result<Vec<AssetReference>> {
        let doc = self.store.get_required(path).await?;
        let mut refs = stored_refs(doc.string_list(ASSET_URLS), doc.nullable_string_list(ASSET_IDS));

        let added = self.upload_all(new_files, folder).await?;
        let added_count = added.len();
        refs.extend(added);

        let patch = fields.merge(asset_lists(&refs));
        self.store.update(path, patch).await?;
        info!(path = %path, added = added_count, total = refs.len(), "record updated with assets");
        Ok(refs)
    }

    /// Detach one asset from the document and delete it from the host.
    ///
    /// The stored entry is matched by `known_url`, then by `known_id`
    /// against each entry's stored or url-derived id. Both lists are
    /// rewritten without that entry so they stay parallel. The id sent to
    /// the host is `known_id` when non-blank, else the entry's id, else one
    /// parsed from `known_url`. The reference is removed even if the remote
    /// delete fails; the returned flag tells whether the host confirmed the
    /// deletion.
    ///
    /// Like [`update_with_assets`](Self::update_with_assets) this is a
    /// read-modify-write and is not atomic.
    pub async fn remove_single_asset(
        &self,
        path: &DocumentPath,
        known_id: Option<&str>,
        known_url: Option<&str>,
    ) -> Result<bool> {
        let known_url = known_url.map(str::trim).filter(|u| !u.is_empty());
        let known_id = known_id.map(str::trim).filter(|id| !id.is_empty());
        if known_url.is_none() && known_id.is_none() {
            return Err(RepoError::InvalidArgument(
                "remove_single_asset needs an asset id or url".to_string(),
            ));
        }

        let doc = self.store.get_required(path).await?;
        let mut refs = stored_refs(doc.string_list(ASSET_URLS), doc.nullable_string_list(ASSET_IDS));

        let position = known_url
            .and_then(|url| refs.iter().position(|r| r.url == url))
            .or_else(|| known_id.and_then(|id| refs.iter().position(|r| refers_to(r, id))));
        let removed = position.map(|index| refs.remove(index));

        let id = known_id
            .map(str::to_string)
            .or_else(|| removed.as_ref().and_then(AssetReference::resolved_id))
            .or_else(|| known_url.and_then(public_id_from_url));

        let deleted = match &id {
            Some(id) => self.delete_quietly(id).await,
            None => {
                warn!(url = ?known_url, "no asset id derivable, skipping remote delete");
                false
            }
        };

        match &removed {
            Some(entry) => {
                self.store.update(path, asset_lists(&refs)).await?;
                debug!(path = %path, url = %entry.url, id = ?id, deleted, "asset detached");
            }
            None => warn!(path = %path, id = ?id, url = ?known_url, "asset not referenced by record"),
        }
        Ok(deleted)
    }

    /// Delete every asset of the document (best effort, concurrently), then
    /// the document itself. `fallback_urls` are used when the document is
    /// missing or carries no urls.
    pub async fn delete_record_and_assets(
        &self,
        path: &DocumentPath,
        fallback_urls: Option<&[String]>,
    ) -> Result<CleanupReport> {
        let doc = self.store.get(path).await?;
        let (mut urls, ids) = match &doc {
            Some(doc) => (doc.string_list(ASSET_URLS), doc.nullable_string_list(ASSET_IDS)),
            None => (Vec::new(), Vec::new()),
        };
        if urls.is_empty() {
            urls = fallback_urls.map(<[String]>::to_vec).unwrap_or_default();
        }

        let mut report = CleanupReport::default();
        let mut targets: Vec<String> = Vec::new();
        for reference in stored_refs(urls, ids) {
            match reference.resolved_id() {
                Some(id) if !targets.contains(&id) => targets.push(id),
                Some(_) => {}
                None => report.unresolved.push(reference.url),
            }
        }

        let outcomes = join_all(targets.iter().map(|id| self.delete_quietly(id))).await;
        for (id, deleted) in targets.into_iter().zip(outcomes) {
            if deleted {
                report.deleted.push(id);
            } else {
                report.failed.push(id);
            }
        }

        self.store.delete(path).await?;
        info!(
            path = %path,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            unresolved = report.unresolved.len(),
            "record deleted"
        );
        Ok(report)
    }

    /// Swap the single asset held in `url_field`/`id_field` of the document
    /// for a new upload. The previous asset is deleted best effort when its
    /// id differs from the new one.
    pub async fn replace_single_asset(
        &self,
        path: &DocumentPath,
        file: UploadFile,
        folder: &str,
        url_field: &str,
        id_field: &str,
    ) -> Result<AssetReference> {
        let previous = self.store.get(path).await?.and_then(|doc| {
            let url = doc.get_str(url_field)?.to_string();
            let id = doc.get_str(id_field).map(str::to_string);
            Some(AssetReference::new(url, id))
        });

        let mut uploaded = self.upload_all(vec![file], folder).await?;
        let Some(new) = uploaded.pop() else {
            return Err(RepoError::InvalidArgument("nothing uploaded".to_string()));
        };

        let patch = Patch::new()
            .set(url_field, new.url.as_str())
            .set(id_field, new.id.clone().map_or(Value::Null, Value::String));
        self.store.set(path, patch, SetMode::Merge).await?;

        let old_id = previous.as_ref().and_then(AssetReference::resolved_id);
        if let Some(old_id) = old_id {
            if Some(&old_id) != new.resolved_id().as_ref() {
                self.delete_quietly(&old_id).await;
            }
        }

        Ok(new)
    }

    /// Delete one asset, logging instead of failing.
    async fn delete_quietly(&self, public_id: &str) -> bool {
        let Some(credentials) = &self.credentials else {
            warn!(public_id, "no delete credentials configured, asset kept");
            return false;
        };
        match self.assets.delete(public_id, credentials).await {
            Ok(true) => {
                debug!(public_id, "asset deleted");
                true
            }
            Ok(false) => {
                warn!(public_id, "asset host reported nothing to delete");
                false
            }
            Err(e) => {
                warn!(public_id, error = %e, kind = %e.delete_kind(), "asset delete failed");
                false
            }
        }
    }
}

/// Pair stored urls with their ids; missing or blank ids become `None`.
fn stored_refs(urls: Vec<String>, ids: Vec<Option<String>>) -> Vec<AssetReference> {
    let mut ids = ids.into_iter();
    urls.into_iter()
        .map(|url| AssetReference::new(url, ids.next().flatten()))
        .collect()
}

/// Whether `reference` points at the asset `id`, by stored id or by url.
fn refers_to(reference: &AssetReference, id: &str) -> bool {
    reference.id.as_deref() == Some(id) || public_id_from_url(&reference.url).as_deref() == Some(id)
}

/// The parallel `assetUrls` / `assetIds` lists for `refs`.
fn asset_lists(refs: &[AssetReference]) -> Patch {
    let urls: Vec<Value> = refs.iter().map(|r| Value::String(r.url.clone())).collect();
    let ids: Vec<Value> = refs
        .iter()
        .map(|r| r.id.clone().map_or(Value::Null, Value::String))
        .collect();
    Patch::new()
        .set(ASSET_URLS, Value::Array(urls))
        .set(ASSET_IDS, Value::Array(ids))
}
