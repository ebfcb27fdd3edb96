//! In-memory asset host used by the repository tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use souk_assets::{AssetError, AssetStore, DeleteCredentials, UploadFile};
use souk_shared::AssetReference;

#[derive(Default)]
pub struct FakeAssets {
    counter: AtomicUsize,
    /// File names whose upload fails.
    fail_uploads: Mutex<HashSet<String>>,
    fail_deletes: Mutex<bool>,
    /// Leave `public_id` out of upload results, like legacy uploads.
    omit_ids: Mutex<bool>,
    pub uploaded: Mutex<Vec<AssetReference>>,
    pub delete_calls: Mutex<Vec<String>>,
    live: Mutex<HashSet<String>>,
}

impl FakeAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upload_of(&self, file_name: &str) {
        self.fail_uploads.lock().unwrap().insert(file_name.to_string());
    }

    pub fn fail_deletes(&self, fail: bool) {
        *self.fail_deletes.lock().unwrap() = fail;
    }

    pub fn omit_ids(&self, omit: bool) {
        *self.omit_ids.lock().unwrap() = omit;
    }

    pub fn upload_count(&self) -> usize {
        self.uploaded.lock().unwrap().len()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }

    pub fn is_live(&self, public_id: &str) -> bool {
        self.live.lock().unwrap().contains(public_id)
    }
}

pub fn creds() -> DeleteCredentials {
    DeleteCredentials::new("key", "secret")
}

pub fn file(name: &str) -> UploadFile {
    UploadFile::new(name, name.as_bytes().to_vec())
}

#[async_trait]
impl AssetStore for FakeAssets {
    async fn upload(&self, file: UploadFile, folder: &str) -> Result<AssetReference, AssetError> {
        // Let concurrent uploads interleave.
        tokio::task::yield_now().await;

        if self.fail_uploads.lock().unwrap().contains(&file.file_name) {
            return Err(AssetError::Rejected {
                status: 500,
                body: format!("cannot store {}", file.file_name),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let stem = format!("{}-{n}", file.file_name.replace('.', "-"));
        let public_id = format!("{folder}/{stem}");
        let url = format!("https://assets.test/souk/image/upload/v1700000000/{public_id}.jpg");

        let id = if *self.omit_ids.lock().unwrap() {
            None
        } else {
            Some(public_id.clone())
        };
        let reference = AssetReference::new(url, id);
        self.live.lock().unwrap().insert(public_id);
        self.uploaded.lock().unwrap().push(reference.clone());
        Ok(reference)
    }

    async fn delete(&self, public_id: &str, credentials: &DeleteCredentials) -> Result<bool, AssetError> {
        self.delete_calls.lock().unwrap().push(public_id.to_string());
        if *credentials != creds() {
            return Err(AssetError::MissingCredentials);
        }
        if *self.fail_deletes.lock().unwrap() {
            return Err(AssetError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.live.lock().unwrap().remove(public_id))
    }
}
