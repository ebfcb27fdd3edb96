//! The asset host contract.

use async_trait::async_trait;
use bytes::Bytes;
use souk_shared::AssetReference;

use crate::error::Result;

/// A file to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

/// API key + secret authorizing deletions. Kept apart from the upload
/// configuration, which only needs an unsigned preset.
#[derive(Clone, PartialEq, Eq)]
pub struct DeleteCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl DeleteCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl std::fmt::Debug for DeleteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload `file` into `folder`. One network round trip.
    async fn upload(&self, file: UploadFile, folder: &str) -> Result<AssetReference>;

    /// Delete the asset with the given opaque id. `Ok(false)` means the host
    /// answered but did not delete anything (e.g. unknown id).
    async fn delete(&self, public_id: &str, credentials: &DeleteCredentials) -> Result<bool>;
}
