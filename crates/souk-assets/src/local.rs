use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use souk_shared::AssetReference;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{AssetStore, DeleteCredentials, UploadFile};
use crate::error::{AssetError, Result};

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, relative: &str) -> Result<PathBuf> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => {
                return Err(AssetError::BadPath(format!(
                    "Path traversal detected: {relative}"
                )));
            }
        }
    }
    if !resolved.starts_with(&canonical_base) || resolved == canonical_base {
        return Err(AssetError::BadPath(format!(
            "Path traversal detected: {relative}"
        )));
    }
    Ok(resolved)
}

fn check_segments(value: &str) -> Result<()> {
    let ok = !value.is_empty()
        && !value.contains('\\')
        && value
            .split('/')
            .all(|s| !s.is_empty() && s != "." && s != "..");
    if ok {
        Ok(())
    } else {
        Err(AssetError::BadPath(value.to_string()))
    }
}

/// Asset host backed by a local directory.
///
/// Files land under `{base}/{folder}/{uuid}.{ext}` and are addressed by
/// URLs in the hosted layout (`…/image/upload/v{unix}/{folder}/{uuid}.{ext}`),
/// so ids can be recovered from URLs exactly as for the hosted service.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    base_path: PathBuf,
    public_url: String,
    max_size: usize,
    admin: Option<DeleteCredentials>,
}

impl LocalAssetStore {
    pub async fn new(base_path: PathBuf, public_url: &str, max_size: usize) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;

        info!(path = %base_path.display(), "Local asset store initialized");

        Ok(Self {
            base_path,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_size,
            admin: None,
        })
    }

    /// Require these credentials for deletion.
    pub fn with_credentials(mut self, credentials: DeleteCredentials) -> Self {
        self.admin = Some(credentials);
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Read back the bytes of a stored asset.
    pub async fn read(&self, public_id: &str) -> Result<Vec<u8>> {
        let path = self
            .locate(public_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(public_id.to_string()))?;
        let data = fs::read(&path).await?;
        debug!(public_id, size = data.len(), "Read asset");
        Ok(data)
    }

    /// Find the file stored for `public_id` (`{folder}/{stem}`), whatever its
    /// extension.
    async fn locate(&self, public_id: &str) -> Result<Option<PathBuf>> {
        check_segments(public_id)?;
        let (folder, stem) = public_id
            .rsplit_once('/')
            .unwrap_or(("", public_id));

        let dir = if folder.is_empty() {
            self.base_path.clone()
        } else {
            ensure_within(&self.base_path, folder)?
        };
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(&self, file: UploadFile, folder: &str) -> Result<AssetReference> {
        if file.bytes.is_empty() {
            return Err(AssetError::Empty);
        }
        if file.bytes.len() > self.max_size {
            return Err(AssetError::TooLarge {
                size: file.bytes.len(),
                max: self.max_size,
            });
        }
        check_segments(folder)?;

        let stem = Uuid::new_v4().simple().to_string();
        let name = match file.extension() {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem.clone(),
        };
        let dir = ensure_within(&self.base_path, folder)?;
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(&name), &file.bytes).await?;

        let version = chrono::Utc::now().timestamp();
        let url = format!("{}/image/upload/v{version}/{folder}/{name}", self.public_url);
        let public_id = format!("{folder}/{stem}");

        debug!(id = %public_id, size = file.bytes.len(), "Stored asset");
        Ok(AssetReference::new(url, Some(public_id)))
    }

    async fn delete(&self, public_id: &str, credentials: &DeleteCredentials) -> Result<bool> {
        if let Some(admin) = &self.admin {
            if admin != credentials {
                return Err(AssetError::MissingCredentials);
            }
        }

        let Some(path) = self.locate(public_id).await? else {
            debug!(public_id, "Asset already gone");
            return Ok(false);
        };
        fs::remove_file(&path).await?;

        debug!(public_id, "Deleted asset");
        Ok(true)
    }
}
