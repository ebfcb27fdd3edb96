use souk_assets::AssetError;
use souk_shared::thread_id::PartyError;
use souk_shared::{AssetReference, ErrorKind};
use souk_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the repositories.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Upload of the `index`-th file failed; nothing was written. Files
    /// that did upload are listed in `orphaned` and are not rolled back.
    #[error("Upload of file #{index} failed: {source}")]
    UploadFailed {
        index: usize,
        #[source]
        source: AssetError,
        orphaned: Vec<AssetReference>,
    },

    /// An asset operation failed outside of an upload batch.
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::Store(e) => e.kind(),
            RepoError::UploadFailed { .. } => ErrorKind::UploadFailed,
            RepoError::Asset(e) => e.delete_kind(),
            RepoError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl From<PartyError> for RepoError {
    fn from(e: PartyError) -> Self {
        RepoError::InvalidArgument(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RepoError>;
