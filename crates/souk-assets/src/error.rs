use souk_shared::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The asset host answered with a non-success status.
    #[error("Asset host rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Upload response carried no URL")]
    MissingUrl,

    #[error("Asset too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Empty upload")]
    Empty,

    #[error("Asset storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid asset path: {0}")]
    BadPath(String),

    /// Deletion was attempted without (valid) API credentials.
    #[error("Missing or invalid delete credentials")]
    MissingCredentials,
}

impl AssetError {
    /// Taxonomy bucket for an error raised while uploading.
    pub fn upload_kind(&self) -> ErrorKind {
        match self {
            AssetError::Http(_) | AssetError::Io(_) => ErrorKind::TransientIo,
            AssetError::BadPath(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::UploadFailed,
        }
    }

    /// Taxonomy bucket for an error raised while deleting.
    pub fn delete_kind(&self) -> ErrorKind {
        match self {
            AssetError::Http(_) | AssetError::Io(_) => ErrorKind::TransientIo,
            AssetError::NotFound(_) => ErrorKind::NotFound,
            AssetError::BadPath(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::DeleteFailed,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AssetError>;
