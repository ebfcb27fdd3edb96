use souk_shared::ErrorKind;
use thiserror::Error;

/// Errors produced by the document store layer.
///
/// `Clone` so a single listener failure can be fanned out to every
/// subscriber of a realtime flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Network / transport failure talking to the store.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The addressed document does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A create-only write targeted an existing document.
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// A change subscription failed and was closed.
    #[error("Listener error: {0}")]
    Listener(String),

    /// A document could not be mapped to its entity type.
    #[error("Malformed document {id}: {reason}")]
    Malformed { id: String, reason: String },

    /// A cursor was used with a query it was not produced for.
    #[error("Cursor bound to {found} cannot be used with {expected}")]
    CursorMismatch { expected: String, found: String },

    /// The cursor token could not be decoded.
    #[error("Invalid cursor token")]
    InvalidCursor,

    /// The request was malformed (e.g. too many `in` values).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Transport(_) => ErrorKind::TransientIo,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::Conflict,
            StoreError::Listener(_) => ErrorKind::Listener,
            StoreError::Malformed { .. } => ErrorKind::MalformedSnapshot,
            StoreError::CursorMismatch { .. }
            | StoreError::InvalidCursor
            | StoreError::InvalidArgument(_)
            | StoreError::Serialization(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
