use serde::{Deserialize, Serialize};

/// Coarse classification shared by every crate-level error.
///
/// Callers branch on the kind rather than on concrete variants: a
/// `TransientIo` may be retried at the caller's discretion (nothing is
/// retried internally), a `DeleteFailed` is informational only, and a
/// `Listener` error means the realtime sequence is closed and must be
/// resubscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network or timeout failure.
    TransientIo,
    /// The addressed document or asset does not exist.
    NotFound,
    /// An asset upload failed; the enclosing create/update wrote nothing.
    UploadFailed,
    /// An asset delete failed; never aborts the enclosing mutation.
    DeleteFailed,
    /// A change subscription failed and was closed.
    Listener,
    /// A single document could not be mapped to its entity type.
    MalformedSnapshot,
    /// The request was rejected before reaching the store.
    InvalidArgument,
    /// A write precondition was not met (e.g. create on an existing id).
    Conflict,
}

impl ErrorKind {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientIo)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::TransientIo => "transient-io",
            ErrorKind::NotFound => "not-found",
            ErrorKind::UploadFailed => "upload-failed",
            ErrorKind::DeleteFailed => "delete-failed",
            ErrorKind::Listener => "listener",
            ErrorKind::MalformedSnapshot => "malformed-snapshot",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::Conflict => "conflict",
        };
        f.write_str(name)
    }
}
