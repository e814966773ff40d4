use thiserror::Error;

use crate::document::ContentVersion;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Structural failures. A poor match is not an error: it comes back as a
/// degraded `ReconciliationResult`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or empty input. Not worth retrying.
    #[error("invalid span: {0}")]
    InvalidSpan(String),

    /// The index was built for another version of the document.
    #[error("version mismatch: index is at {index}, request expects {requested}")]
    VersionMismatch {
        index: ContentVersion,
        requested: ContentVersion,
    },

    /// The global sliding-window search ran past its size or time budget.
    #[error("document too large for global search ({length} bytes, limit {limit})")]
    DocumentTooLargeForGlobalSearch { length: usize, limit: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn invalid_span(reason: impl Into<String>) -> Self {
        SyncError::InvalidSpan(reason.into())
    }
}
