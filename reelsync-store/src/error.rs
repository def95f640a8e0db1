//! Error types for reelsync-store.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from persisted-state operations.
///
/// Reads never produce these — corrupt or missing documents fail open to a
/// default. Only writes (serialize + atomic replace) can fail.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("state document JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
