//! Error types for reelsync-engine.

use std::path::PathBuf;

use thiserror::Error;

use reelsync_core::ProviderName;

/// All errors that can arise while reconciling.
///
/// Snapshot reads never produce these — a failing adapter index degrades to
/// an empty snapshot. They surface from writes, persistence, and setup.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persistence failure from the state or tombstone stores.
    #[error(transparent)]
    Store(#[from] reelsync_store::StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sync configuration file failed to parse.
    #[error("config error at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A pair references a provider no adapter was registered for.
    #[error("no adapter registered for provider {0}")]
    UnknownProvider(ProviderName),

    /// An adapter write failed after retries.
    #[error("provider {provider} failed: {message}")]
    Provider {
        provider: ProviderName,
        message: String,
    },
}

/// Convenience constructor for [`EngineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.into(),
        source,
    }
}
