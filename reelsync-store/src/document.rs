//! Shared typed JSON document repository.
//!
//! Every persisted document in Reelsync goes through these two functions:
//!
//! - reads fail open: a missing or corrupt file yields the default document,
//!   so tombstone bookkeeping can never block a sync;
//! - writes are atomic: serialize → `.tmp` sibling → rename, so readers see
//!   either the fully-old or fully-new document, never a partial one.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, StoreError};

/// Load a document, falling back to `Default` when the file is missing or
/// unparsable. Corruption is logged and swallowed by design.
pub fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return T::default();
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!(
                    "unparsable document at {}: {e}; treating as empty",
                    path.display()
                );
                T::default()
            }
        },
        Err(e) => {
            log::warn!(
                "unreadable document at {}: {e}; treating as empty",
                path.display()
            );
            T::default()
        }
    }
}

/// Atomically save a document. The `.tmp` sibling lives in the same
/// directory as the target so the rename never crosses filesystems.
pub fn save_atomic<T>(path: &Path, document: &T) -> Result<(), StoreError>
where
    T: Serialize,
{
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string_pretty(document)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
