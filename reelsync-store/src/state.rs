//! Baseline/checkpoint state store.
//!
//! # Storage layout
//!
//! ```text
//! <base>/
//!   state.json       (providers → features → baseline + checkpoint, wall)
//!   last_sync.json   (last run record)
//! ```
//!
//! A baseline is the last committed full view of one (provider, feature)
//! collection. It is replaced only on successful commit, never partially
//! written. Reads fail toward an empty document, which makes a corrupted
//! state file behave like a bootstrap (no mass removals).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reelsync_core::{canonical_key, Feature, MediaItem, ProviderName};

use crate::document::{load_or_default, save_atomic};
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Canonical-key → minimal-item map for one (provider, feature).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    #[serde(default)]
    pub items: BTreeMap<String, MediaItem>,
}

/// Per-(provider, feature) state: the committed baseline plus an opaque
/// provider checkpoint, stored without interpretation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureState {
    #[serde(default)]
    pub baseline: Baseline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

/// Root of `state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub providers: BTreeMap<String, BTreeMap<Feature, FeatureState>>,
    #[serde(default)]
    pub wall: Vec<MediaItem>,
    #[serde(default)]
    pub last_sync_epoch: Option<i64>,
}

impl StateDocument {
    /// The committed baseline items for a (provider, feature), empty when
    /// none has been committed yet.
    pub fn baseline(&self, provider: &ProviderName, feature: Feature) -> BTreeMap<String, MediaItem> {
        self.providers
            .get(&provider.0)
            .and_then(|features| features.get(&feature))
            .map(|fs| fs.baseline.items.clone())
            .unwrap_or_default()
    }

    pub fn checkpoint(&self, provider: &ProviderName, feature: Feature) -> Option<String> {
        self.providers
            .get(&provider.0)
            .and_then(|features| features.get(&feature))
            .and_then(|fs| fs.checkpoint.clone())
    }

    /// Replace the baseline for a (provider, feature) with the given view.
    /// Items are stored in minimal projection.
    pub fn commit_baseline(
        &mut self,
        provider: &ProviderName,
        feature: Feature,
        items: &BTreeMap<String, MediaItem>,
    ) {
        let entry = self.feature_entry(provider, feature);
        entry.baseline.items = items
            .iter()
            .map(|(k, v)| (k.clone(), reelsync_core::minimal(v)))
            .collect();
    }

    /// Store an opaque provider checkpoint. `None` leaves the previous
    /// checkpoint in place.
    pub fn commit_checkpoint(
        &mut self,
        provider: &ProviderName,
        feature: Feature,
        checkpoint: Option<String>,
    ) {
        if let Some(cp) = checkpoint {
            self.feature_entry(provider, feature).checkpoint = Some(cp);
        }
    }

    /// Rebuild the watchlist wall: the deduplicated union of every
    /// provider's watchlist baseline, keyed by canonical key.
    pub fn rebuild_wall(&mut self) {
        let mut seen = std::collections::BTreeSet::new();
        let mut wall = Vec::new();
        for features in self.providers.values() {
            if let Some(fs) = features.get(&Feature::Watchlist) {
                for item in fs.baseline.items.values() {
                    let key = canonical_key(item);
                    if seen.insert(key) {
                        wall.push(reelsync_core::minimal(item));
                    }
                }
            }
        }
        self.wall = wall;
    }

    fn feature_entry(&mut self, provider: &ProviderName, feature: Feature) -> &mut FeatureState {
        self.providers
            .entry(provider.0.clone())
            .or_default()
            .entry(feature)
            .or_default()
    }
}

/// `last_sync.json` — small record of the most recent coordinator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastRunRecord {
    pub started_at: i64,
    pub finished_at: i64,
    pub added: u64,
    pub removed: u64,
    pub errors: u64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// File-backed state repository rooted at an explicit base directory
/// (tests pass a `TempDir`).
#[derive(Debug, Clone)]
pub struct StateStore {
    base: PathBuf,
}

impl StateStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn state_path(&self) -> PathBuf {
        self.base.join("state.json")
    }

    pub fn last_run_path(&self) -> PathBuf {
        self.base.join("last_sync.json")
    }

    pub fn load(&self) -> StateDocument {
        load_or_default(&self.state_path())
    }

    pub fn save(&self, doc: &StateDocument) -> Result<(), StoreError> {
        save_atomic(&self.state_path(), doc)
    }

    pub fn save_last_run(&self, record: &LastRunRecord) -> Result<(), StoreError> {
        save_atomic(&self.last_run_path(), record)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
