//! Global tombstone store.
//!
//! Durable, TTL-bounded record of negative events (removed / unrated /
//! unscrobbled) per identity. Any future positive write attempt for the same
//! feature consults it: a still-active entry whose dimension *opposes* the
//! attempted write suppresses that write across any provider pair.
//!
//! Persisted at `<base>/tombstones.json` as a versioned document with an
//! entries list plus a flattened `"feature|key" → epoch` index kept for
//! admin tooling. Reads fail open — an unreadable store never blocks a
//! legitimate write, it merely offers no protection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use reelsync_core::{aliases, any_key_overlap, Dimension, Feature, MediaItem, PairId, ProviderName, WriteScope};

use crate::document::{load_or_default, save_atomic};
use crate::error::StoreError;

const MODEL: &str = "global";
const VERSION: u32 = 2;

// ---------------------------------------------------------------------------
// TTL policy
// ---------------------------------------------------------------------------

/// Tombstone TTL resolution, in precedence order:
/// per-feature seconds override → per-feature days override → global days
/// override → hard defaults (watchlist 7d, ratings 3d, history 2d,
/// playlists 7d).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtlPolicy {
    #[serde(default)]
    pub per_feature_secs: BTreeMap<Feature, i64>,
    #[serde(default)]
    pub per_feature_days: BTreeMap<Feature, i64>,
    #[serde(default)]
    pub global_days: Option<i64>,
}

impl TtlPolicy {
    pub fn resolve(&self, feature: Feature) -> i64 {
        if let Some(&secs) = self.per_feature_secs.get(&feature) {
            return secs.max(1);
        }
        if let Some(&days) = self.per_feature_days.get(&feature) {
            return (days * 24 * 3600).max(1);
        }
        if let Some(days) = self.global_days {
            return (days * 24 * 3600).max(1);
        }
        feature.default_tombstone_ttl_secs()
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// One negative event: every alias key of the entity at recording time, the
/// (feature, dimension) scope, the provider it originated from, and the
/// propagation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TombstoneEntry {
    pub keys: Vec<String>,
    pub scope: WriteScope,
    pub origin: String,
    pub ts_iso: DateTime<Utc>,
    pub propagate_until_iso: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TombstoneDocument {
    pub model: String,
    pub version: u32,
    pub ttl_sec: i64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<TombstoneEntry>,
    /// Flattened `"feature|key" → epoch` view, recomputed on every write.
    #[serde(default)]
    pub keys: BTreeMap<String, i64>,
}

impl Default for TombstoneDocument {
    fn default() -> Self {
        Self {
            model: MODEL.to_owned(),
            version: VERSION,
            ttl_sec: Feature::Watchlist.default_tombstone_ttl_secs(),
            updated_at: Utc::now(),
            entries: Vec::new(),
            keys: BTreeMap::new(),
        }
    }
}

fn flatten_keys(entries: &[TombstoneEntry]) -> BTreeMap<String, i64> {
    let mut flat = BTreeMap::new();
    for entry in entries {
        let epoch = entry.ts_iso.timestamp();
        for key in &entry.keys {
            flat.insert(format!("{}|{key}", entry.scope.feature), epoch);
        }
    }
    flat
}

/// Alias keys of every active entry opposing one attempted write, collected
/// in a single document read so callers can screen a whole batch without
/// re-parsing the store per item.
#[derive(Debug, Clone, Default)]
pub struct SuppressionIndex {
    keys: BTreeSet<String>,
}

impl SuppressionIndex {
    /// True when any alias of `entity` is protected.
    pub fn suppresses(&self, entity: &MediaItem) -> bool {
        !self.keys.is_empty() && aliases(entity).iter().any(|key| self.keys.contains(key))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// File-backed global tombstone store. Constructed from an injected TTL
/// policy and an explicit base directory — no implicit singletons.
#[derive(Debug, Clone)]
pub struct GlobalTombstoneStore {
    path: PathBuf,
    ttl: TtlPolicy,
}

impl GlobalTombstoneStore {
    pub fn new(base: impl Into<PathBuf>, ttl: TtlPolicy) -> Self {
        Self {
            path: base.into().join("tombstones.json"),
            ttl,
        }
    }

    /// Reinitialize the document when it carries a foreign model or an older
    /// version. Legacy content is dropped, not migrated.
    pub fn ensure_model(&self) -> Result<(), StoreError> {
        let doc: TombstoneDocument = load_or_default(&self.path);
        if doc.model != MODEL || doc.version < VERSION {
            save_atomic(&self.path, &TombstoneDocument::default())?;
        }
        Ok(())
    }

    /// Persist a negative tombstone for every alias of `entity`.
    ///
    /// No-op unless the scope dimension is negative (remove / unrate /
    /// unscrobble). Upsert semantics: existing entries for the same
    /// (feature, dimension) with overlapping keys are replaced by the newer
    /// record, bounding document growth.
    pub fn record_negative(
        &self,
        entity: &MediaItem,
        scope: WriteScope,
        origin: &ProviderName,
        pair: Option<&PairId>,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        self.record_negative_at(entity, scope, origin, pair, note, Utc::now())
    }

    /// `record_negative` with an explicit timestamp; used by tests.
    pub fn record_negative_at(
        &self,
        entity: &MediaItem,
        scope: WriteScope,
        origin: &ProviderName,
        pair: Option<&PairId>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.record_negatives_at(std::slice::from_ref(entity), scope, origin, pair, note, now)
    }

    /// Batch form of [`record_negative`](Self::record_negative): one
    /// document load and one atomic write for a whole removal batch.
    pub fn record_negatives(
        &self,
        entities: &[MediaItem],
        scope: WriteScope,
        origin: &ProviderName,
        pair: Option<&PairId>,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        self.record_negatives_at(entities, scope, origin, pair, note, Utc::now())
    }

    /// `record_negatives` with an explicit timestamp; used by tests.
    pub fn record_negatives_at(
        &self,
        entities: &[MediaItem],
        scope: WriteScope,
        origin: &ProviderName,
        pair: Option<&PairId>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !scope.dim.is_negative() || entities.is_empty() {
            return Ok(());
        }

        let ttl_secs = self.ttl.resolve(scope.feature);
        let mut doc: TombstoneDocument = load_or_default(&self.path);
        for entity in entities {
            let keys = aliases(entity);
            doc.entries.retain(|old| {
                old.scope.feature != scope.feature
                    || old.scope.dim != scope.dim
                    || !any_key_overlap(&old.keys, &keys)
            });
            doc.entries.push(TombstoneEntry {
                keys,
                scope,
                origin: origin.0.clone(),
                ts_iso: now,
                propagate_until_iso: now + Duration::seconds(ttl_secs),
                note: note.map(str::to_owned),
                pair_ids: pair.map(|p| vec![p.0.clone()]),
            });
        }
        doc.keys = flatten_keys(&doc.entries);
        doc.updated_at = now;
        doc.ttl_sec = ttl_secs;
        save_atomic(&self.path, &doc)?;
        log::debug!(
            "global tombstones recorded: feature={} dim={} origin={origin} count={}",
            scope.feature,
            scope.dim,
            entities.len()
        );
        Ok(())
    }

    /// True when an active entry for the same feature has an alias key in
    /// common with `entity` and a dimension opposing `attempted_write`.
    pub fn should_suppress(
        &self,
        entity: &MediaItem,
        feature: Feature,
        attempted_write: Dimension,
    ) -> bool {
        self.should_suppress_at(entity, feature, attempted_write, Utc::now())
    }

    /// `should_suppress` with an explicit now; used by tests.
    pub fn should_suppress_at(
        &self,
        entity: &MediaItem,
        feature: Feature,
        attempted_write: Dimension,
        now: DateTime<Utc>,
    ) -> bool {
        self.suppression_index_at(feature, attempted_write, now)
            .suppresses(entity)
    }

    /// Every alias key an active opposing entry protects against
    /// `attempted_write`, loaded in a single read so batch filtering does
    /// not re-parse the document per candidate item.
    pub fn suppression_index(
        &self,
        feature: Feature,
        attempted_write: Dimension,
    ) -> SuppressionIndex {
        self.suppression_index_at(feature, attempted_write, Utc::now())
    }

    /// `suppression_index` with an explicit now; used by tests.
    pub fn suppression_index_at(
        &self,
        feature: Feature,
        attempted_write: Dimension,
        now: DateTime<Utc>,
    ) -> SuppressionIndex {
        let doc: TombstoneDocument = load_or_default(&self.path);
        let opposing = attempted_write.opposing();
        let keys = doc
            .entries
            .iter()
            .filter(|entry| {
                entry.scope.feature == feature
                    && entry.scope.dim == opposing
                    && entry.propagate_until_iso > now
            })
            .flat_map(|entry| entry.keys.iter().cloned())
            .collect();
        SuppressionIndex { keys }
    }

    /// Remove entries past their propagate-until timestamp. Returns the
    /// removed count.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        self.purge_expired_at(Utc::now())
    }

    /// `purge_expired` with an explicit now; used by tests.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut doc: TombstoneDocument = load_or_default(&self.path);
        let before = doc.entries.len();
        doc.entries.retain(|entry| entry.propagate_until_iso > now);
        let removed = before - doc.entries.len();
        if removed > 0 {
            doc.keys = flatten_keys(&doc.entries);
            doc.updated_at = now;
            save_atomic(&self.path, &doc)?;
            log::debug!("global tombstones purged: removed={removed}");
        }
        Ok(removed)
    }

    pub fn ttl(&self) -> &TtlPolicy {
        &self.ttl
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
