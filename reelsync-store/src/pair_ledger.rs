//! Pair tombstone ledger.
//!
//! Records the canonical keys the engine itself removed, scoped by
//! (feature, unordered pair). The two-way reconciler reads it to tell
//! "absent because we removed it" from "absent for an unrelated reason".
//!
//! Persisted at `<base>/pair_tombstones.json` as
//! `{ "keys": { "<feature>:<pair>|<key>": epoch }, "pruned_at": epoch }`.
//!
//! Entries are first-seen-wins: re-marking a key never refreshes its epoch,
//! so a tombstone expires `ttl` after the *first* removal.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use reelsync_core::{Feature, PairId};

use crate::document::{load_or_default, save_atomic};
use crate::error::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairLedgerDocument {
    #[serde(default)]
    pub keys: BTreeMap<String, i64>,
    #[serde(default)]
    pub pruned_at: Option<i64>,
}

/// File-backed ledger rooted at an explicit base directory.
#[derive(Debug, Clone)]
pub struct PairTombstoneLedger {
    path: PathBuf,
}

fn scoped(feature: Feature, pair: &PairId, key: &str) -> String {
    format!("{feature}:{pair}|{key}")
}

impl PairTombstoneLedger {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            path: base.into().join("pair_tombstones.json"),
        }
    }

    /// Record removal epochs for `keys`, first-seen-wins. Returns how many
    /// entries were newly added.
    pub fn mark<I, S>(&self, feature: Feature, pair: &PairId, keys: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.mark_at(feature, pair, keys, Utc::now().timestamp())
    }

    /// `mark` with an explicit epoch; used by tests.
    pub fn mark_at<I, S>(
        &self,
        feature: Feature,
        pair: &PairId,
        keys: I,
        now: i64,
    ) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut doc: PairLedgerDocument = load_or_default(&self.path);
        let mut added = 0;
        for key in keys {
            let scoped = scoped(feature, pair, key.as_ref());
            if !doc.keys.contains_key(&scoped) {
                doc.keys.insert(scoped, now);
                added += 1;
            }
        }
        if added > 0 {
            save_atomic(&self.path, &doc)?;
            log::debug!("pair tombstones marked: feature={feature} pair={pair} added={added}");
        }
        Ok(added)
    }

    /// Keys removed by the engine for (feature, pair) within `ttl_secs`.
    pub fn active(&self, feature: Feature, pair: &PairId, ttl_secs: i64) -> BTreeSet<String> {
        self.active_at(feature, pair, ttl_secs, Utc::now().timestamp())
    }

    /// `active` with an explicit now; used by tests.
    pub fn active_at(
        &self,
        feature: Feature,
        pair: &PairId,
        ttl_secs: i64,
        now: i64,
    ) -> BTreeSet<String> {
        let doc: PairLedgerDocument = load_or_default(&self.path);
        let prefix = format!("{feature}:{pair}|");
        doc.keys
            .iter()
            .filter(|(scoped, &epoch)| {
                scoped.starts_with(&prefix) && now - epoch < ttl_secs
            })
            .map(|(scoped, _)| scoped[prefix.len()..].to_owned())
            .collect()
    }

    /// True when any entry exists for (feature, pair), active or expired.
    /// The bootstrap guard uses this to detect prior reconciliation history.
    pub fn has_history(&self, feature: Feature, pair: &PairId) -> bool {
        let doc: PairLedgerDocument = load_or_default(&self.path);
        let prefix = format!("{feature}:{pair}|");
        doc.keys.keys().any(|scoped| scoped.starts_with(&prefix))
    }

    /// Drop entries older than `ttl_secs` across all features and pairs.
    /// Runs once per coordinator pass. Returns the removed count.
    pub fn prune(&self, ttl_secs: i64) -> Result<usize, StoreError> {
        self.prune_at(ttl_secs, Utc::now().timestamp())
    }

    /// `prune` with an explicit now; used by tests.
    pub fn prune_at(&self, ttl_secs: i64, now: i64) -> Result<usize, StoreError> {
        let mut doc: PairLedgerDocument = load_or_default(&self.path);
        let before = doc.keys.len();
        doc.keys.retain(|_, &mut epoch| now - epoch < ttl_secs);
        let removed = before - doc.keys.len();
        doc.pruned_at = Some(now);
        save_atomic(&self.path, &doc)?;
        if removed > 0 {
            log::debug!("pair tombstones pruned: removed={removed} kept={}", doc.keys.len());
        }
        Ok(removed)
    }
}
