//! Shared plumbing for one (pair, feature) reconciliation unit.

use reelsync_core::{aliases, Dimension, Feature, MediaItem, PairId, ProviderName, WriteScope};
use reelsync_store::{GlobalTombstoneStore, PairTombstoneLedger, StateStore};

use crate::config::FeatureFlags;
use crate::enrich::IdResolver;
use crate::error::EngineError;
use crate::observer::{Observer, SyncEvent};
use crate::provider::ProviderAdapter;
use crate::retry::with_retry;

/// Everything one reconciliation unit needs, borrowed from the coordinator.
pub struct UnitContext<'a> {
    pub source: &'a dyn ProviderAdapter,
    pub target: &'a dyn ProviderAdapter,
    pub pair: PairId,
    pub feature: Feature,
    pub flags: FeatureFlags,
    pub state: &'a StateStore,
    pub global: &'a GlobalTombstoneStore,
    pub ledger: &'a PairTombstoneLedger,
    pub resolver: Option<&'a dyn IdResolver>,
    pub observer: &'a dyn Observer,
    pub dry_run: bool,
}

/// Counters for one unit; the coordinator sums these into the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    pub added: u64,
    pub removed: u64,
    pub errors: u64,
}

impl UnitOutcome {
    pub fn absorb(&mut self, other: UnitOutcome) {
        self.added += other.added;
        self.removed += other.removed;
        self.errors += other.errors;
    }
}

impl UnitContext<'_> {
    /// Issue one batched write with retry. Failures are counted, never
    /// propagated — a stuck batch must not abort the rest of the run.
    pub(crate) fn apply(
        &self,
        adapter: &dyn ProviderAdapter,
        dim: Dimension,
        items: &[MediaItem],
    ) -> (u64, u64) {
        if items.is_empty() {
            return (0, 0);
        }
        let provider = adapter.identity();
        let what = format!("{provider} {dim} x{} ({})", items.len(), self.feature);
        let result = with_retry(&what, || {
            if dim.is_negative() {
                adapter.remove(self.feature, items, self.dry_run)
            } else {
                adapter.add(self.feature, items, self.dry_run)
            }
        });
        match result {
            Ok(outcome) => {
                self.observer.event(&SyncEvent::Applied {
                    provider,
                    feature: self.feature,
                    dim,
                    count: outcome.count,
                    errors: outcome.errors.len(),
                });
                let partial = if outcome.errors.is_empty() { 0 } else { 1 };
                (outcome.count, partial)
            }
            Err(e) => {
                log::error!("{what} failed after retries: {e}");
                (0, 1)
            }
        }
    }

    /// Drop planned additions an active opposing tombstone forbids. The
    /// tombstone document is read once for the whole batch.
    pub(crate) fn filter_suppressed(&self, additions: Vec<MediaItem>) -> Vec<MediaItem> {
        if additions.is_empty() {
            return additions;
        }
        let index = self
            .global
            .suppression_index(self.feature, self.feature.positive_dimension());
        let before = additions.len();
        let allowed: Vec<MediaItem> = additions
            .into_iter()
            .filter(|item| !index.suppresses(item))
            .collect();
        let suppressed = before - allowed.len();
        if suppressed > 0 {
            self.observer.event(&SyncEvent::SuppressedByTombstone {
                pair: self.pair.clone(),
                feature: self.feature,
                count: suppressed,
            });
        }
        allowed
    }

    /// Persist global tombstones for items just removed. Skipped on dry runs.
    pub(crate) fn record_negatives(
        &self,
        origin: &ProviderName,
        items: &[MediaItem],
    ) -> Result<(), EngineError> {
        if self.dry_run {
            return Ok(());
        }
        let scope = WriteScope::new(self.feature, self.feature.negative_dimension());
        self.global
            .record_negatives(items, scope, origin, Some(&self.pair), None)?;
        Ok(())
    }

    /// Mark removed canonical keys in the pair ledger. Skipped on dry runs.
    pub(crate) fn mark_ledger<'k, I>(&self, keys: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = &'k String>,
    {
        if self.dry_run {
            return Ok(());
        }
        self.ledger.mark(self.feature, &self.pair, keys)?;
        Ok(())
    }

    pub(crate) fn ttl_secs(&self) -> i64 {
        self.global.ttl().resolve(self.feature)
    }
}

/// True when any alias of `item` is in the tombstoned key set.
pub(crate) fn hits_tombstone(
    item: &MediaItem,
    tombstoned: &std::collections::BTreeSet<String>,
) -> bool {
    aliases(item).iter().any(|k| tombstoned.contains(k))
}
