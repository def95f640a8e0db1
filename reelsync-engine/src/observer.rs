//! Run observability seam.
//!
//! The engine emits every noteworthy moment through one [`Observer`] hook and
//! never aggregates statistics itself. Hosts plug in whatever sink they want
//! (progress bars, counters, webhooks); the default [`NullObserver`] drops
//! everything.

use reelsync_core::{Dimension, Feature, PairId, ProviderName};

/// One engine event. Counts are plan/apply sizes, never item payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    RunStarted {
        pairs: usize,
        dry_run: bool,
    },
    RunFinished {
        added: u64,
        removed: u64,
        errors: u64,
    },
    PairStarted {
        pair: PairId,
    },
    /// Plan sizes for one (pair, feature) unit, before any write.
    PlanReady {
        pair: PairId,
        feature: Feature,
        additions: usize,
        removals: usize,
    },
    /// Outcome of one batched write.
    Applied {
        provider: ProviderName,
        feature: Feature,
        dim: Dimension,
        count: u64,
        errors: usize,
    },
    /// An adapter index read failed; the unit continued on an empty snapshot.
    ProviderDegraded {
        provider: ProviderName,
        feature: Feature,
    },
    /// Additions dropped because an active tombstone opposed them.
    SuppressedByTombstone {
        pair: PairId,
        feature: Feature,
        count: usize,
    },
    /// First run for a unit: removals were withheld.
    BootstrapGuard {
        pair: PairId,
        feature: Feature,
    },
}

pub trait Observer {
    fn event(&self, event: &SyncEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn event(&self, _event: &SyncEvent) {}
}
