//! Run coordinator.
//!
//! Walks the configured pairs sequentially and runs one reconciliation unit
//! per enabled (pair, feature). Unit failures are logged and counted but
//! never abort the remaining units — one sick provider must not stall the
//! whole run. Tombstone maintenance (ledger prune, global purge) happens
//! exactly once per run, before any unit.

use std::path::PathBuf;

use chrono::Utc;

use reelsync_core::Feature;
use reelsync_store::{GlobalTombstoneStore, LastRunRecord, PairTombstoneLedger, StateStore};

use crate::config::{PairConfig, SyncConfig, SyncMode};
use crate::enrich::IdResolver;
use crate::error::EngineError;
use crate::observer::{Observer, SyncEvent};
use crate::provider::ProviderRegistry;
use crate::unit::{UnitContext, UnitOutcome};
use crate::{oneway, twoway};

/// Aggregate result of one coordinator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ok: bool,
    pub added: u64,
    pub removed: u64,
    pub errors: u64,
    /// Pairs actually executed (enabled pairs with registered adapters).
    pub pairs: usize,
}

pub struct Coordinator<'a> {
    registry: &'a ProviderRegistry,
    config: SyncConfig,
    state: StateStore,
    global: GlobalTombstoneStore,
    ledger: PairTombstoneLedger,
    resolver: Option<&'a dyn IdResolver>,
    observer: &'a dyn Observer,
}

impl<'a> Coordinator<'a> {
    /// All persisted documents live under `base`.
    pub fn new(
        registry: &'a ProviderRegistry,
        config: SyncConfig,
        base: impl Into<PathBuf>,
        observer: &'a dyn Observer,
    ) -> Self {
        let base = base.into();
        let global = GlobalTombstoneStore::new(&base, config.tombstones.clone());
        let ledger = PairTombstoneLedger::new(&base);
        let state = StateStore::new(&base);
        Self {
            registry,
            config,
            state,
            global,
            ledger,
            resolver: None,
            observer,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a dyn IdResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Run every enabled pair. Returns the aggregate summary; `Err` only for
    /// setup-level failures (store writes), never for unit errors.
    pub fn run_pairs(&self, dry_run: bool) -> Result<RunSummary, EngineError> {
        let started_at = Utc::now().timestamp();
        let enabled: Vec<&PairConfig> =
            self.config.pairs.iter().filter(|p| p.enabled).collect();
        self.observer.event(&SyncEvent::RunStarted {
            pairs: enabled.len(),
            dry_run,
        });
        log::info!("sync run started: {} pair(s), dry_run={dry_run}", enabled.len());

        if !dry_run {
            self.global.ensure_model()?;
            let purged = self.global.purge_expired()?;
            // The ledger holds mixed-TTL entries; prune with the longest so
            // shorter-lived entries are only ever dropped late, never early.
            let max_ttl = Feature::ALL
                .into_iter()
                .map(|f| self.config.tombstones.resolve(f))
                .max()
                .unwrap_or_default();
            let pruned = self.ledger.prune(max_ttl)?;
            log::debug!("tombstone maintenance: purged={purged} pruned={pruned}");
        }

        let mut total = UnitOutcome::default();
        let mut pairs_run = 0usize;
        for pair in enabled {
            match self.run_pair(pair, dry_run) {
                Ok(outcome) => {
                    pairs_run += 1;
                    total.absorb(outcome);
                }
                Err(e) => {
                    log::error!("pair {} skipped: {e}", pair.pair_id());
                    total.errors += 1;
                }
            }
        }

        let finished_at = Utc::now().timestamp();
        if !dry_run {
            let mut doc = self.state.load();
            doc.last_sync_epoch = Some(finished_at);
            self.state.save(&doc)?;
            self.state.save_last_run(&LastRunRecord {
                started_at,
                finished_at,
                added: total.added,
                removed: total.removed,
                errors: total.errors,
            })?;
        }

        self.observer.event(&SyncEvent::RunFinished {
            added: total.added,
            removed: total.removed,
            errors: total.errors,
        });
        log::info!(
            "sync run finished: added={} removed={} errors={}",
            total.added,
            total.removed,
            total.errors
        );
        Ok(RunSummary {
            ok: total.errors == 0,
            added: total.added,
            removed: total.removed,
            errors: total.errors,
            pairs: pairs_run,
        })
    }

    /// Run every enabled feature of one pair. `Err` only when an adapter is
    /// missing; per-unit failures are absorbed into the outcome.
    pub fn run_pair(&self, pair: &PairConfig, dry_run: bool) -> Result<UnitOutcome, EngineError> {
        let pair_id = pair.pair_id();
        self.observer.event(&SyncEvent::PairStarted {
            pair: pair_id.clone(),
        });
        let source = self.registry.get(&pair.source_name())?;
        let target = self.registry.get(&pair.target_name())?;

        let mut total = UnitOutcome::default();
        for (feature, flags) in pair.enabled_features() {
            // Capability short-circuit: never call into an adapter that
            // can't serve this unit.
            if !source.supports(feature) || !target.supports(feature) {
                log::debug!("{pair_id}/{feature}: unsupported on one side, skipping");
                continue;
            }
            let writable = match pair.mode {
                SyncMode::OneWay => target.capabilities().bidirectional,
                SyncMode::TwoWay => {
                    source.capabilities().bidirectional && target.capabilities().bidirectional
                }
            };
            if !writable {
                log::warn!("{pair_id}/{feature}: destination is read-only, skipping");
                continue;
            }

            let ctx = UnitContext {
                source,
                target,
                pair: pair_id.clone(),
                feature,
                flags,
                state: &self.state,
                global: &self.global,
                ledger: &self.ledger,
                resolver: self.config.enrichment.then_some(self.resolver).flatten(),
                observer: self.observer,
                dry_run,
            };
            let result = match pair.mode {
                SyncMode::OneWay => oneway::run(&ctx),
                SyncMode::TwoWay => twoway::run(&ctx),
            };
            match result {
                Ok(outcome) => total.absorb(outcome),
                Err(e) => {
                    log::error!("{pair_id}/{feature} failed: {e}");
                    total.errors += 1;
                }
            }
        }
        Ok(total)
    }
}
