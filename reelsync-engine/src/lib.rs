//! # reelsync-engine
//!
//! Diff-and-apply reconciliation across media providers: snapshot both sides
//! of a configured pair, plan set differences over canonical identities, and
//! apply batched writes under tombstone suppression so deletions propagate
//! once and never resurrect.
//!
//! Hosts register adapters in a [`ProviderRegistry`], load a [`SyncConfig`],
//! and drive everything through [`Coordinator::run_pairs`].

pub mod config;
pub mod coordinator;
pub mod enrich;
pub mod error;
pub mod observer;
pub mod oneway;
pub mod provider;
pub mod retry;
pub mod snapshot;
pub mod twoway;
pub mod unit;

pub use config::{FeatureFlags, PairConfig, SyncConfig, SyncMode};
pub use coordinator::{Coordinator, RunSummary};
pub use enrich::{enrich_additions, has_ids_for, IdResolver};
pub use error::EngineError;
pub use observer::{NullObserver, Observer, SyncEvent};
pub use provider::{Capabilities, IndexSemantics, ProviderAdapter, ProviderRegistry, WriteOutcome};
pub use snapshot::{build_snapshot, effective_view, Snapshot};
pub use unit::{UnitContext, UnitOutcome};
