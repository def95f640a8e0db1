//! # reelsync-store
//!
//! File-backed persistence for the Reelsync reconciliation engine: the
//! baseline/checkpoint state store, the global tombstone store, and the
//! per-pair tombstone ledger. All documents share one repository discipline
//! (fail-open reads, atomic replace writes) implemented in [`document`].

pub mod document;
pub mod error;
pub mod global_tombstones;
pub mod pair_ledger;
pub mod state;

pub use document::{load_or_default, save_atomic};
pub use error::StoreError;
pub use global_tombstones::{
    GlobalTombstoneStore, SuppressionIndex, TombstoneDocument, TombstoneEntry, TtlPolicy,
};
pub use pair_ledger::{PairLedgerDocument, PairTombstoneLedger};
pub use state::{Baseline, FeatureState, LastRunRecord, StateDocument, StateStore};
