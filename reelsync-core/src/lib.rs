//! # reelsync-core
//!
//! Domain types and the canonical identity resolver shared by the Reelsync
//! stores and reconciliation engine.

pub mod identity;
pub mod types;

pub use identity::{aliases, any_key_overlap, canonical_key, merge_ids, minimal};
pub use types::{
    CanonicalKey, Dimension, Feature, MediaItem, MediaKind, PairId, ProviderName, WriteScope,
};
