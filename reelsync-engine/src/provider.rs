//! Provider adapter contract and registry.
//!
//! Every media backend (Plex, Trakt, Simkl, Jellyfin, …) plugs in through
//! [`ProviderAdapter`]. The engine only ever talks to the trait: it asks for
//! capabilities up front, reads a full or delta index per feature, and issues
//! batched add/remove writes. Adapters are registered explicitly at startup
//! in a [`ProviderRegistry`]; there is no discovery or module scanning.

use std::collections::BTreeMap;

use reelsync_core::{Feature, MediaItem, ProviderName};

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Whether `build_index` returns the complete collection or only changes
/// since the last checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexSemantics {
    /// The index is the whole collection; absence means deleted.
    #[default]
    Full,
    /// The index holds additions since the last checkpoint; absence means
    /// nothing. Effective views union the baseline back in.
    Delta,
}

/// Static description of what an adapter can do, consulted before any call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The provider returns authoritative external ids, so enrichment is
    /// unnecessary when writing *to* it.
    pub provides_ids: bool,
    /// The provider accepts writes (some are read-only mirrors).
    pub bidirectional: bool,
    pub index_semantics: IndexSemantics,
    /// Whether a key vanishing from this provider's index may be treated as
    /// a user deletion. Providers with flaky listings set this to false.
    pub observed_deletes: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            provides_ids: false,
            bidirectional: true,
            index_semantics: IndexSemantics::Full,
            observed_deletes: true,
        }
    }
}

/// Result of one batched write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub ok: bool,
    /// Entries the provider confirmed applied.
    pub count: u64,
    pub errors: Vec<String>,
}

impl WriteOutcome {
    pub fn applied(count: u64) -> Self {
        Self {
            ok: true,
            count,
            errors: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// One media backend. Implementations own their transport and auth; the
/// engine never sees either.
pub trait ProviderAdapter {
    fn identity(&self) -> ProviderName;

    fn supports(&self, feature: Feature) -> bool;

    fn capabilities(&self) -> Capabilities;

    /// Read the provider's index for a feature. `checkpoint` is the opaque
    /// cursor stored after the previous run, meaningful only to
    /// delta-semantics providers.
    fn build_index(
        &self,
        feature: Feature,
        checkpoint: Option<&str>,
    ) -> Result<Vec<MediaItem>, EngineError>;

    /// Batched positive write (add / rate / scrobble). With `dry_run` the
    /// adapter must perform no side effect and report the would-be count.
    fn add(
        &self,
        feature: Feature,
        items: &[MediaItem],
        dry_run: bool,
    ) -> Result<WriteOutcome, EngineError>;

    /// Batched negative write (remove / unrate / unscrobble).
    fn remove(
        &self,
        feature: Feature,
        items: &[MediaItem],
        dry_run: bool,
    ) -> Result<WriteOutcome, EngineError>;

    /// Opaque checkpoint to persist after a successful run. `None` keeps the
    /// previous one.
    fn activities(&self) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Explicit adapter registry built once at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<ProviderName, Box<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own identity. Re-registering the same
    /// provider replaces the previous adapter.
    pub fn register(&mut self, adapter: Box<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.identity(), adapter);
    }

    pub fn get(&self, name: &ProviderName) -> Result<&dyn ProviderAdapter, EngineError> {
        self.adapters
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| EngineError::UnknownProvider(name.clone()))
    }

    pub fn names(&self) -> impl Iterator<Item = &ProviderName> {
        self.adapters.keys()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
