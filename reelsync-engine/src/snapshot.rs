//! Snapshot builder and differ.
//!
//! A snapshot is one provider's view of one feature, canonicalized into a
//! `canonical key → item` map. All planning is pure set arithmetic over
//! snapshots and committed baselines; nothing here touches the network or
//! the filesystem.

use std::collections::BTreeMap;

use reelsync_core::{aliases, canonical_key, Feature, MediaItem};

use crate::observer::{Observer, SyncEvent};
use crate::provider::{IndexSemantics, ProviderAdapter};

/// Canonical view of one (provider, feature) at one instant.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub items: BTreeMap<String, MediaItem>,
    pub checkpoint: Option<String>,
    /// True when the adapter index read failed and this snapshot is a stand-in.
    pub degraded: bool,
}

/// Read and canonicalize a provider index.
///
/// Adapter failure degrades to an empty snapshot rather than an error: the
/// run continues, and because planning against an empty *source* produces no
/// removals past the bootstrap guard, a flaky provider can never trigger a
/// mass delete on the other side.
pub fn build_snapshot(
    adapter: &dyn ProviderAdapter,
    feature: Feature,
    checkpoint: Option<&str>,
    observer: &dyn Observer,
) -> Snapshot {
    let items = match adapter.build_index(feature, checkpoint) {
        Ok(items) => items,
        Err(e) => {
            log::warn!(
                "index read failed for {}/{feature}: {e}; continuing on empty snapshot",
                adapter.identity()
            );
            observer.event(&SyncEvent::ProviderDegraded {
                provider: adapter.identity(),
                feature,
            });
            return Snapshot {
                degraded: true,
                ..Snapshot::default()
            };
        }
    };

    let mut view = BTreeMap::new();
    for item in items {
        view.entry(canonical_key(&item).0).or_insert(item);
    }
    Snapshot {
        items: view,
        checkpoint: adapter.activities(),
        degraded: false,
    }
}

/// The view reconcilers plan against.
///
/// Full-index providers report everything, so the fresh snapshot *is* the
/// view. Delta providers report only changes since the checkpoint; absence
/// means nothing there, so the committed baseline is unioned back in with
/// fresh entries winning per key.
pub fn effective_view(
    baseline: &BTreeMap<String, MediaItem>,
    fresh: &BTreeMap<String, MediaItem>,
    semantics: IndexSemantics,
) -> BTreeMap<String, MediaItem> {
    match semantics {
        IndexSemantics::Full => fresh.clone(),
        IndexSemantics::Delta => {
            let mut view = baseline.clone();
            for (key, item) in fresh {
                view.insert(key.clone(), item.clone());
            }
            view
        }
    }
}

// ---------------------------------------------------------------------------
// Alias matching
// ---------------------------------------------------------------------------

/// `alias → canonical key` lookup over one view. Lets two providers that
/// know the same entity under different id namespaces match without a
/// spurious add+remove pair.
pub fn alias_index(view: &BTreeMap<String, MediaItem>) -> BTreeMap<String, String> {
    let mut index = BTreeMap::new();
    for (key, item) in view {
        for alias in aliases(item) {
            index.entry(alias).or_insert_with(|| key.clone());
        }
    }
    index
}

/// The canonical key under which `item` is present in the indexed view, if
/// any alias of it matches.
pub fn present_in(index: &BTreeMap<String, String>, item: &MediaItem) -> Option<String> {
    aliases(item)
        .into_iter()
        .find_map(|alias| index.get(&alias).cloned())
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Items in `src_view` with no alias present in the destination.
pub fn missing_on_destination(
    src_view: &BTreeMap<String, MediaItem>,
    dst_index: &BTreeMap<String, String>,
) -> Vec<MediaItem> {
    src_view
        .values()
        .filter(|item| present_in(dst_index, item).is_none())
        .cloned()
        .collect()
}

/// Baseline entries whose key no longer appears in the current view — the
/// entries the user deleted since the last committed run. Returned as
/// `(canonical key, baseline item)`.
pub fn vanished_since_baseline(
    baseline: &BTreeMap<String, MediaItem>,
    current: &BTreeMap<String, MediaItem>,
) -> Vec<(String, MediaItem)> {
    let current_index = alias_index(current);
    baseline
        .iter()
        .filter(|(key, item)| {
            !current.contains_key(*key) && present_in(&current_index, item).is_none()
        })
        .map(|(key, item)| (key.clone(), item.clone()))
        .collect()
}

/// Value-aware ratings diff: upsert when the destination lacks the entry or
/// carries a different rating. Unrated source items never produce writes.
pub fn rating_upserts(
    src_view: &BTreeMap<String, MediaItem>,
    dst_view: &BTreeMap<String, MediaItem>,
    dst_index: &BTreeMap<String, String>,
) -> Vec<MediaItem> {
    src_view
        .values()
        .filter(|item| item.rating.is_some())
        .filter(|item| match present_in(dst_index, item) {
            Some(dst_key) => dst_view.get(&dst_key).and_then(|d| d.rating) != item.rating,
            None => true,
        })
        .cloned()
        .collect()
}
