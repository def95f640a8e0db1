//! Identifier enrichment for planned additions.
//!
//! Destinations that don't return authoritative ids (`provides_ids: false`)
//! often can't ingest an item known only by one foreign namespace. Before
//! the add phase, items missing both `imdb` and `tmdb` are batched into a
//! single [`IdResolver`] lookup and the results merged fill-only, so an id
//! the source already had is never clobbered. Items the destination still
//! can't address afterwards are dropped for this pass and retried next run.

use std::collections::BTreeMap;

use reelsync_core::{merge_ids, MediaItem, ProviderName};

/// External id lookup (typically TMDb-backed). One call per unit, batched.
pub trait IdResolver {
    /// Resolve ids for each item; `None` where no confident match exists.
    /// The result must be index-aligned with the input.
    fn resolve(&self, items: &[MediaItem]) -> Vec<Option<BTreeMap<String, String>>>;
}

/// Id namespaces each provider can ingest on write. Unknown providers get
/// the common denominator.
pub fn accepted_namespaces(provider: &ProviderName) -> &'static [&'static str] {
    match provider.0.as_str() {
        "TRAKT" => &["trakt", "tmdb", "imdb", "tvdb"],
        "SIMKL" => &["imdb", "tmdb", "tvdb", "slug"],
        "PLEX" => &["plex", "guid", "imdb", "tmdb", "tvdb", "trakt"],
        "JELLYFIN" => &["jellyfin", "imdb", "tmdb", "tvdb", "slug"],
        _ => &["tmdb", "imdb", "tvdb", "trakt", "slug"],
    }
}

/// True when the destination can address this item by at least one id.
pub fn has_ids_for(destination: &ProviderName, item: &MediaItem) -> bool {
    accepted_namespaces(destination)
        .iter()
        .any(|ns| item.ids.contains_key(*ns))
}

fn needs_enrichment(item: &MediaItem) -> bool {
    !item.ids.contains_key("imdb") && !item.ids.contains_key("tmdb")
}

/// Enrich and filter planned additions for a destination.
///
/// Rating and watch timestamps survive enrichment untouched; only the id
/// map grows. Returns the items still addressable by the destination.
pub fn enrich_additions(
    items: Vec<MediaItem>,
    resolver: Option<&dyn IdResolver>,
    destination: &ProviderName,
) -> Vec<MediaItem> {
    let mut items = items;

    if let Some(resolver) = resolver {
        let wanted: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| needs_enrichment(item))
            .map(|(i, _)| i)
            .collect();
        if !wanted.is_empty() {
            let batch: Vec<MediaItem> = wanted.iter().map(|&i| items[i].clone()).collect();
            let resolved = resolver.resolve(&batch);
            for (slot, ids) in wanted.into_iter().zip(resolved) {
                if let Some(ids) = ids {
                    items[slot].ids = merge_ids(&items[slot].ids, &ids);
                }
            }
        }
    }

    let before = items.len();
    items.retain(|item| has_ids_for(destination, item));
    let dropped = before - items.len();
    if dropped > 0 {
        log::debug!("dropped {dropped} additions {destination} cannot address; will retry next run");
    }
    items
}
