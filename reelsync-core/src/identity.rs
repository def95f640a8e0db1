//! Canonical identity resolution across heterogeneous provider ID schemes.
//!
//! Every provider reports its own identifier namespaces (`imdb`, `tmdb`,
//! `plex`, …). The resolver derives one stable [`CanonicalKey`] per entity,
//! plus the full ordered alias list used for cross-provider matching and
//! tombstone overlap checks.
//!
//! Invariant: two items sharing any identifier-namespace value resolve to the
//! same key or alias-match into the same bucket.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{CanonicalKey, MediaItem, MediaKind};

/// Fixed namespace priority order used for canonical key selection.
pub const ID_PRIORITY: [&str; 8] = [
    "imdb", "tmdb", "tvdb", "trakt", "simkl", "plex", "guid", "slug",
];

/// Values that mean "no identifier" in the wild.
const SENTINELS: [&str; 7] = ["none", "null", "nan", "undefined", "unknown", "0", ""];

// Per-run-unique fallback for items with no identifiers and no title. Two
// such items must never collapse onto the same key.
static SYNTHETIC: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// 1. Normalization
// ---------------------------------------------------------------------------

/// Normalize a single identifier value so values from different providers
/// compare equal: numeric namespaces keep digits only, `imdb` is coerced to
/// `tt<digits>`, `slug` is lowercased, `guid` is kept verbatim.
pub fn normalize_id(namespace: &str, raw: &str) -> Option<String> {
    let ns = namespace.trim().to_lowercase();
    let value = raw.trim();
    if value.is_empty() || SENTINELS.contains(&value.to_lowercase().as_str()) {
        return None;
    }

    match ns.as_str() {
        "tmdb" | "tvdb" | "trakt" | "simkl" | "plex" | "jellyfin" => {
            let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
            (!digits.is_empty()).then_some(digits)
        }
        "imdb" => {
            let lower = value.to_lowercase();
            if let Some(pos) = lower.find("tt") {
                let digits: String = lower[pos + 2..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if !digits.is_empty() {
                    return Some(format!("tt{digits}"));
                }
            }
            let digits: String = lower.chars().filter(|c| c.is_ascii_digit()).collect();
            (!digits.is_empty()).then(|| format!("tt{digits}"))
        }
        "slug" => Some(value.to_lowercase()),
        _ => Some(value.to_owned()),
    }
}

/// Normalize a whole namespace → value map, dropping empty/sentinel entries.
pub fn normalized_ids(ids: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (ns, raw) in ids {
        let ns = ns.trim().to_lowercase();
        if let Some(v) = normalize_id(&ns, raw) {
            out.insert(ns, v);
        }
    }
    out
}

/// Fill-only merge of two id maps; existing values are never clobbered.
/// Used by enrichment to attach resolver results without losing stronger IDs.
pub fn merge_ids(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut out = normalized_ids(old);
    for (ns, v) in normalized_ids(new) {
        out.entry(ns).or_insert(v);
    }
    out
}

// ---------------------------------------------------------------------------
// 2. Canonical key
// ---------------------------------------------------------------------------

fn best_id_key(ids: &BTreeMap<String, String>) -> Option<String> {
    for ns in ID_PRIORITY {
        if let Some(v) = ids.get(ns) {
            return Some(format!("{ns}:{}", v.to_lowercase()));
        }
    }
    None
}

fn title_year_key(item: &MediaItem) -> Option<String> {
    let title = item.title.as_deref()?.trim();
    if title.is_empty() {
        return None;
    }
    let year = item.year.map(|y| y.to_string()).unwrap_or_default();
    Some(format!(
        "{}|title:{}|year:{year}",
        item.kind,
        title.to_lowercase()
    ))
}

/// `#sXXeYY` for episodes, `#season:N` for seasons. Episode keys must carry
/// the season/episode numbers so distinct episodes never collapse.
fn season_episode_fragment(item: &MediaItem) -> Option<String> {
    let season = item.season?;
    match item.kind {
        MediaKind::Season => Some(format!("#season:{season}")),
        MediaKind::Episode => {
            let episode = item.episode?;
            Some(format!("#s{season:02}e{episode:02}"))
        }
        _ => None,
    }
}

/// Show-level key for seasons/episodes: explicit `show_ids` preferred,
/// otherwise the item's own ids (most providers put show ids on episodes).
fn show_key(item: &MediaItem) -> Option<String> {
    if !item.show_ids.is_empty() {
        if let Some(k) = best_id_key(&normalized_ids(&item.show_ids)) {
            return Some(k);
        }
    }
    best_id_key(&normalized_ids(&item.ids))
}

fn synthetic_key() -> String {
    format!("unknown:{}", SYNTHETIC.fetch_add(1, Ordering::Relaxed))
}

/// One stable key per entity.
///
/// Seasons/episodes with a resolvable show id get the composite
/// `showkey#sXXeYY` form; otherwise the best-priority id wins, then the
/// `kind|title|year` fallback, then a per-run-unique synthetic key.
pub fn canonical_key(item: &MediaItem) -> CanonicalKey {
    if matches!(item.kind, MediaKind::Season | MediaKind::Episode) {
        if let (Some(show), Some(frag)) = (show_key(item), season_episode_fragment(item)) {
            return CanonicalKey(format!("{show}{frag}"));
        }
    }
    if let Some(k) = best_id_key(&normalized_ids(&item.ids)) {
        return CanonicalKey(k);
    }
    if let Some(k) = title_year_key(item) {
        return CanonicalKey(k);
    }
    CanonicalKey(synthetic_key())
}

// ---------------------------------------------------------------------------
// 3. Aliases
// ---------------------------------------------------------------------------

/// All keys that can represent this item, ordered and de-duplicated:
/// canonical key first, then every identifier-namespace key in priority
/// order, then the title/year fallback, then the episode composite.
pub fn aliases(item: &MediaItem) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |key: String| {
        if !out.contains(&key) {
            out.push(key);
        }
    };

    push(canonical_key(item).0);

    let ids = normalized_ids(&item.ids);
    for ns in ID_PRIORITY {
        if let Some(v) = ids.get(ns) {
            push(format!("{ns}:{}", v.to_lowercase()));
        }
    }

    if let Some(k) = title_year_key(item) {
        push(k);
    }

    if matches!(item.kind, MediaKind::Season | MediaKind::Episode) {
        if let (Some(show), Some(frag)) = (show_key(item), season_episode_fragment(item)) {
            push(format!("{show}{frag}"));
        }
    }

    out
}

/// True when the two key collections share at least one key.
pub fn any_key_overlap<'a, A, B>(a: A, b: B) -> bool
where
    A: IntoIterator<Item = &'a String>,
    B: IntoIterator<Item = &'a String>,
{
    let set: std::collections::BTreeSet<&str> = a.into_iter().map(String::as_str).collect();
    if set.is_empty() {
        return false;
    }
    b.into_iter().any(|k| set.contains(k.as_str()))
}

// ---------------------------------------------------------------------------
// 4. Minimal projection
// ---------------------------------------------------------------------------

/// Minimal persisted form of an item: normalized ids plus the fields the
/// baseline layout keeps. TV-safe — show ids survive for seasons/episodes.
pub fn minimal(item: &MediaItem) -> MediaItem {
    let mut out = MediaItem::new(item.kind);
    out.title = item.title.clone();
    out.year = item.year;
    out.ids = normalized_ids(&item.ids);
    out.rating = item.rating;
    out.rated_at = item.rated_at;
    out.watched_at = item.watched_at;
    if matches!(item.kind, MediaKind::Season | MediaKind::Episode) {
        out.season = item.season;
        out.episode = item.episode;
        out.show_ids = normalized_ids(&item.show_ids);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
