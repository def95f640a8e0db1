//! Domain types for the Reelsync reconciliation engine.
//!
//! A [`MediaItem`] is one media entity as reported by one provider at one
//! instant. Items are never persisted alone; they live inside snapshots and
//! baselines keyed by canonical key (see [`crate::identity`]).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed provider name. Always stored uppercased so lookups and
/// pair identifiers are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderName(pub String);

impl ProviderName {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().trim().to_uppercase())
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ProviderName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unordered pair identifier: the two provider names sorted and joined with
/// `-`, so `(A, B)` and `(B, A)` scope the same ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairId(pub String);

impl PairId {
    pub fn of(a: &ProviderName, b: &ProviderName) -> Self {
        let mut names = [a.0.as_str(), b.0.as_str()];
        names.sort_unstable();
        Self(format!("{}-{}", names[0], names[1]))
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Deterministic identity string used to match the same media item across
/// providers. Produced only by [`crate::identity::canonical_key`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalKey(pub String);

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CanonicalKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A syncable per-user collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Watchlist,
    Ratings,
    History,
    Playlists,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Watchlist,
        Feature::Ratings,
        Feature::History,
        Feature::Playlists,
    ];

    /// The dimension a forward write uses for this feature.
    pub fn positive_dimension(self) -> Dimension {
        match self {
            Feature::Watchlist | Feature::Playlists => Dimension::Add,
            Feature::Ratings => Dimension::Rate,
            Feature::History => Dimension::Scrobble,
        }
    }

    /// The dimension recorded when an entry is deleted from this feature.
    pub fn negative_dimension(self) -> Dimension {
        match self {
            Feature::Watchlist | Feature::Playlists => Dimension::Remove,
            Feature::Ratings => Dimension::Unrate,
            Feature::History => Dimension::Unscrobble,
        }
    }

    /// Hard-default tombstone TTL, overridable via config (see reelsync-store).
    pub fn default_tombstone_ttl_secs(self) -> i64 {
        match self {
            Feature::Watchlist | Feature::Playlists => 7 * 24 * 3600,
            Feature::Ratings => 3 * 24 * 3600,
            Feature::History => 2 * 24 * 3600,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Watchlist => write!(f, "watchlist"),
            Feature::Ratings => write!(f, "ratings"),
            Feature::History => write!(f, "history"),
            Feature::Playlists => write!(f, "playlists"),
        }
    }
}

/// Write dimension for tombstone scoping. A tombstone recorded with a
/// negative dimension suppresses only the *opposing* positive write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Add,
    Remove,
    Rate,
    Unrate,
    Scrobble,
    Unscrobble,
}

impl Dimension {
    pub fn opposing(self) -> Dimension {
        match self {
            Dimension::Add => Dimension::Remove,
            Dimension::Remove => Dimension::Add,
            Dimension::Rate => Dimension::Unrate,
            Dimension::Unrate => Dimension::Rate,
            Dimension::Scrobble => Dimension::Unscrobble,
            Dimension::Unscrobble => Dimension::Scrobble,
        }
    }

    /// Only negative dimensions create tombstones.
    pub fn is_negative(self) -> bool {
        matches!(
            self,
            Dimension::Remove | Dimension::Unrate | Dimension::Unscrobble
        )
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Add => write!(f, "add"),
            Dimension::Remove => write!(f, "remove"),
            Dimension::Rate => write!(f, "rate"),
            Dimension::Unrate => write!(f, "unrate"),
            Dimension::Scrobble => write!(f, "scrobble"),
            Dimension::Unscrobble => write!(f, "unscrobble"),
        }
    }
}

/// (feature, dimension) scope attached to every tombstone entry and write
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteScope {
    #[serde(rename = "list")]
    pub feature: Feature,
    pub dim: Dimension,
}

impl WriteScope {
    pub fn new(feature: Feature, dim: Dimension) -> Self {
        Self { feature, dim }
    }
}

/// Media entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Movie,
    Show,
    Season,
    Episode,
}

impl MediaKind {
    /// Permissive parse: providers report "movies", "tv", "series", "eps", …
    pub fn parse(raw: &str) -> MediaKind {
        match raw.trim().to_lowercase().as_str() {
            "show" | "shows" | "series" | "tv" => MediaKind::Show,
            "season" | "seasons" => MediaKind::Season,
            "episode" | "episodes" | "ep" | "eps" => MediaKind::Episode,
            _ => MediaKind::Movie,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Show => write!(f, "show"),
            MediaKind::Season => write!(f, "season"),
            MediaKind::Episode => write!(f, "episode"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One media entity as reported by one provider at one instant.
///
/// `ids` is a namespace → value map (`imdb`, `tmdb`, …); `show_ids` carries
/// show-level identifiers for seasons/episodes so episode keys don't collapse
/// onto each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub ids: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub show_ids: BTreeMap<String, String>,
}

impl MediaItem {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            title: None,
            year: None,
            ids: BTreeMap::new(),
            rating: None,
            rated_at: None,
            watched_at: None,
            season: None,
            episode: None,
            show_ids: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, namespace: &str, value: &str) -> Self {
        self.ids.insert(namespace.to_owned(), value.to_owned());
        self
    }

    pub fn with_title(mut self, title: &str, year: Option<i32>) -> Self {
        self.title = Some(title.to_owned());
        self.year = year;
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }
}
