//! End-to-end reconciliation runs against in-memory mock providers.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use common::{init_logs, movie, Handle, MockProvider, RecordingObserver};
use reelsync_core::{Feature, MediaItem, MediaKind};
use reelsync_engine::{
    Capabilities, Coordinator, FeatureFlags, IdResolver, IndexSemantics, NullObserver, PairConfig,
    ProviderRegistry, SyncConfig, SyncEvent, SyncMode,
};

fn features(list: &[(Feature, bool)]) -> BTreeMap<Feature, FeatureFlags> {
    list.iter()
        .map(|&(f, remove)| {
            (
                f,
                FeatureFlags {
                    enable: true,
                    remove,
                },
            )
        })
        .collect()
}

fn pair_cfg(
    source: &str,
    target: &str,
    mode: SyncMode,
    feats: &[(Feature, bool)],
) -> PairConfig {
    PairConfig {
        source: source.into(),
        target: target.into(),
        mode,
        enabled: true,
        features: features(feats),
    }
}

fn registry(providers: &[&Arc<MockProvider>]) -> ProviderRegistry {
    init_logs();
    let mut registry = ProviderRegistry::new();
    for p in providers {
        registry.register(Box::new(Handle(Arc::clone(p))));
    }
    registry
}

const WL: Feature = Feature::Watchlist;
const RT: Feature = Feature::Ratings;

// ---------------------------------------------------------------------------
// One-way
// ---------------------------------------------------------------------------

#[test]
fn one_way_mirrors_additions_and_is_idempotent() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));
    plex.seed(WL, movie("tt2"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let coordinator = Coordinator::new(&registry, config, base.path(), &NullObserver);

    let first = coordinator.run_pairs(false).unwrap();
    assert!(first.ok);
    assert_eq!(first.added, 2);
    assert_eq!(first.removed, 0);
    assert!(trakt.has(WL, "imdb", "tt1") && trakt.has(WL, "imdb", "tt2"));

    // Converged state: the second run plans nothing.
    let second = coordinator.run_pairs(false).unwrap();
    assert_eq!((second.added, second.removed, second.errors), (0, 0, 0));
}

#[test]
fn alias_equivalent_items_produce_no_writes() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    // Same movie, disjoint strongest ids but a shared tmdb value.
    plex.seed(WL, movie("tt0133093").with_id("tmdb", "603"));
    trakt.seed(WL, MediaItem::new(MediaKind::Movie).with_id("tmdb", "603"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let summary = Coordinator::new(&registry, config, base.path(), &NullObserver)
        .run_pairs(false)
        .unwrap();

    assert_eq!((summary.added, summary.removed), (0, 0));
    assert_eq!(trakt.items(WL).len(), 1);
}

#[test]
fn degraded_source_never_mass_deletes() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let observer = RecordingObserver::new();
    let coordinator = Coordinator::new(&registry, config, base.path(), &observer);
    coordinator.run_pairs(false).unwrap();
    assert!(trakt.has(WL, "imdb", "tt1"));

    // Source goes dark: the empty snapshot must not read as "everything
    // deleted".
    plex.fail_next_index();
    let outage = coordinator.run_pairs(false).unwrap();
    assert_eq!(outage.removed, 0);
    assert_eq!(trakt.remove_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(trakt.has(WL, "imdb", "tt1"));
    assert!(observer.any(|e| matches!(e, SyncEvent::ProviderDegraded { .. })));

    // Healthy again: baseline survived the outage, still nothing to do.
    let recovered = coordinator.run_pairs(false).unwrap();
    assert_eq!((recovered.added, recovered.removed), (0, 0));
}

#[test]
fn one_way_readd_at_source_stays_down_within_ttl() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));
    plex.seed(WL, movie("tt2"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let observer = RecordingObserver::new();
    let coordinator = Coordinator::new(&registry, config, base.path(), &observer);
    coordinator.run_pairs(false).unwrap();

    plex.unseed(WL, "imdb", "tt1");
    let second = coordinator.run_pairs(false).unwrap();
    assert_eq!(second.removed, 1);
    assert!(!trakt.has(WL, "imdb", "tt1"));

    // The source lists tt1 again inside the tombstone window: the removal
    // stays sticky on the destination.
    plex.seed(WL, movie("tt1"));
    let third = coordinator.run_pairs(false).unwrap();
    assert_eq!(third.added, 0);
    assert!(!trakt.has(WL, "imdb", "tt1"));
    assert!(observer.any(|e| matches!(e, SyncEvent::SuppressedByTombstone { .. })));
}

#[test]
fn degraded_destination_replans_entire_source_as_adds() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));
    plex.seed(WL, movie("tt2"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let coordinator = Coordinator::new(&registry, config, base.path(), &NullObserver);
    coordinator.run_pairs(false).unwrap();

    // Destination goes dark: its empty snapshot makes the whole source view
    // look missing, so everything is re-planned as an add and nothing as a
    // removal. The upserting adapter absorbs the replay.
    trakt.fail_next_index();
    let outage = coordinator.run_pairs(false).unwrap();
    assert_eq!(outage.added, 2);
    assert_eq!(outage.removed, 0);
    assert_eq!(trakt.items(WL).len(), 2);

    // The destination baseline survived the outage untouched.
    let recovered = coordinator.run_pairs(false).unwrap();
    assert_eq!((recovered.added, recovered.removed, recovered.errors), (0, 0, 0));
}

#[test]
fn degraded_two_way_side_never_reads_as_deletion() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));
    trakt.seed(WL, movie("tt2"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::TwoWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let coordinator = Coordinator::new(&registry, config, base.path(), &NullObserver);
    coordinator.run_pairs(false).unwrap();

    trakt.fail_next_index();
    let outage = coordinator.run_pairs(false).unwrap();
    assert_eq!(outage.removed, 0, "an outage is not a deletion");
    for p in [&plex, &trakt] {
        assert!(p.has(WL, "imdb", "tt1") && p.has(WL, "imdb", "tt2"));
    }

    let recovered = coordinator.run_pairs(false).unwrap();
    assert_eq!((recovered.added, recovered.removed), (0, 0));
}

#[test]
fn delta_destination_does_not_readd() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let simkl = MockProvider::with_caps(
        "simkl",
        Capabilities {
            index_semantics: IndexSemantics::Delta,
            ..Capabilities::default()
        },
    );
    plex.seed(WL, movie("tt1"));

    let registry = registry(&[&plex, &simkl]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "simkl", SyncMode::OneWay, &[(WL, false)])],
        ..SyncConfig::default()
    };
    let coordinator = Coordinator::new(&registry, config, base.path(), &NullObserver);

    coordinator.run_pairs(false).unwrap();
    assert_eq!(simkl.add_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // The delta index stays empty, but the committed baseline remembers tt1.
    let second = coordinator.run_pairs(false).unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(simkl.add_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // A delta echoing the earlier add changes nothing either.
    simkl.set_delta(vec![movie("tt1")]);
    let third = coordinator.run_pairs(false).unwrap();
    assert_eq!((third.added, third.removed), (0, 0));
}

#[test]
fn dry_run_plans_without_side_effects() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let summary = Coordinator::new(&registry, config, base.path(), &NullObserver)
        .run_pairs(true)
        .unwrap();

    assert_eq!(summary.added, 1, "plan counts are still reported");
    assert!(trakt.items(WL).is_empty());
    assert!(!base.path().join("state.json").exists());
    assert!(!base.path().join("last_sync.json").exists());
}

#[test]
fn unknown_provider_is_counted_not_fatal() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![
            pair_cfg("ghost", "trakt", SyncMode::OneWay, &[(WL, false)]),
            pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, false)]),
        ],
        ..SyncConfig::default()
    };
    let summary = Coordinator::new(&registry, config, base.path(), &NullObserver)
        .run_pairs(false)
        .unwrap();

    assert!(!summary.ok);
    assert_eq!(summary.errors, 1);
    // The healthy pair still ran.
    assert_eq!(summary.added, 1);
    assert!(trakt.has(WL, "imdb", "tt1"));
}

// ---------------------------------------------------------------------------
// Two-way
// ---------------------------------------------------------------------------

#[test]
fn two_way_bootstrap_unions_without_removals() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));
    trakt.seed(WL, movie("tt2"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::TwoWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let observer = RecordingObserver::new();
    let summary = Coordinator::new(&registry, config, base.path(), &observer)
        .run_pairs(false)
        .unwrap();

    assert_eq!(summary.added, 2);
    assert_eq!(summary.removed, 0, "first run must never remove");
    assert!(observer.any(|e| matches!(e, SyncEvent::BootstrapGuard { .. })));
    for p in [&plex, &trakt] {
        assert!(p.has(WL, "imdb", "tt1") && p.has(WL, "imdb", "tt2"));
    }
}

#[test]
fn deletion_propagates_once_and_stays_down() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));
    plex.seed(WL, movie("tt2"));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::TwoWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let coordinator = Coordinator::new(&registry, config, base.path(), &NullObserver);
    coordinator.run_pairs(false).unwrap();

    // The user deletes tt1 on one side.
    plex.unseed(WL, "imdb", "tt1");
    let second = coordinator.run_pairs(false).unwrap();
    assert_eq!(second.removed, 1);
    assert_eq!(second.added, 0, "deletion must not bounce back as an add");
    assert!(!trakt.has(WL, "imdb", "tt1"));

    // Converged: nothing oscillates on the next run.
    let third = coordinator.run_pairs(false).unwrap();
    assert_eq!((third.added, third.removed), (0, 0));

    // A re-add inside the tombstone window loses to the sticky removal.
    plex.seed(WL, movie("tt1"));
    let fourth = coordinator.run_pairs(false).unwrap();
    assert_eq!(fourth.added, 0);
    assert_eq!(fourth.removed, 1);
    assert!(!plex.has(WL, "imdb", "tt1"));
    assert!(!trakt.has(WL, "imdb", "tt1"));
}

#[test]
fn expired_tombstone_allows_readd() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(WL, movie("tt1"));
    plex.seed(WL, movie("tt2"));

    let registry = registry(&[&plex, &trakt]);
    let mut config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::TwoWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    config.tombstones.per_feature_secs.insert(WL, 1);

    let coordinator = Coordinator::new(&registry, config, base.path(), &NullObserver);
    coordinator.run_pairs(false).unwrap();

    plex.unseed(WL, "imdb", "tt1");
    coordinator.run_pairs(false).unwrap();
    assert!(!trakt.has(WL, "imdb", "tt1"));

    // Past the TTL, a fresh add is a genuine intent again.
    std::thread::sleep(std::time::Duration::from_millis(1200));
    plex.seed(WL, movie("tt1"));
    let after = coordinator.run_pairs(false).unwrap();
    assert_eq!(after.added, 1);
    assert!(trakt.has(WL, "imdb", "tt1"));
}

// ---------------------------------------------------------------------------
// Ratings
// ---------------------------------------------------------------------------

#[test]
fn ratings_diff_is_value_aware() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(RT, movie("tt1").with_rating(8));
    plex.seed(RT, movie("tt2").with_rating(7));
    trakt.seed(RT, movie("tt2").with_rating(3));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(RT, false)])],
        ..SyncConfig::default()
    };
    let summary = Coordinator::new(&registry, config, base.path(), &NullObserver)
        .run_pairs(false)
        .unwrap();

    assert_eq!(summary.added, 2);
    let ratings = trakt.items(RT);
    let get = |imdb: &str| {
        ratings
            .iter()
            .find(|i| i.ids.get("imdb").map(String::as_str) == Some(imdb))
            .and_then(|i| i.rating)
    };
    assert_eq!(get("tt1"), Some(8));
    assert_eq!(get("tt2"), Some(7), "stale value upserted");
}

#[test]
fn unrate_propagates_and_suppresses_rerate() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    plex.seed(RT, movie("tt1").with_rating(8));

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(RT, true)])],
        ..SyncConfig::default()
    };
    let coordinator = Coordinator::new(&registry, config, base.path(), &NullObserver);
    coordinator.run_pairs(false).unwrap();
    assert!(trakt.has(RT, "imdb", "tt1"));

    plex.unseed(RT, "imdb", "tt1");
    let second = coordinator.run_pairs(false).unwrap();
    assert_eq!(second.removed, 1);
    assert!(trakt.items(RT).is_empty());

    // Re-rating inside the window is held back by the tombstone.
    plex.seed(RT, movie("tt1").with_rating(9));
    let third = coordinator.run_pairs(false).unwrap();
    assert_eq!(third.added, 0);
    assert!(trakt.items(RT).is_empty());
}

// ---------------------------------------------------------------------------
// Global tombstones across pairs
// ---------------------------------------------------------------------------

#[test]
fn removal_suppresses_adds_on_other_pairs() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    let simkl = MockProvider::new("simkl");
    plex.seed(WL, movie("tt1"));

    let registry = registry(&[&plex, &trakt, &simkl]);
    let ab = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, true)])],
        ..SyncConfig::default()
    };
    let coordinator = Coordinator::new(&registry, ab, base.path(), &NullObserver);
    coordinator.run_pairs(false).unwrap();
    plex.unseed(WL, "imdb", "tt1");
    coordinator.run_pairs(false).unwrap();
    assert!(!trakt.has(WL, "imdb", "tt1"));

    // A third provider still lists tt1; the global tombstone holds the line
    // on an unrelated pair sharing the same store.
    simkl.seed(WL, movie("tt1"));
    let ca = SyncConfig {
        pairs: vec![pair_cfg("simkl", "plex", SyncMode::OneWay, &[(WL, false)])],
        ..SyncConfig::default()
    };
    let observer = RecordingObserver::new();
    let summary = Coordinator::new(&registry, ca, base.path(), &observer)
        .run_pairs(false)
        .unwrap();

    assert_eq!(summary.added, 0);
    assert!(!plex.has(WL, "imdb", "tt1"));
    assert!(observer.any(|e| matches!(e, SyncEvent::SuppressedByTombstone { .. })));
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

struct StaticResolver;

impl IdResolver for StaticResolver {
    fn resolve(&self, items: &[MediaItem]) -> Vec<Option<BTreeMap<String, String>>> {
        items
            .iter()
            .map(|_| Some(BTreeMap::from([("tmdb".to_owned(), "603".to_owned())])))
            .collect()
    }
}

#[test]
fn enrichment_makes_items_addressable() {
    let base = TempDir::new().unwrap();
    let plex = MockProvider::new("plex");
    let trakt = MockProvider::new("trakt");
    // Plex-only id; trakt can't ingest it without enrichment.
    plex.seed(
        WL,
        MediaItem::new(MediaKind::Movie)
            .with_id("plex", "12345")
            .with_title("The Matrix", Some(1999)),
    );

    let registry = registry(&[&plex, &trakt]);
    let config = SyncConfig {
        pairs: vec![pair_cfg("plex", "trakt", SyncMode::OneWay, &[(WL, false)])],
        ..SyncConfig::default()
    };

    // Without a resolver the item is dropped this pass.
    let bare = TempDir::new().unwrap();
    let dropped = Coordinator::new(&registry, config.clone(), bare.path(), &NullObserver)
        .run_pairs(false)
        .unwrap();
    assert_eq!(dropped.added, 0);
    assert!(trakt.items(WL).is_empty());

    let resolver = StaticResolver;
    let summary = Coordinator::new(&registry, config, base.path(), &NullObserver)
        .with_resolver(&resolver)
        .run_pairs(false)
        .unwrap();
    assert_eq!(summary.added, 1);
    assert!(trakt.has(WL, "tmdb", "603"));
}
