//! Two-way reconciliation: converge one feature across both providers of a
//! pair without oscillation.
//!
//! Deletions are detected by comparing each side's committed baseline to its
//! fresh view; detected keys join the pair ledger and stay "down" on both
//! sides until the tombstone ages out. The sticky tie-break means a
//! tombstone-driven removal always beats a re-add attempt, whichever side it
//! comes from. Removals apply before additions so a key never flaps within
//! one run.

use std::collections::BTreeMap;

use reelsync_core::{aliases, any_key_overlap, canonical_key, Feature, MediaItem};

use crate::error::EngineError;
use crate::observer::SyncEvent;
use crate::snapshot::{
    alias_index, build_snapshot, effective_view, missing_on_destination, rating_upserts,
    vanished_since_baseline, Snapshot,
};
use crate::unit::{hits_tombstone, UnitContext, UnitOutcome};

pub fn run(ctx: &UnitContext) -> Result<UnitOutcome, EngineError> {
    let feature = ctx.feature;
    let a_name = ctx.source.identity();
    let b_name = ctx.target.identity();
    let a_caps = ctx.source.capabilities();
    let b_caps = ctx.target.capabilities();
    let mut outcome = UnitOutcome::default();

    // ---- 1. Snapshot ----
    let mut doc = ctx.state.load();
    let a_base = doc.baseline(&a_name, feature);
    let b_base = doc.baseline(&b_name, feature);
    let a_snap = build_snapshot(
        ctx.source,
        feature,
        doc.checkpoint(&a_name, feature).as_deref(),
        ctx.observer,
    );
    let b_snap = build_snapshot(
        ctx.target,
        feature,
        doc.checkpoint(&b_name, feature).as_deref(),
        ctx.observer,
    );
    let mut a_view = effective_view(&a_base, &a_snap.items, a_caps.index_semantics);
    let mut b_view = effective_view(&b_base, &b_snap.items, b_caps.index_semantics);

    let bootstrap =
        a_base.is_empty() && b_base.is_empty() && !ctx.ledger.has_history(feature, &ctx.pair);
    if bootstrap && ctx.flags.remove {
        ctx.observer.event(&SyncEvent::BootstrapGuard {
            pair: ctx.pair.clone(),
            feature,
        });
    }

    // ---- 2. Detect deletions, build the tombstoned key set ----
    let mut tombstoned = ctx.ledger.active(feature, &ctx.pair, ctx.ttl_secs());
    let mut removal_plan = 0usize;
    if ctx.flags.remove && !bootstrap {
        let mut newly: Vec<String> = Vec::new();
        let sides: [(&Snapshot, &BTreeMap<String, MediaItem>, &BTreeMap<String, MediaItem>, bool); 2] = [
            (&a_snap, &a_base, &a_view, a_caps.observed_deletes),
            (&b_snap, &b_base, &b_view, b_caps.observed_deletes),
        ];
        for (snap, base, view, observed_deletes) in sides {
            if snap.degraded || !observed_deletes {
                continue;
            }
            for (key, _) in vanished_since_baseline(base, view) {
                if tombstoned.insert(key.clone()) {
                    newly.push(key);
                }
            }
        }
        ctx.mark_ledger(newly.iter())?;

        // ---- 3. Remove tombstoned entries still present on either side ----
        for (adapter, view) in [(ctx.source, &mut a_view), (ctx.target, &mut b_view)] {
            let doomed: Vec<(String, MediaItem)> = view
                .iter()
                .filter(|(_, item)| hits_tombstone(item, &tombstoned))
                .filter(|(_, item)| feature != Feature::Ratings || item.rating.is_some())
                .map(|(k, item)| (k.clone(), item.clone()))
                .collect();
            if doomed.is_empty() {
                continue;
            }
            removal_plan += doomed.len();
            let items: Vec<MediaItem> = doomed.iter().map(|(_, i)| i.clone()).collect();
            let (count, errors) = ctx.apply(adapter, feature.negative_dimension(), &items);
            outcome.removed += count;
            outcome.errors += errors;
            if errors == 0 {
                ctx.record_negatives(&adapter.identity(), &items)?;
                for (key, _) in &doomed {
                    view.remove(key);
                }
            }
        }
    }

    // ---- 4. Plan additions in both directions ----
    let b_index = alias_index(&b_view);
    let a_index = alias_index(&a_view);
    let (mut to_b, mut to_a) = if feature == Feature::Ratings {
        (
            rating_upserts(&a_view, &b_view, &b_index),
            rating_upserts(&b_view, &a_view, &a_index),
        )
    } else {
        (
            missing_on_destination(&a_view, &b_index),
            missing_on_destination(&b_view, &a_index),
        )
    };
    if feature == Feature::Ratings {
        resolve_rating_conflicts(&mut to_b, &mut to_a);
    }

    to_b.retain(|item| !hits_tombstone(item, &tombstoned));
    to_a.retain(|item| !hits_tombstone(item, &tombstoned));
    let to_b = ctx.filter_suppressed(to_b);
    let to_a = ctx.filter_suppressed(to_a);

    let to_b = crate::enrich::enrich_additions(
        to_b,
        (!b_caps.provides_ids).then_some(ctx.resolver).flatten(),
        &b_name,
    );
    let to_a = crate::enrich::enrich_additions(
        to_a,
        (!a_caps.provides_ids).then_some(ctx.resolver).flatten(),
        &a_name,
    );

    ctx.observer.event(&SyncEvent::PlanReady {
        pair: ctx.pair.clone(),
        feature,
        additions: to_b.len() + to_a.len(),
        removals: removal_plan,
    });

    // ---- 5. Apply additions ----
    for (adapter, items, view) in [
        (ctx.target, &to_b, &mut b_view),
        (ctx.source, &to_a, &mut a_view),
    ] {
        if items.is_empty() {
            continue;
        }
        let (count, errors) = ctx.apply(adapter, feature.positive_dimension(), items);
        outcome.added += count;
        outcome.errors += errors;
        if errors == 0 {
            for item in items {
                view.insert(canonical_key(item).0, item.clone());
            }
        }
    }

    // ---- 6. Commit both sides ----
    if !ctx.dry_run {
        if !a_snap.degraded {
            doc.commit_baseline(&a_name, feature, &a_view);
            doc.commit_checkpoint(&a_name, feature, a_snap.checkpoint.clone());
        }
        if !b_snap.degraded {
            doc.commit_baseline(&b_name, feature, &b_view);
            doc.commit_checkpoint(&b_name, feature, b_snap.checkpoint.clone());
        }
        if feature == Feature::Watchlist {
            doc.rebuild_wall();
        }
        ctx.state.save(&doc)?;
    }

    Ok(outcome)
}

/// When both sides rate the same entity differently, the newer `rated_at`
/// wins; with no timestamps the pair's configured source wins. Exactly one
/// direction survives per conflicting key, so values never ping-pong.
fn resolve_rating_conflicts(to_b: &mut Vec<MediaItem>, to_a: &mut Vec<MediaItem>) {
    let mut keep_a = vec![true; to_a.len()];
    let mut keep_b = vec![true; to_b.len()];
    for (i, forward) in to_b.iter().enumerate() {
        let forward_aliases = aliases(forward);
        for (j, backward) in to_a.iter().enumerate() {
            if any_key_overlap(&forward_aliases, &aliases(backward)) {
                if backward.rated_at > forward.rated_at {
                    keep_b[i] = false;
                } else {
                    keep_a[j] = false;
                }
            }
        }
    }
    let mut b_iter = keep_b.into_iter();
    to_b.retain(|_| b_iter.next().unwrap_or(true));
    let mut a_iter = keep_a.into_iter();
    to_a.retain(|_| a_iter.next().unwrap_or(true));
}
