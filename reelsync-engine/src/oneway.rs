//! One-way reconciliation: mirror one feature from a source provider onto a
//! destination.
//!
//! Phase order is fixed: Snapshot → Plan → Remove → Enrich → Add → Commit.
//! With the feature's `remove` flag set the destination is a strict mirror:
//! anything it holds that no longer alias-matches the source view is removed.
//! The bootstrap guard withholds all removals on a unit's first ever run, and
//! a degraded source snapshot withholds them too — an outage must never read
//! as "the user deleted everything".

use reelsync_core::{canonical_key, Feature, MediaItem};

use crate::error::EngineError;
use crate::observer::SyncEvent;
use crate::snapshot::{
    alias_index, build_snapshot, effective_view, missing_on_destination, rating_upserts,
};
use crate::unit::{UnitContext, UnitOutcome};

pub fn run(ctx: &UnitContext) -> Result<UnitOutcome, EngineError> {
    let feature = ctx.feature;
    let src_name = ctx.source.identity();
    let dst_name = ctx.target.identity();
    let src_caps = ctx.source.capabilities();
    let dst_caps = ctx.target.capabilities();
    let mut outcome = UnitOutcome::default();

    // ---- 1. Snapshot ----
    let mut doc = ctx.state.load();
    let src_base = doc.baseline(&src_name, feature);
    let dst_base = doc.baseline(&dst_name, feature);
    let src_snap = build_snapshot(
        ctx.source,
        feature,
        doc.checkpoint(&src_name, feature).as_deref(),
        ctx.observer,
    );
    let dst_snap = build_snapshot(
        ctx.target,
        feature,
        doc.checkpoint(&dst_name, feature).as_deref(),
        ctx.observer,
    );

    let src_view = effective_view(&src_base, &src_snap.items, src_caps.index_semantics);
    let mut dst_view = effective_view(&dst_base, &dst_snap.items, dst_caps.index_semantics);

    // ---- 2. Plan removals ----
    // Bootstrap: with no committed destination baseline and no ledger
    // history, absence carries no meaning yet, so the first run only adds.
    let bootstrap = dst_base.is_empty() && !ctx.ledger.has_history(feature, &ctx.pair);
    if bootstrap && ctx.flags.remove {
        ctx.observer.event(&SyncEvent::BootstrapGuard {
            pair: ctx.pair.clone(),
            feature,
        });
    }

    let mut removals: Vec<(String, MediaItem)> = Vec::new();
    if ctx.flags.remove && !bootstrap && !src_snap.degraded {
        let src_index = alias_index(&src_view);
        for (key, item) in &dst_view {
            if crate::snapshot::present_in(&src_index, item).is_some() {
                continue;
            }
            // Unrates only make sense against an actually-rated entry.
            if feature == Feature::Ratings && item.rating.is_none() {
                continue;
            }
            removals.push((key.clone(), item.clone()));
        }
    }

    // ---- 3. Remove ----
    if !removals.is_empty() {
        let items: Vec<MediaItem> = removals.iter().map(|(_, i)| i.clone()).collect();
        let (count, errors) = ctx.apply(ctx.target, feature.negative_dimension(), &items);
        outcome.removed += count;
        outcome.errors += errors;
        if errors == 0 {
            ctx.mark_ledger(removals.iter().map(|(k, _)| k))?;
            ctx.record_negatives(&src_name, &items)?;
            for (key, _) in &removals {
                dst_view.remove(key);
            }
        }
    }

    // ---- 4. Plan additions ----
    let dst_index = alias_index(&dst_view);
    let mut additions = if feature == Feature::Ratings {
        rating_upserts(&src_view, &dst_view, &dst_index)
    } else {
        missing_on_destination(&src_view, &dst_index)
    };

    // Recent removals stay down via the global tombstone recorded above;
    // the pair ledger is only consumed by the two-way reconciler.
    let additions = ctx.filter_suppressed(additions);

    // ---- 5. Enrich + add ----
    let resolver = (!dst_caps.provides_ids).then_some(ctx.resolver).flatten();
    let additions = crate::enrich::enrich_additions(additions, resolver, &dst_name);

    ctx.observer.event(&SyncEvent::PlanReady {
        pair: ctx.pair.clone(),
        feature,
        additions: additions.len(),
        removals: removals.len(),
    });

    if !additions.is_empty() {
        let (count, errors) = ctx.apply(ctx.target, feature.positive_dimension(), &additions);
        outcome.added += count;
        outcome.errors += errors;
        if errors == 0 {
            for item in &additions {
                dst_view.insert(canonical_key(item).0, item.clone());
            }
        }
    }

    // ---- 6. Commit ----
    // A degraded side keeps its previous baseline so the next healthy run
    // still sees real deletions.
    if !ctx.dry_run {
        if !src_snap.degraded {
            doc.commit_baseline(&src_name, feature, &src_view);
            doc.commit_checkpoint(&src_name, feature, src_snap.checkpoint);
        }
        if !dst_snap.degraded {
            doc.commit_baseline(&dst_name, feature, &dst_view);
            doc.commit_checkpoint(&dst_name, feature, dst_snap.checkpoint);
        }
        if feature == Feature::Watchlist {
            doc.rebuild_wall();
        }
        ctx.state.save(&doc)?;
    }

    Ok(outcome)
}
