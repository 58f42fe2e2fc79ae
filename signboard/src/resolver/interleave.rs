//! Priority banding and share-of-voice interleaving.
//!
//! Interrupts are layouts that demand a fixed number of seconds per hour.
//! The resolver accumulates each interrupt round-robin until its share of
//! voice is satisfied, fills the rest of the hour with the normal layouts,
//! and then blends the two sequences deterministically so interrupts are
//! spread across the hour instead of clumping.

use tracing::debug;

use crate::cache::LayoutCache;
use crate::schedule::ScheduleItem;

/// Duration assumed for a layout the cache has never observed.
const DEFAULT_DURATION_SECS: u32 = 60;

/// Floor for pathological computed durations; keeps the fill loops finite.
const MIN_SLOT_SECS: u32 = 10;

/// The share-of-voice accounting period.
const SECONDS_PER_HOUR: i64 = 3600;

/// Planned duration of an item in seconds.
///
/// The duration hint wins when present; otherwise the cache manager's last
/// observed duration (default 60) is used. Values that compute to zero are
/// floored to ten seconds.
pub fn effective_duration(item: &ScheduleItem, cache: &dyn LayoutCache) -> u32 {
    let duration = if item.duration_hint > 0 {
        item.duration_hint
    } else {
        cache.layout_duration(item.layout_id, DEFAULT_DURATION_SECS)
    };
    if duration == 0 {
        MIN_SLOT_SECS
    } else {
        duration
    }
}

/// Keep only the items in the highest priority band; ties all survive, in
/// input order.
pub fn keep_top_priority_band(items: Vec<ScheduleItem>) -> Vec<ScheduleItem> {
    let Some(top) = items.iter().map(|i| i.priority).max() else {
        return items;
    };
    items.into_iter().filter(|i| i.priority == top).collect()
}

/// Resolve the flat layout list into the playable sequence.
///
/// `default_layout` substitutes for an empty normal set and is the final
/// fallback when resolution produces nothing at all.
pub fn resolve_layouts(
    items: Vec<ScheduleItem>,
    default_layout: Option<&ScheduleItem>,
    cache: &dyn LayoutCache,
) -> Vec<ScheduleItem> {
    let (interrupts, normals): (Vec<_>, Vec<_>) =
        items.into_iter().partition(ScheduleItem::is_interrupt);

    let normals = keep_top_priority_band(normals);
    let mut interrupts = keep_top_priority_band(interrupts);

    if interrupts.is_empty() {
        return if normals.is_empty() {
            fallback(default_layout)
        } else {
            normals
        };
    }

    let normals = if normals.is_empty() {
        default_layout.cloned().into_iter().collect()
    } else {
        normals
    };

    // Share-of-voice accumulation: visit the interrupts round-robin, adding
    // one effective duration per visit, until every interrupt has committed
    // at least its share of voice.
    for item in &mut interrupts {
        item.committed_duration = 0;
    }

    let mut resolved_interrupt: Vec<ScheduleItem> = Vec::new();
    let mut interrupt_seconds: i64 = 0;
    while interrupts
        .iter()
        .any(|i| i.committed_duration < i.share_of_voice)
    {
        for item in interrupts.iter_mut() {
            if item.committed_duration >= item.share_of_voice {
                continue;
            }
            let duration = effective_duration(item, cache);
            item.committed_duration = item.committed_duration.saturating_add(duration);
            interrupt_seconds += i64::from(duration);
            resolved_interrupt.push(item.clone());
        }
    }

    // Normal fill: whatever the interrupts left of the hour goes to the
    // normal layouts, round-robin.
    let mut remaining = SECONDS_PER_HOUR - interrupt_seconds;
    let mut resolved_normal: Vec<ScheduleItem> = Vec::new();
    if !normals.is_empty() && remaining > 0 {
        'fill: loop {
            for item in &normals {
                resolved_normal.push(item.clone());
                remaining -= i64::from(effective_duration(item, cache));
                if remaining <= 0 {
                    break 'fill;
                }
            }
        }
    }

    let resolved = interleave(resolved_normal, resolved_interrupt);

    if resolved.is_empty() {
        fallback(default_layout)
    } else {
        resolved
    }
}

/// Deterministic blend of the normal and interrupt sequences.
///
/// Picks `max(n, m)` slots; normals repeat cyclically while interrupts are
/// consumed at most once each. With more interrupts than picks the division
/// would give a zero step, which means "interrupt every slot".
fn interleave(
    resolved_normal: Vec<ScheduleItem>,
    resolved_interrupt: Vec<ScheduleItem>,
) -> Vec<ScheduleItem> {
    let n = resolved_normal.len();
    let m = resolved_interrupt.len();

    if m == 0 {
        return resolved_normal;
    }
    if n == 0 {
        return resolved_interrupt;
    }

    let pick = n.max(m);
    let normal_step = pick.div_ceil(n);
    let interrupt_step = (pick / m).max(1);

    debug!(
        normals = n,
        interrupts = m,
        normal_step,
        interrupt_step,
        "interleaving schedule"
    );

    let mut blended = Vec::with_capacity(n + m);
    let mut normal_index = 0usize;
    let mut interrupt_index = 0usize;
    for i in 0..pick {
        if i % normal_step == 0 {
            blended.push(resolved_normal[normal_index % n].clone());
            normal_index += 1;
        }
        if i % interrupt_step == 0 && interrupt_index < m {
            blended.push(resolved_interrupt[interrupt_index].clone());
            interrupt_index += 1;
        }
    }
    blended
}

fn fallback(default_layout: Option<&ScheduleItem>) -> Vec<ScheduleItem> {
    default_layout.cloned().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryLayoutCache, NoOpLayoutCache};
    use chrono::{DateTime, Utc};

    fn item(layout_id: i64, priority: u32) -> ScheduleItem {
        let mut item =
            ScheduleItem::layout(layout_id, 1, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC);
        item.priority = priority;
        item
    }

    fn interrupt(layout_id: i64, share_of_voice: u32, duration: u32) -> ScheduleItem {
        let mut item = item(layout_id, 0);
        item.share_of_voice = share_of_voice;
        item.duration_hint = duration;
        item
    }

    fn normal(layout_id: i64, duration: u32) -> ScheduleItem {
        let mut item = item(layout_id, 0);
        item.duration_hint = duration;
        item
    }

    #[test]
    fn test_effective_duration_prefers_hint() {
        let cache = InMemoryLayoutCache::new();
        cache.set_duration(1, 25);

        assert_eq!(effective_duration(&normal(1, 30), &cache), 30);
        assert_eq!(effective_duration(&normal(1, 0), &cache), 25);
        assert_eq!(effective_duration(&normal(2, 0), &cache), 60, "cache fallback");
    }

    #[test]
    fn test_effective_duration_floors_zero() {
        let cache = InMemoryLayoutCache::new();
        cache.set_duration(1, 0);

        assert_eq!(effective_duration(&normal(1, 0), &cache), 10);
    }

    #[test]
    fn test_priority_band_keeps_ties() {
        let kept = keep_top_priority_band(vec![item(1, 1), item(2, 5), item(3, 5)]);

        let ids: Vec<i64> = kept.iter().map(|i| i.layout_id).collect();
        assert_eq!(ids, vec![2, 3], "order preserved from input");
    }

    #[test]
    fn test_no_interrupts_returns_normals_unfilled() {
        let resolved = resolve_layouts(
            vec![item(1, 0), item(2, 0)],
            Some(&ScheduleItem::splash()),
            &NoOpLayoutCache,
        );

        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_everything_empty_falls_back_to_default() {
        let splash = ScheduleItem::splash();
        let resolved = resolve_layouts(Vec::new(), Some(&splash), &NoOpLayoutCache);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].node_kind, splash.node_kind);
    }

    #[test]
    fn test_share_of_voice_interleave_alternates() {
        // One normal (60s), one interrupt demanding 1800s at 60s a visit:
        // 30 interrupt copies, 1800s of normal fill = 30 normal copies,
        // pick=30 with both steps 1 gives a strict N,I,N,I,... blend.
        let resolved = resolve_layouts(
            vec![normal(1, 60), interrupt(2, 1800, 60)],
            Some(&ScheduleItem::splash()),
            &NoOpLayoutCache,
        );

        assert_eq!(resolved.len(), 60);
        for (i, entry) in resolved.iter().enumerate() {
            let expected = if i % 2 == 0 { 1 } else { 2 };
            assert_eq!(entry.layout_id, expected, "position {i}");
        }
    }

    #[test]
    fn test_interrupt_commits_at_least_share_of_voice() {
        let resolved = resolve_layouts(
            vec![normal(1, 60), interrupt(2, 100, 45)],
            Some(&ScheduleItem::splash()),
            &NoOpLayoutCache,
        );

        // 100s of voice at 45s a visit needs 3 visits (135s committed)
        let interrupt_count = resolved.iter().filter(|i| i.layout_id == 2).count();
        assert_eq!(interrupt_count, 3);

        let committed: u32 = resolved
            .iter()
            .filter(|i| i.layout_id == 2)
            .map(|i| i.committed_duration)
            .max()
            .unwrap();
        assert!(committed >= 100);
    }

    #[test]
    fn test_multiple_interrupts_all_satisfied() {
        let resolved = resolve_layouts(
            vec![
                normal(1, 60),
                interrupt(2, 120, 60),
                interrupt(3, 300, 60),
            ],
            Some(&ScheduleItem::splash()),
            &NoOpLayoutCache,
        );

        assert_eq!(resolved.iter().filter(|i| i.layout_id == 2).count(), 2);
        assert_eq!(resolved.iter().filter(|i| i.layout_id == 3).count(), 5);
    }

    #[test]
    fn test_interrupts_only_when_no_normals_or_default() {
        let resolved = resolve_layouts(vec![interrupt(2, 60, 60)], None, &NoOpLayoutCache);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].layout_id, 2);
    }

    #[test]
    fn test_default_substitutes_for_missing_normals() {
        let splash = ScheduleItem::splash();
        let resolved = resolve_layouts(vec![interrupt(2, 60, 60)], Some(&splash), &NoOpLayoutCache);

        // 60s of interrupt, 3540s of splash fill at 10s floor... splash has
        // no hint and no cache record, so the 60s default applies: 59 slots.
        let splash_count = resolved
            .iter()
            .filter(|i| i.node_kind == splash.node_kind)
            .count();
        assert_eq!(splash_count, 59);
        assert_eq!(resolved.iter().filter(|i| i.layout_id == 2).count(), 1);
    }

    #[test]
    fn test_interrupt_band_applies_within_interrupts() {
        let mut low = interrupt(2, 60, 60);
        low.priority = 1;
        let mut high = interrupt(3, 60, 60);
        high.priority = 4;

        let resolved = resolve_layouts(
            vec![normal(1, 3600), low, high],
            Some(&ScheduleItem::splash()),
            &NoOpLayoutCache,
        );

        assert!(resolved.iter().any(|i| i.layout_id == 3));
        assert!(!resolved.iter().any(|i| i.layout_id == 2));
    }

    #[test]
    fn test_more_interrupts_than_picks_every_slot() {
        // Ten interrupts, each satisfied in one 60s visit; one normal fills
        // the remaining 3000s in one 3600s slot. pick = max(1, 10) = 10 and
        // the interrupt step would floor to 1 anyway; the guard matters when
        // n > m, so check the n=1 side: pick/m = 10/10 = 1, all consumed.
        let mut items: Vec<ScheduleItem> = (2..12).map(|id| interrupt(id, 60, 60)).collect();
        items.insert(0, normal(1, 3600));

        let resolved = resolve_layouts(items, Some(&ScheduleItem::splash()), &NoOpLayoutCache);

        for id in 2..12 {
            assert_eq!(
                resolved.iter().filter(|i| i.layout_id == id).count(),
                1,
                "interrupt {id} consumed exactly once"
            );
        }
    }

    #[test]
    fn test_interrupt_step_zero_guard() {
        // Two interrupts but a single normal slot: n=1, m=2, pick=2,
        // pick/m = 1; shrink further: n=1, m=3 -> pick=3, step=1. The
        // degenerate case is pick < m, impossible since pick = max(n, m),
        // but the guard also covers pick/m flooring to 0 from integer
        // division with m > pick. Exercise a big interrupt pool.
        let mut items: Vec<ScheduleItem> = (2..8).map(|id| interrupt(id, 30, 30)).collect();
        items.push(normal(1, 3600));

        let resolved = resolve_layouts(items, Some(&ScheduleItem::splash()), &NoOpLayoutCache);

        // All six interrupts surface despite the single normal pick.
        for id in 2..8 {
            assert!(resolved.iter().any(|i| i.layout_id == id));
        }
    }

    #[test]
    fn test_total_interrupt_time_bounded() {
        // Invariant: accumulated interrupt seconds stay within one visit of
        // the share; with 500s shares at 60s visits, 9 visits = 540s each.
        let resolved = resolve_layouts(
            vec![normal(1, 60), interrupt(2, 500, 60), interrupt(3, 500, 60)],
            Some(&ScheduleItem::splash()),
            &NoOpLayoutCache,
        );

        let total: u32 = resolved
            .iter()
            .filter(|i| i.is_interrupt())
            .map(|i| i.duration_hint)
            .sum();
        assert!(i64::from(total) <= SECONDS_PER_HOUR + 60);
    }
}
