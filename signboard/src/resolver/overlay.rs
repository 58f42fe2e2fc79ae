//! Overlay resolution.
//!
//! Overlays resolve independently of the layout sequence: after validity and
//! window filtering, override overlays win outright, then the highest
//! priority band (priority 1 and up), then the baseline set.

use crate::schedule::ScheduleItem;

use super::interleave::keep_top_priority_band;
use super::validity::{filter_playable, ValidityContext, ValidityOutcome};

/// Result of an overlay resolution pass.
#[derive(Debug, Default)]
pub struct OverlayOutcome {
    /// Overlays to draw, in input order.
    pub overlays: Vec<ScheduleItem>,
    /// Layout ids quarantined by cache validity during the pass.
    pub invalid_ids: Vec<i64>,
}

/// Resolve the overlay list for this tick.
///
/// Validity uses the same rules as the layout path: an overlay with any
/// invalid dependent is quarantined whole.
pub fn resolve_overlays(items: Vec<ScheduleItem>, ctx: &ValidityContext) -> OverlayOutcome {
    let ValidityOutcome {
        playable,
        invalid_ids,
        ..
    } = filter_playable(items, ctx);

    let (overrides, scheduled): (Vec<_>, Vec<_>) =
        playable.into_iter().partition(|i| i.is_override);

    if !overrides.is_empty() {
        return OverlayOutcome {
            overlays: overrides,
            invalid_ids,
        };
    }

    let (prioritised, base): (Vec<_>, Vec<_>) =
        scheduled.into_iter().partition(|i| i.priority >= 1);

    let overlays = if !prioritised.is_empty() {
        keep_top_priority_band(prioritised)
    } else {
        base
    };

    OverlayOutcome {
        overlays,
        invalid_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryLayoutCache;
    use crate::schedule::NodeKind;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    fn overlay(layout_id: i64, priority: u32) -> ScheduleItem {
        let mut item =
            ScheduleItem::layout(layout_id, 1, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC);
        item.node_kind = NodeKind::Overlay;
        item.priority = priority;
        item
    }

    fn cache_with(ids: &[i64]) -> InMemoryLayoutCache {
        let cache = InMemoryLayoutCache::new();
        for id in ids {
            cache.add_file(format!("{id}.xlf"));
        }
        cache
    }

    fn ctx(cache: &InMemoryLayoutCache) -> ValidityContext<'_> {
        ValidityContext {
            now: now(),
            fix: None,
            cache,
            expire_modified_layouts: true,
            currently_playing: None,
        }
    }

    #[test]
    fn test_base_overlays_all_surface() {
        let cache = cache_with(&[1, 2]);

        let outcome = resolve_overlays(vec![overlay(1, 0), overlay(2, 0)], &ctx(&cache));
        assert_eq!(outcome.overlays.len(), 2);
    }

    #[test]
    fn test_priority_band_beats_base() {
        let cache = cache_with(&[1, 2, 3]);

        let outcome =
            resolve_overlays(vec![overlay(1, 0), overlay(2, 2), overlay(3, 2)], &ctx(&cache));

        let ids: Vec<i64> = outcome.overlays.iter().map(|i| i.layout_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_highest_band_wins_among_prioritised() {
        let cache = cache_with(&[1, 2]);

        let outcome = resolve_overlays(vec![overlay(1, 1), overlay(2, 5)], &ctx(&cache));

        assert_eq!(outcome.overlays.len(), 1);
        assert_eq!(outcome.overlays[0].layout_id, 2);
    }

    #[test]
    fn test_override_beats_everything() {
        let cache = cache_with(&[1, 2]);

        let mut injected = overlay(2, 0);
        injected.is_override = true;

        let outcome = resolve_overlays(vec![overlay(1, 9), injected], &ctx(&cache));

        assert_eq!(outcome.overlays.len(), 1);
        assert!(outcome.overlays[0].is_override);
    }

    #[test]
    fn test_invalid_dependent_quarantines_overlay() {
        let cache = cache_with(&[1]);

        let mut item = overlay(1, 0);
        item.dependents = vec!["missing.png".to_string()];

        let outcome = resolve_overlays(vec![item], &ctx(&cache));
        assert!(outcome.overlays.is_empty());
        assert_eq!(outcome.invalid_ids, vec![1]);
    }

    #[test]
    fn test_window_filter_applies() {
        let cache = cache_with(&[1]);

        let mut expired = overlay(1, 0);
        expired.from_dt = now() - chrono::Duration::hours(2);
        expired.to_dt = now() - chrono::Duration::hours(1);

        let outcome = resolve_overlays(vec![expired], &ctx(&cache));
        assert!(outcome.overlays.is_empty());
        assert!(outcome.invalid_ids.is_empty());
    }
}
