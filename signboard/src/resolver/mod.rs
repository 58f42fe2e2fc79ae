//! The per-tick resolution pipeline.
//!
//! Order of play for each tick: prune serviced override actions, assemble
//! the candidate list (document layouts + materialised overrides + the
//! adspace slot), filter for validity, apply override exclusivity, collapse
//! cycle groups, interleave by priority and share of voice, and resolve
//! overlays and actions on their own independent rules.
//!
//! [`resolve`] is a pure-ish function over the locked state; the surrounding
//! daemon ([`daemon::ScheduleDaemon`]) owns locking, change detection, and
//! eventing.

pub mod cycle;
pub mod daemon;
pub mod dispatch;
pub mod events;
pub mod interleave;
pub mod overlay;
pub mod overrides;
pub mod state;
pub mod validity;

pub use daemon::{DaemonContext, ScheduleDaemon};
pub use dispatch::{CommandRunner, DispatchError, NoOpCommandRunner};
pub use events::ScheduleEvents;
pub use overrides::{LayoutChangeAction, OverlayLayoutAction};
pub use state::{ResolverState, SharedScheduleState};

use chrono::{DateTime, Utc};

use crate::cache::LayoutCache;
use crate::exchange::AdExchange;
use crate::schedule::{watermark_actions, ScheduleAction, ScheduleItem};

use cycle::group_cycles;
use interleave::resolve_layouts;
use overlay::resolve_overlays;
use overrides::{apply_override_exclusivity, materialise_layout_changes, materialise_overlay_actions};
use validity::{filter_playable, ValidityContext, ValidityOutcome};

/// Collaborators and configuration one resolution pass runs under.
pub struct ResolveEnv<'a> {
    /// The tick's captured instant.
    pub now: DateTime<Utc>,
    /// Cache manager for validity and duration queries.
    pub cache: &'a dyn LayoutCache,
    /// Ad-exchange client, when ad serving is wired up.
    pub exchange: Option<&'a dyn AdExchange>,
    /// Whether adspace scheduling is enabled in configuration.
    pub adspace_enabled: bool,
    /// Whether CMS updates expire the layout currently on screen.
    pub expire_modified_layouts: bool,
}

/// Everything one resolution pass produced.
#[derive(Debug, Default)]
pub struct Resolution {
    /// The playable layout sequence.
    pub schedule: Vec<ScheduleItem>,
    /// The active overlay set.
    pub overlays: Vec<ScheduleItem>,
    /// The surfaced action set.
    pub actions: Vec<ScheduleAction>,
    /// The extracted default/splash fallback.
    pub default_layout: Option<ScheduleItem>,
    /// Layout ids quarantined during this pass.
    pub invalid_ids: Vec<i64>,
}

/// Run one resolution pass over the locked state.
///
/// Serviced override actions are pruned here (a deferred-removal pass, never
/// removal while iterating). The state's raw lists are read, not replaced;
/// the caller decides what to do with the returned [`Resolution`].
pub fn resolve(state: &mut ResolverState, env: &ResolveEnv) -> Resolution {
    state.layout_change_actions.retain(|a| !a.is_serviced());
    state.overlay_layout_actions.retain(|a| !a.is_serviced());

    let fix = state.last_geo_fix;

    let mut candidates = state.raw_layout_schedule.clone();
    candidates.extend(materialise_layout_changes(&state.layout_change_actions));

    if env.adspace_enabled {
        if let Some(exchange) = env.exchange {
            let share = exchange.share_of_voice();
            if share > 0 {
                candidates.push(ScheduleItem::adspace(share, exchange.average_ad_duration()));
            }
        }
    }

    let vctx = ValidityContext {
        now: env.now,
        fix,
        cache: env.cache,
        expire_modified_layouts: env.expire_modified_layouts,
        currently_playing: state.currently_playing_layout_id,
    };

    let ValidityOutcome {
        playable,
        default_layout,
        mut invalid_ids,
    } = filter_playable(candidates, &vctx);

    let (selected, was_override) = apply_override_exclusivity(playable);
    let schedule = if was_override {
        selected
    } else {
        resolve_layouts(group_cycles(selected), default_layout.as_ref(), env.cache)
    };

    let mut overlay_candidates = state.raw_overlay_schedule.clone();
    overlay_candidates.extend(materialise_overlay_actions(&state.overlay_layout_actions));
    let overlay_outcome = resolve_overlays(overlay_candidates, &vctx);
    for id in overlay_outcome.invalid_ids {
        if !invalid_ids.contains(&id) {
            invalid_ids.push(id);
        }
    }

    let actions = watermark_actions(&state.raw_actions_schedule, env.now, fix.as_ref());

    Resolution {
        schedule,
        overlays: overlay_outcome.overlays,
        actions,
        default_layout,
        invalid_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryLayoutCache;
    use crate::exchange::{Ad, AdExchange, ExchangeError};
    use crate::schedule::NodeKind;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    fn env<'a>(cache: &'a InMemoryLayoutCache) -> ResolveEnv<'a> {
        ResolveEnv {
            now: now(),
            cache,
            exchange: None,
            adspace_enabled: false,
            expire_modified_layouts: true,
        }
    }

    fn windowed(layout_id: i64, priority: u32) -> ScheduleItem {
        let mut item = ScheduleItem::layout(
            layout_id,
            layout_id,
            now() - chrono::Duration::hours(1),
            now() + chrono::Duration::hours(1),
        );
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

    #[test]
    fn test_override_beats_priority() {
        // Schedule = {A(prio 10), B(override)} resolves to [B] alone.
        let cache = cache_with(&[1, 2]);
        let mut state = ResolverState {
            raw_layout_schedule: vec![windowed(1, 10)],
            ..Default::default()
        };
        state
            .layout_change_actions
            .push(LayoutChangeAction::new(2, now(), 9, false));

        let resolution = resolve(&mut state, &env(&cache));

        assert_eq!(resolution.schedule.len(), 1);
        assert_eq!(resolution.schedule[0].layout_id, 2);
        assert!(resolution.schedule[0].is_override);
    }

    #[test]
    fn test_priority_band_keeps_ties_in_order() {
        let cache = cache_with(&[1, 2, 3]);
        let mut state = ResolverState {
            raw_layout_schedule: vec![windowed(1, 1), windowed(2, 5), windowed(3, 5)],
            ..Default::default()
        };

        let resolution = resolve(&mut state, &env(&cache));

        let ids: Vec<i64> = resolution.schedule.iter().map(|i| i.layout_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_serviced_actions_pruned() {
        let cache = cache_with(&[1]);
        let mut state = ResolverState {
            raw_layout_schedule: vec![windowed(1, 0)],
            ..Default::default()
        };
        let mut played = LayoutChangeAction::new(2, now(), 9, false);
        played.set_played();
        state.layout_change_actions.push(played);

        let resolution = resolve(&mut state, &env(&cache));

        assert!(state.layout_change_actions.is_empty(), "pruned at tick start");
        assert_eq!(resolution.schedule[0].layout_id, 1);
    }

    #[test]
    fn test_invalid_override_quarantined_falls_through() {
        // Override layout 2 is not cached, so the planned layout plays.
        let cache = cache_with(&[1]);
        let mut state = ResolverState {
            raw_layout_schedule: vec![windowed(1, 0)],
            ..Default::default()
        };
        state
            .layout_change_actions
            .push(LayoutChangeAction::new(2, now(), 9, false));

        let resolution = resolve(&mut state, &env(&cache));

        assert_eq!(resolution.schedule[0].layout_id, 1);
        assert_eq!(resolution.invalid_ids, vec![2]);
    }

    #[test]
    fn test_cycle_group_resolves_as_single_slot() {
        let cache = cache_with(&[1, 2, 3]);
        let mut cycle_a = windowed(1, 0);
        cycle_a.is_cycle_playback = true;
        cycle_a.cycle_group_key = "k".to_string();
        let mut cycle_b = windowed(2, 0);
        cycle_b.is_cycle_playback = true;
        cycle_b.cycle_group_key = "k".to_string();

        let mut state = ResolverState {
            raw_layout_schedule: vec![cycle_a, cycle_b, windowed(3, 0)],
            ..Default::default()
        };

        let resolution = resolve(&mut state, &env(&cache));

        assert_eq!(resolution.schedule.len(), 2);
        let parent = &resolution.schedule[0];
        assert_eq!(parent.layout_id, 1);
        assert_eq!(parent.cycle_children.len(), 3);
        assert!(parent.cycle_children[0].is_cycle_sentinel());
    }

    #[test]
    fn test_adspace_joins_interrupts() {
        struct FixedExchange;
        impl AdExchange for FixedExchange {
            fn configure(&self) {}
            fn share_of_voice(&self) -> u32 {
                120
            }
            fn average_ad_duration(&self) -> u32 {
                60
            }
            fn get_ad(&self, _w: u32, _h: u32) -> Result<Ad, ExchangeError> {
                Err(ExchangeError::NoAdAvailable)
            }
        }

        let cache = cache_with(&[1]);
        let mut state = ResolverState {
            raw_layout_schedule: vec![windowed(1, 0)],
            ..Default::default()
        };

        let exchange = FixedExchange;
        let mut env = env(&cache);
        env.exchange = Some(&exchange);
        env.adspace_enabled = true;

        let resolution = resolve(&mut state, &env);

        let adspace_count = resolution
            .schedule
            .iter()
            .filter(|i| i.node_kind == NodeKind::AdSpace)
            .count();
        assert_eq!(adspace_count, 2, "120s of voice at 60s a visit");
    }

    #[test]
    fn test_actions_watermarked_per_tick() {
        use std::collections::HashMap;

        let cache = cache_with(&[1]);
        let mut state = ResolverState {
            raw_layout_schedule: vec![windowed(1, 0)],
            ..Default::default()
        };
        state.raw_actions_schedule = vec![
            ScheduleAction {
                priority: 2,
                from_dt: now() - chrono::Duration::hours(1),
                to_dt: now() + chrono::Duration::hours(1),
                is_geo_aware: false,
                geo_fence: None,
                payload: HashMap::new(),
            },
            ScheduleAction {
                priority: 7,
                from_dt: now() + chrono::Duration::hours(2),
                to_dt: now() + chrono::Duration::hours(3),
                is_geo_aware: false,
                geo_fence: None,
                payload: HashMap::new(),
            },
        ];

        let resolution = resolve(&mut state, &env(&cache));

        // The priority-7 action is not yet in window, so the 2 band surfaces.
        assert_eq!(resolution.actions.len(), 1);
        assert_eq!(resolution.actions[0].priority, 2);
    }

    #[test]
    fn test_empty_document_resolves_to_splash() {
        let cache = InMemoryLayoutCache::new();
        let mut state = ResolverState {
            raw_layout_schedule: vec![ScheduleItem::splash()],
            ..Default::default()
        };

        let resolution = resolve(&mut state, &env(&cache));

        assert_eq!(resolution.schedule.len(), 1);
        assert_eq!(resolution.schedule[0].node_kind, NodeKind::Splash);
        assert!(resolution.default_layout.is_some());
    }
}
