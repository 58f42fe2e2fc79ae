//! Validity filtering: which schedule items are playable right now.
//!
//! An item is playable when the cache manager vouches for its layout file and
//! every dependent, its window contains the current instant, and (for
//! geo-aware items) its fence contains the current fix. Items the cache
//! cannot vouch for are quarantined so diagnostics can report exactly what
//! was withheld and why.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::LayoutCache;
use crate::geo::GeoFix;
use crate::schedule::{NodeKind, ScheduleItem};

/// Per-tick context the validity filter runs under.
pub struct ValidityContext<'a> {
    /// The tick's captured instant.
    pub now: DateTime<Utc>,
    /// Latest usable geolocation fix, if any.
    pub fix: Option<GeoFix>,
    /// Cache manager consulted for file validity and layout safety.
    pub cache: &'a dyn LayoutCache,
    /// When false, the layout currently on screen skips the validity test so
    /// an in-place CMS update cannot blank the player.
    pub expire_modified_layouts: bool,
    /// Layout currently on screen, if the renderer reported one.
    pub currently_playing: Option<i64>,
}

/// Result of a validity pass.
#[derive(Debug, Default)]
pub struct ValidityOutcome {
    /// Items that may play right now, in input order.
    pub playable: Vec<ScheduleItem>,
    /// The extracted default/splash fallback, when the input carried one.
    pub default_layout: Option<ScheduleItem>,
    /// Layout ids quarantined by cache validity.
    pub invalid_ids: Vec<i64>,
}

/// Filter items down to the playable set.
///
/// Fallback kinds (default, splash) bypass every check and are extracted into
/// `default_layout`. Adspace items have no backing file and skip the cache
/// consultation. Everything else must pass cache validity, the window test,
/// and the geofence test, in that order.
pub fn filter_playable(items: Vec<ScheduleItem>, ctx: &ValidityContext) -> ValidityOutcome {
    let mut outcome = ValidityOutcome::default();
    // Cache verdicts are memoised per layout id: the manager is consulted
    // once per distinct layout in a pass.
    let mut verdicts: HashMap<i64, bool> = HashMap::new();

    for item in items {
        if item.node_kind.is_fallback() {
            outcome.default_layout = Some(item);
            continue;
        }

        let cache_ok = if item.node_kind == NodeKind::AdSpace {
            true
        } else if !ctx.expire_modified_layouts && ctx.currently_playing == Some(item.layout_id) {
            // Keep the running layout alive across an update.
            true
        } else {
            *verdicts
                .entry(item.layout_id)
                .or_insert_with(|| cache_validates(&item, ctx.cache))
        };

        if !cache_ok {
            if !outcome.invalid_ids.contains(&item.layout_id) {
                outcome.invalid_ids.push(item.layout_id);
            }
            continue;
        }

        if !item.window_contains(ctx.now) {
            continue;
        }

        if item.is_geo_aware && !geo_active(&item, ctx.fix.as_ref()) {
            debug!(layout_id = item.layout_id, "layout outside geofence, skipping");
            continue;
        }

        outcome.playable.push(item);
    }

    outcome
}

/// Consult the cache manager. Any error counts as invalid: a layout the
/// cache cannot vouch for must not play.
fn cache_validates(item: &ScheduleItem, cache: &dyn LayoutCache) -> bool {
    let layout_file = format!("{}.xlf", item.layout_id);

    match cache.is_valid_path(&layout_file) {
        Ok(true) => {}
        Ok(false) => {
            warn!(layout_id = item.layout_id, "layout file not cache-valid, quarantining");
            return false;
        }
        Err(e) => {
            warn!(layout_id = item.layout_id, error = %e, "cache lookup failed, quarantining");
            return false;
        }
    }

    match cache.is_unsafe_layout(item.layout_id) {
        Ok(false) => {}
        Ok(true) => {
            warn!(layout_id = item.layout_id, "layout flagged unsafe, quarantining");
            return false;
        }
        Err(e) => {
            warn!(layout_id = item.layout_id, error = %e, "unsafe-layout lookup failed, quarantining");
            return false;
        }
    }

    for dependent in &item.dependents {
        match cache.is_valid_path(dependent) {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    layout_id = item.layout_id,
                    dependent, "dependent not cache-valid, quarantining layout"
                );
                return false;
            }
            Err(e) => {
                warn!(
                    layout_id = item.layout_id,
                    dependent, error = %e, "dependent lookup failed, quarantining layout"
                );
                return false;
            }
        }
    }

    true
}

/// Whether a geo-aware item may play under the current fix. No fence or no
/// fix means not geo-active.
fn geo_active(item: &ScheduleItem, fix: Option<&GeoFix>) -> bool {
    match (&item.geo_fence, fix) {
        (Some(fence), Some(fix)) => fence.contains(fix),
        _ => false,
    }
}
