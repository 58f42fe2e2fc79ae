//! CMS action model and the priority watermark.
//!
//! Actions are opaque instructions the CMS schedules alongside layouts
//! (touch triggers, webhook bindings, and the like). The resolver does not
//! interpret them; it only decides which ones are currently surfaced: of the
//! actions whose time window and geofence match right now, the highest
//! priority band wins and everything below it is discarded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::geo::{GeoFence, GeoFix};

/// A CMS-scheduled action.
#[derive(Debug, Clone)]
pub struct ScheduleAction {
    /// Selection priority; the highest valid band is surfaced.
    pub priority: u32,
    /// Window start (UTC).
    pub from_dt: DateTime<Utc>,
    /// Window end (UTC).
    pub to_dt: DateTime<Utc>,
    /// Whether the action is guarded by a geofence.
    pub is_geo_aware: bool,
    /// Parsed geofence, when `is_geo_aware`.
    pub geo_fence: Option<GeoFence>,
    /// Raw attribute payload forwarded untouched to the consumer.
    pub payload: HashMap<String, String>,
}

impl ScheduleAction {
    /// Whether the action is valid right now: inside its window and, when
    /// geo-aware, fenced around the current fix.
    pub fn is_valid(&self, now: DateTime<Utc>, fix: Option<&GeoFix>) -> bool {
        if now < self.from_dt || now > self.to_dt {
            return false;
        }
        if self.is_geo_aware {
            match (&self.geo_fence, fix) {
                (Some(fence), Some(fix)) => fence.contains(fix),
                _ => false,
            }
        } else {
            true
        }
    }
}

/// Apply the priority watermark: keep only the highest-priority band among
/// the actions valid at `now` under the current fix. Ties accumulate in
/// input order.
pub fn watermark_actions(
    actions: &[ScheduleAction],
    now: DateTime<Utc>,
    fix: Option<&GeoFix>,
) -> Vec<ScheduleAction> {
    let mut surfaced: Vec<ScheduleAction> = Vec::new();
    let mut watermark = 0u32;

    for action in actions {
        if !action.is_valid(now, fix) {
            continue;
        }
        if action.priority > watermark {
            watermark = action.priority;
            surfaced.clear();
            surfaced.push(action.clone());
        } else if action.priority == watermark {
            surfaced.push(action.clone());
        }
    }

    surfaced
}
