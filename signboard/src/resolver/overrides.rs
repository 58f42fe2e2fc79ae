//! Player-injected override actions.
//!
//! The CMS can instruct the player directly: "change to this layout now" or
//! "put this overlay up". Those instructions arrive outside the schedule
//! document and are queued here until their content is downloaded, then
//! materialised as synthetic schedule items that outrank everything the
//! document planned. Once the renderer reports the override played, the
//! action is serviced and pruned on the next tick.

use chrono::{DateTime, Duration, Utc};

use crate::schedule::{NodeKind, ScheduleItem};

/// A "change layout now" instruction injected by the player API.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutChangeAction {
    /// Layout to switch to.
    pub layout_id: i64,
    /// When the instruction was issued.
    pub created_at: DateTime<Utc>,
    /// CMS action id, carried onto the materialised item.
    pub action_id: i64,
    /// True until the layout and its media are downloaded; the action is not
    /// materialised while this is set.
    pub download_required: bool,
    played: bool,
}

impl LayoutChangeAction {
    /// Create a pending layout-change action.
    pub fn new(layout_id: i64, created_at: DateTime<Utc>, action_id: i64, download_required: bool) -> Self {
        Self {
            layout_id,
            created_at,
            action_id,
            download_required,
            played: false,
        }
    }

    /// Record that the renderer played the override.
    pub fn set_played(&mut self) {
        self.played = true;
    }

    /// Whether the action has been satisfied and can be pruned.
    pub fn is_serviced(&self) -> bool {
        self.played
    }

    /// Materialise the action as an override schedule item.
    ///
    /// The window opens one second before the action was issued so clock
    /// jitter between the API thread and the tick cannot hide it, and never
    /// closes.
    pub fn to_schedule_item(&self) -> ScheduleItem {
        let mut item = ScheduleItem::layout(
            self.layout_id,
            0,
            self.created_at - Duration::seconds(1),
            DateTime::<Utc>::MAX_UTC,
        );
        item.action_id = self.action_id;
        item.is_override = true;
        item
    }
}

/// An "overlay this layout" instruction injected by the player API.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayoutAction {
    /// Layout to overlay.
    pub layout_id: i64,
    /// CMS action id, carried onto the materialised item.
    pub action_id: i64,
    /// True until the layout and its media are downloaded.
    pub download_required: bool,
    played: bool,
}

impl OverlayLayoutAction {
    /// Create a pending overlay-layout action.
    pub fn new(layout_id: i64, action_id: i64, download_required: bool) -> Self {
        Self {
            layout_id,
            action_id,
            download_required,
            played: false,
        }
    }

    /// Record that the renderer showed the overlay.
    pub fn set_played(&mut self) {
        self.played = true;
    }

    /// Whether the action has been satisfied and can be pruned.
    pub fn is_serviced(&self) -> bool {
        self.played
    }

    /// Materialise the action as an override overlay item with an unbounded
    /// window.
    pub fn to_schedule_item(&self) -> ScheduleItem {
        let mut item = ScheduleItem::layout(self.layout_id, 0, DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC);
        item.node_kind = NodeKind::Overlay;
        item.action_id = self.action_id;
        item.is_override = true;
        item
    }
}

/// Materialise every downloadable layout-change action.
pub fn materialise_layout_changes(actions: &[LayoutChangeAction]) -> Vec<ScheduleItem> {
    actions
        .iter()
        .filter(|a| !a.download_required && !a.is_serviced())
        .map(LayoutChangeAction::to_schedule_item)
        .collect()
}

/// Materialise every downloadable overlay-layout action.
pub fn materialise_overlay_actions(actions: &[OverlayLayoutAction]) -> Vec<ScheduleItem> {
    actions
        .iter()
        .filter(|a| !a.download_required && !a.is_serviced())
        .map(OverlayLayoutAction::to_schedule_item)
        .collect()
}

/// Override exclusivity: when any surviving item is an override, the
/// overrides alone form the schedule. Otherwise the input passes through for
/// cycle and priority resolution.
pub fn apply_override_exclusivity(items: Vec<ScheduleItem>) -> (Vec<ScheduleItem>, bool) {
    if items.iter().any(|i| i.is_override) {
        (items.into_iter().filter(|i| i.is_override).collect(), true)
    } else {
        (items, false)
    }
}
