//! Schedule item data model.
//!
//! A [`ScheduleItem`] is one candidate layout in the schedule: a CMS-planned
//! layout, the default/splash fallback, an overlay, a player-injected
//! override, or a synthetic adspace slot. The resolver filters, groups, and
//! interleaves these per tick.

use chrono::{DateTime, Utc};

use crate::geo::GeoFence;

/// Kind of schedule node an item was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The CMS-designated fallback layout.
    Default,
    /// A planned layout.
    Layout,
    /// An overlay drawn on top of the current layout.
    Overlay,
    /// The built-in splash shown when nothing else is playable.
    Splash,
    /// A synthetic slot reserved for ad-exchange creatives.
    AdSpace,
}

impl NodeKind {
    /// Whether this kind is a fallback that bypasses validity and window
    /// checks.
    pub fn is_fallback(&self) -> bool {
        matches!(self, NodeKind::Default | NodeKind::Splash)
    }
}

/// Identity of an item for change detection.
///
/// Two items are the same scheduled entity when their layout, schedule event,
/// override action, and window all match; everything else (priority edits,
/// cycle config) refreshes in place without a layout swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemIdentity {
    pub layout_id: i64,
    pub schedule_id: i64,
    pub action_id: i64,
    pub from_dt: DateTime<Utc>,
    pub to_dt: DateTime<Utc>,
}

/// A single candidate layout in the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleItem {
    /// Layout identifier; the backing file is `<layout_id>.xlf`.
    pub layout_id: i64,
    /// CMS schedule event id; 0 for the default/splash item.
    pub schedule_id: i64,
    /// Originating override action id; 0 when not an override.
    pub action_id: i64,
    /// Node kind the item was parsed from.
    pub node_kind: NodeKind,
    /// Resolved path of the layout file within the library.
    pub file: String,
    /// Window start (UTC). The default item ignores the window.
    pub from_dt: DateTime<Utc>,
    /// Window end (UTC).
    pub to_dt: DateTime<Utc>,
    /// Scheduling priority; 0 is the baseline band.
    pub priority: u32,
    /// True for player-injected override items.
    pub is_override: bool,
    /// Seconds per hour this item must occupy; 0 means not an interrupt.
    pub share_of_voice: u32,
    /// Planned duration in seconds; 0 means "ask the cache manager".
    pub duration_hint: u32,
    /// Whether the item is guarded by a geofence.
    pub is_geo_aware: bool,
    /// Parsed geofence, when `is_geo_aware`.
    pub geo_fence: Option<GeoFence>,
    /// Whether this item participates in cycle playback.
    pub is_cycle_playback: bool,
    /// Cycle group key; non-empty when cycling.
    pub cycle_group_key: String,
    /// Renderer-facing play count per cycle step.
    pub cycle_play_count: u32,
    /// Files that must all be cache-valid for the item to play.
    pub dependents: Vec<String>,
    /// Cycle children; populated on cycle parents only, with a sentinel at
    /// index 0 standing in for the parent itself.
    pub cycle_children: Vec<ScheduleItem>,
    /// Seconds committed during share-of-voice accumulation. Transient;
    /// meaningful only inside the priority/interrupt resolver.
    pub committed_duration: u32,
}

impl ScheduleItem {
    /// Create a layout item with an explicit window.
    pub fn layout(layout_id: i64, schedule_id: i64, from_dt: DateTime<Utc>, to_dt: DateTime<Utc>) -> Self {
        Self {
            layout_id,
            schedule_id,
            file: format!("{layout_id}.xlf"),
            from_dt,
            to_dt,
            ..Self::empty(NodeKind::Layout)
        }
    }

    /// Create the built-in splash fallback.
    pub fn splash() -> Self {
        Self::empty(NodeKind::Splash)
    }

    /// Create the CMS default fallback for the given layout.
    pub fn default_layout(layout_id: i64) -> Self {
        Self {
            layout_id,
            file: format!("{layout_id}.xlf"),
            ..Self::empty(NodeKind::Default)
        }
    }

    /// Create a synthetic adspace interrupt carrying the exchange's share of
    /// voice and average creative duration.
    pub fn adspace(share_of_voice: u32, average_ad_duration: u32) -> Self {
        Self {
            share_of_voice,
            duration_hint: average_ad_duration,
            ..Self::empty(NodeKind::AdSpace)
        }
    }

    fn empty(node_kind: NodeKind) -> Self {
        Self {
            layout_id: 0,
            schedule_id: 0,
            action_id: 0,
            node_kind,
            file: String::new(),
            from_dt: DateTime::<Utc>::MIN_UTC,
            to_dt: DateTime::<Utc>::MAX_UTC,
            priority: 0,
            is_override: false,
            share_of_voice: 0,
            duration_hint: 0,
            is_geo_aware: false,
            geo_fence: None,
            is_cycle_playback: false,
            cycle_group_key: String::new(),
            cycle_play_count: 0,
            dependents: Vec::new(),
            cycle_children: Vec::new(),
            committed_duration: 0,
        }
    }

    /// Whether the item demands share-of-voice interleaving.
    pub fn is_interrupt(&self) -> bool {
        self.share_of_voice > 0
    }

    /// Whether `now` falls inside the item's window. Fallback kinds always
    /// match.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.node_kind.is_fallback() || (self.from_dt <= now && now <= self.to_dt)
    }

    /// The identity tuple used for change detection.
    pub fn identity(&self) -> ItemIdentity {
        ItemIdentity {
            layout_id: self.layout_id,
            schedule_id: self.schedule_id,
            action_id: self.action_id,
            from_dt: self.from_dt,
            to_dt: self.to_dt,
        }
    }

    /// The empty sentinel reserving index 0 of a cycle parent's child list.
    pub fn cycle_sentinel() -> Self {
        Self::empty(NodeKind::Layout)
    }

    /// Whether this item is the cycle sentinel.
    pub fn is_cycle_sentinel(&self) -> bool {
        self.layout_id == 0 && self.node_kind == NodeKind::Layout && self.cycle_group_key.is_empty()
    }
}
