//! Shared resolver state.
//!
//! A single [`ResolverState`] instance holds everything the resolver reads
//! and writes: the parsed document, the injected override actions, and the
//! currently resolved schedules. One process-wide mutex protects it; the
//! tick loop holds the lock for a whole resolution pass, while external
//! threads (action injectors, the geo watcher, the downloader) take it for
//! brief critical sections through the typed accessors on
//! [`SharedScheduleState`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::geo::{distance_m, GeoFix};
use crate::schedule::{
    parse_schedule_xml, read_schedule_xml, write_schedule_xml, ScheduleAction, ScheduleCommand,
    ScheduleDocument, ScheduleFileError, ScheduleItem,
};

use super::overrides::{LayoutChangeAction, OverlayLayoutAction};

/// Process-wide resolver state. Single instance, created at startup.
#[derive(Debug, Default)]
pub struct ResolverState {
    /// Parsed `layout`/`default` nodes.
    pub raw_layout_schedule: Vec<ScheduleItem>,
    /// Parsed overlay nodes.
    pub raw_overlay_schedule: Vec<ScheduleItem>,
    /// Parsed commands; `has_run` flips in place.
    pub commands: Vec<ScheduleCommand>,
    /// Parsed actions, unfiltered; watermarked per tick.
    pub raw_actions_schedule: Vec<ScheduleAction>,

    /// Pending player-injected layout changes.
    pub layout_change_actions: Vec<LayoutChangeAction>,
    /// Pending player-injected overlay layouts.
    pub overlay_layout_actions: Vec<OverlayLayoutAction>,

    /// The resolved layout sequence observers read.
    pub current_schedule: Vec<ScheduleItem>,
    /// The resolved overlay set.
    pub current_overlay_schedule: Vec<ScheduleItem>,
    /// The surfaced action set.
    pub current_actions_schedule: Vec<ScheduleAction>,
    /// The extracted default/splash fallback.
    pub current_default_layout: Option<ScheduleItem>,
    /// Layout ids quarantined by the last validity pass.
    pub invalid_schedule: Vec<i64>,

    /// Set by the geo watcher and refresh callers; consumed at tick start.
    pub refresh_requested: bool,
    /// When the last screenshot was taken.
    pub last_screenshot_at: Option<DateTime<Utc>>,
    /// Latest usable geolocation fix.
    pub last_geo_fix: Option<GeoFix>,
    /// Layout the renderer reported as on screen.
    pub currently_playing_layout_id: Option<i64>,
    /// Human-readable outcome of the last tick, for diagnostics.
    pub last_tick_status: String,
}

/// Thread-safe handle to the resolver state.
#[derive(Clone, Debug, Default)]
pub struct SharedScheduleState {
    inner: Arc<Mutex<ResolverState>>,
}

impl SharedScheduleState {
    /// Create an empty state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the state lock.
    ///
    /// A poisoned lock is recovered rather than propagated: a panicking tick
    /// must not take the whole player down with it.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the raw schedules with a freshly parsed document.
    pub fn install_document(&self, doc: ScheduleDocument) {
        let mut state = self.lock();
        info!(
            layouts = doc.layouts.len(),
            overlays = doc.overlays.len(),
            commands = doc.commands.len(),
            actions = doc.actions.len(),
            "installing schedule document"
        );
        state.raw_layout_schedule = doc.layouts;
        state.raw_overlay_schedule = doc.overlays;
        state.commands = doc.commands;
        state.raw_actions_schedule = doc.actions;
        state.refresh_requested = true;
    }

    /// Install the splash fallback schedule.
    pub fn set_empty_schedule(&self) {
        self.install_document(ScheduleDocument::splash_fallback());
    }

    /// Read and parse the schedule file, installing the result.
    ///
    /// A missing file parses as the empty document; an unreadable or
    /// unparsable one installs the splash fallback. The file read happens
    /// under the state lock so the downloader's replace cannot interleave.
    pub fn load_schedule_from_file(&self, path: &Path, library_dir: &Path) {
        // Hold the lock across read + parse + install so readers never see a
        // half-written file or a half-installed document.
        let mut state = self.lock();

        let xml = match read_schedule_xml(path) {
            Ok(xml) => xml,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "schedule file unreadable, installing splash");
                String::new()
            }
        };

        let doc = match parse_schedule_xml(&xml, library_dir) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "schedule document unparsable, installing splash");
                ScheduleDocument::splash_fallback()
            }
        };

        info!(
            path = %path.display(),
            layouts = doc.layouts.len(),
            overlays = doc.overlays.len(),
            "loaded schedule from file"
        );
        state.raw_layout_schedule = doc.layouts;
        state.raw_overlay_schedule = doc.overlays;
        state.commands = doc.commands;
        state.raw_actions_schedule = doc.actions;
        state.refresh_requested = true;
    }

    /// Persist a received schedule document verbatim, serialised through the
    /// state lock.
    pub fn write_schedule_to_disk(&self, path: &Path, xml: &str) -> Result<(), ScheduleFileError> {
        let _state = self.lock();
        write_schedule_xml(path, xml)
    }

    /// Queue a player-injected layout change.
    pub fn add_layout_change_action(&self, action: LayoutChangeAction) {
        let mut state = self.lock();
        info!(
            layout_id = action.layout_id,
            action_id = action.action_id,
            download_required = action.download_required,
            "layout change action queued"
        );
        state.layout_change_actions.push(action);
        state.refresh_requested = true;
    }

    /// Drop all pending layout changes.
    pub fn clear_layout_change_actions(&self) {
        let mut state = self.lock();
        state.layout_change_actions.clear();
        state.refresh_requested = true;
    }

    /// Queue a player-injected overlay layout.
    pub fn add_overlay_layout_action(&self, action: OverlayLayoutAction) {
        let mut state = self.lock();
        info!(
            layout_id = action.layout_id,
            action_id = action.action_id,
            "overlay layout action queued"
        );
        state.overlay_layout_actions.push(action);
        state.refresh_requested = true;
    }

    /// Mark every pending injected action as downloaded, making them
    /// eligible for materialisation on the next tick.
    pub fn set_all_actions_downloaded(&self) {
        let mut state = self.lock();
        for action in &mut state.layout_change_actions {
            action.download_required = false;
        }
        for action in &mut state.overlay_layout_actions {
            action.download_required = false;
        }
        state.refresh_requested = true;
    }

    /// Mark the injected actions behind `action_id` as played, so the next
    /// tick prunes them.
    pub fn mark_action_played(&self, action_id: i64) {
        let mut state = self.lock();
        for action in &mut state.layout_change_actions {
            if action.action_id == action_id {
                action.set_played();
            }
        }
        for action in &mut state.overlay_layout_actions {
            if action.action_id == action_id {
                action.set_played();
            }
        }
    }

    /// Ask for a re-resolution on the next wake.
    pub fn request_refresh(&self) {
        self.lock().refresh_requested = true;
    }

    /// Record a position fix.
    ///
    /// Returns true when the fix was accepted as movement: the first valid
    /// fix, or a fix at least `threshold_m` metres from the stored one.
    /// Acceptance stores the fix and raises the refresh flag.
    pub fn record_position(&self, fix: GeoFix, threshold_m: f64) -> bool {
        if !fix.is_valid() {
            return false;
        }

        let mut state = self.lock();
        let moved = match &state.last_geo_fix {
            None => true,
            Some(previous) => distance_m(previous, &fix) >= threshold_m,
        };

        if moved {
            info!(
                latitude = fix.latitude,
                longitude = fix.longitude,
                "position accepted, schedule is stale"
            );
            state.last_geo_fix = Some(fix);
            state.refresh_requested = true;
        }
        moved
    }

    /// Record which layout the renderer has on screen.
    pub fn set_currently_playing(&self, layout_id: Option<i64>) {
        self.lock().currently_playing_layout_id = layout_id;
    }

    /// Snapshot of the resolved layout sequence.
    pub fn current_schedule(&self) -> Vec<ScheduleItem> {
        self.lock().current_schedule.clone()
    }

    /// Snapshot of the resolved overlay set.
    pub fn current_overlay_schedule(&self) -> Vec<ScheduleItem> {
        self.lock().current_overlay_schedule.clone()
    }

    /// Snapshot of the surfaced action set.
    pub fn current_actions_schedule(&self) -> Vec<ScheduleAction> {
        self.lock().current_actions_schedule.clone()
    }

    /// Snapshot of the extracted default layout.
    pub fn current_default_layout(&self) -> Option<ScheduleItem> {
        self.lock().current_default_layout.clone()
    }

    /// Snapshot of the quarantined layout ids.
    pub fn invalid_schedule(&self) -> Vec<i64> {
        self.lock().invalid_schedule.clone()
    }

    /// The last tick's diagnostic status line.
    pub fn last_tick_status(&self) -> String {
        self.lock().last_tick_status.clone()
    }
}
