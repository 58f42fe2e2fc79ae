//! Signboard - schedule resolution for a digital-signage player
//!
//! This library decides what a signage player should be showing right now.
//! Once per tick it takes the cached schedule document, player-injected
//! override actions, and the latest geolocation fix, and resolves them into
//! the playable layout sequence, the active overlay set, the active action
//! set, and any commands due for imminent execution. Change notifications let
//! the downstream renderer swap what is on screen.
//!
//! # High-Level API
//!
//! ```ignore
//! use signboard::config::SchedulerSettings;
//! use signboard::resolver::{DaemonContext, ScheduleDaemon, ScheduleEvents, SharedScheduleState};
//!
//! let settings = SchedulerSettings::default();
//! let state = SharedScheduleState::new();
//! state.load_schedule_from_file(&settings.schedule_path, &settings.library_dir);
//!
//! let events = ScheduleEvents::new()
//!     .with_on_new_schedule_available(|| { /* swap layouts */ });
//!
//! let daemon = ScheduleDaemon::start(DaemonContext {
//!     state, settings, cache, exchange: None, runner, screenshots: None, events,
//! });
//! // ... daemon.refresh_now() / daemon.stop()
//! ```

pub mod cache;
pub mod config;
pub mod exchange;
pub mod geo;
pub mod logging;
pub mod resolver;
pub mod schedule;
pub mod screenshot;

/// Version of the signboard library.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
