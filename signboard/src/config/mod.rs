//! Scheduler configuration.
//!
//! Settings are plain data with sensible defaults; an optional INI file
//! overlays them ([`parser`]). Collaborator wiring (cache manager, ad
//! exchange, shell runner) is injected in code, not configured here.

use std::path::PathBuf;
use std::time::Duration;

mod parser;

pub use parser::{load_settings, ConfigError};

/// Complete scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Path of the cached schedule XML.
    pub schedule_path: PathBuf,
    /// Content-library root layout files resolve against.
    pub library_dir: PathBuf,
    /// Base tick interval of the resolution loop.
    pub tick_interval: Duration,
    /// Look-ahead window for command dispatch.
    pub command_window: Duration,
    /// Whether a CMS update expires the layout currently on screen.
    pub expire_modified_layouts: bool,
    /// Interval between screenshots; zero disables them.
    pub screenshot_interval: Duration,
    /// Whether ad-exchange adspace slots join the schedule.
    pub adspace_enabled: bool,
    /// Movement distance in metres that marks the schedule stale.
    pub geo_refresh_distance_m: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            schedule_path: PathBuf::from("schedule.xml"),
            library_dir: PathBuf::from("library"),
            tick_interval: Duration::from_secs(10),
            command_window: Duration::from_secs(10),
            expire_modified_layouts: true,
            screenshot_interval: Duration::ZERO,
            adspace_enabled: false,
            geo_refresh_distance_m: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SchedulerSettings::default();

        assert_eq!(settings.tick_interval, Duration::from_secs(10));
        assert_eq!(settings.command_window, Duration::from_secs(10));
        assert!(settings.expire_modified_layouts);
        assert!(settings.screenshot_interval.is_zero());
        assert!(!settings.adspace_enabled);
        assert_eq!(settings.geo_refresh_distance_m, 100.0);
    }
}
