//! INI parsing for scheduler settings.
//!
//! This is the single place where INI key names map to struct fields.
//! Parsing starts from `SchedulerSettings::default()` and overlays any
//! values found in the file; a missing file just means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::SchedulerSettings;

/// Errors raised while loading the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed as INI.
    #[error("failed to load config file: {0}")]
    Load(String),

    /// A key holds a value that cannot be interpreted.
    #[error("invalid value for [{section}] {key}: {value} ({reason})")]
    InvalidValue {
        /// Section the key lives in.
        section: String,
        /// Offending key.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Load settings from an INI file, overlaying the defaults.
///
/// A missing file yields the defaults unchanged.
pub fn load_settings(path: &Path) -> Result<SchedulerSettings, ConfigError> {
    if !path.exists() {
        return Ok(SchedulerSettings::default());
    }

    let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Load(e.to_string()))?;
    parse_ini(&ini)
}

fn parse_ini(ini: &Ini) -> Result<SchedulerSettings, ConfigError> {
    let mut settings = SchedulerSettings::default();

    if let Some(section) = ini.section(Some("schedule")) {
        if let Some(v) = section.get("path") {
            if !v.trim().is_empty() {
                settings.schedule_path = PathBuf::from(v.trim());
            }
        }
        if let Some(v) = section.get("library") {
            if !v.trim().is_empty() {
                settings.library_dir = PathBuf::from(v.trim());
            }
        }
        if let Some(v) = section.get("tick_interval_secs") {
            settings.tick_interval = Duration::from_secs(parse_u64("schedule", "tick_interval_secs", v)?);
        }
        if let Some(v) = section.get("command_window_secs") {
            settings.command_window =
                Duration::from_secs(parse_u64("schedule", "command_window_secs", v)?);
        }
        if let Some(v) = section.get("expire_modified_layouts") {
            settings.expire_modified_layouts = parse_bool("schedule", "expire_modified_layouts", v)?;
        }
    }

    if let Some(section) = ini.section(Some("screenshot")) {
        if let Some(v) = section.get("interval_secs") {
            settings.screenshot_interval =
                Duration::from_secs(parse_u64("screenshot", "interval_secs", v)?);
        }
    }

    if let Some(section) = ini.section(Some("adspace")) {
        if let Some(v) = section.get("enabled") {
            settings.adspace_enabled = parse_bool("adspace", "enabled", v)?;
        }
    }

    if let Some(section) = ini.section(Some("geo")) {
        if let Some(v) = section.get("refresh_distance_m") {
            let parsed: f64 = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                section: "geo".to_string(),
                key: "refresh_distance_m".to_string(),
                value: v.to_string(),
                reason: "must be a number of metres".to_string(),
            })?;
            if parsed <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    section: "geo".to_string(),
                    key: "refresh_distance_m".to_string(),
                    value: v.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            settings.geo_refresh_distance_m = parsed;
        }
    }

    Ok(settings)
}

fn parse_u64(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a boolean".to_string(),
        }),
    }
}
