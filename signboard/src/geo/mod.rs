//! Geolocation primitives for geofenced scheduling.
//!
//! This module provides the position fix type shared by the schedule resolver
//! and the geo watcher, plus the navigation mathematics needed to decide when
//! the player has moved far enough that the schedule must be re-resolved.
//!
//! # Coordinate System
//!
//! - Latitude: degrees north (-90 to 90)
//! - Longitude: degrees east (-180 to 180)
//! - Distance: metres

use std::f64::consts::PI;

use thiserror::Error;

pub mod fence;
pub mod watcher;

pub use fence::GeoFence;
pub use watcher::GeoWatcher;

/// Earth's mean radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Degrees to radians conversion factor.
const DEG_TO_RAD: f64 = PI / 180.0;

/// Errors that can occur while handling geolocation data.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The geofence payload is not valid GeoJSON.
    #[error("invalid GeoJSON geofence: {0}")]
    InvalidGeoJson(String),

    /// The GeoJSON geometry type is not supported for fencing.
    #[error("unsupported geofence geometry: {0}")]
    UnsupportedGeometry(String),

    /// The coordinate feed has closed and could not be re-established.
    #[error("position feed closed")]
    FeedClosed,
}

/// A single geolocation fix reported by the positioning hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    /// Latitude in degrees north.
    pub latitude: f64,
    /// Longitude in degrees east.
    pub longitude: f64,
}

impl GeoFix {
    /// Create a fix from a latitude/longitude pair.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether this fix is usable for geofencing decisions.
    ///
    /// Hardware that has not acquired a position reports (0, 0) or NaN;
    /// both are ignored rather than treated as a real location.
    pub fn is_valid(&self) -> bool {
        if self.latitude.is_nan() || self.longitude.is_nan() {
            return false;
        }
        if self.latitude == 0.0 && self.longitude == 0.0 {
            return false;
        }
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Calculate the great-circle distance between two fixes in metres.
///
/// Uses the haversine formula for accuracy over short distances, which is
/// where the movement threshold operates.
///
/// # Example
///
/// ```
/// use signboard::geo::{distance_m, GeoFix};
///
/// // 1 degree of latitude is approximately 111 km
/// let d = distance_m(&GeoFix::new(0.0, 0.0), &GeoFix::new(1.0, 0.0));
/// assert!((d - 111_195.0).abs() < 200.0);
/// ```
pub fn distance_m(from: &GeoFix, to: &GeoFix) -> f64 {
    let lat1_rad = from.latitude * DEG_TO_RAD;
    let lat2_rad = to.latitude * DEG_TO_RAD;
    let delta_lat = (to.latitude - from.latitude) * DEG_TO_RAD;
    let delta_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    // Haversine formula
    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_validity() {
        assert!(GeoFix::new(52.52, 13.405).is_valid());
        assert!(GeoFix::new(-33.86, 151.21).is_valid());

        // Unacquired hardware placeholder
        assert!(!GeoFix::new(0.0, 0.0).is_valid());

        // Out of range
        assert!(!GeoFix::new(91.0, 0.0).is_valid());
        assert!(!GeoFix::new(45.0, 181.0).is_valid());

        // NaN
        assert!(!GeoFix::new(f64::NAN, 13.0).is_valid());
    }

    #[test]
    fn test_equator_on_meridian_is_invalid_but_nearby_is_not() {
        // (0, 0) specifically is the "no fix" placeholder; a real position in
        // the Gulf of Guinea a few metres away must still count.
        assert!(GeoFix::new(0.0001, 0.0).is_valid());
        assert!(GeoFix::new(0.0, 0.0001).is_valid());
    }

    #[test]
    fn test_distance_zero() {
        let berlin = GeoFix::new(52.52, 13.405);
        assert!(distance_m(&berlin, &berlin).abs() < 0.001);
    }

    #[test]
    fn test_distance_symmetry() {
        let a = GeoFix::new(52.52, 13.405);
        let b = GeoFix::new(52.53, 13.42);

        let ab = distance_m(&a, &b);
        let ba = distance_m(&b, &a);
        assert!((ab - ba).abs() < 0.001, "distance should be symmetric");
    }

    #[test]
    fn test_distance_city_block() {
        // ~100 m north of a reference point: 100 m is ~0.0009 degrees latitude
        let a = GeoFix::new(52.5200, 13.4050);
        let b = GeoFix::new(52.5209, 13.4050);

        let d = distance_m(&a, &b);
        assert!(d > 90.0 && d < 110.0, "expected ~100 m, got {}", d);
    }

    #[test]
    fn test_distance_berlin_to_paris() {
        // Berlin to Paris is approximately 878 km
        let berlin = GeoFix::new(52.52, 13.405);
        let paris = GeoFix::new(48.8566, 2.3522);

        let d = distance_m(&berlin, &paris);
        assert!(
            (d - 878_000.0).abs() < 10_000.0,
            "expected ~878 km, got {}",
            d
        );
    }
}
