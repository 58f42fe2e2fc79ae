//! Ad-exchange seam for share-of-voice ad scheduling.
//!
//! When ad serving is enabled, the exchange client reports how many seconds
//! per hour of screen time ads must occupy and how long an average creative
//! runs. The resolver turns that into a synthetic adspace schedule item that
//! competes with other interrupts. Serving a concrete creative happens at
//! render time through [`AdExchange::get_ad`].

use thiserror::Error;

use crate::geo::{GeoFence, GeoFix};

/// Errors reported by the ad-exchange client.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The exchange has no creative to serve right now.
    #[error("no ad available")]
    NoAdAvailable,

    /// The exchange request failed.
    #[error("exchange request failed: {0}")]
    RequestFailed(String),
}

/// Metadata for an ad-exchange creative.
#[derive(Debug, Clone)]
pub struct Ad {
    /// Exchange-assigned identifier.
    pub id: String,
    /// Media duration in seconds.
    pub duration: u32,
    /// Local file the creative was downloaded to.
    pub file: String,
    /// Optional geofence restricting where the ad may serve.
    pub geo_fence: Option<GeoFence>,
}

impl Ad {
    /// Whether the ad may serve at the player's current location.
    ///
    /// Ads without a fence serve everywhere. A fenced ad with no known fix
    /// does not serve.
    pub fn is_geo_active(&self, fix: Option<&GeoFix>) -> bool {
        match (&self.geo_fence, fix) {
            (None, _) => true,
            (Some(fence), Some(fix)) => fence.contains(fix),
            (Some(_), None) => false,
        }
    }
}

/// Ad-exchange client abstraction consumed by the resolver.
pub trait AdExchange: Send + Sync {
    /// Refresh the exchange configuration from the upstream service.
    fn configure(&self);

    /// Seconds per hour ads must occupy; 0 disables adspace scheduling.
    fn share_of_voice(&self) -> u32;

    /// Average creative duration in seconds, used as the adspace item's
    /// duration hint.
    fn average_ad_duration(&self) -> u32;

    /// Fetch a creative for the given screen dimensions.
    fn get_ad(&self, width: u32, height: u32) -> Result<Ad, ExchangeError>;
}

/// Exchange stub used when ad serving is not configured.
#[derive(Debug, Clone, Default)]
pub struct NoOpExchange;

impl AdExchange for NoOpExchange {
    fn configure(&self) {}

    fn share_of_voice(&self) -> u32 {
        0
    }

    fn average_ad_duration(&self) -> u32 {
        0
    }

    fn get_ad(&self, _width: u32, _height: u32) -> Result<Ad, ExchangeError> {
        Err(ExchangeError::NoAdAvailable)
    }
}
