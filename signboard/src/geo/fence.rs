//! GeoJSON geofences for location-gated schedule items.
//!
//! The CMS attaches a GeoJSON feature to geo-aware layouts, overlays, and
//! actions. A fence accepts a `Feature`, a bare `Polygon`/`MultiPolygon`
//! geometry, or a `FeatureCollection` (first polygonal feature wins), and
//! answers point-in-polygon queries against the player's current fix.

use serde::Deserialize;

use super::{GeoError, GeoFix};

/// A polygon ring as GeoJSON positions: `[longitude, latitude]` pairs.
type Ring = Vec<[f64; 2]>;

/// A parsed geofence polygon set.
///
/// Each polygon holds an exterior ring followed by zero or more hole rings,
/// per the GeoJSON spec. Containment means inside at least one polygon's
/// exterior and outside all of that polygon's holes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFence {
    polygons: Vec<Vec<Ring>>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    Feature {
        geometry: Option<Geometry>,
    },
    FeatureCollection {
        features: Vec<FeatureEntry>,
    },
    Polygon {
        coordinates: Vec<Ring>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Ring>>,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

#[derive(Deserialize)]
struct FeatureEntry {
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Ring>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Ring>>,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl GeoFence {
    /// Parse a fence from a GeoJSON string.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidGeoJson`] for malformed JSON and
    /// [`GeoError::UnsupportedGeometry`] when no polygonal geometry is
    /// present.
    pub fn parse(geojson: &str) -> Result<Self, GeoError> {
        let doc: GeoJson =
            serde_json::from_str(geojson).map_err(|e| GeoError::InvalidGeoJson(e.to_string()))?;

        let polygons = match doc {
            GeoJson::Polygon { coordinates } => vec![coordinates],
            GeoJson::MultiPolygon { coordinates } => coordinates,
            GeoJson::Feature { geometry } => Self::from_geometry(geometry)?,
            GeoJson::FeatureCollection { features } => {
                let mut found = None;
                for feature in features {
                    if let Ok(polys) = Self::from_geometry(feature.geometry) {
                        found = Some(polys);
                        break;
                    }
                }
                found.ok_or_else(|| {
                    GeoError::UnsupportedGeometry("no polygonal feature in collection".to_string())
                })?
            }
            GeoJson::Other(v) => {
                return Err(GeoError::UnsupportedGeometry(
                    v.get("type")
                        .and_then(|t| t.as_str())
                        .unwrap_or("unknown")
                        .to_string(),
                ))
            }
        };

        if polygons.iter().all(|p| p.is_empty()) {
            return Err(GeoError::UnsupportedGeometry(
                "polygon with no rings".to_string(),
            ));
        }

        Ok(Self { polygons })
    }

    fn from_geometry(geometry: Option<Geometry>) -> Result<Vec<Vec<Ring>>, GeoError> {
        match geometry {
            Some(Geometry::Polygon { coordinates }) => Ok(vec![coordinates]),
            Some(Geometry::MultiPolygon { coordinates }) => Ok(coordinates),
            Some(Geometry::Other(v)) => Err(GeoError::UnsupportedGeometry(
                v.get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            )),
            None => Err(GeoError::UnsupportedGeometry("null geometry".to_string())),
        }
    }

    /// Whether the fence contains the given fix.
    ///
    /// Invalid fixes are never inside a fence.
    pub fn contains(&self, fix: &GeoFix) -> bool {
        if !fix.is_valid() {
            return false;
        }

        self.polygons.iter().any(|rings| {
            let mut iter = rings.iter();
            let Some(exterior) = iter.next() else {
                return false;
            };
            ring_contains(exterior, fix) && !iter.any(|hole| ring_contains(hole, fix))
        })
    }
}

/// Ray-casting point-in-ring test on GeoJSON `[lon, lat]` positions.
fn ring_contains(ring: &[[f64; 2]], fix: &GeoFix) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (x, y) = (fix.longitude, fix.latitude);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);

        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}
