//! Geographic bounding box of the map viewport

use serde::{Deserialize, Serialize};

use crate::{Result, SmogMapError};

/// Axis-aligned box in WGS84 degrees. `min_lat <= max_lat` and
/// `min_lon <= max_lon` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Build a box from explicit edges, rejecting inverted or non-finite ones.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        let edges = [min_lat, max_lat, min_lon, max_lon];
        if edges.iter().any(|edge| !edge.is_finite()) {
            return Err(SmogMapError::validation("bounding box edges must be finite"));
        }
        if min_lat > max_lat || min_lon > max_lon {
            return Err(SmogMapError::validation(format!(
                "inverted bounding box: lat {min_lat}..{max_lat}, lon {min_lon}..{max_lon}"
            )));
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Build a box from two opposite corners given in any order.
    #[must_use]
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            min_lat: a.0.min(b.0),
            max_lat: a.0.max(b.0),
            min_lon: a.1.min(b.1),
            max_lon: a.1.max(b.1),
        }
    }

    /// Inclusive containment test
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    /// Two boxes are the same viewport when every edge differs by less than
    /// `epsilon` degrees.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self.min_lat - other.min_lat).abs() < epsilon
            && (self.max_lat - other.max_lat).abs() < epsilon
            && (self.min_lon - other.min_lon).abs() < epsilon
            && (self.max_lon - other.max_lon).abs() < epsilon
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = SmogMapError;

    /// Parses `minLat,maxLat,minLon,maxLon`.
    fn from_str(s: &str) -> Result<Self> {
        let edges: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SmogMapError::validation(format!("bad bounding box '{s}': {e}")))?;

        match edges.as_slice() {
            [min_lat, max_lat, min_lon, max_lon] => {
                Self::new(*min_lat, *max_lat, *min_lon, *max_lon)
            }
            _ => Err(SmogMapError::validation(format!(
                "bounding box needs 4 comma-separated numbers, got '{s}'"
            ))),
        }
    }
}
