//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::BoundingBox;

/// Web Mercator sphere radius (meters).
const MERCATOR_RADIUS: f64 = 6378137.0;

/// A CRS identified by its EPSG code.
///
/// Only identity is tracked here; coordinate math beyond the two
/// well-known geographic conversions lives with the collaborators that
/// own real projection engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    /// WGS84 Geographic (lon/lat in degrees)
    pub const WGS84: Crs = Crs { epsg: 4326 };
    /// Web Mercator (meters)
    pub const WEB_MERCATOR: Crs = Crs { epsg: 3857 };

    pub fn new(epsg: u32) -> Self {
        Self { epsg }
    }

    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:4326"
    /// - "CRS:84" (equivalent to EPSG:4326 with lon/lat axis order)
    /// - "urn:ogc:def:crs:EPSG::3857"
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        if normalized == "CRS:84" {
            return Ok(Self::WGS84);
        }

        let code = normalized
            .strip_prefix("EPSG:")
            .or_else(|| normalized.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))
            .ok_or_else(|| CrsParseError::UnsupportedCrs(s.to_string()))?;

        match code.parse::<u32>() {
            Ok(900913) => Ok(Self::WEB_MERCATOR),
            Ok(epsg) => Ok(Self { epsg }),
            Err(_) => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4269)
    }

    /// Express a bounding box of this CRS in WGS84 degrees.
    ///
    /// Returns `None` when this CRS has no built-in conversion.
    pub fn to_geographic(&self, bbox: &BoundingBox) -> Option<BoundingBox> {
        match self.epsg {
            4326 | 4269 => Some(*bbox),
            3857 => {
                let lon = |x: f64| (x / MERCATOR_RADIUS).to_degrees();
                let lat = |y: f64| {
                    (2.0 * (y / MERCATOR_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2)
                        .to_degrees()
                };
                Some(BoundingBox::new(
                    lon(bbox.min_x),
                    lat(bbox.min_y),
                    lon(bbox.max_x),
                    lat(bbox.max_y),
                ))
            }
            _ => None,
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}
