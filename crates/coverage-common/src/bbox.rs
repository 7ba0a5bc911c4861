//! Axis-aligned envelopes in a coverage CRS.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Envelope given by its lower-left and upper-right corners.
///
/// Units follow the CRS the envelope belongs to (degrees for EPSG:4326,
/// meters for EPSG:3857). The box carries no CRS itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Envelope of a point set. `None` for no points.
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        let (&(x0, y0), rest) = points.split_first()?;
        Some(rest.iter().fold(Self::new(x0, y0, x0, y0), |acc, &(x, y)| {
            Self::new(acc.min_x.min(x), acc.min_y.min(y), acc.max_x.max(x), acc.max_y.max(y))
        }))
    }

    /// Parse the comma separated `minx,miny,maxx,maxy` form used in request
    /// parameters. Whitespace around each number is ignored.
    pub fn from_wms_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x0, y0, x1, y1] = parts[..] else {
            return Err(BboxParseError::InvalidFormat(format!(
                "'{s}' has {} values",
                parts.len()
            )));
        };

        let number = |part: &str| {
            part.parse::<f64>()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))
        };
        Ok(Self::new(number(x0)?, number(y0)?, number(x1)?, number(y1)?))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// No positive area. Inverted and NaN boxes are empty too.
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Finite, ordered coordinates. Zero-area boxes are valid.
    pub fn is_valid(&self) -> bool {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        finite && self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    /// Overlap with positive area. Boxes sharing only an edge or a corner
    /// do not intersect, and a degenerate box intersects nothing.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.intersection(other).is_some()
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let overlap = Self::new(
            f64::max(self.min_x, other.min_x),
            f64::max(self.min_y, other.min_y),
            f64::min(self.max_x, other.max_x),
            f64::min(self.max_y, other.max_y),
        );
        (!overlap.is_empty()).then_some(overlap)
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        Self::new(
            f64::min(self.min_x, other.min_x),
            f64::min(self.min_y, other.min_y),
            f64::max(self.max_x, other.max_x),
            f64::max(self.max_y, other.max_y),
        )
    }

    /// Closed test: points on the boundary are inside.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Lower-left, lower-right, upper-right, upper-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (x0, y0, x1, y1) = (self.min_x, self.min_y, self.max_x, self.max_y);
        [(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }
}

impl FromStr for BoundingBox {
    type Err = BboxParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wms_string(s)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("envelope must have four comma separated values: {0}")]
    InvalidFormat(String),

    #[error("envelope coordinate is not a number: '{0}'")]
    InvalidNumber(String),
}
