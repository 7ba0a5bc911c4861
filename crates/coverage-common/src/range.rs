//! Closed numeric ranges used for vertical subsets.

use serde::{Deserialize, Serialize};

/// A closed numeric range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumberRange {
    pub min: f64,
    pub max: f64,
}

impl NumberRange {
    /// Create a range, swapping the bounds if they are given in reverse.
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A degenerate range covering one value.
    pub fn point(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn is_point(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Closed-interval intersection test (touching ranges intersect).
    pub fn intersects(&self, other: &NumberRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn union(&self, other: &NumberRange) -> NumberRange {
        NumberRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Parse `"value"` or `"min/max"`.
    pub fn parse(s: &str) -> Result<Self, RangeParseError> {
        let number = |p: &str| {
            p.trim()
                .parse::<f64>()
                .map_err(|_| RangeParseError::InvalidNumber(p.to_string()))
        };

        match s.split_once('/') {
            Some((lo, hi)) => Ok(Self::new(number(lo)?, number(hi)?)),
            None => Ok(Self::point(number(s)?)),
        }
    }
}

impl std::fmt::Display for NumberRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_point() {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}/{}", self.min, self.max)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RangeParseError {
    #[error("Invalid number in range: {0}")]
    InvalidNumber(String),
}
