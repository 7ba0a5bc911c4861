//! Temporal ranges and ISO 8601 parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A closed date range `[start, end]`.
///
/// A single instant is a range whose start equals its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Create a range, swapping the bounds if they are given in reverse.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// A degenerate range covering one instant.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        (self.start..=self.end).contains(instant)
    }

    /// Closed-interval intersection test (touching ranges intersect).
    pub fn intersects(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Parse a TIME value: a single instant or a `start/end` range.
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        match s.split_once('/') {
            Some((start, end)) => Ok(Self::new(parse_iso8601(start)?, parse_iso8601(end)?)),
            None => parse_iso8601(s).map(Self::instant),
        }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_instant() {
            write!(f, "{}", format_iso8601(&self.start))
        } else {
            write!(
                f,
                "{}/{}",
                format_iso8601(&self.start),
                format_iso8601(&self.end)
            )
        }
    }
}

/// Offset-free layouts accepted after RFC 3339, read as UTC.
const NAIVE_LAYOUTS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse an ISO 8601 timestamp, assuming UTC when no offset is given.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    if let Ok(zoned) = DateTime::parse_from_rfc3339(s) {
        return Ok(zoned.with_timezone(&Utc));
    }

    let naive = NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|day| day.and_hms_opt(0, 0, 0))
        });

    naive
        .map(|ndt| ndt.and_utc())
        .ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))
}

/// Render a timestamp the way catalog attributes and metadata values are written.
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("not an ISO 8601 timestamp: '{0}'")]
    InvalidFormat(String),
}
