//! Non-spatial domains of a coverage and how they map to catalog attributes.

use coverage_common::time::parse_iso8601;
use coverage_common::{AttributeValue, CoverageError, CoverageResult, ValueKind};
use granule_catalog::Filter;
use serde::{Deserialize, Serialize};

/// Dimension name used for the temporal domain.
pub const TIME_DIMENSION: &str = "time";

/// Dimension name used for the vertical domain.
pub const ELEVATION_DIMENSION: &str = "elevation";

/// Kind of a non-spatial domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainKind {
    Time,
    Elevation,
    /// A named custom axis whose values have the given kind.
    Custom(ValueKind),
}

impl DomainKind {
    pub fn value_kind(&self) -> ValueKind {
        match self {
            DomainKind::Time => ValueKind::Date,
            DomainKind::Elevation => ValueKind::Number,
            DomainKind::Custom(kind) => *kind,
        }
    }

    /// Parse one domain value.
    pub fn parse_value(&self, s: &str) -> CoverageResult<AttributeValue> {
        let s = s.trim();
        match self.value_kind() {
            ValueKind::Date => parse_iso8601(s)
                .map(AttributeValue::Date)
                .map_err(|e| CoverageError::validation(e.to_string())),
            ValueKind::Number => s
                .parse::<f64>()
                .map(AttributeValue::Number)
                .map_err(|_| CoverageError::validation(format!("invalid number: {}", s))),
            ValueKind::Text => Ok(AttributeValue::Text(s.to_string())),
        }
    }

    /// Parse a comma separated list of values and `start/end` ranges.
    pub fn parse_subset(&self, s: &str) -> CoverageResult<Vec<DomainSubset>> {
        s.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| match item.split_once('/') {
                Some((lo, hi)) if self.value_kind() != ValueKind::Text => {
                    Ok(DomainSubset::Range(self.parse_value(lo)?, self.parse_value(hi)?))
                }
                _ => Ok(DomainSubset::Value(self.parse_value(item)?)),
            })
            .collect()
    }
}

/// One requested element of a domain subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainSubset {
    Value(AttributeValue),
    Range(AttributeValue, AttributeValue),
}

/// Which aggregate supplies the value of an unconstrained dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    /// Leave the dimension unconstrained.
    #[default]
    None,
    Min,
    Max,
}

impl DefaultPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "all" => Some(Self::None),
            "min" | "minimum" => Some(Self::Min),
            "max" | "maximum" => Some(Self::Max),
            _ => None,
        }
    }
}

/// A non-spatial dimension and its backing catalog attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDescriptor {
    pub name: String,
    pub kind: DomainKind,
    /// Attribute holding the value (or range start) of each granule.
    pub start_attribute: String,
    /// Attribute holding the range end, for granules spanning an interval.
    pub end_attribute: Option<String>,
    pub default_policy: DefaultPolicy,
    pub units: Option<String>,
}

impl DimensionDescriptor {
    /// Temporal dimension; defaults to the latest instant.
    pub fn time(attribute: impl Into<String>) -> Self {
        Self {
            name: TIME_DIMENSION.to_string(),
            kind: DomainKind::Time,
            start_attribute: attribute.into(),
            end_attribute: None,
            default_policy: DefaultPolicy::Max,
            units: Some("ISO8601".to_string()),
        }
    }

    /// Vertical dimension; defaults to the lowest level.
    pub fn elevation(attribute: impl Into<String>) -> Self {
        Self {
            name: ELEVATION_DIMENSION.to_string(),
            kind: DomainKind::Elevation,
            start_attribute: attribute.into(),
            end_attribute: None,
            default_policy: DefaultPolicy::Min,
            units: None,
        }
    }

    /// Custom dimension; defaults to its minimum value.
    pub fn custom(name: impl Into<String>, attribute: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind: DomainKind::Custom(kind),
            start_attribute: attribute.into(),
            end_attribute: None,
            default_policy: DefaultPolicy::Min,
            units: None,
        }
    }

    pub fn with_end_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.end_attribute = Some(attribute.into());
        self
    }

    pub fn with_default_policy(mut self, policy: DefaultPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.kind, DomainKind::Custom(_))
    }

    /// Attribute holding the upper end of each granule's extent.
    pub fn upper_attribute(&self) -> &str {
        self.end_attribute.as_deref().unwrap_or(&self.start_attribute)
    }

    /// Granules whose extent intersects the closed range `[min, max]`.
    pub fn range_filter(&self, min: AttributeValue, max: AttributeValue) -> Filter {
        Filter::and([
            Filter::le(self.start_attribute.clone(), max),
            Filter::ge(self.upper_attribute().to_string(), min),
        ])
    }

    /// Granules at exactly `value`.
    pub fn value_filter(&self, value: AttributeValue) -> Filter {
        Filter::eq(self.start_attribute.clone(), value)
    }

    /// Upper-cased name used in metadata keys.
    pub fn metadata_prefix(&self) -> String {
        self.name.to_uppercase()
    }
}
