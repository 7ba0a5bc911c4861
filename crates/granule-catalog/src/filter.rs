//! Boolean filter expressions over granule attributes.

use std::cmp::Ordering;
use std::fmt;

use coverage_common::{AttributeValue, BoundingBox};
use serde::{Deserialize, Serialize};

use crate::granule::Granule;

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// A filter over catalog granules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches everything.
    Include,
    /// Matches nothing.
    Exclude,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare {
        attribute: String,
        op: CompareOp,
        value: AttributeValue,
    },
    /// Granule footprint intersects the box with a non-empty area.
    Intersects(BoundingBox),
}

impl Filter {
    pub fn compare(
        attribute: impl Into<String>,
        op: CompareOp,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Filter::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::compare(attribute, CompareOp::Eq, value)
    }

    pub fn le(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::compare(attribute, CompareOp::Le, value)
    }

    pub fn ge(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::compare(attribute, CompareOp::Ge, value)
    }

    pub fn intersects(bbox: BoundingBox) -> Self {
        Filter::Intersects(bbox)
    }

    /// Conjunction, flattening nested ANDs and dropping INCLUDE terms.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut terms = Vec::new();
        for filter in filters {
            match filter {
                Filter::Include => {}
                Filter::Exclude => return Filter::Exclude,
                Filter::And(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => Filter::Include,
            1 => terms.remove(0),
            _ => Filter::And(terms),
        }
    }

    /// Disjunction, flattening nested ORs and dropping EXCLUDE terms.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut terms = Vec::new();
        for filter in filters {
            match filter {
                Filter::Exclude => {}
                Filter::Include => return Filter::Include,
                Filter::Or(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => Filter::Exclude,
            1 => terms.remove(0),
            _ => Filter::Or(terms),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Filter::Include => Filter::Exclude,
            Filter::Exclude => Filter::Include,
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }

    pub fn is_include(&self) -> bool {
        matches!(self, Filter::Include)
    }

    /// Evaluate against a granule. Missing attributes and values of a
    /// different kind never match.
    pub fn evaluate(&self, granule: &Granule) -> bool {
        match self {
            Filter::Include => true,
            Filter::Exclude => false,
            Filter::And(terms) => terms.iter().all(|t| t.evaluate(granule)),
            Filter::Or(terms) => terms.iter().any(|t| t.evaluate(granule)),
            Filter::Not(inner) => !inner.evaluate(granule),
            Filter::Compare {
                attribute,
                op,
                value,
            } => granule
                .attribute(attribute)
                .and_then(|actual| actual.partial_cmp(value))
                .map(|ordering| op.accepts(ordering))
                .unwrap_or(false),
            Filter::Intersects(bbox) => granule.bbox.intersects(bbox),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, terms: &[Filter], sep: &str| {
            write!(f, "(")?;
            for (i, term) in terms.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", term)?;
            }
            write!(f, ")")
        };

        match self {
            Filter::Include => write!(f, "INCLUDE"),
            Filter::Exclude => write!(f, "EXCLUDE"),
            Filter::And(terms) => join(f, terms, "AND"),
            Filter::Or(terms) => join(f, terms, "OR"),
            Filter::Not(inner) => write!(f, "NOT {}", inner),
            Filter::Compare {
                attribute,
                op,
                value,
            } => write!(f, "{} {} {}", attribute, op.symbol(), value),
            Filter::Intersects(b) => write!(
                f,
                "BBOX({}, {}, {}, {})",
                b.min_x, b.min_y, b.max_x, b.max_y
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_common::time::parse_iso8601;

    fn granule() -> Granule {
        Granule::new("a.nc", 0, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
            .with_attribute("elevation", 500.0)
            .with_attribute("time", parse_iso8601("2024-01-15T12:00:00Z").unwrap())
            .with_attribute("member", "m1")
    }

    #[test]
    fn test_range_predicate() {
        let g = granule();
        let inside = Filter::and([Filter::ge("elevation", 400.0), Filter::le("elevation", 600.0)]);
        let outside = Filter::and([Filter::ge("elevation", 700.0), Filter::le("elevation", 900.0)]);
        assert!(inside.evaluate(&g));
        assert!(!outside.evaluate(&g));
    }

    #[test]
    fn test_date_comparison() {
        let g = granule();
        let t = parse_iso8601("2024-01-15T12:00:00Z").unwrap();
        assert!(Filter::eq("time", t).evaluate(&g));
        assert!(!Filter::eq("time", parse_iso8601("2024-01-15T13:00:00Z").unwrap()).evaluate(&g));
    }

    #[test]
    fn test_kind_mismatch_never_matches() {
        let g = granule();
        assert!(!Filter::eq("elevation", "500").evaluate(&g));
        assert!(!Filter::eq("missing", 1.0).evaluate(&g));
    }

    #[test]
    fn test_and_flattening() {
        let f = Filter::and([
            Filter::Include,
            Filter::and([Filter::eq("a", 1.0), Filter::eq("b", 2.0)]),
            Filter::eq("c", 3.0),
        ]);
        match f {
            Filter::And(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected AND, got {}", other),
        }

        assert_eq!(Filter::and([Filter::Include]), Filter::Include);
        assert_eq!(
            Filter::and([Filter::eq("a", 1.0), Filter::Exclude]),
            Filter::Exclude
        );
    }

    #[test]
    fn test_or_and_not() {
        let g = granule();
        let f = Filter::or([Filter::eq("member", "m2"), Filter::eq("member", "m1")]);
        assert!(f.evaluate(&g));
        assert!(!f.clone().negate().evaluate(&g));
        assert_eq!(f.clone().negate().negate(), f);
    }

    #[test]
    fn test_bbox_filter() {
        let g = granule();
        assert!(Filter::intersects(BoundingBox::new(5.0, 5.0, 20.0, 20.0)).evaluate(&g));
        assert!(!Filter::intersects(BoundingBox::new(10.0, 0.0, 20.0, 10.0)).evaluate(&g));
    }

    #[test]
    fn test_display() {
        let f = Filter::and([
            Filter::eq("member", "m1"),
            Filter::le("elevation", 850.0),
            Filter::intersects(BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
        ]);
        assert_eq!(
            f.to_string(),
            "(member = 'm1' AND elevation <= 850 AND BBOX(0, 0, 1, 1))"
        );
    }
}
