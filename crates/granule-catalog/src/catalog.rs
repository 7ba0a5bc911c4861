//! The catalog trait consumed by the coverage reader.

use std::cmp::Ordering;

use async_trait::async_trait;
use coverage_common::{AttributeValue, CoverageResult};
use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::granule::Granule;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One sort key of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub attribute: String,
    pub order: SortOrder,
}

impl SortBy {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Descending,
        }
    }
}

/// A filter plus optional ordering and limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranuleQuery {
    pub filter: Filter,
    pub sort_by: Vec<SortBy>,
    pub limit: Option<usize>,
}

impl GranuleQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort_by: Vec::new(),
            limit: None,
        }
    }

    pub fn sorted_by(mut self, sort: SortBy) -> Self {
        self.sort_by.push(sort);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Aggregate function for default-value resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Min,
    Max,
}

/// Access to the granule index of one or more coverages.
///
/// Queries are the only blocking operations the reader issues against the
/// catalog; implementations must be safe to share across concurrent reads.
#[async_trait]
pub trait GranuleCatalog: Send + Sync {
    /// Return granules matching the query, in the requested order when
    /// `sort_by` is non-empty and sorting is supported.
    async fn query(&self, query: &GranuleQuery) -> CoverageResult<Vec<Granule>>;

    /// Whether `query` honors `sort_by`.
    fn supports_sorting(&self) -> bool {
        true
    }

    /// Minimum or maximum of an attribute over the matching granules.
    ///
    /// Values of a different kind than the first one seen are ignored.
    async fn aggregate(
        &self,
        filter: &Filter,
        attribute: &str,
        aggregate: Aggregate,
    ) -> CoverageResult<Option<AttributeValue>> {
        let granules = self.query(&GranuleQuery::new(filter.clone())).await?;

        let mut best: Option<AttributeValue> = None;
        for value in granules.iter().filter_map(|g| g.attribute(attribute)) {
            best = match best {
                None => Some(value),
                Some(current) => match (value.partial_cmp(&current), aggregate) {
                    (Some(Ordering::Less), Aggregate::Min)
                    | (Some(Ordering::Greater), Aggregate::Max) => Some(value),
                    _ => Some(current),
                },
            };
        }
        Ok(best)
    }

    /// Distinct values of an attribute over the matching granules, ascending.
    async fn distinct_values(
        &self,
        filter: &Filter,
        attribute: &str,
    ) -> CoverageResult<Vec<AttributeValue>> {
        let granules = self.query(&GranuleQuery::new(filter.clone())).await?;

        let mut values: Vec<AttributeValue> =
            granules.iter().filter_map(|g| g.attribute(attribute)).collect();
        values.sort_by(AttributeValue::total_cmp);
        values.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        Ok(values)
    }
}

/// Stable multi-key sort of granules. Missing values sort last.
pub fn sort_granules(granules: &mut [Granule], sort_by: &[SortBy]) {
    if sort_by.is_empty() {
        return;
    }

    granules.sort_by(|a, b| {
        for key in sort_by {
            let ordering = match (a.attribute(&key.attribute), b.attribute(&key.attribute)) {
                (Some(va), Some(vb)) => va.partial_cmp(&vb).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match key.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
