//! In-process granule catalog.

use async_trait::async_trait;
use coverage_common::{CoverageError, CoverageResult};
use tokio::sync::RwLock;

use crate::catalog::{sort_granules, GranuleCatalog, GranuleQuery};
use crate::granule::Granule;

/// Granule catalog held in memory.
///
/// Filters are evaluated with [`crate::Filter::evaluate`]. Sorting can be
/// disabled to mimic stores that cannot order results.
pub struct MemoryCatalog {
    granules: RwLock<Vec<Granule>>,
    sorting: bool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::from_granules(Vec::new())
    }

    pub fn from_granules(granules: Vec<Granule>) -> Self {
        Self {
            granules: RwLock::new(granules),
            sorting: true,
        }
    }

    /// Report sorting as unsupported and reject sorted queries.
    pub fn without_sorting(mut self) -> Self {
        self.sorting = false;
        self
    }

    pub async fn insert(&self, granule: Granule) {
        self.granules.write().await.push(granule);
    }

    pub async fn len(&self) -> usize {
        self.granules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.granules.read().await.is_empty()
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GranuleCatalog for MemoryCatalog {
    async fn query(&self, query: &GranuleQuery) -> CoverageResult<Vec<Granule>> {
        if !query.sort_by.is_empty() && !self.sorting {
            return Err(CoverageError::catalog("catalog does not support sorting"));
        }

        let granules = self.granules.read().await;
        let mut matches: Vec<Granule> = granules
            .iter()
            .filter(|g| query.filter.evaluate(g))
            .cloned()
            .collect();
        drop(granules);

        sort_granules(&mut matches, &query.sort_by);
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        tracing::trace!(filter = %query.filter, matched = matches.len(), "Memory catalog query");
        Ok(matches)
    }

    fn supports_sorting(&self) -> bool {
        self.sorting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Aggregate, SortBy};
    use crate::filter::Filter;
    use coverage_common::{AttributeValue, BoundingBox};

    fn catalog() -> MemoryCatalog {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        MemoryCatalog::from_granules(vec![
            Granule::new("b.nc", 0, bbox).with_attribute("elevation", 20.0),
            Granule::new("a.nc", 0, bbox).with_attribute("elevation", 0.0),
            Granule::new("a.nc", 1, bbox).with_attribute("elevation", 10.0),
            Granule::new("c.nc", 0, bbox).with_attribute("elevation", 10.0),
        ])
    }

    #[tokio::test]
    async fn test_query_filter_sort_limit() {
        let catalog = catalog();
        let query = GranuleQuery::new(Filter::ge("elevation", 10.0))
            .sorted_by(SortBy::ascending("location"))
            .with_limit(2);
        let result = catalog.query(&query).await.unwrap();

        let locations: Vec<&str> = result.iter().map(|g| g.location.as_str()).collect();
        assert_eq!(locations, vec!["a.nc", "b.nc"]);
    }

    #[tokio::test]
    async fn test_aggregate_and_distinct() {
        let catalog = catalog();
        let max = catalog
            .aggregate(&Filter::Include, "elevation", Aggregate::Max)
            .await
            .unwrap();
        let min = catalog
            .aggregate(&Filter::Include, "elevation", Aggregate::Min)
            .await
            .unwrap();
        assert_eq!(max, Some(AttributeValue::Number(20.0)));
        assert_eq!(min, Some(AttributeValue::Number(0.0)));

        let distinct = catalog
            .distinct_values(&Filter::Include, "elevation")
            .await
            .unwrap();
        assert_eq!(
            distinct,
            vec![
                AttributeValue::Number(0.0),
                AttributeValue::Number(10.0),
                AttributeValue::Number(20.0)
            ]
        );
    }

    #[tokio::test]
    async fn test_aggregate_on_empty_catalog() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.is_empty().await);
        let max = catalog
            .aggregate(&Filter::Include, "elevation", Aggregate::Max)
            .await
            .unwrap();
        assert_eq!(max, None);
    }

    #[tokio::test]
    async fn test_distinct_values_across_kinds() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let members = [
            AttributeValue::Number(5.0),
            AttributeValue::from("control"),
            AttributeValue::Number(5.0),
            AttributeValue::Number(1.0),
            AttributeValue::from("control"),
        ];
        let catalog = MemoryCatalog::from_granules(
            members
                .into_iter()
                .enumerate()
                .map(|(i, m)| Granule::new("ens.nc", i, bbox).with_attribute("member", m))
                .collect(),
        );

        let distinct = catalog
            .distinct_values(&Filter::Include, "member")
            .await
            .unwrap();
        assert_eq!(
            distinct,
            vec![
                AttributeValue::Number(1.0),
                AttributeValue::Number(5.0),
                AttributeValue::Text("control".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_sorting_disabled() {
        let catalog = catalog().without_sorting();
        assert!(!catalog.supports_sorting());

        let sorted = GranuleQuery::new(Filter::Include).sorted_by(SortBy::ascending("location"));
        assert!(catalog.query(&sorted).await.is_err());

        let unsorted = GranuleQuery::new(Filter::Include);
        assert_eq!(catalog.query(&unsorted).await.unwrap().len(), 4);
    }
}
