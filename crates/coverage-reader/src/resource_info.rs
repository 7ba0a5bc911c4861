//! Groups catalog slices by backing file for introspection.

use std::collections::{BTreeMap, HashMap};

use coverage_common::{AttributeValue, BoundingBox, CoverageResult, Crs, DateRange, NumberRange};
use granule_catalog::{Filter, Granule, GranuleCatalog, GranuleQuery, SortBy, LOCATION_ATTRIBUTE};
use serde::Serialize;

use crate::dimension::DimensionDescriptor;

/// Aggregated extent of one dimension over a file group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DimensionExtent {
    Numeric(NumberRange),
    Temporal(DateRange),
    Lexical { min: String, max: String },
}

/// All slices sharing one file location.
#[derive(Debug, Clone, Serialize)]
pub struct FileGroup {
    pub location: String,
    pub slices: Vec<Granule>,
    pub bbox: BoundingBox,
    pub geographic_bbox: Option<BoundingBox>,
    /// Extent per dimension name, for dimensions present in the group.
    pub dimensions: BTreeMap<String, DimensionExtent>,
}

/// Builds [`FileGroup`]s for one coverage.
pub struct ResourceInfoAggregator<'a> {
    dimensions: &'a [DimensionDescriptor],
    crs: Crs,
}

impl<'a> ResourceInfoAggregator<'a> {
    pub fn new(dimensions: &'a [DimensionDescriptor], crs: Crs) -> Self {
        Self { dimensions, crs }
    }

    /// Query the catalog and group the result by location.
    ///
    /// A catalog shared between coverages is read sorted by location and
    /// grouped in one streaming pass; without sorting support the slices
    /// are grouped in memory.
    pub async fn collect(
        &self,
        catalog: &dyn GranuleCatalog,
        filter: Filter,
        shared_catalog: bool,
    ) -> CoverageResult<Vec<FileGroup>> {
        if shared_catalog && catalog.supports_sorting() {
            let query = GranuleQuery::new(filter).sorted_by(SortBy::ascending(LOCATION_ATTRIBUTE));
            let slices = catalog.query(&query).await?;
            return Ok(self.group_sorted(slices));
        }

        if shared_catalog {
            tracing::debug!("Catalog cannot sort, grouping file slices in memory");
        }
        let slices = catalog.query(&GranuleQuery::new(filter)).await?;
        Ok(self.group_by_file(slices))
    }

    /// Partition slices by exact location, in first-seen order.
    pub fn group_by_file(&self, slices: Vec<Granule>) -> Vec<FileGroup> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Granule>> = HashMap::new();
        for slice in slices {
            if !groups.contains_key(&slice.location) {
                order.push(slice.location.clone());
            }
            groups.entry(slice.location.clone()).or_default().push(slice);
        }

        order
            .into_iter()
            .filter_map(|location| {
                let slices = groups.remove(&location)?;
                Some(self.build_group(location, slices))
            })
            .collect()
    }

    /// Group slices already ordered by location in a single pass.
    fn group_sorted(&self, slices: Vec<Granule>) -> Vec<FileGroup> {
        let mut groups = Vec::new();
        let mut current: Option<(String, Vec<Granule>)> = None;

        for slice in slices {
            match current.as_mut() {
                Some((location, members)) if *location == slice.location => members.push(slice),
                _ => {
                    if let Some((location, members)) = current.take() {
                        groups.push(self.build_group(location, members));
                    }
                    current = Some((slice.location.clone(), vec![slice]));
                }
            }
        }
        if let Some((location, members)) = current {
            groups.push(self.build_group(location, members));
        }
        groups
    }

    fn build_group(&self, location: String, slices: Vec<Granule>) -> FileGroup {
        let bbox = slices
            .iter()
            .map(|s| s.bbox)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, 0.0, 0.0));

        let mut dimensions = BTreeMap::new();
        for descriptor in self.dimensions {
            let values: Vec<AttributeValue> = slices
                .iter()
                .flat_map(|s| {
                    [
                        s.attribute(&descriptor.start_attribute),
                        descriptor.end_attribute.as_deref().and_then(|a| s.attribute(a)),
                    ]
                })
                .flatten()
                .collect();
            if let Some(extent) = extent_of(&values) {
                dimensions.insert(descriptor.name.clone(), extent);
            }
        }

        FileGroup {
            geographic_bbox: self.crs.to_geographic(&bbox),
            location,
            slices,
            bbox,
            dimensions,
        }
    }
}

/// Min/max of a set of values, typed by their common kind.
fn extent_of(values: &[AttributeValue]) -> Option<DimensionExtent> {
    if values.is_empty() {
        return None;
    }

    let numbers: Option<Vec<f64>> = values.iter().map(AttributeValue::as_f64).collect();
    if let Some(numbers) = numbers {
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        return Some(DimensionExtent::Numeric(NumberRange::new(min, max)));
    }

    let dates: Option<Vec<_>> = values.iter().map(AttributeValue::as_date).collect();
    if let Some(dates) = dates {
        let min = dates.iter().min()?;
        let max = dates.iter().max()?;
        return Some(DimensionExtent::Temporal(DateRange::new(*min, *max)));
    }

    let lexical: Vec<String> = values.iter().map(AttributeValue::to_lexical).collect();
    Some(DimensionExtent::Lexical {
        min: lexical.iter().min()?.clone(),
        max: lexical.iter().max()?.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_common::time::parse_iso8601;

    fn slice(location: &str, index: usize, elevation: f64, time: &str) -> Granule {
        Granule::new(location, index, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
            .with_attribute("elevation", elevation)
            .with_attribute("time", parse_iso8601(time).unwrap())
    }

    fn dims() -> Vec<DimensionDescriptor> {
        vec![
            DimensionDescriptor::time("time"),
            DimensionDescriptor::elevation("elevation"),
        ]
    }

    #[test]
    fn test_extent_kinds() {
        let numbers = vec![AttributeValue::Number(5.0), AttributeValue::Number(-2.0)];
        assert_eq!(
            extent_of(&numbers),
            Some(DimensionExtent::Numeric(NumberRange::new(-2.0, 5.0)))
        );

        let mixed = vec![AttributeValue::Number(5.0), AttributeValue::Text("b".into())];
        assert_eq!(
            extent_of(&mixed),
            Some(DimensionExtent::Lexical {
                min: "5".into(),
                max: "b".into()
            })
        );
        assert_eq!(extent_of(&[]), None);
    }

    #[test]
    fn test_group_by_file_partitions() {
        let dims = dims();
        let aggregator = ResourceInfoAggregator::new(&dims, Crs::WGS84);
        let groups = aggregator.group_by_file(vec![
            slice("b.zarr", 0, 0.0, "2024-01-01T00:00:00Z"),
            slice("a.zarr", 0, 10.0, "2024-01-01T00:00:00Z"),
            slice("b.zarr", 1, 20.0, "2024-01-03T00:00:00Z"),
            slice("b.zarr", 2, 10.0, "2024-01-02T00:00:00Z"),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].location, "b.zarr");
        assert_eq!(groups[0].slices.len(), 3);
        assert_eq!(groups[1].location, "a.zarr");
        assert_eq!(
            groups[0].dimensions.get("elevation"),
            Some(&DimensionExtent::Numeric(NumberRange::new(0.0, 20.0)))
        );
        assert_eq!(
            groups[0].dimensions.get("time"),
            Some(&DimensionExtent::Temporal(DateRange::new(
                parse_iso8601("2024-01-01T00:00:00Z").unwrap(),
                parse_iso8601("2024-01-03T00:00:00Z").unwrap()
            )))
        );
        assert_eq!(groups[0].geographic_bbox, Some(groups[0].bbox));
    }

    #[test]
    fn test_sorted_grouping_matches_in_memory() {
        let dims = dims();
        let aggregator = ResourceInfoAggregator::new(&dims, Crs::WGS84);
        let sorted = vec![
            slice("a.zarr", 0, 0.0, "2024-01-01T00:00:00Z"),
            slice("a.zarr", 1, 10.0, "2024-01-01T00:00:00Z"),
            slice("b.zarr", 0, 0.0, "2024-01-02T00:00:00Z"),
        ];

        let streamed = aggregator.group_sorted(sorted.clone());
        let grouped = aggregator.group_by_file(sorted);
        let locations = |groups: &[FileGroup]| -> Vec<(String, usize)> {
            groups.iter().map(|g| (g.location.clone(), g.slices.len())).collect()
        };
        assert_eq!(locations(&streamed), locations(&grouped));
    }

    #[test]
    fn test_collect_falls_back_without_sorting() {
        let dims = dims();
        let aggregator = ResourceInfoAggregator::new(&dims, Crs::WGS84);
        let slices = vec![
            slice("b.zarr", 0, 0.0, "2024-01-01T00:00:00Z"),
            slice("a.zarr", 0, 0.0, "2024-01-01T00:00:00Z"),
        ];

        let sorted = granule_catalog::MemoryCatalog::from_granules(slices.clone());
        let groups =
            tokio_test::block_on(aggregator.collect(&sorted, Filter::Include, true)).unwrap();
        assert_eq!(groups[0].location, "a.zarr");

        let unsorted = granule_catalog::MemoryCatalog::from_granules(slices).without_sorting();
        let groups =
            tokio_test::block_on(aggregator.collect(&unsorted, Filter::Include, true)).unwrap();
        assert_eq!(groups[0].location, "b.zarr");
    }
}
