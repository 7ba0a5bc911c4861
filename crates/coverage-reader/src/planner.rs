//! Translates non-spatial subsets into one catalog filter per slice.

use coverage_common::{
    AttributeValue, BoundingBox, CoverageError, CoverageResult, DateRange, NumberRange,
};
use granule_catalog::{Aggregate, Filter, GranuleCatalog, GranuleQuery};

use crate::dimension::{DefaultPolicy, DimensionDescriptor, DomainKind, DomainSubset};
use crate::types::ReadRequest;

/// One element of the temporal x vertical cross product.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceQuery {
    /// Temporal coordinate, `None` when time is unconstrained.
    pub time: Option<DateRange>,
    /// Vertical coordinate, `None` when elevation is unconstrained.
    pub elevation: Option<NumberRange>,
    pub filter: Filter,
}

/// Builds per-slice catalog filters for one coverage.
pub struct DimensionFilterPlanner<'a> {
    dimensions: &'a [DimensionDescriptor],
    base_filter: Filter,
    nearest_elevation_match: bool,
}

impl<'a> DimensionFilterPlanner<'a> {
    /// `base_filter` restricts the catalog to this coverage's granules.
    pub fn new(
        dimensions: &'a [DimensionDescriptor],
        base_filter: Filter,
        nearest_elevation_match: bool,
    ) -> Self {
        Self {
            dimensions,
            base_filter,
            nearest_elevation_match,
        }
    }

    fn dimension(&self, kind: DomainKind) -> Option<&'a DimensionDescriptor> {
        self.dimensions.iter().find(|d| d.kind == kind)
    }

    /// Reject subsets no query could satisfy. Runs before any catalog access.
    pub fn validate(&self, request: &ReadRequest) -> CoverageResult<()> {
        for (name, subsets) in &request.additional_subset {
            let descriptor = self
                .dimensions
                .iter()
                .find(|d| d.is_custom() && &d.name == name)
                .ok_or_else(|| CoverageError::validation(format!("unknown dimension: {}", name)))?;

            for subset in subsets {
                match subset {
                    DomainSubset::Range(..) => {
                        return Err(CoverageError::validation(format!(
                            "range values are not supported for dimension {}",
                            name
                        )))
                    }
                    DomainSubset::Value(v) if v.kind() != descriptor.kind.value_kind() => {
                        return Err(CoverageError::validation(format!(
                            "value {} does not match the type of dimension {}",
                            v, name
                        )))
                    }
                    DomainSubset::Value(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Produce one query per temporal x vertical combination, in that
    /// iteration order.
    pub async fn plan(
        &self,
        catalog: &dyn GranuleCatalog,
        request: &ReadRequest,
        crop_bbox: &BoundingBox,
    ) -> CoverageResult<Vec<SliceQuery>> {
        self.validate(request)?;

        let selection = Filter::and([
            self.base_filter.clone(),
            request.filter.clone().unwrap_or(Filter::Include),
        ]);

        let mut common = vec![selection.clone(), Filter::intersects(*crop_bbox)];
        for descriptor in self.dimensions.iter().filter(|d| d.is_custom()) {
            match request.additional_subset.get(&descriptor.name) {
                Some(subsets) if !subsets.is_empty() => {
                    common.push(Filter::or(subsets.iter().filter_map(|s| match s {
                        DomainSubset::Value(v) => Some(descriptor.value_filter(v.clone())),
                        DomainSubset::Range(..) => None,
                    })));
                }
                _ => {
                    if let Some(value) = self.default_value(catalog, &selection, descriptor).await? {
                        common.push(descriptor.value_filter(value));
                    }
                }
            }
        }

        let times = self.resolve_times(catalog, request, &selection).await?;
        let elevations = self.resolve_elevations(catalog, request, &selection).await?;

        let time_dim = self.dimension(DomainKind::Time);
        let elevation_dim = self.dimension(DomainKind::Elevation);

        let times: Vec<Option<DateRange>> = if times.is_empty() {
            vec![None]
        } else {
            times.into_iter().map(Some).collect()
        };
        let elevations: Vec<Option<NumberRange>> = if elevations.is_empty() {
            vec![None]
        } else {
            elevations.into_iter().map(Some).collect()
        };

        let mut queries = Vec::with_capacity(times.len() * elevations.len());
        for time in &times {
            for elevation in &elevations {
                let mut terms = common.clone();
                if let (Some(t), Some(dim)) = (time, time_dim) {
                    terms.push(dim.range_filter(
                        AttributeValue::Date(t.start),
                        AttributeValue::Date(t.end),
                    ));
                }
                if let (Some(e), Some(dim)) = (elevation, elevation_dim) {
                    terms.push(dim.range_filter(
                        AttributeValue::Number(e.min),
                        AttributeValue::Number(e.max),
                    ));
                }
                queries.push(SliceQuery {
                    time: *time,
                    elevation: *elevation,
                    filter: Filter::and(terms),
                });
            }
        }

        tracing::debug!(queries = queries.len(), "Planned slice queries");
        Ok(queries)
    }

    async fn resolve_times(
        &self,
        catalog: &dyn GranuleCatalog,
        request: &ReadRequest,
        selection: &Filter,
    ) -> CoverageResult<Vec<DateRange>> {
        let Some(dim) = self.dimension(DomainKind::Time) else {
            if !request.temporal_subset.is_empty() {
                tracing::debug!("Ignoring temporal subset on a coverage without time");
            }
            return Ok(Vec::new());
        };

        if !request.temporal_subset.is_empty() {
            return Ok(request.temporal_subset.clone());
        }

        Ok(match self.default_value(catalog, selection, dim).await? {
            Some(AttributeValue::Date(t)) => vec![DateRange::instant(t)],
            Some(other) => {
                tracing::warn!(value = %other, "Default time is not a date, leaving time unconstrained");
                Vec::new()
            }
            None => Vec::new(),
        })
    }

    async fn resolve_elevations(
        &self,
        catalog: &dyn GranuleCatalog,
        request: &ReadRequest,
        selection: &Filter,
    ) -> CoverageResult<Vec<NumberRange>> {
        let Some(dim) = self.dimension(DomainKind::Elevation) else {
            if !request.vertical_subset.is_empty() {
                tracing::debug!("Ignoring vertical subset on a coverage without elevation");
            }
            return Ok(Vec::new());
        };

        if !request.vertical_subset.is_empty() {
            if !self.nearest_elevation_match {
                return Ok(request.vertical_subset.clone());
            }
            let extents = self.vertical_extents(catalog, selection, dim).await?;
            return Ok(request
                .vertical_subset
                .iter()
                .map(|requested| nearest_extent(requested, &extents))
                .collect());
        }

        Ok(match self.default_value(catalog, selection, dim).await? {
            Some(AttributeValue::Number(v)) => vec![NumberRange::point(v)],
            Some(other) => {
                tracing::warn!(value = %other, "Default elevation is not numeric, leaving elevation unconstrained");
                Vec::new()
            }
            None => Vec::new(),
        })
    }

    /// Distinct vertical extents in the catalog, ordered by their minimum.
    async fn vertical_extents(
        &self,
        catalog: &dyn GranuleCatalog,
        selection: &Filter,
        dim: &DimensionDescriptor,
    ) -> CoverageResult<Vec<NumberRange>> {
        if dim.end_attribute.is_none() {
            let values = catalog
                .distinct_values(selection, &dim.start_attribute)
                .await?;
            return Ok(values
                .iter()
                .filter_map(AttributeValue::as_f64)
                .map(NumberRange::point)
                .collect());
        }

        let granules = catalog.query(&GranuleQuery::new(selection.clone())).await?;
        let mut extents: Vec<NumberRange> = granules
            .iter()
            .filter_map(|g| {
                let low = g.attribute(&dim.start_attribute)?.as_f64()?;
                let high = g.attribute(dim.upper_attribute())?.as_f64()?;
                Some(NumberRange::new(low, high))
            })
            .collect();
        extents.sort_by(|a, b| a.min.total_cmp(&b.min));
        extents.dedup();
        Ok(extents)
    }

    async fn default_value(
        &self,
        catalog: &dyn GranuleCatalog,
        selection: &Filter,
        dim: &DimensionDescriptor,
    ) -> CoverageResult<Option<AttributeValue>> {
        let aggregate = match dim.default_policy {
            DefaultPolicy::None => return Ok(None),
            DefaultPolicy::Min => Aggregate::Min,
            DefaultPolicy::Max => Aggregate::Max,
        };
        let value = catalog
            .aggregate(selection, &dim.start_attribute, aggregate)
            .await?;
        tracing::debug!(
            dimension = %dim.name,
            policy = ?dim.default_policy,
            value = ?value,
            "Resolved dimension default"
        );
        Ok(value)
    }
}

/// Keep `requested` when it intersects an available extent, otherwise snap
/// to the extent whose minimum is closest to the requested minimum.
///
/// Ties keep the first extent encountered.
pub fn nearest_extent(requested: &NumberRange, extents: &[NumberRange]) -> NumberRange {
    if extents.is_empty() || extents.iter().any(|e| e.intersects(requested)) {
        return *requested;
    }

    let mut best = extents[0];
    let mut best_distance = (best.min - requested.min).abs();
    for extent in &extents[1..] {
        let distance = (extent.min - requested.min).abs();
        if distance < best_distance {
            best = *extent;
            best_distance = distance;
        }
    }
    tracing::debug!(requested = %requested, resolved = %best, "Snapped elevation to nearest level");
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverage_common::time::parse_iso8601;
    use coverage_common::ValueKind;
    use granule_catalog::{Granule, MemoryCatalog};

    fn bbox() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 10.0, 10.0)
    }

    fn catalog() -> MemoryCatalog {
        let mut granules = Vec::new();
        for (i, elevation) in [0.0, 10.0, 20.0].iter().enumerate() {
            for (j, time) in ["2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z"].iter().enumerate() {
                granules.push(
                    Granule::new("cube.zarr", i * 2 + j, bbox())
                        .with_attribute("elevation", *elevation)
                        .with_attribute("time", parse_iso8601(time).unwrap())
                        .with_attribute("member", "m1"),
                );
            }
        }
        MemoryCatalog::from_granules(granules)
    }

    #[test]
    fn test_nearest_extent() {
        let extents = [NumberRange::point(0.0), NumberRange::point(10.0), NumberRange::point(20.0)];
        assert_eq!(nearest_extent(&NumberRange::point(7.0), &extents), NumberRange::point(10.0));
        assert_eq!(nearest_extent(&NumberRange::point(10.0), &extents), NumberRange::point(10.0));
        // equidistant: first wins
        assert_eq!(nearest_extent(&NumberRange::point(5.0), &extents), NumberRange::point(0.0));
        // an intersecting range is kept as requested
        let wide = NumberRange::new(5.0, 15.0);
        assert_eq!(nearest_extent(&wide, &extents), wide);
        assert_eq!(nearest_extent(&NumberRange::point(3.0), &[]), NumberRange::point(3.0));
    }

    #[tokio::test]
    async fn test_cross_product_order() {
        let catalog = catalog();
        let dims = vec![
            DimensionDescriptor::time("time"),
            DimensionDescriptor::elevation("elevation"),
        ];
        let planner = DimensionFilterPlanner::new(&dims, Filter::Include, true);
        let t1 = parse_iso8601("2024-01-01T00:00:00Z").unwrap();
        let t2 = parse_iso8601("2024-01-02T00:00:00Z").unwrap();
        let request = ReadRequest::new()
            .at_time(t1)
            .at_time(t2)
            .at_elevation(0.0)
            .at_elevation(20.0);

        let queries = planner.plan(&catalog, &request, &bbox()).await.unwrap();
        let coords: Vec<(DateRange, NumberRange)> = queries
            .iter()
            .map(|q| (q.time.unwrap(), q.elevation.unwrap()))
            .collect();
        assert_eq!(
            coords,
            vec![
                (DateRange::instant(t1), NumberRange::point(0.0)),
                (DateRange::instant(t1), NumberRange::point(20.0)),
                (DateRange::instant(t2), NumberRange::point(0.0)),
                (DateRange::instant(t2), NumberRange::point(20.0)),
            ]
        );

        for query in &queries {
            let matched = catalog.query(&GranuleQuery::new(query.filter.clone())).await.unwrap();
            assert_eq!(matched.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_max_default_policy() {
        let catalog = catalog();
        let dims = vec![DimensionDescriptor::elevation("elevation").with_default_policy(DefaultPolicy::Max)];
        let planner = DimensionFilterPlanner::new(&dims, Filter::Include, true);

        let queries = planner.plan(&catalog, &ReadRequest::new(), &bbox()).await.unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].elevation, Some(NumberRange::point(20.0)));
        assert_eq!(queries[0].time, None);
    }

    #[tokio::test]
    async fn test_no_default_leaves_axis_open() {
        let catalog = catalog();
        let dims = vec![DimensionDescriptor::time("time").with_default_policy(DefaultPolicy::None)];
        let planner = DimensionFilterPlanner::new(&dims, Filter::Include, true);

        let queries = planner.plan(&catalog, &ReadRequest::new(), &bbox()).await.unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].time, None);
        let matched = catalog.query(&GranuleQuery::new(queries[0].filter.clone())).await.unwrap();
        assert_eq!(matched.len(), 6);
    }

    #[tokio::test]
    async fn test_nearest_elevation_in_plan() {
        let catalog = catalog();
        let dims = vec![DimensionDescriptor::elevation("elevation")];

        let planner = DimensionFilterPlanner::new(&dims, Filter::Include, true);
        let request = ReadRequest::new().at_elevation(7.0);
        let queries = planner.plan(&catalog, &request, &bbox()).await.unwrap();
        assert_eq!(queries[0].elevation, Some(NumberRange::point(10.0)));

        let strict = DimensionFilterPlanner::new(&dims, Filter::Include, false);
        let queries = strict.plan(&catalog, &request, &bbox()).await.unwrap();
        assert_eq!(queries[0].elevation, Some(NumberRange::point(7.0)));
    }

    #[tokio::test]
    async fn test_additional_dimension_values() {
        let catalog = catalog();
        let dims = vec![DimensionDescriptor::custom("member", "member", ValueKind::Text)];
        let planner = DimensionFilterPlanner::new(&dims, Filter::Include, true);

        let request = ReadRequest::new().with_dimension_value("member", "m1");
        let queries = planner.plan(&catalog, &request, &bbox()).await.unwrap();
        let matched = catalog.query(&GranuleQuery::new(queries[0].filter.clone())).await.unwrap();
        assert_eq!(matched.len(), 6);

        let request = ReadRequest::new().with_dimension_value("member", "m2");
        let queries = planner.plan(&catalog, &request, &bbox()).await.unwrap();
        let matched = catalog.query(&GranuleQuery::new(queries[0].filter.clone())).await.unwrap();
        assert!(matched.is_empty());
    }

    #[tokio::test]
    async fn test_additional_dimension_range_rejected() {
        let catalog = catalog();
        let dims = vec![DimensionDescriptor::custom("member", "member", ValueKind::Text)];
        let planner = DimensionFilterPlanner::new(&dims, Filter::Include, true);

        let request = ReadRequest::new().with_dimension_subset(
            "member",
            DomainSubset::Range("m1".into(), "m3".into()),
        );
        let result = planner.plan(&catalog, &request, &bbox()).await;
        assert!(matches!(result, Err(CoverageError::Validation(_))));

        let unknown = ReadRequest::new().with_dimension_value("run", 1.0);
        assert!(planner.validate(&unknown).is_err());
    }

    #[tokio::test]
    async fn test_spatial_predicate_applied() {
        let catalog = catalog();
        let planner = DimensionFilterPlanner::new(&[], Filter::Include, true);
        let far = BoundingBox::new(50.0, 50.0, 60.0, 60.0);

        let queries = planner.plan(&catalog, &ReadRequest::new(), &far).await.unwrap();
        assert_eq!(queries.len(), 1);
        let matched = catalog.query(&GranuleQuery::new(queries[0].filter.clone())).await.unwrap();
        assert!(matched.is_empty());
    }
}
