//! Request, geometry and result types of the read pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use coverage_common::{
    AttributeValue, BoundingBox, CoverageError, CoverageResult, Crs, DateRange, NumberRange,
};
use granule_catalog::Filter;
use serde::{Deserialize, Serialize};

use crate::affine::AffineTransform;
use crate::dimension::DomainSubset;

/// Interpolation method used when resampling decoded rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (preserves exact values and palette indices).
    #[default]
    Nearest,
    /// Bilinear interpolation.
    Bilinear,
    /// Bicubic interpolation.
    Cubic,
}

impl InterpolationMethod {
    /// Parse from string (case-insensitive). Unknown names fall back to nearest.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "bilinear" | "linear" => Self::Bilinear,
            "cubic" | "bicubic" => Self::Cubic,
            _ => Self::Nearest,
        }
    }
}

impl std::fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

/// Distance from a pixel boundary treated as lying on it.
const PIXEL_EPSILON: f64 = 1e-6;

/// Largest pixel coordinate magnitude a raster edge may have.
pub const MAX_PIXEL_COORDINATE: i64 = 1 << 31;

/// Largest number of pixels an output raster may hold.
pub const MAX_RASTER_PIXELS: usize = 1 << 30;

/// Pixel edge for a grid coordinate already snapped to an integer value.
fn pixel_edge(v: f64) -> CoverageResult<i64> {
    if v.is_finite() && v.abs() <= MAX_PIXEL_COORDINATE as f64 {
        Ok(v as i64)
    } else {
        Err(CoverageError::validation(format!(
            "pixel coordinate {} is out of range",
            v
        )))
    }
}

/// A rectangle in pixel space. `x`/`y` may be negative for margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterArea {
    pub x: i64,
    pub y: i64,
    pub width: usize,
    pub height: usize,
}

impl RasterArea {
    pub fn new(x: i64, y: i64, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Area of `width x height` pixels anchored at the origin.
    pub fn sized(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive end column.
    pub fn max_x(&self) -> i64 {
        self.x.saturating_add_unsigned(self.width as u64)
    }

    /// Exclusive end row.
    pub fn max_y(&self) -> i64 {
        self.y.saturating_add_unsigned(self.height as u64)
    }

    pub fn pixel_count(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// Reject areas whose edges or pixel count exceed what a raster can hold.
    pub fn check_extent(&self) -> CoverageResult<()> {
        let edges = [self.x, self.y, self.max_x(), self.max_y()];
        if edges.iter().any(|e| e.unsigned_abs() > MAX_PIXEL_COORDINATE as u64) {
            return Err(CoverageError::validation(format!(
                "raster area {}x{} at ({}, {}) is out of range",
                self.width, self.height, self.x, self.y
            )));
        }
        match self.width.checked_mul(self.height) {
            Some(count) if count <= MAX_RASTER_PIXELS => Ok(()),
            _ => Err(CoverageError::validation(format!(
                "raster area {}x{} exceeds {} pixels",
                self.width, self.height, MAX_RASTER_PIXELS
            ))),
        }
    }

    /// Pixel rectangle as a continuous bbox in grid coordinates.
    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.x as f64,
            self.y as f64,
            self.max_x() as f64,
            self.max_y() as f64,
        )
    }

    /// Area spanned by the rounded edges of a grid-space bbox.
    pub fn rounded(bbox: &BoundingBox) -> CoverageResult<Self> {
        Self::from_edges(
            bbox.min_x.round(),
            bbox.min_y.round(),
            bbox.max_x.round(),
            bbox.max_y.round(),
        )
    }

    /// Smallest area covering every pixel touched by a grid-space bbox.
    ///
    /// Edges within floating point noise of a pixel boundary snap to it.
    pub fn enclosing(bbox: &BoundingBox) -> CoverageResult<Self> {
        let snap = |v: f64| {
            let r = v.round();
            if (v - r).abs() < PIXEL_EPSILON {
                r
            } else {
                v
            }
        };
        Self::from_edges(
            snap(bbox.min_x).floor(),
            snap(bbox.min_y).floor(),
            snap(bbox.max_x).ceil(),
            snap(bbox.max_y).ceil(),
        )
    }

    fn from_edges(x0: f64, y0: f64, x1: f64, y1: f64) -> CoverageResult<Self> {
        let (x0, y0) = (pixel_edge(x0)?, pixel_edge(y0)?);
        let (x1, y1) = (pixel_edge(x1)?, pixel_edge(y1)?);
        // edges are bounded, so the spans cannot overflow
        Ok(Self::new(
            x0,
            y0,
            (x1 - x0).max(0) as usize,
            (y1 - y0).max(0) as usize,
        ))
    }

    /// Overlap of two areas, `None` when it has no pixels.
    pub fn intersection(&self, other: &RasterArea) -> Option<RasterArea> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(RasterArea::new(
            x0,
            y0,
            x1.abs_diff(x0) as usize,
            y1.abs_diff(y0) as usize,
        ))
    }

    /// Grow by `margin` pixels on each side.
    pub fn grow(&self, margin: usize) -> RasterArea {
        RasterArea::new(
            self.x.saturating_sub_unsigned(margin as u64),
            self.y.saturating_sub_unsigned(margin as u64),
            self.width.saturating_add(2 * margin),
            self.height.saturating_add(2 * margin),
        )
    }
}

/// Descriptor of one band of a coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDimension {
    pub name: String,
    pub units: Option<String>,
    /// Values are palette indices rather than measurements.
    #[serde(default)]
    pub indexed: bool,
}

impl SampleDimension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: None,
            indexed: false,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Native geometry of a coverage, derived once and cached with its source.
#[derive(Debug, Clone)]
pub struct CoverageProperties {
    pub name: String,
    pub crs: Crs,
    /// Native grid-to-world transform anchored at pixel centers.
    pub grid_to_world: AffineTransform,
    pub raster_area: RasterArea,
    pub bbox: BoundingBox,
    pub full_resolution: (f64, f64),
    pub geographic_bbox: Option<BoundingBox>,
    pub sample_dimensions: Vec<SampleDimension>,
}

impl CoverageProperties {
    /// Build properties from a pixel-center grid-to-world transform.
    pub fn new(
        name: impl Into<String>,
        crs: Crs,
        grid_to_world: AffineTransform,
        raster_area: RasterArea,
        sample_dimensions: Vec<SampleDimension>,
    ) -> CoverageResult<Self> {
        let name = name.into();
        if raster_area.is_empty() {
            return Err(CoverageError::validation(format!(
                "coverage {} has an empty raster area",
                name
            )));
        }
        if sample_dimensions.is_empty() {
            return Err(CoverageError::validation(format!(
                "coverage {} has no sample dimensions",
                name
            )));
        }
        grid_to_world.inverse()?;

        let corner = grid_to_world.concatenate(&AffineTransform::translation(-0.5, -0.5));
        let bbox = corner.transform_bbox(&raster_area.to_bbox());

        Ok(Self {
            name,
            crs,
            grid_to_world,
            raster_area,
            bbox,
            full_resolution: grid_to_world.resolution(),
            geographic_bbox: crs.to_geographic(&bbox),
            sample_dimensions,
        })
    }

    /// Build properties for a north-up grid of `width x height` pixels covering `bbox`.
    pub fn from_extent(
        name: impl Into<String>,
        crs: Crs,
        bbox: BoundingBox,
        width: usize,
        height: usize,
        sample_dimensions: Vec<SampleDimension>,
    ) -> CoverageResult<Self> {
        if width == 0 || height == 0 || bbox.is_empty() || !bbox.is_valid() {
            return Err(CoverageError::validation(format!(
                "invalid coverage extent {} ({}x{})",
                bbox, width, height
            )));
        }
        let res_x = bbox.width() / width as f64;
        let res_y = bbox.height() / height as f64;
        let grid_to_world = AffineTransform::new(
            res_x,
            0.0,
            bbox.min_x + res_x / 2.0,
            0.0,
            -res_y,
            bbox.max_y - res_y / 2.0,
        );
        let mut properties = Self::new(
            name,
            crs,
            grid_to_world,
            RasterArea::sized(width, height),
            sample_dimensions,
        )?;
        // Keep the declared extent rather than its float round trip.
        properties.bbox = bbox;
        properties.geographic_bbox = crs.to_geographic(&bbox);
        Ok(properties)
    }

    /// Native grid-to-world transform anchored at pixel corners.
    pub fn corner_grid_to_world(&self) -> AffineTransform {
        self.grid_to_world
            .concatenate(&AffineTransform::translation(-0.5, -0.5))
    }
}

/// A read request. Immutable for the duration of one call.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    /// Crop rectangle in `bbox_crs` (the coverage CRS when unset).
    pub bbox: Option<BoundingBox>,
    pub bbox_crs: Option<Crs>,
    /// Requested output pixel area.
    pub raster_area: Option<RasterArea>,
    /// Requested output grid-to-world transform, corner anchored.
    pub grid_to_world: Option<AffineTransform>,
    pub temporal_subset: Vec<DateRange>,
    pub vertical_subset: Vec<NumberRange>,
    pub additional_subset: BTreeMap<String, Vec<DomainSubset>>,
    pub bands: Option<Vec<usize>>,
    pub filter: Option<Filter>,
    /// Output fields selected by sample dimension name.
    pub range_selection: Option<Vec<String>>,
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_bbox_crs(mut self, crs: Crs) -> Self {
        self.bbox_crs = Some(crs);
        self
    }

    pub fn with_raster_area(mut self, width: usize, height: usize) -> Self {
        self.raster_area = Some(RasterArea::sized(width, height));
        self
    }

    pub fn with_grid_to_world(mut self, grid_to_world: AffineTransform) -> Self {
        self.grid_to_world = Some(grid_to_world);
        self
    }

    pub fn at_time(mut self, time: DateTime<Utc>) -> Self {
        self.temporal_subset.push(DateRange::instant(time));
        self
    }

    pub fn with_time_range(mut self, range: DateRange) -> Self {
        self.temporal_subset.push(range);
        self
    }

    pub fn at_elevation(mut self, elevation: f64) -> Self {
        self.vertical_subset.push(NumberRange::point(elevation));
        self
    }

    pub fn with_elevation_range(mut self, range: NumberRange) -> Self {
        self.vertical_subset.push(range);
        self
    }

    pub fn with_dimension_value(
        mut self,
        dimension: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.additional_subset
            .entry(dimension.into())
            .or_default()
            .push(DomainSubset::Value(value.into()));
        self
    }

    pub fn with_dimension_subset(
        mut self,
        dimension: impl Into<String>,
        subset: DomainSubset,
    ) -> Self {
        self.additional_subset
            .entry(dimension.into())
            .or_default()
            .push(subset);
        self
    }

    pub fn with_bands(mut self, bands: Vec<usize>) -> Self {
        self.bands = Some(bands);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.range_selection = Some(fields);
        self
    }
}

/// A georeferenced output raster.
#[derive(Debug, Clone)]
pub struct RasterResult {
    pub coverage: String,
    pub width: usize,
    pub height: usize,
    /// Row-major pixel data, one buffer per selected band.
    pub bands: Vec<Vec<f32>>,
    pub sample_dimensions: Vec<SampleDimension>,
    pub no_data: f32,
    /// Output grid-to-world transform anchored at pixel corners.
    pub grid_to_world: AffineTransform,
    pub crs: Crs,
    pub envelope: BoundingBox,
}

impl RasterResult {
    /// Value of `band` at (`col`, `row`).
    pub fn value(&self, band: usize, col: usize, row: usize) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.bands.get(band).map(|data| data[row * self.width + col])
    }

    pub fn is_no_data(&self, value: f32) -> bool {
        if self.no_data.is_nan() {
            value.is_nan()
        } else {
            value == self.no_data
        }
    }
}

/// One output raster tagged with its non-spatial coordinates.
///
/// A coordinate is `None` when its axis was left unconstrained.
#[derive(Debug, Clone)]
pub struct SliceResult {
    pub raster: RasterResult,
    pub time: Option<DateRange>,
    pub elevation: Option<NumberRange>,
}

/// How a read call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    Complete,
    Cancelled,
    TimedOut,
}

/// Result of a read call: the assembled slices in cross-product order.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub slices: Vec<SliceResult>,
    pub completion: Completion,
}

impl ReadOutcome {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn into_slices(self) -> Vec<SliceResult> {
        self.slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_area_rounding() {
        let bbox = BoundingBox::new(0.4, 1.6, 10.49, 2.4);
        assert_eq!(RasterArea::rounded(&bbox).unwrap(), RasterArea::new(0, 2, 10, 0));
        assert_eq!(RasterArea::enclosing(&bbox).unwrap(), RasterArea::new(0, 1, 11, 2));

        let noisy = BoundingBox::new(-1e-12, 900.0000000001, 100.0000000001, 1000.0);
        assert_eq!(
            RasterArea::enclosing(&noisy).unwrap(),
            RasterArea::new(0, 900, 100, 100)
        );
    }

    #[test]
    fn test_raster_area_rejects_huge_extents() {
        let huge = BoundingBox::new(-1e301, 0.0, 1e301, 10.0);
        assert!(matches!(
            RasterArea::rounded(&huge),
            Err(CoverageError::Validation(_))
        ));
        assert!(RasterArea::enclosing(&huge).is_err());

        assert!(RasterArea::sized(1000, 1000).check_extent().is_ok());
        assert!(RasterArea::sized(1 << 20, 1 << 20).check_extent().is_err());
        assert!(RasterArea::new(i64::MAX - 5, 0, 10, 10).check_extent().is_err());
        assert_eq!(RasterArea::sized(usize::MAX, 2).pixel_count(), usize::MAX);
    }

    #[test]
    fn test_raster_area_intersection() {
        let a = RasterArea::new(0, 0, 10, 10);
        assert_eq!(
            a.intersection(&RasterArea::new(5, -3, 10, 5)),
            Some(RasterArea::new(5, 0, 5, 2))
        );
        assert_eq!(a.intersection(&RasterArea::new(10, 0, 5, 5)), None);
        assert_eq!(a.grow(2), RasterArea::new(-2, -2, 14, 14));
    }

    #[test]
    fn test_properties_from_extent() {
        let props = CoverageProperties::from_extent(
            "temp",
            Crs::WGS84,
            BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            360,
            180,
            vec![SampleDimension::new("temp")],
        )
        .unwrap();

        assert_eq!(props.full_resolution, (1.0, 1.0));
        assert_eq!(props.bbox, BoundingBox::new(-180.0, -90.0, 180.0, 90.0));
        assert_eq!(props.grid_to_world.transform_point(0.0, 0.0), (-179.5, 89.5));
        assert_eq!(
            props.corner_grid_to_world().transform_point(0.0, 0.0),
            (-180.0, 90.0)
        );
        assert_eq!(props.geographic_bbox, Some(props.bbox));
    }

    #[test]
    fn test_properties_reject_singular_transform() {
        let result = CoverageProperties::new(
            "bad",
            Crs::WGS84,
            AffineTransform::new(0.0, 0.0, 0.0, 0.0, 1.0, 0.0),
            RasterArea::sized(10, 10),
            vec![SampleDimension::new("v")],
        );
        assert!(matches!(result, Err(CoverageError::Validation(_))));
    }

    #[test]
    fn test_interpolation_parse() {
        assert_eq!(InterpolationMethod::from_str("BILINEAR"), InterpolationMethod::Bilinear);
        assert_eq!(InterpolationMethod::from_str("bicubic"), InterpolationMethod::Cubic);
        assert_eq!(InterpolationMethod::from_str("other"), InterpolationMethod::Nearest);
        assert_eq!(InterpolationMethod::default(), InterpolationMethod::Nearest);
    }
}
