//! Reconciles the requested spatial window with the native grid.

use coverage_common::{BoundingBox, CoverageError, CoverageResult};

use crate::affine::AffineTransform;
use crate::types::{CoverageProperties, RasterArea, ReadRequest};

/// Pixels added on each side of the raster bounds when oversampling.
pub const OVERSAMPLING_MARGIN: usize = 2;

/// Tolerance when comparing requested and native resolutions.
const RESOLUTION_EPSILON: f64 = 1e-6;

/// Request-scoped spatial plan.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialPlan {
    /// World rectangle the output is clipped to.
    pub crop_bbox: BoundingBox,
    /// Output raster bounds in the output grid.
    pub raster_bounds: RasterArea,
    /// Decimation factors (x, y) applied when decoding.
    pub subsampling: (usize, usize),
    /// The request asked for a finer resolution than the native one.
    pub oversampled: bool,
    /// Resolution asked for by the request.
    pub requested_resolution: (f64, f64),
    /// Output grid-to-world transform, corner anchored.
    pub grid_to_world: AffineTransform,
    pub world_to_grid: AffineTransform,
}

impl SpatialPlan {
    /// Georeferencing of the output buffer, whose pixel (0, 0) is the
    /// origin of `raster_bounds`.
    pub fn raster_grid_to_world(&self) -> AffineTransform {
        self.grid_to_world.concatenate(&AffineTransform::translation(
            self.raster_bounds.x as f64,
            self.raster_bounds.y as f64,
        ))
    }

    /// World footprint of the output raster, margins included.
    pub fn raster_envelope(&self) -> BoundingBox {
        self.grid_to_world
            .transform_bbox(&self.raster_bounds.to_bbox())
    }

    /// World area a granule must overlap to contribute.
    ///
    /// A line or point crop still yields one pixel per degenerate axis, so
    /// its footprint is that of the output raster.
    pub fn footprint(&self) -> BoundingBox {
        if self.crop_bbox.is_empty() {
            self.raster_envelope()
        } else {
            self.crop_bbox
        }
    }

    /// World area to read from granules: the footprint, or the full raster
    /// footprint when margins were added.
    pub fn read_bbox(&self) -> BoundingBox {
        if self.oversampled {
            self.raster_envelope()
        } else {
            self.footprint()
        }
    }
}

/// Computes [`SpatialPlan`]s against one coverage's native geometry.
pub struct SpatialSubsetResolver<'a> {
    properties: &'a CoverageProperties,
}

impl<'a> SpatialSubsetResolver<'a> {
    pub fn new(properties: &'a CoverageProperties) -> Self {
        Self { properties }
    }

    /// Plan the spatial part of a read request.
    pub fn plan_request(&self, request: &ReadRequest) -> CoverageResult<SpatialPlan> {
        if let Some(crs) = request.bbox_crs {
            if crs != self.properties.crs {
                return Err(CoverageError::validation(format!(
                    "bbox CRS {} differs from coverage CRS {}",
                    crs, self.properties.crs
                )));
            }
        }
        self.plan(request.bbox, request.raster_area, request.grid_to_world)
    }

    /// Resolve crop bbox, raster bounds and decimation.
    ///
    /// A missing bbox or raster area is derived from the other; when both
    /// are missing the native ones are used.
    pub fn plan(
        &self,
        bbox: Option<BoundingBox>,
        raster_area: Option<RasterArea>,
        grid_to_world: Option<AffineTransform>,
    ) -> CoverageResult<SpatialPlan> {
        let props = self.properties;

        if let Some(b) = &bbox {
            if !b.is_valid() {
                return Err(CoverageError::validation(format!("invalid bbox {}", b)));
            }
        }
        if let Some(area) = &raster_area {
            if area.is_empty() {
                return Err(CoverageError::validation(format!(
                    "requested raster area must be at least 1x1, got {}x{}",
                    area.width, area.height
                )));
            }
            area.check_extent()?;
        }
        if let Some(g2w) = &grid_to_world {
            g2w.inverse()?;
        }

        let native_corner = props.corner_grid_to_world();
        let (bbox, area) = match (bbox, raster_area) {
            (None, None) => (props.bbox, props.raster_area),
            (Some(b), None) => (b, self.derive_raster_area(&b, &native_corner)?),
            (None, Some(a)) => {
                let g2w = grid_to_world.unwrap_or(native_corner);
                (g2w.transform_bbox(&a.to_bbox()), a)
            }
            (Some(b), Some(a)) => (b, a),
        };

        let requested_resolution = match &grid_to_world {
            Some(g2w) => g2w.resolution(),
            None => (
                bbox.width() / area.width as f64,
                bbox.height() / area.height as f64,
            ),
        };

        let (res_x, factor_x, over_x) =
            decimation(requested_resolution.0, props.full_resolution.0);
        let (res_y, factor_y, over_y) =
            decimation(requested_resolution.1, props.full_resolution.1);
        let oversampled = over_x || over_y;

        let grid_to_world = match grid_to_world {
            Some(g2w) if !oversampled => g2w,
            _ => AffineTransform::new(res_x, 0.0, bbox.min_x, 0.0, -res_y, bbox.max_y),
        };
        let world_to_grid = grid_to_world.inverse()?;

        let crop_bbox = bbox;
        let pixels = world_to_grid.transform_bbox(&crop_bbox);
        if !pixels.is_valid() {
            return Err(CoverageError::validation(format!(
                "crop bbox {} has no finite raster footprint",
                crop_bbox
            )));
        }

        let mut raster_bounds = RasterArea::rounded(&pixels)?;
        if raster_bounds.width == 0 {
            raster_bounds.width = 1;
        }
        if raster_bounds.height == 0 {
            raster_bounds.height = 1;
        }
        if oversampled {
            raster_bounds = raster_bounds.grow(OVERSAMPLING_MARGIN);
        }
        raster_bounds.check_extent()?;

        tracing::debug!(
            coverage = %props.name,
            crop = %crop_bbox,
            width = raster_bounds.width,
            height = raster_bounds.height,
            subsampling_x = factor_x,
            subsampling_y = factor_y,
            oversampled,
            "Resolved spatial plan"
        );

        Ok(SpatialPlan {
            crop_bbox,
            raster_bounds,
            subsampling: (factor_x, factor_y),
            oversampled,
            requested_resolution,
            grid_to_world,
            world_to_grid,
        })
    }

    /// Native pixel area covered by `bbox`, at least one pixel.
    fn derive_raster_area(
        &self,
        bbox: &BoundingBox,
        native_corner: &AffineTransform,
    ) -> CoverageResult<RasterArea> {
        let pixels = native_corner.inverse()?.transform_bbox(bbox);
        if !pixels.is_valid() {
            return Err(CoverageError::validation(format!(
                "bbox {} has no finite native footprint",
                bbox
            )));
        }
        let area = RasterArea::rounded(&pixels)?;
        if area.is_empty() {
            return Ok(RasterArea::sized(1, 1));
        }
        area.check_extent()?;
        Ok(area)
    }
}

/// Effective resolution, subsampling factor and oversampling flag for one axis.
fn decimation(requested: f64, native: f64) -> (f64, usize, bool) {
    if !requested.is_finite() || requested <= 0.0 {
        return (native, 1, false);
    }
    if requested < native * (1.0 - RESOLUTION_EPSILON) {
        return (native, 1, true);
    }
    let factor = ((requested / native) + RESOLUTION_EPSILON).floor().max(1.0) as usize;
    (requested, factor, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleDimension;
    use coverage_common::Crs;

    fn properties() -> CoverageProperties {
        // 1000 x 1000 pixels of 0.1 units
        CoverageProperties::from_extent(
            "test",
            Crs::WGS84,
            BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            1000,
            1000,
            vec![SampleDimension::new("value")],
        )
        .unwrap()
    }

    #[test]
    fn test_no_subsetting_uses_native_geometry() {
        let props = properties();
        let plan = SpatialSubsetResolver::new(&props).plan(None, None, None).unwrap();

        assert_eq!(plan.crop_bbox, props.bbox);
        assert_eq!(plan.raster_bounds, props.raster_area);
        assert_eq!(plan.subsampling, (1, 1));
        assert!(!plan.oversampled);
    }

    #[test]
    fn test_decimation_factor() {
        let props = properties();
        let plan = SpatialSubsetResolver::new(&props)
            .plan(
                Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
                Some(RasterArea::sized(10, 10)),
                None,
            )
            .unwrap();

        assert_eq!(plan.subsampling, (10, 10));
        assert_eq!(plan.raster_bounds, RasterArea::sized(10, 10));
        assert!((plan.grid_to_world.scale_x() - 1.0).abs() < 1e-9);
        assert!((plan.grid_to_world.scale_y() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_only_derives_native_area() {
        let props = properties();
        let plan = SpatialSubsetResolver::new(&props)
            .plan(Some(BoundingBox::new(10.0, 10.0, 20.0, 30.0)), None, None)
            .unwrap();

        assert_eq!(plan.subsampling, (1, 1));
        assert_eq!(plan.raster_bounds.width, 100);
        assert_eq!(plan.raster_bounds.height, 200);
    }

    #[test]
    fn test_oversampling_grows_margin() {
        let props = properties();
        let plan = SpatialSubsetResolver::new(&props)
            .plan(
                Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0)),
                Some(RasterArea::sized(100, 100)),
                None,
            )
            .unwrap();

        assert!(plan.oversampled);
        assert_eq!(plan.subsampling, (1, 1));
        // 10 native pixels plus the margin on both sides
        assert_eq!(plan.raster_bounds, RasterArea::new(-2, -2, 14, 14));
        assert!(plan.read_bbox().min_x < 0.0);
    }

    #[test]
    fn test_degenerate_width_becomes_one() {
        let props = properties();
        let g2w = AffineTransform::new(1.0, 0.0, 0.0, 0.0, -1.0, 10.0);
        let plan = SpatialSubsetResolver::new(&props)
            .plan(
                Some(BoundingBox::new(0.0, 0.0, 0.3, 10.0)),
                Some(RasterArea::sized(1, 10)),
                Some(g2w),
            )
            .unwrap();

        assert!(!plan.oversampled);
        assert_eq!(plan.raster_bounds.width, 1);
        assert_eq!(plan.raster_bounds.height, 10);
    }

    #[test]
    fn test_degenerate_width_with_oversampling() {
        let props = properties();
        let plan = SpatialSubsetResolver::new(&props)
            .plan(
                Some(BoundingBox::new(0.0, 0.0, 0.01, 1.0)),
                Some(RasterArea::sized(1, 100)),
                None,
            )
            .unwrap();

        assert!(plan.oversampled);
        // 0 grown to 1, then 2 pixels on each side
        assert_eq!(plan.raster_bounds.width, 5);
    }

    #[test]
    fn test_line_crop_footprint_is_one_pixel_wide() {
        let props = properties();
        let plan = SpatialSubsetResolver::new(&props)
            .plan(
                Some(BoundingBox::new(5.0, 0.0, 5.0, 10.0)),
                Some(RasterArea::sized(1, 10)),
                None,
            )
            .unwrap();

        assert_eq!(plan.raster_bounds.width, 1);
        let footprint = plan.footprint();
        assert!(!footprint.is_empty());
        assert!((footprint.min_x - 5.0).abs() < 1e-9);
        assert!((footprint.width() - 0.1).abs() < 1e-9);
        assert_eq!(plan.read_bbox(), footprint);

        let area = SpatialSubsetResolver::new(&props)
            .plan(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)), None, None)
            .unwrap();
        assert_eq!(area.footprint(), area.crop_bbox);
    }

    #[test]
    fn test_huge_extents_rejected() {
        let props = properties();
        let resolver = SpatialSubsetResolver::new(&props);

        let wide = resolver.plan(Some(BoundingBox::new(-1e300, 0.0, 1e300, 10.0)), None, None);
        assert!(matches!(wide, Err(CoverageError::Validation(_))));

        let oversized = resolver.plan(None, Some(RasterArea::sized(1 << 20, 1 << 20)), None);
        assert!(matches!(oversized, Err(CoverageError::Validation(_))));
    }

    #[test]
    fn test_singular_transform_rejected() {
        let props = properties();
        let singular = AffineTransform::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let result = SpatialSubsetResolver::new(&props).plan(
            Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            Some(RasterArea::sized(10, 10)),
            Some(singular),
        );
        assert!(matches!(result, Err(CoverageError::Validation(_))));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let props = properties();
        let resolver = SpatialSubsetResolver::new(&props);
        assert!(resolver
            .plan(Some(BoundingBox::new(10.0, 0.0, 0.0, 10.0)), None, None)
            .is_err());
        assert!(resolver.plan(None, Some(RasterArea::sized(0, 10)), None).is_err());

        let request = ReadRequest::new().with_bbox_crs(Crs::WEB_MERCATOR);
        assert!(resolver.plan_request(&request).is_err());
    }

    #[test]
    fn test_decimation_helper() {
        assert_eq!(decimation(0.1, 0.1), (0.1, 1, false));
        assert_eq!(decimation(0.05, 0.1), (0.1, 1, true));
        let (_, factor, over) = decimation(1.0, 0.1);
        assert_eq!((factor, over), (10, false));
        let (_, factor, _) = decimation(0.25, 0.1);
        assert_eq!(factor, 2);
    }
}
