//! Composition of the per-slice decoded-raster-to-output transform.

use coverage_common::{BoundingBox, CoverageError, CoverageResult};

use crate::affine::AffineTransform;
use crate::spatial::SpatialPlan;
use crate::types::{CoverageProperties, RasterArea};

/// Builds the transform mapping decoded raster pixels to output pixels.
#[derive(Debug, Clone)]
pub struct AffineTransformComposer {
    /// Native grid-to-world, pixel-center anchored.
    native_grid_to_world: AffineTransform,
    /// World to output buffer pixels.
    output_world_to_grid: AffineTransform,
    output_bounds: RasterArea,
}

impl AffineTransformComposer {
    pub fn new(properties: &CoverageProperties, plan: &SpatialPlan) -> CoverageResult<Self> {
        Ok(Self {
            native_grid_to_world: properties.grid_to_world,
            output_world_to_grid: plan.raster_grid_to_world().inverse()?,
            output_bounds: RasterArea::sized(plan.raster_bounds.width, plan.raster_bounds.height),
        })
    }

    /// World georeferencing of a decoded raster read from `source_region`
    /// and decoded to `decoded_size` pixels.
    pub fn source_to_world(
        &self,
        source_region: &RasterArea,
        decoded_size: (usize, usize),
    ) -> AffineTransform {
        let scale_x = source_region.width as f64 / decoded_size.0.max(1) as f64;
        let scale_y = source_region.height as f64 / decoded_size.1.max(1) as f64;

        self.native_grid_to_world
            .concatenate(&AffineTransform::translation(-0.5, -0.5))
            .concatenate(&AffineTransform::translation(
                source_region.x as f64,
                source_region.y as f64,
            ))
            .concatenate(&AffineTransform::scaling(scale_x, scale_y))
    }

    /// Final transform from decoded pixels to output buffer pixels.
    ///
    /// Fails with `DecodeFailure` when the decoded raster lands on no output
    /// pixel or the transform degenerates.
    pub fn compose(
        &self,
        source_region: &RasterArea,
        decoded_size: (usize, usize),
    ) -> CoverageResult<AffineTransform> {
        let transform = self
            .source_to_world(source_region, decoded_size)
            .pre_concatenate(&self.output_world_to_grid);

        if !transform.is_finite() {
            return Err(CoverageError::decode_failure("composed transform is not finite"));
        }

        let footprint = transform.transform_bbox(&BoundingBox::new(
            0.0,
            0.0,
            decoded_size.0 as f64,
            decoded_size.1 as f64,
        ));
        if footprint.intersection(&self.output_bounds.to_bbox()).is_none() {
            return Err(CoverageError::decode_failure(format!(
                "decoded raster maps to an empty output layout {}",
                footprint
            )));
        }

        Ok(transform)
    }
}
