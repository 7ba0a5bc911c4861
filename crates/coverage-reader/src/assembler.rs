//! Drives catalog lookup, decoding and resampling for every planned slice.

use coverage_common::{CoverageError, CoverageResult};
use granule_catalog::{Granule, GranuleCatalog, GranuleQuery};

use crate::compose::AffineTransformComposer;
use crate::config::ReadParameters;
use crate::decoder::{DecodeLocks, DecodeRequest, RasterDecoder};
use crate::planner::SliceQuery;
use crate::resample::{warp_band, SourceBand};
use crate::spatial::SpatialPlan;
use crate::types::{
    Completion, CoverageProperties, InterpolationMethod, RasterArea, RasterResult, ReadOutcome,
    SampleDimension, SliceResult,
};

/// Output buffers of one slice under construction.
struct SliceCanvas {
    width: usize,
    bands: Vec<Vec<f32>>,
    filled: Vec<bool>,
}

impl SliceCanvas {
    fn new(width: usize, height: usize, band_count: usize, no_data: f32) -> Self {
        Self {
            width,
            bands: vec![vec![no_data; width * height]; band_count],
            filled: vec![false; width * height],
        }
    }
}

/// Assembles output rasters from catalogued granules.
pub struct RasterAssembler<'a> {
    properties: &'a CoverageProperties,
    catalog: &'a dyn GranuleCatalog,
    decoder: &'a dyn RasterDecoder,
    locks: &'a DecodeLocks,
    parameters: &'a ReadParameters,
}

impl<'a> RasterAssembler<'a> {
    pub fn new(
        properties: &'a CoverageProperties,
        catalog: &'a dyn GranuleCatalog,
        decoder: &'a dyn RasterDecoder,
        locks: &'a DecodeLocks,
        parameters: &'a ReadParameters,
    ) -> Self {
        Self {
            properties,
            catalog,
            decoder,
            locks,
            parameters,
        }
    }

    /// Produce one result per slice query that yields data, in query order.
    ///
    /// `bands` are indices into the coverage's sample dimensions and must
    /// already be validated. Catalog failures abort the call; decode
    /// failures only drop the affected granule.
    pub async fn assemble(
        &self,
        plan: &SpatialPlan,
        queries: &[SliceQuery],
        bands: &[usize],
    ) -> CoverageResult<ReadOutcome> {
        let composer = AffineTransformComposer::new(self.properties, plan)?;
        let mut slices = Vec::new();

        for query in queries {
            if let Some(completion) = self.parameters.interruption() {
                return Ok(self.interrupted(slices, completion));
            }

            let granules = self
                .catalog
                .query(&GranuleQuery::new(query.filter.clone()))
                .await?;
            if granules.is_empty() {
                tracing::debug!(
                    coverage = %self.properties.name,
                    filter = %query.filter,
                    "No granule matches slice, skipping"
                );
                continue;
            }

            let mut canvas = SliceCanvas::new(
                plan.raster_bounds.width,
                plan.raster_bounds.height,
                bands.len(),
                self.parameters.no_data,
            );
            let mut contributed = false;

            for granule in &granules {
                if let Some(completion) = self.parameters.interruption() {
                    return Ok(self.interrupted(slices, completion));
                }

                match self
                    .render_granule(granule, plan, &composer, bands, &mut canvas)
                    .await
                {
                    Ok(true) => contributed = true,
                    Ok(false) => {}
                    Err(CoverageError::DataUnavailable(msg)) => {
                        tracing::debug!(
                            location = %granule.location,
                            image = granule.image_index,
                            reason = %msg,
                            "Granule data unavailable, skipping"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            location = %granule.location,
                            image = granule.image_index,
                            error = %e,
                            "Failed to decode granule, skipping"
                        );
                    }
                }
            }

            if contributed {
                slices.push(SliceResult {
                    raster: self.finish(plan, canvas, bands),
                    time: query.time,
                    elevation: query.elevation,
                });
            }
        }

        tracing::debug!(
            coverage = %self.properties.name,
            slices = slices.len(),
            "Assembled read"
        );
        Ok(ReadOutcome {
            slices,
            completion: Completion::Complete,
        })
    }

    fn interrupted(&self, slices: Vec<SliceResult>, completion: Completion) -> ReadOutcome {
        tracing::info!(
            coverage = %self.properties.name,
            completion = ?completion,
            slices = slices.len(),
            "Read interrupted"
        );
        ReadOutcome { slices, completion }
    }

    /// Crop, decode and resample one granule into the canvas.
    ///
    /// `Ok(false)` means the granule has nothing to contribute.
    async fn render_granule(
        &self,
        granule: &Granule,
        plan: &SpatialPlan,
        composer: &AffineTransformComposer,
        bands: &[usize],
        canvas: &mut SliceCanvas,
    ) -> CoverageResult<bool> {
        // Inclusion is decided against the crop footprint.
        let Some(area) = granule
            .bbox
            .intersection(&self.properties.bbox)
            .and_then(|b| b.intersection(&plan.footprint()))
        else {
            tracing::trace!(location = %granule.location, "Granule outside crop");
            return Ok(false);
        };
        let read_area = if plan.oversampled {
            granule
                .bbox
                .intersection(&self.properties.bbox)
                .and_then(|b| b.intersection(&plan.read_bbox()))
                .unwrap_or(area)
        } else {
            area
        };

        let native_world_to_grid = self.properties.corner_grid_to_world().inverse()?;
        let pixels = native_world_to_grid.transform_bbox(&read_area);
        let Some(region) = RasterArea::enclosing(&pixels)?
            .intersection(&self.properties.raster_area)
        else {
            tracing::trace!(location = %granule.location, "Empty source region");
            return Ok(false);
        };

        let request = DecodeRequest {
            location: granule.location.clone(),
            image_index: granule.image_index,
            region,
            subsampling: plan.subsampling,
        };
        let decoded = {
            let _guard = self.locks.acquire(&granule.location).await;
            self.decoder.decode(&request).await?
        };

        if decoded.is_empty() {
            return Err(CoverageError::decode_failure("decoder returned an empty raster"));
        }
        if let Some(&missing) = bands.iter().find(|&&b| b >= decoded.band_count()) {
            return Err(CoverageError::decode_failure(format!(
                "decoded raster has {} bands, band {} requested",
                decoded.band_count(),
                missing
            )));
        }

        let warp = composer.compose(&region, (decoded.width, decoded.height))?;
        let output_to_source = warp.inverse().map_err(|e| {
            CoverageError::decode_failure(format!("composed transform: {}", e))
        })?;

        let before = canvas.filled.clone();
        let mut written = 0;
        for (out_band, &band) in bands.iter().enumerate() {
            let source = SourceBand {
                data: &decoded.bands[band],
                width: decoded.width,
                height: decoded.height,
                fill: decoded.fill_value,
            };
            let mut mask = before.clone();
            written += warp_band(
                &source,
                &output_to_source,
                self.parameters.interpolation,
                &mut canvas.bands[out_band],
                canvas.width,
                &mut mask,
            );
            for (merged, wrote) in canvas.filled.iter_mut().zip(mask) {
                *merged |= wrote;
            }
        }

        tracing::trace!(
            location = %granule.location,
            image = granule.image_index,
            region = ?region,
            written,
            "Rendered granule"
        );
        Ok(written > 0)
    }

    fn finish(&self, plan: &SpatialPlan, canvas: SliceCanvas, bands: &[usize]) -> RasterResult {
        let sample_dimensions: Vec<SampleDimension> = bands
            .iter()
            .map(|&b| {
                let mut dim = self.properties.sample_dimensions[b].clone();
                if self.parameters.interpolation != InterpolationMethod::Nearest {
                    dim.indexed = false;
                }
                dim
            })
            .collect();

        let grid_to_world = plan.raster_grid_to_world();
        let envelope = grid_to_world.transform_bbox(
            &RasterArea::sized(plan.raster_bounds.width, plan.raster_bounds.height).to_bbox(),
        );

        RasterResult {
            coverage: self.properties.name.clone(),
            width: plan.raster_bounds.width,
            height: plan.raster_bounds.height,
            bands: canvas.bands,
            sample_dimensions,
            no_data: self.parameters.no_data,
            grid_to_world,
            crs: self.properties.crs,
            envelope,
        }
    }
}
