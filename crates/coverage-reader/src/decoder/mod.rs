//! Raster decoder seam and per-location decode serialization.

mod zarr;

pub use zarr::ZarrSliceDecoder;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coverage_common::{CoverageError, CoverageResult};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::RasterArea;

/// One decode call: a pixel region of one image, with decimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    pub location: String,
    pub image_index: usize,
    /// Source region in native pixels; always inside the native raster.
    pub region: RasterArea,
    /// Keep every n-th column and row.
    pub subsampling: (usize, usize),
}

/// Raw pixels produced by a decoder.
#[derive(Debug, Clone)]
pub struct DecodedRaster {
    pub width: usize,
    pub height: usize,
    /// Row-major data, one buffer per band.
    pub bands: Vec<Vec<f32>>,
    /// Fill value of the underlying data, if any.
    pub fill_value: Option<f32>,
}

impl DecodedRaster {
    pub fn new(width: usize, height: usize, bands: Vec<Vec<f32>>) -> CoverageResult<Self> {
        if let Some(bad) = bands.iter().find(|b| b.len() != width * height) {
            return Err(CoverageError::decode_failure(format!(
                "band holds {} values, expected {}x{}",
                bad.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            bands,
            fill_value: None,
        })
    }

    pub fn with_fill_value(mut self, fill: f32) -> Self {
        self.fill_value = if fill.is_nan() { None } else { Some(fill) };
        self
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.bands.is_empty()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }
}

/// Decodes pixel regions of catalogued images.
///
/// Handles are not assumed to support concurrent reads of one location;
/// callers serialize through [`DecodeLocks`].
#[async_trait]
pub trait RasterDecoder: Send + Sync {
    /// Decode a region of one image.
    ///
    /// Missing files or arrays are reported as `DataUnavailable`, read
    /// errors as `DecodeFailure`.
    async fn decode(&self, request: &DecodeRequest) -> CoverageResult<DecodedRaster>;

    /// Release underlying handles. Called once when the owning source is disposed.
    fn close(&self) {}
}

/// Creates the decoder owned by one coverage source.
pub trait DecoderFactory: Send + Sync {
    fn create(&self, coverage: &str) -> CoverageResult<Box<dyn RasterDecoder>>;
}

impl<F> DecoderFactory for F
where
    F: Fn(&str) -> CoverageResult<Box<dyn RasterDecoder>> + Send + Sync,
{
    fn create(&self, coverage: &str) -> CoverageResult<Box<dyn RasterDecoder>> {
        self(coverage)
    }
}

/// One async lock per file location.
#[derive(Default)]
pub struct DecodeLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DecodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive decode access to `location`.
    pub async fn acquire(&self, location: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(location.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn clear(&self) {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Keep every `step_x`-th column and `step_y`-th row, starting at the first.
pub fn subsample(
    data: &[f32],
    width: usize,
    height: usize,
    step_x: usize,
    step_y: usize,
) -> (Vec<f32>, usize, usize) {
    let step_x = step_x.max(1);
    let step_y = step_y.max(1);
    if step_x == 1 && step_y == 1 {
        return (data.to_vec(), width, height);
    }

    let out_width = width.div_ceil(step_x);
    let out_height = height.div_ceil(step_y);
    let mut out = Vec::with_capacity(out_width * out_height);
    for row in (0..height).step_by(step_y) {
        for col in (0..width).step_by(step_x) {
            out.push(data[row * width + col]);
        }
    }
    (out, out_width, out_height)
}
