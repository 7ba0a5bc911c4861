//! Zarr V3 slice decoder.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coverage_common::{CoverageError, CoverageResult};
use lru::LruCache;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs::storage::ReadableStorageTraits;

use super::{subsample, DecodeRequest, DecodedRaster, RasterDecoder};

/// Decodes slices from Zarr arrays laid out as `[image, row, col]` or
/// `[image, band, row, col]`.
///
/// Granule locations are array paths inside one store. Opened arrays are
/// kept in a small LRU so repeated slices of one file skip metadata reads.
pub struct ZarrSliceDecoder<S: ReadableStorageTraits + 'static> {
    store: Arc<S>,
    arrays: Mutex<LruCache<String, Arc<Array<S>>>>,
}

impl<S: ReadableStorageTraits + Send + Sync + 'static> ZarrSliceDecoder<S> {
    pub fn new(store: S, max_open_arrays: usize) -> Self {
        Self::from_arc(Arc::new(store), max_open_arrays)
    }

    pub fn from_arc(store: Arc<S>, max_open_arrays: usize) -> Self {
        let capacity = NonZeroUsize::new(max_open_arrays).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            arrays: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of arrays currently held open.
    pub fn open_arrays(&self) -> usize {
        self.arrays.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn array(&self, location: &str) -> CoverageResult<Arc<Array<S>>> {
        let path = if location.starts_with('/') {
            location.to_string()
        } else {
            format!("/{}", location)
        };

        let mut arrays = self.arrays.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(array) = arrays.get(&path) {
            return Ok(array.clone());
        }

        let array = Array::open(self.store.clone(), &path).map_err(|e| {
            CoverageError::data_unavailable(format!("cannot open array {}: {}", path, e))
        })?;
        let array = Arc::new(array);
        arrays.put(path, array.clone());
        Ok(array)
    }

    fn read_sync(&self, request: &DecodeRequest) -> CoverageResult<DecodedRaster> {
        let array = self.array(&request.location)?;
        let shape = array.shape().to_vec();

        let (images, bands, rows, cols) = match shape.as_slice() {
            [images, rows, cols] => (*images, 1, *rows, *cols),
            [images, bands, rows, cols] => (*images, *bands, *rows, *cols),
            _ => {
                return Err(CoverageError::decode_failure(format!(
                    "{}: expected a 3D or 4D array, got shape {:?}",
                    request.location, shape
                )))
            }
        };

        if request.image_index as u64 >= images {
            return Err(CoverageError::decode_failure(format!(
                "{}: image {} out of range ({} images)",
                request.location, request.image_index, images
            )));
        }

        let region = request.region;
        if region.is_empty()
            || region.x < 0
            || region.y < 0
            || region.max_x() as u64 > cols
            || region.max_y() as u64 > rows
        {
            return Err(CoverageError::decode_failure(format!(
                "{}: region {:?} outside {}x{} raster",
                request.location, region, cols, rows
            )));
        }

        let fill_value = array
            .fill_value()
            .as_ne_bytes()
            .try_into()
            .map(f32::from_ne_bytes)
            .unwrap_or(f32::NAN);

        let mut decoded = Vec::with_capacity(bands as usize);
        let (mut out_width, mut out_height) = (0, 0);
        for band in 0..bands {
            let (start, extent) = if shape.len() == 3 {
                (
                    vec![request.image_index as u64, region.y as u64, region.x as u64],
                    vec![1, region.height as u64, region.width as u64],
                )
            } else {
                (
                    vec![request.image_index as u64, band, region.y as u64, region.x as u64],
                    vec![1, 1, region.height as u64, region.width as u64],
                )
            };

            let subset = ArraySubset::new_with_start_shape(start, extent)
                .map_err(|e| CoverageError::decode_failure(e.to_string()))?;
            let data: Vec<f32> = array
                .retrieve_array_subset_elements(&subset)
                .map_err(|e| {
                    CoverageError::decode_failure(format!("{}: {}", request.location, e))
                })?;

            let (data, w, h) = subsample(
                &data,
                region.width,
                region.height,
                request.subsampling.0,
                request.subsampling.1,
            );
            out_width = w;
            out_height = h;
            decoded.push(data);
        }

        Ok(DecodedRaster::new(out_width, out_height, decoded)?.with_fill_value(fill_value))
    }
}

#[async_trait]
impl<S: ReadableStorageTraits + Send + Sync + 'static> RasterDecoder for ZarrSliceDecoder<S> {
    async fn decode(&self, request: &DecodeRequest) -> CoverageResult<DecodedRaster> {
        let raster = self.read_sync(request)?;
        tracing::trace!(
            location = %request.location,
            image = request.image_index,
            width = raster.width,
            height = raster.height,
            "Decoded zarr slice"
        );
        Ok(raster)
    }

    fn close(&self) {
        self.arrays.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
