//! Shared fixtures for the coverage-reader integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coverage_common::{BoundingBox, CoverageError, CoverageResult, Crs};
use coverage_reader::decoder::subsample;
use coverage_reader::{
    CancellationFlag, CoverageDefinition, CoverageProperties, CoverageStore, DecodeRequest,
    DecodedRaster, DimensionDescriptor, RasterDecoder, ReaderConfig, SampleDimension,
};
use granule_catalog::{Granule, GranuleCatalog, GranuleQuery, MemoryCatalog};
use test_utils::{grid_value, LAYER_OFFSET};

pub const COVERAGE: &str = "temperature";
pub const LOCATION: &str = "temperature.zarr";
pub const ELEVATIONS: [f64; 3] = [0.0, 10.0, 20.0];

/// Native extent: 1000x1000 pixels of 0.1 units.
pub fn native_bbox() -> BoundingBox {
    BoundingBox::new(0.0, 0.0, 100.0, 100.0)
}

pub fn properties(bands: &[&str]) -> CoverageProperties {
    CoverageProperties::from_extent(
        COVERAGE,
        Crs::WGS84,
        native_bbox(),
        1000,
        1000,
        bands.iter().map(|b| SampleDimension::new(*b)).collect(),
    )
    .unwrap()
}

/// One granule per elevation, image index matching the position in [`ELEVATIONS`].
pub fn elevation_granules() -> Vec<Granule> {
    ELEVATIONS
        .iter()
        .enumerate()
        .map(|(i, &e)| Granule::new(LOCATION, i, native_bbox()).with_attribute("elevation", e))
        .collect()
}

pub fn elevation_definition(bands: &[&str]) -> CoverageDefinition {
    CoverageDefinition::new(
        properties(bands),
        vec![DimensionDescriptor::elevation("elevation")],
    )
}

/// Expected value of native pixel (`col`, `row`) in `band` of `image`.
pub fn expected(image: usize, band: usize, bands: usize, col: usize, row: usize) -> f32 {
    grid_value(col, row) + (image * bands + band) as f32 * LAYER_OFFSET
}

/// Decode calls seen by a [`SyntheticDecoder`].
#[derive(Clone, Default)]
pub struct DecodeLog(Arc<Mutex<Vec<DecodeRequest>>>);

impl DecodeLog {
    pub fn calls(&self) -> Vec<DecodeRequest> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn record(&self, request: &DecodeRequest) {
        self.0.lock().unwrap().push(request.clone());
    }
}

/// Decoder producing [`expected`] values for any region.
#[derive(Clone, Default)]
pub struct SyntheticDecoder {
    bands: usize,
    failing: HashSet<String>,
    missing: HashSet<String>,
    delay: Option<Duration>,
    cancel_after_decode: Option<CancellationFlag>,
    pub log: DecodeLog,
    pub closed: Arc<AtomicBool>,
}

impl SyntheticDecoder {
    pub fn new(bands: usize) -> Self {
        Self {
            bands,
            ..Default::default()
        }
    }

    /// Fail decodes of `location` with a decode error.
    pub fn failing(mut self, location: &str) -> Self {
        self.failing.insert(location.to_string());
        self
    }

    /// Report `location` as unavailable.
    pub fn missing(mut self, location: &str) -> Self {
        self.missing.insert(location.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Trip `flag` after every successful decode.
    pub fn cancelling(mut self, flag: CancellationFlag) -> Self {
        self.cancel_after_decode = Some(flag);
        self
    }
}

#[async_trait]
impl RasterDecoder for SyntheticDecoder {
    async fn decode(&self, request: &DecodeRequest) -> CoverageResult<DecodedRaster> {
        self.log.record(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.missing.contains(&request.location) {
            return Err(CoverageError::data_unavailable(format!("{} not found", request.location)));
        }
        if self.failing.contains(&request.location) {
            return Err(CoverageError::decode_failure(format!("{} is corrupt", request.location)));
        }

        let region = request.region;
        let mut bands = Vec::with_capacity(self.bands);
        let (mut width, mut height) = (0, 0);
        for band in 0..self.bands {
            let mut data = Vec::with_capacity(region.pixel_count());
            for row in 0..region.height {
                for col in 0..region.width {
                    data.push(expected(
                        request.image_index,
                        band,
                        self.bands,
                        region.x as usize + col,
                        region.y as usize + row,
                    ));
                }
            }
            let (data, w, h) = subsample(
                &data,
                region.width,
                region.height,
                request.subsampling.0,
                request.subsampling.1,
            );
            width = w;
            height = h;
            bands.push(data);
        }

        if let Some(flag) = &self.cancel_after_decode {
            flag.cancel();
        }
        DecodedRaster::new(width, height, bands)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Catalog wrapper counting the queries it serves.
pub struct CountingCatalog {
    inner: MemoryCatalog,
    queries: AtomicUsize,
}

impl CountingCatalog {
    pub fn new(inner: MemoryCatalog) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GranuleCatalog for CountingCatalog {
    async fn query(&self, query: &GranuleQuery) -> CoverageResult<Vec<Granule>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(query).await
    }

    fn supports_sorting(&self) -> bool {
        self.inner.supports_sorting()
    }
}

/// Store over `catalog` whose sources all clone `decoder`.
pub fn store_with(
    catalog: Arc<dyn GranuleCatalog>,
    decoder: SyntheticDecoder,
    config: ReaderConfig,
) -> CoverageStore {
    let factory = move |_: &str| -> CoverageResult<Box<dyn RasterDecoder>> {
        Ok(Box::new(decoder.clone()))
    };
    CoverageStore::new(catalog, Arc::new(factory), config).unwrap()
}

/// Store holding the single-band elevation coverage.
pub async fn elevation_store(
    decoder: SyntheticDecoder,
    config: ReaderConfig,
) -> (CoverageStore, Arc<CountingCatalog>) {
    let catalog = Arc::new(CountingCatalog::new(MemoryCatalog::from_granules(
        elevation_granules(),
    )));
    let store = store_with(catalog.clone(), decoder, config);
    store
        .register(elevation_definition(&["value"]))
        .await
        .unwrap();
    (store, catalog)
}
