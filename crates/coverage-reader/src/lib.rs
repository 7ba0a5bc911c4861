//! Request-to-raster subsetting for multidimensional gridded coverages
//!
//! A coverage is a stack of 2D slices ("granules") indexed by a
//! [`granule_catalog::GranuleCatalog`]. Each granule is one image inside a
//! backing file and carries its footprint plus its time, elevation and
//! custom dimension values. Reading a coverage turns a request (bbox,
//! output size, dimension subsets, bands) into one raster per matching
//! time/elevation combination.
//!
//! # Architecture
//!
//! ```text
//! CoverageStore::read(name, request)
//!      │
//!      ├─► SourceCache: one CoverageSource per coverage name
//!      │
//!      ├─► SpatialSubsetResolver: crop bbox, output raster, decimation
//!      │
//!      ├─► DimensionFilterPlanner: resolve defaults and nearest elevations,
//!      │         one SliceQuery per time × elevation combination
//!      │
//!      └─► RasterAssembler, per slice query:
//!               │
//!               ├─► catalog.query(filter)
//!               ├─► RasterDecoder::decode(region, subsampling)
//!               ├─► AffineTransformComposer: decoded grid → output grid
//!               └─► warp_band into the slice canvas
//!                        │
//!                        ▼
//!                   ReadOutcome { slices, completion }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use coverage_reader::{CoverageDefinition, CoverageStore, ReadRequest, ReaderConfig};
//!
//! let store = CoverageStore::new(catalog, decoders, ReaderConfig::from_env())?;
//! store.register(CoverageDefinition::new(properties, dimensions)).await?;
//!
//! let request = ReadRequest::new()
//!     .with_bbox(BoundingBox::new(-100.0, 30.0, -90.0, 40.0))
//!     .with_raster_area(256, 256)
//!     .at_elevation(850.0);
//! let outcome = store.read("temperature", &request).await?;
//! for slice in outcome.slices {
//!     // ...
//! }
//! ```

pub mod affine;
pub mod assembler;
pub mod cache;
pub mod compose;
pub mod config;
pub mod decoder;
pub mod dimension;
pub mod planner;
pub mod resample;
pub mod resource_info;
pub mod source;
pub mod spatial;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use affine::AffineTransform;
pub use cache::{SourceCache, SourceCacheStats};
pub use config::{CancellationFlag, ReadParameters, ReaderConfig};
pub use decoder::{
    DecodeLocks, DecodeRequest, DecodedRaster, DecoderFactory, RasterDecoder, ZarrSliceDecoder,
};
pub use dimension::{DefaultPolicy, DimensionDescriptor, DomainKind, DomainSubset};
pub use planner::{DimensionFilterPlanner, SliceQuery};
pub use resample::{bilinear_interpolate, cubic_interpolate, nearest_interpolate};
pub use resource_info::{DimensionExtent, FileGroup};
pub use source::CoverageSource;
pub use spatial::{SpatialPlan, SpatialSubsetResolver};
pub use store::{CoverageDefinition, CoverageStore, COVERAGE_ATTRIBUTE};
pub use types::{
    Completion, CoverageProperties, InterpolationMethod, RasterArea, RasterResult, ReadOutcome,
    ReadRequest, SampleDimension, SliceResult,
};
