//! An open coverage: its geometry, dimensions and collaborators.

use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use coverage_common::{CoverageError, CoverageResult};
use granule_catalog::{Aggregate, Filter, GranuleCatalog};

use crate::assembler::RasterAssembler;
use crate::config::{ReadParameters, ReaderConfig};
use crate::decoder::{DecodeLocks, RasterDecoder};
use crate::dimension::{DimensionDescriptor, DomainKind};
use crate::planner::DimensionFilterPlanner;
use crate::resource_info::{FileGroup, ResourceInfoAggregator};
use crate::spatial::SpatialSubsetResolver;
use crate::store::CoverageDefinition;
use crate::types::{CoverageProperties, ReadOutcome, ReadRequest};

const HAS_PREFIX: &str = "HAS_";
const DOMAIN_SUFFIX: &str = "_DOMAIN";
const MINIMUM_SUFFIX: &str = "_DOMAIN_MINIMUM";
const MAXIMUM_SUFFIX: &str = "_DOMAIN_MAXIMUM";
const DATATYPE_SUFFIX: &str = "_DOMAIN_DATATYPE";

/// Parsed metadata key.
enum MetadataKey<'a> {
    Has(&'a str),
    Domain(&'a str),
    Minimum(&'a str),
    Maximum(&'a str),
    Datatype(&'a str),
}

impl<'a> MetadataKey<'a> {
    fn parse(name: &'a str) -> Option<Self> {
        if let Some(dim) = name.strip_suffix(MINIMUM_SUFFIX) {
            return Some(Self::Minimum(dim));
        }
        if let Some(dim) = name.strip_suffix(MAXIMUM_SUFFIX) {
            return Some(Self::Maximum(dim));
        }
        if let Some(dim) = name.strip_suffix(DATATYPE_SUFFIX) {
            return Some(Self::Datatype(dim));
        }
        let dim = name.strip_suffix(DOMAIN_SUFFIX)?;
        Some(match dim.strip_prefix(HAS_PREFIX) {
            Some(dim) => Self::Has(dim),
            None => Self::Domain(dim),
        })
    }
}

/// A coverage opened for reading.
///
/// Safe to share between concurrent reads. The decoder is released by
/// [`CoverageSource::dispose`] or, failing that, when the source drops.
pub struct CoverageSource {
    properties: CoverageProperties,
    dimensions: Vec<DimensionDescriptor>,
    base_filter: Filter,
    shared_catalog: bool,
    catalog: Arc<dyn GranuleCatalog>,
    decoder: Box<dyn RasterDecoder>,
    locks: DecodeLocks,
    config: Arc<ReaderConfig>,
    disposed: AtomicBool,
    /// Left the source cache while still shared; the last holder releases it.
    evicted: AtomicBool,
    created_at: Option<Backtrace>,
}

impl CoverageSource {
    pub fn new(
        definition: &CoverageDefinition,
        catalog: Arc<dyn GranuleCatalog>,
        decoder: Box<dyn RasterDecoder>,
        config: Arc<ReaderConfig>,
    ) -> Self {
        let dimensions = definition
            .dimensions
            .iter()
            .cloned()
            .map(|mut dim| {
                if let Some(policy) = config.default_policy_for(&dim.name) {
                    dim.default_policy = policy;
                }
                dim
            })
            .collect();

        let created_at = config
            .trace_undisposed_sources
            .then(Backtrace::force_capture);

        tracing::info!(
            coverage = %definition.properties.name,
            crs = %definition.properties.crs,
            "Opened coverage source"
        );

        Self {
            properties: definition.properties.clone(),
            dimensions,
            base_filter: definition.base_filter(),
            shared_catalog: definition.catalog_key.is_some(),
            catalog,
            decoder,
            locks: DecodeLocks::new(),
            config,
            disposed: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
            created_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn properties(&self) -> &CoverageProperties {
        &self.properties
    }

    pub fn dimensions(&self) -> &[DimensionDescriptor] {
        &self.dimensions
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Mark a source the cache no longer owns, so dropping it is not a leak.
    pub(crate) fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> CoverageResult<()> {
        if self.is_disposed() {
            return Err(CoverageError::unsupported(format!(
                "coverage source {} has been disposed",
                self.name()
            )));
        }
        Ok(())
    }

    /// Read with the configured defaults.
    pub async fn read(&self, request: &ReadRequest) -> CoverageResult<ReadOutcome> {
        self.read_with(request, &self.config.read_parameters()).await
    }

    /// Read with explicit per-call parameters.
    pub async fn read_with(
        &self,
        request: &ReadRequest,
        parameters: &ReadParameters,
    ) -> CoverageResult<ReadOutcome> {
        self.ensure_open()?;

        let bands = self.resolve_bands(request)?;
        let planner = DimensionFilterPlanner::new(
            &self.dimensions,
            self.base_filter.clone(),
            self.config.nearest_elevation_match,
        );
        planner.validate(request)?;
        let plan = SpatialSubsetResolver::new(&self.properties).plan_request(request)?;

        let queries = planner
            .plan(self.catalog.as_ref(), request, &plan.footprint())
            .await?;

        RasterAssembler::new(
            &self.properties,
            self.catalog.as_ref(),
            self.decoder.as_ref(),
            &self.locks,
            parameters,
        )
        .assemble(&plan, &queries, &bands)
        .await
    }

    /// Output band indices from `bands` and `range_selection`.
    fn resolve_bands(&self, request: &ReadRequest) -> CoverageResult<Vec<usize>> {
        let available = &self.properties.sample_dimensions;

        let mut bands = match &request.bands {
            Some(bands) => {
                if bands.is_empty() {
                    return Err(CoverageError::validation("band selection is empty"));
                }
                if let Some(bad) = bands.iter().find(|&&b| b >= available.len()) {
                    return Err(CoverageError::validation(format!(
                        "band {} out of range, coverage has {} bands",
                        bad,
                        available.len()
                    )));
                }
                bands.clone()
            }
            None => (0..available.len()).collect(),
        };

        if let Some(fields) = &request.range_selection {
            let mut selected = Vec::with_capacity(fields.len());
            for field in fields {
                let index = available
                    .iter()
                    .position(|d| d.name.eq_ignore_ascii_case(field))
                    .ok_or_else(|| {
                        CoverageError::validation(format!("unknown field: {}", field))
                    })?;
                selected.push(index);
            }
            if request.bands.is_some() {
                bands.retain(|b| selected.contains(b));
                if bands.is_empty() {
                    return Err(CoverageError::validation(
                        "band and field selections do not overlap",
                    ));
                }
            } else {
                bands = selected;
            }
        }

        Ok(bands)
    }

    /// File groups of this coverage, optionally narrowed by `filter`.
    pub async fn file_groups(&self, filter: Option<Filter>) -> CoverageResult<Vec<FileGroup>> {
        self.ensure_open()?;
        let filter = Filter::and([self.base_filter.clone(), filter.unwrap_or(Filter::Include)]);
        ResourceInfoAggregator::new(&self.dimensions, self.properties.crs)
            .collect(self.catalog.as_ref(), filter, self.shared_catalog)
            .await
    }

    /// Names of the domain metadata entries this coverage answers.
    pub fn metadata_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for dim in &self.dimensions {
            let prefix = dim.metadata_prefix();
            names.push(format!("{}{}{}", HAS_PREFIX, prefix, DOMAIN_SUFFIX));
            names.push(format!("{}{}", prefix, DOMAIN_SUFFIX));
            names.push(format!("{}{}", prefix, MINIMUM_SUFFIX));
            names.push(format!("{}{}", prefix, MAXIMUM_SUFFIX));
            names.push(format!("{}{}", prefix, DATATYPE_SUFFIX));
        }
        names
    }

    /// Value of a domain metadata entry, `None` for unknown names.
    pub async fn metadata_value(&self, name: &str) -> CoverageResult<Option<String>> {
        let Some(key) = MetadataKey::parse(name) else {
            return Ok(None);
        };
        let prefix = match &key {
            MetadataKey::Has(p)
            | MetadataKey::Domain(p)
            | MetadataKey::Minimum(p)
            | MetadataKey::Maximum(p)
            | MetadataKey::Datatype(p) => *p,
        };
        let Some(dim) = self.dimensions.iter().find(|d| d.metadata_prefix() == prefix) else {
            return Ok(match key {
                MetadataKey::Has(_) => Some("false".to_string()),
                _ => None,
            });
        };

        self.ensure_open()?;
        let catalog = self.catalog.as_ref();
        let value = match key {
            MetadataKey::Has(_) => Some("true".to_string()),
            MetadataKey::Datatype(_) => Some(dim.kind.value_kind().type_name().to_string()),
            MetadataKey::Domain(_) => {
                let values = catalog
                    .distinct_values(&self.base_filter, &dim.start_attribute)
                    .await?;
                Some(
                    values
                        .iter()
                        .map(|v| v.to_lexical())
                        .collect::<Vec<_>>()
                        .join(","),
                )
            }
            MetadataKey::Minimum(_) => catalog
                .aggregate(&self.base_filter, &dim.start_attribute, Aggregate::Min)
                .await?
                .map(|v| v.to_lexical()),
            MetadataKey::Maximum(_) => catalog
                .aggregate(&self.base_filter, dim.upper_attribute(), Aggregate::Max)
                .await?
                .map(|v| v.to_lexical()),
        };
        Ok(value)
    }

    /// Whether a time domain is configured.
    pub fn has_time(&self) -> bool {
        self.dimensions.iter().any(|d| d.kind == DomainKind::Time)
    }

    /// Whether a vertical domain is configured.
    pub fn has_elevation(&self) -> bool {
        self.dimensions.iter().any(|d| d.kind == DomainKind::Elevation)
    }

    /// Writing coverage data is not supported.
    pub fn write(&self, _request: &ReadRequest) -> CoverageResult<()> {
        Err(CoverageError::unsupported(format!(
            "coverage {} is read-only",
            self.name()
        )))
    }

    /// Removing coverage data is not supported.
    pub fn remove(&self) -> CoverageResult<()> {
        Err(CoverageError::unsupported(format!(
            "coverage {} cannot be removed",
            self.name()
        )))
    }

    /// Release the decoder. Idempotent; later reads fail.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.decoder.close();
        self.locks.clear();
        tracing::info!(coverage = %self.properties.name, "Disposed coverage source");
    }
}

impl Drop for CoverageSource {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        let evicted = self.evicted.load(Ordering::SeqCst);
        if let Some(backtrace) = self.created_at.as_ref().filter(|_| !evicted) {
            tracing::warn!(
                coverage = %self.properties.name,
                created_at = %backtrace,
                "Coverage source dropped without dispose"
            );
        }
        self.dispose();
    }
}
