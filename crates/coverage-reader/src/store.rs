//! Named coverages backed by one catalog and one decoder factory.

use std::collections::BTreeMap;
use std::sync::Arc;

use coverage_common::{CoverageError, CoverageResult};
use granule_catalog::{Filter, GranuleCatalog};
use tokio::sync::RwLock;

use crate::cache::{SourceCache, SourceCacheStats};
use crate::config::{ReadParameters, ReaderConfig};
use crate::decoder::DecoderFactory;
use crate::dimension::DimensionDescriptor;
use crate::resource_info::FileGroup;
use crate::source::CoverageSource;
use crate::types::{CoverageProperties, ReadOutcome, ReadRequest};

/// Granule attribute naming the coverage in a shared catalog.
pub const COVERAGE_ATTRIBUTE: &str = "coverage";

/// Static description of a coverage.
#[derive(Debug, Clone)]
pub struct CoverageDefinition {
    pub properties: CoverageProperties,
    pub dimensions: Vec<DimensionDescriptor>,
    /// Value of [`COVERAGE_ATTRIBUTE`] selecting this coverage's granules
    /// when the catalog holds several coverages.
    pub catalog_key: Option<String>,
}

impl CoverageDefinition {
    pub fn new(properties: CoverageProperties, dimensions: Vec<DimensionDescriptor>) -> Self {
        Self {
            properties,
            dimensions,
            catalog_key: None,
        }
    }

    pub fn with_catalog_key(mut self, key: impl Into<String>) -> Self {
        self.catalog_key = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.properties.name
    }

    /// Filter selecting this coverage's granules.
    pub fn base_filter(&self) -> Filter {
        match &self.catalog_key {
            Some(key) => Filter::eq(COVERAGE_ATTRIBUTE, key.as_str()),
            None => Filter::Include,
        }
    }
}

/// Entry point for reading named coverages.
pub struct CoverageStore {
    catalog: Arc<dyn GranuleCatalog>,
    decoders: Arc<dyn DecoderFactory>,
    definitions: RwLock<BTreeMap<String, Arc<CoverageDefinition>>>,
    cache: SourceCache,
    config: Arc<ReaderConfig>,
}

impl CoverageStore {
    pub fn new(
        catalog: Arc<dyn GranuleCatalog>,
        decoders: Arc<dyn DecoderFactory>,
        config: ReaderConfig,
    ) -> CoverageResult<Self> {
        config.validate().map_err(CoverageError::validation)?;
        Ok(Self {
            catalog,
            decoders,
            definitions: RwLock::new(BTreeMap::new()),
            cache: SourceCache::new(config.source_cache_capacity),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Register a coverage. Names are unique.
    pub async fn register(&self, definition: CoverageDefinition) -> CoverageResult<()> {
        let mut definitions = self.definitions.write().await;
        let name = definition.name().to_string();
        if definitions.contains_key(&name) {
            return Err(CoverageError::validation(format!(
                "coverage {} is already registered",
                name
            )));
        }
        tracing::debug!(coverage = %name, dimensions = definition.dimensions.len(), "Registered coverage");
        definitions.insert(name, Arc::new(definition));
        Ok(())
    }

    pub async fn coverage_names(&self) -> Vec<String> {
        self.definitions.read().await.keys().cloned().collect()
    }

    /// The open source for `name`, created on first access.
    pub async fn source(&self, name: &str) -> CoverageResult<Arc<CoverageSource>> {
        let definition = self
            .definitions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CoverageError::NotFound(name.to_string()))?;

        self.cache
            .get_or_create(name, || {
                let decoder = self.decoders.create(name)?;
                Ok(CoverageSource::new(
                    &definition,
                    self.catalog.clone(),
                    decoder,
                    self.config.clone(),
                ))
            })
            .await
    }

    pub async fn read(&self, name: &str, request: &ReadRequest) -> CoverageResult<ReadOutcome> {
        self.source(name).await?.read(request).await
    }

    pub async fn read_with(
        &self,
        name: &str,
        request: &ReadRequest,
        parameters: &ReadParameters,
    ) -> CoverageResult<ReadOutcome> {
        self.source(name).await?.read_with(request, parameters).await
    }

    pub async fn file_groups(
        &self,
        name: &str,
        filter: Option<Filter>,
    ) -> CoverageResult<Vec<FileGroup>> {
        self.source(name).await?.file_groups(filter).await
    }

    /// Dispose the open source of one coverage. The definition stays.
    pub async fn dispose_coverage(&self, name: &str) -> bool {
        self.cache.evict(name).await
    }

    /// Dispose every open source.
    pub async fn dispose(&self) {
        self.cache.clear().await;
        tracing::info!("Disposed coverage store");
    }

    pub async fn cache_stats(&self) -> SourceCacheStats {
        self.cache.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodeRequest, DecodedRaster, RasterDecoder};
    use crate::types::SampleDimension;
    use async_trait::async_trait;
    use coverage_common::{BoundingBox, Crs};
    use granule_catalog::MemoryCatalog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ClosingDecoder {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RasterDecoder for ClosingDecoder {
        async fn decode(&self, _request: &DecodeRequest) -> CoverageResult<DecodedRaster> {
            Err(CoverageError::data_unavailable("no data"))
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn definition(name: &str) -> CoverageDefinition {
        let properties = CoverageProperties::from_extent(
            name,
            Crs::WGS84,
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            10,
            10,
            vec![SampleDimension::new("value")],
        )
        .unwrap();
        CoverageDefinition::new(properties, vec![])
    }

    fn store(capacity: usize, created: Arc<AtomicUsize>, closed: Arc<AtomicUsize>) -> CoverageStore {
        let factory = move |_: &str| -> CoverageResult<Box<dyn RasterDecoder>> {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ClosingDecoder {
                closed: closed.clone(),
            }))
        };
        let config = ReaderConfig {
            source_cache_capacity: capacity,
            ..Default::default()
        };
        CoverageStore::new(Arc::new(MemoryCatalog::new()), Arc::new(factory), config).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_coverage() {
        let store = store(4, Arc::default(), Arc::default());
        assert!(matches!(
            store.source("missing").await,
            Err(CoverageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let store = store(4, Arc::default(), Arc::default());
        store.register(definition("a")).await.unwrap();
        assert!(store.register(definition("a")).await.is_err());
        assert_eq!(store.coverage_names().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_single_instance_per_name() {
        let created = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(store(4, created.clone(), Arc::default()));
        store.register(definition("a")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.source("a").await.unwrap() })
            })
            .collect();
        let sources: Vec<Arc<CoverageSource>> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(sources.iter().all(|s| Arc::ptr_eq(s, &sources[0])));
        let stats = store.cache_stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 7);
    }

    #[tokio::test]
    async fn test_eviction_disposes_unused_source() {
        let closed = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let store = store(1, created.clone(), closed.clone());
        store.register(definition("a")).await.unwrap();
        store.register(definition("b")).await.unwrap();

        drop(store.source("a").await.unwrap());
        let _b = store.source("b").await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(store.cache_stats().await.evictions, 1);

        // a fresh source is opened on the next lookup
        let a = store.source("a").await.unwrap();
        assert!(!a.is_disposed());
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_evicted_source_stays_readable_while_held() {
        let closed = Arc::new(AtomicUsize::new(0));
        let store = store(1, Arc::default(), closed.clone());
        store.register(definition("a")).await.unwrap();
        store.register(definition("b")).await.unwrap();

        let held = store.source("a").await.unwrap();
        let _b = store.source("b").await.unwrap();
        assert!(!store.cache.contains("a").await);
        assert!(!held.is_disposed());
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        assert!(held.read(&ReadRequest::new()).await.is_ok());

        // the last holder releases the decoder
        drop(held);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispose_coverage_and_store() {
        let closed = Arc::new(AtomicUsize::new(0));
        let store = store(4, Arc::default(), closed.clone());
        store.register(definition("a")).await.unwrap();
        store.register(definition("b")).await.unwrap();
        let a = store.source("a").await.unwrap();
        store.source("b").await.unwrap();

        assert!(store.dispose_coverage("a").await);
        assert!(!store.dispose_coverage("a").await);
        assert!(a.is_disposed());
        a.dispose();
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        store.dispose().await;
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert_eq!(store.cache_stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_drop_releases_decoder() {
        let closed = Arc::new(AtomicUsize::new(0));
        let source = CoverageSource::new(
            &definition("a"),
            Arc::new(MemoryCatalog::new()),
            Box::new(ClosingDecoder {
                closed: closed.clone(),
            }),
            Arc::new(ReaderConfig {
                trace_undisposed_sources: true,
                ..Default::default()
            }),
        );
        drop(source);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_base_filter() {
        assert!(definition("a").base_filter().is_include());
        let keyed = definition("a").with_catalog_key("temperature");
        assert_eq!(keyed.base_filter().to_string(), "coverage = 'temperature'");
    }
}
