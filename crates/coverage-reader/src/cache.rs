//! Bounded LRU cache of open coverage sources.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coverage_common::CoverageResult;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::source::CoverageSource;

/// Statistics about the source cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Coverage-name to source cache with at most one instance per name.
///
/// Lookup and creation happen under one lock, so concurrent callers asking
/// for the same name share a single source. A source pushed out by capacity
/// is disposed right away only when nobody else holds it; otherwise the last
/// holder releases it on drop. `evict` and `clear` always dispose.
pub struct SourceCache {
    entries: Mutex<LruCache<String, Arc<CoverageSource>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SourceCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached source for `name`, creating it with `create` on a miss.
    pub async fn get_or_create<F>(&self, name: &str, create: F) -> CoverageResult<Arc<CoverageSource>>
    where
        F: FnOnce() -> CoverageResult<CoverageSource>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(source) = entries.get(name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(source.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let source = Arc::new(create()?);
        if let Some((evicted_name, evicted)) = entries.push(name.to_string(), source.clone()) {
            if evicted_name != name {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                release_evicted(&evicted_name, evicted);
            }
        }
        Ok(source)
    }

    /// Remove and dispose the source for `name`. Returns whether one was cached.
    pub async fn evict(&self, name: &str) -> bool {
        let removed = self.entries.lock().await.pop(name);
        match removed {
            Some(source) => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                source.dispose();
                true
            }
            None => false,
        }
    }

    /// Dispose every cached source.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        while let Some((_, source)) = entries.pop_lru() {
            source.dispose();
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.entries.lock().await.contains(name)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn stats(&self) -> SourceCacheStats {
        SourceCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len().await,
        }
    }
}

fn release_evicted(name: &str, source: Arc<CoverageSource>) {
    match Arc::try_unwrap(source) {
        Ok(source) => {
            tracing::debug!(coverage = %name, "Evicting coverage source");
            source.dispose();
        }
        Err(shared) => {
            tracing::debug!(
                coverage = %name,
                holders = Arc::strong_count(&shared),
                "Evicting coverage source still in use"
            );
            shared.mark_evicted();
        }
    }
}
