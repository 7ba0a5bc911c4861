//! Configuration for the coverage reader.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dimension::DefaultPolicy;
use crate::types::{Completion, InterpolationMethod};

/// Reader-wide configuration, built once per store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Maximum number of open coverage sources kept in the cache.
    pub source_cache_capacity: usize,

    /// Default interpolation method for resampling.
    pub interpolation: InterpolationMethod,

    /// Value written to pixels no granule covers.
    #[serde(default = "default_no_data", skip_serializing_if = "is_nan")]
    pub no_data: f32,

    /// Snap vertical requests that miss every level to the closest level.
    pub nearest_elevation_match: bool,

    /// Per-dimension overrides of the default-value policy.
    pub dimension_defaults: BTreeMap<String, DefaultPolicy>,

    /// Capture a backtrace when a source is created and log it if the source
    /// is dropped without being disposed.
    pub trace_undisposed_sources: bool,
}

fn default_no_data() -> f32 {
    f32::NAN
}

fn is_nan(value: &f32) -> bool {
    value.is_nan()
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            source_cache_capacity: 32,
            interpolation: InterpolationMethod::Nearest,
            no_data: f32::NAN,
            nearest_elevation_match: true,
            dimension_defaults: BTreeMap::new(),
            trace_undisposed_sources: false,
        }
    }
}

impl ReaderConfig {
    /// Defaults overridden by `COVERAGE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("COVERAGE_SOURCE_CACHE_SIZE") {
            if let Ok(size) = val.parse() {
                config.source_cache_capacity = size;
            }
        }

        if let Ok(val) = std::env::var("COVERAGE_INTERPOLATION") {
            config.interpolation = InterpolationMethod::from_str(&val);
        }

        if let Ok(val) = std::env::var("COVERAGE_NODATA") {
            if let Ok(value) = val.parse() {
                config.no_data = value;
            }
        }

        if let Ok(val) = std::env::var("COVERAGE_NEAREST_ELEVATION") {
            config.nearest_elevation_match = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("COVERAGE_DIMENSION_DEFAULTS") {
            match parse_dimension_defaults(&val) {
                Ok(defaults) => config.dimension_defaults = defaults,
                Err(e) => tracing::warn!(error = %e, "Ignoring COVERAGE_DIMENSION_DEFAULTS"),
            }
        }

        if let Ok(val) = std::env::var("COVERAGE_TRACE_LEAKS") {
            config.trace_undisposed_sources = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Reject settings no reader could run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.source_cache_capacity == 0 {
            return Err("source_cache_capacity must be > 0".to_string());
        }

        if self.no_data.is_infinite() {
            return Err("no_data must be finite or NaN".to_string());
        }

        Ok(())
    }

    /// Default policy override for a dimension, if configured.
    pub fn default_policy_for(&self, dimension: &str) -> Option<DefaultPolicy> {
        self.dimension_defaults.get(dimension).copied()
    }

    /// Per-call parameters seeded from this configuration.
    pub fn read_parameters(&self) -> ReadParameters {
        ReadParameters {
            interpolation: self.interpolation,
            no_data: self.no_data,
            deadline: None,
            cancellation: None,
        }
    }
}

/// Parse `name=policy` pairs separated by commas, e.g. `time=max,run=none`.
pub fn parse_dimension_defaults(s: &str) -> Result<BTreeMap<String, DefaultPolicy>, String> {
    let mut defaults = BTreeMap::new();
    for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, policy) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected name=policy, got '{}'", pair))?;
        let policy = DefaultPolicy::from_str(policy)
            .ok_or_else(|| format!("unknown default policy '{}'", policy.trim()))?;
        defaults.insert(name.trim().to_string(), policy);
    }
    Ok(defaults)
}

/// Cooperative cancellation shared between a caller and a running read.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Immutable per-call read parameters.
#[derive(Debug, Clone)]
pub struct ReadParameters {
    pub interpolation: InterpolationMethod,
    pub no_data: f32,
    pub deadline: Option<Instant>,
    pub cancellation: Option<CancellationFlag>,
}

impl Default for ReadParameters {
    fn default() -> Self {
        ReaderConfig::default().read_parameters()
    }
}

impl ReadParameters {
    pub fn with_interpolation(mut self, interpolation: InterpolationMethod) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_no_data(mut self, no_data: f32) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    /// `Some` when the call must stop before doing more work.
    pub fn interruption(&self) -> Option<Completion> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationFlag::is_cancelled)
        {
            return Some(Completion::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Completion::TimedOut),
            _ => None,
        }
    }
}
