//! Optimizer configuration: batching, caching, monitoring and dispatch limits.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::WorkerPoolConfig;
use crate::core::{AppResult, ProcessingType};

/// Batch size per processing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSizes {
    /// Born-digital documents.
    pub electronic: usize,
    /// Documents that need OCR.
    pub scanned: usize,
    /// Plain text and markup.
    pub text: usize,
    /// Large or structurally complex documents.
    pub complex: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            electronic: 10,
            scanned: 3,
            text: 20,
            complex: 5,
        }
    }
}

impl BatchSizes {
    /// Configured batch size for a processing type.
    #[must_use]
    pub const fn for_type(&self, processing_type: ProcessingType) -> usize {
        match processing_type {
            ProcessingType::Electronic => self.electronic,
            ProcessingType::Scanned => self.scanned,
            ProcessingType::Text => self.text,
            ProcessingType::Complex => self.complex,
        }
    }

    /// Validate that every batch size is non-zero.
    ///
    /// # Errors
    ///
    /// Names the first processing type with a zero batch size.
    pub fn validate(&self) -> Result<(), String> {
        for processing_type in ProcessingType::ALL {
            if self.for_type(processing_type) == 0 {
                return Err(format!("batch size for `{processing_type}` must be greater than 0"));
            }
        }
        Ok(())
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds.
    pub ttl_ms: u64,
    /// Maximum number of live entries.
    pub capacity: usize,
    /// Largest serialized payload accepted for caching.
    pub max_entry_bytes: usize,
    /// Interval of the background expiry sweep.
    pub prune_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60 * 60 * 1000,
            capacity: 1000,
            max_entry_bytes: 8 * 1024 * 1024,
            prune_interval_ms: 60_000,
        }
    }
}

impl CacheConfig {
    /// Entry lifetime as a [`Duration`].
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Validate cache settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_ms == 0 {
            return Err("ttl_ms must be greater than 0".into());
        }
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".into());
        }
        if self.max_entry_bytes == 0 {
            return Err("max_entry_bytes must be greater than 0".into());
        }
        if self.prune_interval_ms == 0 {
            return Err("prune_interval_ms must be greater than 0".into());
        }
        Ok(())
    }
}

/// Resource monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval of the background sampler.
    pub sample_interval_ms: u64,
    /// Number of samples kept in the rolling history.
    pub history_len: usize,
    /// Memory usage ratio above which work is throttled.
    pub memory_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 30_000,
            history_len: 100,
            memory_threshold: 0.8,
        }
    }
}

impl MonitorConfig {
    /// Validate monitor settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_interval_ms == 0 {
            return Err("sample_interval_ms must be greater than 0".into());
        }
        if self.history_len == 0 {
            return Err("history_len must be greater than 0".into());
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err("memory_threshold must be in (0, 1]".into());
        }
        Ok(())
    }
}

/// Root configuration, supplied once at optimizer construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Worker pool settings.
    pub pool: WorkerPoolConfig,
    /// Batch size per processing type.
    pub batch_sizes: BatchSizes,
    /// Result cache settings.
    pub cache: CacheConfig,
    /// Resource monitor settings.
    pub monitor: MonitorConfig,
    /// Batches allowed in flight at once, independent of worker count.
    pub max_concurrent_batches: usize,
    /// Pause between waves when memory pressure is detected.
    pub recovery_pause_ms: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            pool: WorkerPoolConfig::default(),
            batch_sizes: BatchSizes::default(),
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
            max_concurrent_batches: 4,
            recovery_pause_ms: 250,
        }
    }
}

impl OptimizerConfig {
    /// Validate every section, prefixing errors with the section name.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        self.batch_sizes
            .validate()
            .map_err(|e| format!("batch_sizes invalid: {e}"))?;
        self.cache.validate().map_err(|e| format!("cache invalid: {e}"))?;
        self.monitor
            .validate()
            .map_err(|e| format!("monitor invalid: {e}"))?;
        if self.max_concurrent_batches == 0 {
            return Err("max_concurrent_batches must be greater than 0".into());
        }
        Ok(())
    }

    /// Pause applied after pruning under memory pressure.
    #[must_use]
    pub const fn recovery_pause(&self) -> Duration {
        Duration::from_millis(self.recovery_pause_ms)
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from a JSON file and validate.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed or validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading config file {}", path.display()))
    }

    /// Build configuration from defaults overridden by `DOCPIPE_*` environment
    /// variables. A `.env` file is loaded first when present.
    ///
    /// # Errors
    ///
    /// Fails if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(workers) = env_var("DOCPIPE_WORKERS")? {
            cfg.pool.worker_count = workers;
        }
        if let Some(ttl_ms) = env_var("DOCPIPE_CACHE_TTL_MS")? {
            cfg.cache.ttl_ms = ttl_ms;
        }
        if let Some(capacity) = env_var("DOCPIPE_CACHE_CAPACITY")? {
            cfg.cache.capacity = capacity;
        }
        if let Some(threshold) = env_var("DOCPIPE_MEMORY_THRESHOLD")? {
            cfg.monitor.memory_threshold = threshold;
        }
        if let Some(ceiling) = env_var("DOCPIPE_MAX_CONCURRENT_BATCHES")? {
            cfg.max_concurrent_batches = ceiling;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn env_var<T>(key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {key}={raw}")),
        Err(_) => Ok(None),
    }
}
