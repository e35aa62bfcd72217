//! Builder assembling a [`DocumentOptimizer`] from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BatchSizes, OptimizerConfig};
use crate::core::{AppResult, DocumentOptimizer, DocumentProcessor, OptimizerError, SystemProbe};

/// Fluent construction of a [`DocumentOptimizer`].
///
/// ```rust,ignore
/// let optimizer = OptimizerBuilder::new(MyProcessor)
///     .with_worker_count(4)
///     .with_max_concurrent_batches(2)
///     .build()?;
/// ```
pub struct OptimizerBuilder<D> {
    processor: D,
    config: OptimizerConfig,
    probe: Option<Arc<dyn SystemProbe>>,
}

impl<D: DocumentProcessor> OptimizerBuilder<D> {
    /// Start from default configuration.
    pub fn new(processor: D) -> Self {
        Self {
            processor,
            config: OptimizerConfig::default(),
            probe: None,
        }
    }

    /// Start from configuration loaded with [`OptimizerConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Fails if an environment override cannot be parsed or is invalid.
    pub fn from_env(processor: D) -> AppResult<Self> {
        Ok(Self::new(processor).with_config(OptimizerConfig::from_env()?))
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of workers.
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.config.pool.worker_count = count;
        self
    }

    /// Set the batch sizes per processing type.
    #[must_use]
    pub fn with_batch_sizes(mut self, sizes: BatchSizes) -> Self {
        self.config.batch_sizes = sizes;
        self
    }

    /// Set the cache entry lifetime.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the cache capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache.capacity = capacity;
        self
    }

    /// Set the memory ratio above which work is throttled.
    #[must_use]
    pub fn with_memory_threshold(mut self, threshold: f64) -> Self {
        self.config.monitor.memory_threshold = threshold;
        self
    }

    /// Set how many batches may be in flight at once.
    #[must_use]
    pub fn with_max_concurrent_batches(mut self, ceiling: usize) -> Self {
        self.config.max_concurrent_batches = ceiling;
        self
    }

    /// Sample resources through `probe` instead of `sysinfo`.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// The configuration accumulated so far.
    #[must_use]
    pub const fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Validate configuration and start the optimizer.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::InvalidConfig` if validation fails, or
    /// `OptimizerError::Pool` if workers cannot be started.
    pub fn build(self) -> Result<DocumentOptimizer<D>, OptimizerError> {
        match self.probe {
            Some(probe) => DocumentOptimizer::with_probe(self.config, self.processor, probe),
            None => DocumentOptimizer::new(self.config, self.processor),
        }
    }
}
