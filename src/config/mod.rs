//! Configuration models for the pool, cache, monitor and dispatch limits.

pub mod optimizer;
pub mod pool;

pub use optimizer::{BatchSizes, CacheConfig, MonitorConfig, OptimizerConfig};
pub use pool::{default_worker_count, WorkerPoolConfig};
