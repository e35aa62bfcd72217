//! Document scheduling core: classification, batching, caching, worker
//! execution, resource monitoring and the optimizer that ties them together.

pub mod batch;
pub mod cache;
pub mod classifier;
pub mod document;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod optimizer;
pub mod worker_pool;

pub use batch::{build_batches, Batch, BatchId};
pub use cache::{CacheEntry, CacheStats, PruneReport, ResultCache};
pub use classifier::{classify, ClassifiedItem, Fingerprint, ProcessingType, SizeCategory};
pub use document::{Document, DocumentFlags, DocumentId, Level, MediaKind};
pub use error::{AppResult, OptimizerError};
pub use executor::{BatchExecutor, BatchOutput, DocumentProcessor, ProcessedDocument, Spawn, WorkerExecutor};
pub use monitor::{FixedProbe, ResourceMetrics, ResourceMonitor, SysinfoProbe, SystemProbe, SystemReading};
pub use optimizer::{
    plan_batches, DocumentOptimizer, DocumentOutcome, DocumentResult, OptimizationStatus, ProcessOutcome,
    ProcessingSummary, PERFORMANCE_HISTORY_LEN,
};
pub use worker_pool::{
    ActiveJob, JobId, PoolError, PoolStatus, ShutdownReport, TaskMetadata, WorkerPool, WorkerRecord, WorkerState,
};
