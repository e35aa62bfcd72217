//! Error types for optimizer operations.

use thiserror::Error;

use super::batch::BatchId;
use super::worker_pool::PoolError;

/// Errors produced by optimizer components.
///
/// Only [`OptimizerError::InvalidConfig`] escapes construction; the other
/// variants are contained per document or per batch and reported in the run
/// summary.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Worker pool failure (crash, shutdown, queueing).
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
    /// A result could not be stored in the cache.
    #[error("cache write failed: {0}")]
    CacheWrite(String),
    /// A batch's dispatch returned an error.
    #[error("batch {batch_id} failed: {reason}")]
    BatchFailed {
        /// Failed batch.
        batch_id: BatchId,
        /// Failure description.
        reason: String,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
