//! Task execution traits and runtime spawning abstraction.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::batch::Batch;
use super::classifier::{ClassifiedItem, ProcessingType};
use super::document::DocumentId;
use super::worker_pool::TaskMetadata;

/// Executor trait for worker pools.
///
/// Result types carry no serialization requirement. A panic inside
/// `execute` is treated as a worker crash: the task fails and the worker is
/// replaced.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use docpipe::core::{TaskMetadata, WorkerExecutor};
///
/// #[derive(Clone)]
/// struct Doubler;
///
/// #[async_trait]
/// impl WorkerExecutor<u64, u64> for Doubler {
///     async fn execute(&self, payload: u64, _meta: TaskMetadata) -> u64 {
///         payload * 2
///     }
/// }
/// ```
#[async_trait]
pub trait WorkerExecutor<P, R>: Send + Sync + Clone + 'static
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Execute a task payload and return the result.
    ///
    /// # Threading
    ///
    /// Called from a dedicated worker thread with its own single-threaded
    /// tokio runtime, so blocking work does not stall the caller's runtime.
    async fn execute(&self, payload: P, meta: TaskMetadata) -> R;
}

/// Result payload for one document produced by a [`DocumentProcessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    /// Document the payload belongs to.
    pub document_id: DocumentId,
    /// Opaque result, e.g. extracted text or analysis output.
    pub payload: Value,
}

impl ProcessedDocument {
    /// Pair a payload with its document.
    pub fn new(document_id: impl Into<DocumentId>, payload: Value) -> Self {
        Self {
            document_id: document_id.into(),
            payload,
        }
    }
}

/// Outcome of one batch as returned by a worker.
pub type BatchOutput = Result<Vec<ProcessedDocument>, String>;

/// The opaque unit of document work (extraction, OCR, analysis).
///
/// Returning `Err` fails the whole batch. Documents missing from an `Ok`
/// result are reported as individual failures.
#[async_trait]
pub trait DocumentProcessor: Send + Sync + Clone + 'static {
    /// Process a batch of same-type documents.
    async fn process_batch(&self, processing_type: ProcessingType, items: &[ClassifiedItem]) -> BatchOutput;
}

/// Adapts a [`DocumentProcessor`] to the worker pool's executor interface.
#[derive(Debug, Clone)]
pub struct BatchExecutor<D> {
    processor: D,
}

impl<D: DocumentProcessor> BatchExecutor<D> {
    /// Wrap a processor.
    pub const fn new(processor: D) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl<D: DocumentProcessor> WorkerExecutor<Batch, BatchOutput> for BatchExecutor<D> {
    async fn execute(&self, batch: Batch, meta: TaskMetadata) -> BatchOutput {
        tracing::debug!(
            job_id = %meta.id,
            batch_id = %batch.id,
            processing_type = %batch.processing_type,
            items = batch.len(),
            "processing batch"
        );
        self.processor.process_batch(batch.processing_type, &batch.items).await
    }
}

/// Abstraction for spawning background work on a runtime.
pub trait Spawn {
    /// Spawn an async task.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
