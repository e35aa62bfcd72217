//! # docpipe
//!
//! A resource-aware document processing optimizer.
//!
//! This library takes a heterogeneous set of documents (PDFs, scans, plain
//! text, Word files), classifies each one by processing cost, groups them into
//! batches sized for their processing type, and dispatches those batches to a
//! bounded pool of dedicated worker threads. Per-document results are cached
//! with expiry, and the dispatch rate adapts to memory pressure.
//!
//! ## Core Problem Solved
//!
//! Document extraction workloads mix very cheap and very expensive units:
//!
//! - **Uneven cost**: a 50 KB text file and a 40 MB scan must not share a batch
//! - **Memory limits**: running too many OCR batches at once exhausts RAM
//! - **Repeated work**: the same documents are often submitted again
//! - **Fragile units**: one crashing extraction must not take the run down
//!
//! ## Key Features
//!
//! - **Classification**: processing type, complexity, priority and a cache fingerprint per document
//! - **Typed batching**: bounded batches per type, dispatched highest priority first
//! - **Worker Thread Pool**: dedicated OS threads, FIFO backpressure, crash replacement
//! - **Result Cache**: TTL expiry, capacity pruning, hit/miss accounting
//! - **Resource Monitor**: rolling memory and utilization history with throttling
//! - **Partial failure**: a failed batch is reported, never fatal to the run
//!
//! ## Processing documents
//!
//! ```rust,ignore
//! use docpipe::builders::OptimizerBuilder;
//! use docpipe::core::Document;
//!
//! let optimizer = OptimizerBuilder::new(my_processor) // Implements DocumentProcessor
//!     .with_worker_count(4)
//!     .with_max_concurrent_batches(2)
//!     .build()?;
//!
//! let outcome = optimizer
//!     .process(vec![Document::new("doc-1", "report.pdf", "application/pdf", 512 * 1024)])
//!     .await;
//! println!("hit rate {:.2}", outcome.summary.cache_hit_rate);
//! optimizer.shutdown();
//! ```
//!
//! ## WorkerPool - Thread Pool for CPU-Bound Work
//!
//! The pool can also be used on its own with any [`core::WorkerExecutor`]:
//!
//! ```rust,ignore
//! use docpipe::core::{ProcessingType, WorkerPool};
//! use docpipe::config::WorkerPoolConfig;
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(4), my_executor)?;
//! let result = pool.execute(ProcessingType::Text, job).await?;
//! ```
//!
//! For complete examples, see:
//! - `tests/pipeline_test.rs` - end-to-end pipeline scenarios
//! - `tests/worker_pool_test.rs` - pool concurrency and crash isolation

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Classification, batching, caching, workers, monitoring and the optimizer.
pub mod core;
/// Configuration models for the pool, cache, monitor and optimizer.
pub mod config;
/// Builders to construct optimizer components from configuration.
pub mod builders;
/// Runtime adapters for background tasks.
pub mod runtime;
/// Shared utilities.
pub mod util;
