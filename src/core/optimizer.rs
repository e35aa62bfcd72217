//! Document optimizer: runs the classify → cache → batch → dispatch → merge
//! pipeline and keeps a rolling history of run summaries.
//!
//! # Example
//!
//! ```rust,ignore
//! use docpipe::config::OptimizerConfig;
//! use docpipe::core::DocumentOptimizer;
//!
//! let optimizer = DocumentOptimizer::new(OptimizerConfig::default(), MyProcessor)?;
//! let outcome = optimizer.process(documents).await;
//! println!("{} processed, {} failed", outcome.summary.documents_processed, outcome.summary.documents_failed);
//! optimizer.shutdown();
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::batch::{build_batches, Batch, BatchId};
use super::cache::{ratio, CacheStats, ResultCache};
use super::classifier::{classify, ClassifiedItem, Fingerprint, ProcessingType};
use super::document::{Document, DocumentId};
use super::error::OptimizerError;
use super::executor::{BatchExecutor, BatchOutput, DocumentProcessor, Spawn};
use super::monitor::{ResourceMetrics, ResourceMonitor, SystemProbe};
use super::worker_pool::{PoolError, PoolStatus, ShutdownReport, WorkerPool};
use crate::config::OptimizerConfig;

/// Run summaries kept for [`DocumentOptimizer::performance_history`].
pub const PERFORMANCE_HISTORY_LEN: usize = 100;

/// How a document's result was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DocumentResult {
    /// Served from the result cache.
    Cached {
        /// Cached payload.
        payload: Value,
    },
    /// Computed by a worker in this run.
    Processed {
        /// Fresh payload.
        payload: Value,
    },
    /// No result; the batch failed, omitted the document, or its id was a duplicate.
    Failed {
        /// Failure description.
        error: String,
    },
}

/// Result for a single submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// Submitted document id.
    pub document_id: DocumentId,
    /// Processing path chosen by the classifier.
    pub processing_type: ProcessingType,
    /// Result or failure.
    pub result: DocumentResult,
}

impl DocumentOutcome {
    /// True for cached and processed results.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.result, DocumentResult::Failed { .. })
    }

    /// The payload, if there is one.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        match &self.result {
            DocumentResult::Cached { payload } | DocumentResult::Processed { payload } => Some(payload),
            DocumentResult::Failed { .. } => None,
        }
    }
}

/// Aggregate figures for one [`DocumentOptimizer::process`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    /// Run identifier.
    pub run_id: Uuid,
    /// Documents passed in.
    pub documents_submitted: usize,
    /// Documents with a result (cache hits included).
    pub documents_processed: usize,
    /// Documents without a result.
    pub documents_failed: usize,
    /// Cache hits in this run.
    pub cache_hits: usize,
    /// Cache misses in this run.
    pub cache_misses: usize,
    /// `hits / submitted` for this run, 0 for an empty run.
    pub cache_hit_rate: f64,
    /// Batches dispatched.
    pub total_batches: usize,
    /// Batches that returned a result.
    pub successful_batches: usize,
    /// Batches that failed.
    pub failed_batches: usize,
    /// Wall time of the run.
    pub total_time_ms: u64,
    /// `successful / dispatched` batches, 1.0 when nothing was dispatched.
    pub worker_efficiency: f64,
    /// `1 - mean sampled memory ratio`.
    pub memory_efficiency: f64,
    /// Concurrent-batch ceiling at the end of the run.
    pub final_concurrency: usize,
    /// Results that could not be cached.
    pub cache_write_failures: usize,
    /// Classification fallbacks and resource-exhaustion notices.
    pub warnings: Vec<String>,
}

/// Output of [`DocumentOptimizer::process`]. Result order is unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// One entry per submitted document.
    pub results: Vec<DocumentOutcome>,
    /// Run summary.
    pub summary: ProcessingSummary,
}

/// Observability snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    /// Worker pool status.
    pub pool: PoolStatus,
    /// Cache statistics (cumulative).
    pub cache: CacheStats,
    /// Latest resource sample.
    pub latest_metrics: Option<ResourceMetrics>,
    /// Rolling resource history, oldest first.
    pub resource_history: Vec<ResourceMetrics>,
    /// Recent run summaries, oldest first.
    pub performance_history: Vec<ProcessingSummary>,
}

/// Identity of a dispatched batch's items, kept while the batch is on a worker.
struct BatchTicket {
    batch_id: BatchId,
    processing_type: ProcessingType,
    items: Vec<(DocumentId, Fingerprint)>,
}

impl BatchTicket {
    fn of(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id,
            processing_type: batch.processing_type,
            items: batch
                .items
                .iter()
                .map(|item| (item.id().clone(), item.fingerprint.clone()))
                .collect(),
        }
    }
}

#[derive(Default)]
struct RunTally {
    processed: usize,
    failed: usize,
    successful_batches: usize,
    failed_batches: usize,
    cache_write_failures: usize,
    memory_samples: Vec<f64>,
    warnings: Vec<String>,
}

/// Facade over classifier, batch builder, cache, worker pool and monitor.
pub struct DocumentOptimizer<D: DocumentProcessor> {
    config: OptimizerConfig,
    pool: Arc<WorkerPool<Batch, BatchOutput, BatchExecutor<D>>>,
    cache: Arc<ResultCache>,
    monitor: Arc<ResourceMonitor>,
    performance: RwLock<VecDeque<ProcessingSummary>>,
    stop: watch::Sender<bool>,
}

impl<D: DocumentProcessor> DocumentOptimizer<D> {
    /// Build an optimizer that samples the host with `sysinfo`.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::InvalidConfig` for an invalid configuration
    /// and `OptimizerError::Pool` if the workers cannot be started.
    pub fn new(config: OptimizerConfig, processor: D) -> Result<Self, OptimizerError> {
        config.validate().map_err(OptimizerError::InvalidConfig)?;
        let monitor = ResourceMonitor::new(config.monitor.clone());
        Self::assemble(config, processor, monitor)
    }

    /// Build an optimizer with a custom resource probe.
    ///
    /// # Errors
    ///
    /// Same as [`DocumentOptimizer::new`].
    pub fn with_probe(
        config: OptimizerConfig,
        processor: D,
        probe: Arc<dyn SystemProbe>,
    ) -> Result<Self, OptimizerError> {
        config.validate().map_err(OptimizerError::InvalidConfig)?;
        let monitor = ResourceMonitor::with_probe(config.monitor.clone(), probe);
        Self::assemble(config, processor, monitor)
    }

    fn assemble(config: OptimizerConfig, processor: D, monitor: ResourceMonitor) -> Result<Self, OptimizerError> {
        let pool = WorkerPool::new(config.pool.clone(), BatchExecutor::new(processor))?;
        let cache = ResultCache::new(config.cache.clone());
        let (stop, _) = watch::channel(false);
        info!(
            workers = config.pool.worker_count,
            max_concurrent_batches = config.max_concurrent_batches,
            cache_capacity = config.cache.capacity,
            "document optimizer ready"
        );
        Ok(Self {
            config,
            pool: Arc::new(pool),
            cache: Arc::new(cache),
            monitor: Arc::new(monitor),
            performance: RwLock::new(VecDeque::with_capacity(PERFORMANCE_HISTORY_LEN)),
            stop,
        })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// The result cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// The resource monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    /// Worker pool status.
    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Run the pipeline over `documents`.
    ///
    /// Always returns one outcome per document. Failures local to a document
    /// or batch show up as `DocumentResult::Failed` and in the summary.
    pub async fn process(&self, documents: Vec<Document>) -> ProcessOutcome {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let submitted = documents.len();
        let mut tally = RunTally::default();
        let mut results = Vec::with_capacity(submitted);
        let mut misses = Vec::new();
        let mut seen: HashSet<DocumentId> = HashSet::with_capacity(submitted);

        for document in documents {
            let item = classify(document);
            if !seen.insert(item.id().clone()) {
                Self::reject_duplicate(&item, &mut tally, &mut results);
                continue;
            }
            if let Some(warning) = &item.warning {
                tally.warnings.push(warning.clone());
            }
            match self.cache.get(&item.fingerprint) {
                Some(entry) => results.push(DocumentOutcome {
                    document_id: item.id().clone(),
                    processing_type: item.processing_type,
                    result: DocumentResult::Cached { payload: entry.payload },
                }),
                None => misses.push(item),
            }
        }
        let cache_hits = results
            .iter()
            .filter(|outcome| matches!(outcome.result, DocumentResult::Cached { .. }))
            .count();
        let cache_misses = misses.len();

        let mut pending: VecDeque<Batch> = build_batches(misses, &self.config.batch_sizes).into();
        let total_batches = pending.len();
        let mut ceiling = self.config.max_concurrent_batches;
        debug!(run_id = %run_id, cache_hits, cache_misses, total_batches, "dispatching batches");

        while !pending.is_empty() {
            let wave: Vec<Batch> = pending.drain(..ceiling.min(pending.len())).collect();
            let outcomes = join_all(wave.into_iter().map(|batch| self.dispatch(batch))).await;
            for (ticket, outcome) in outcomes {
                self.record(ticket, outcome, &mut tally, &mut results);
            }

            let metrics = self.monitor.sample(self.pool.status().utilization);
            tally.memory_samples.push(metrics.memory_ratio());
            if !pending.is_empty() && self.monitor.exceeds_threshold(&metrics) {
                ceiling = self.relieve_pressure(ceiling, &mut tally).await;
            }
        }

        if tally.memory_samples.is_empty() {
            let metrics = self.monitor.sample(self.pool.status().utilization);
            tally.memory_samples.push(metrics.memory_ratio());
        }

        let summary = self.summarize(run_id, submitted, cache_hits, cache_misses, total_batches, ceiling, started, tally);
        info!(
            run_id = %summary.run_id,
            documents_processed = summary.documents_processed,
            documents_failed = summary.documents_failed,
            successful_batches = summary.successful_batches,
            failed_batches = summary.failed_batches,
            cache_hit_rate = summary.cache_hit_rate,
            total_time_ms = summary.total_time_ms,
            "processing run complete"
        );

        let mut history = self.performance.write();
        history.push_back(summary.clone());
        while history.len() > PERFORMANCE_HISTORY_LEN {
            history.pop_front();
        }
        drop(history);

        ProcessOutcome { results, summary }
    }

    async fn dispatch(&self, batch: Batch) -> (BatchTicket, Result<BatchOutput, PoolError>) {
        let ticket = BatchTicket::of(&batch);
        let outcome = self.pool.execute(batch.processing_type, batch).await;
        (ticket, outcome)
    }

    fn record(
        &self,
        ticket: BatchTicket,
        outcome: Result<BatchOutput, PoolError>,
        tally: &mut RunTally,
        results: &mut Vec<DocumentOutcome>,
    ) {
        let documents = match outcome {
            Ok(Ok(documents)) => documents,
            Ok(Err(reason)) => return Self::fail_batch(ticket, reason, tally, results),
            Err(err) => return Self::fail_batch(ticket, OptimizerError::Pool(err).to_string(), tally, results),
        };

        tally.successful_batches += 1;
        let mut payloads: HashMap<DocumentId, Value> = documents
            .into_iter()
            .map(|doc| (doc.document_id, doc.payload))
            .collect();

        for (document_id, fingerprint) in ticket.items {
            let result = match payloads.remove(&document_id) {
                Some(payload) => {
                    if let Err(err) = self.cache.put(fingerprint, payload.clone()) {
                        warn!(document_id = %document_id, error = %err, "result not cached");
                        tally.cache_write_failures += 1;
                    }
                    tally.processed += 1;
                    DocumentResult::Processed { payload }
                }
                None => {
                    tally.failed += 1;
                    DocumentResult::Failed {
                        error: format!("document missing from output of batch {}", ticket.batch_id),
                    }
                }
            };
            results.push(DocumentOutcome {
                document_id,
                processing_type: ticket.processing_type,
                result,
            });
        }
    }

    /// Results are matched to items by id, so only the first document with a
    /// given id is processed in a run.
    fn reject_duplicate(item: &ClassifiedItem, tally: &mut RunTally, results: &mut Vec<DocumentOutcome>) {
        warn!(document_id = %item.id(), "duplicate document id in submission");
        tally.failed += 1;
        tally
            .warnings
            .push(format!("duplicate document id `{}` skipped", item.id()));
        results.push(DocumentOutcome {
            document_id: item.id().clone(),
            processing_type: item.processing_type,
            result: DocumentResult::Failed {
                error: format!("duplicate document id `{}` in submission", item.id()),
            },
        });
    }

    fn fail_batch(ticket: BatchTicket, reason: String, tally: &mut RunTally, results: &mut Vec<DocumentOutcome>) {
        let error = OptimizerError::BatchFailed {
            batch_id: ticket.batch_id,
            reason,
        }
        .to_string();
        warn!(
            batch_id = %ticket.batch_id,
            processing_type = %ticket.processing_type,
            items = ticket.items.len(),
            error = %error,
            "batch failed"
        );
        tally.failed_batches += 1;
        tally.failed += ticket.items.len();
        results.extend(ticket.items.into_iter().map(|(document_id, _)| DocumentOutcome {
            document_id,
            processing_type: ticket.processing_type,
            result: DocumentResult::Failed { error: error.clone() },
        }));
    }

    /// Prune and pause, then halve the ceiling if memory is still high.
    async fn relieve_pressure(&self, ceiling: usize, tally: &mut RunTally) -> usize {
        let pruned = self.cache.prune();
        info!(
            expired = pruned.expired,
            evicted = pruned.evicted,
            pause_ms = self.config.recovery_pause_ms,
            "memory pressure between waves; pruned cache"
        );
        tokio::time::sleep(self.config.recovery_pause()).await;

        let metrics = self.monitor.sample(self.pool.status().utilization);
        tally.memory_samples.push(metrics.memory_ratio());
        if !self.monitor.exceeds_threshold(&metrics) {
            return ceiling;
        }

        let reduced = (ceiling / 2).max(1);
        warn!(
            memory_ratio = metrics.memory_ratio(),
            from = ceiling,
            to = reduced,
            "memory still above threshold after pruning; reducing concurrent batches"
        );
        tally.warnings.push(format!(
            "resource exhaustion: memory at {:.0}% after pruning, concurrent batches reduced from {ceiling} to {reduced}",
            metrics.memory_ratio() * 100.0
        ));
        reduced
    }

    #[allow(clippy::too_many_arguments)]
    fn summarize(
        &self,
        run_id: Uuid,
        submitted: usize,
        cache_hits: usize,
        cache_misses: usize,
        total_batches: usize,
        ceiling: usize,
        started: Instant,
        tally: RunTally,
    ) -> ProcessingSummary {
        let dispatched = tally.successful_batches + tally.failed_batches;
        let worker_efficiency = if dispatched == 0 {
            1.0
        } else {
            ratio(tally.successful_batches as u64, dispatched as u64)
        };
        #[allow(clippy::cast_precision_loss)]
        let mean_memory = if tally.memory_samples.is_empty() {
            0.0
        } else {
            tally.memory_samples.iter().sum::<f64>() / tally.memory_samples.len() as f64
        };

        ProcessingSummary {
            run_id,
            documents_submitted: submitted,
            documents_processed: cache_hits + tally.processed,
            documents_failed: tally.failed,
            cache_hits,
            cache_misses,
            cache_hit_rate: ratio(cache_hits as u64, submitted as u64),
            total_batches,
            successful_batches: tally.successful_batches,
            failed_batches: tally.failed_batches,
            total_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            worker_efficiency,
            memory_efficiency: (1.0 - mean_memory).clamp(0.0, 1.0),
            final_concurrency: ceiling,
            cache_write_failures: tally.cache_write_failures,
            warnings: tally.warnings,
        }
    }

    /// Recent run summaries, oldest first.
    #[must_use]
    pub fn performance_history(&self) -> Vec<ProcessingSummary> {
        self.performance.read().iter().cloned().collect()
    }

    /// Snapshot for dashboards.
    #[must_use]
    pub fn optimization_status(&self) -> OptimizationStatus {
        OptimizationStatus {
            pool: self.pool.status(),
            cache: self.cache.stats(),
            latest_metrics: self.monitor.latest(),
            resource_history: self.monitor.history(),
            performance_history: self.performance_history(),
        }
    }

    /// Start the background cache pruner and resource sampler. Both stop on
    /// [`DocumentOptimizer::shutdown`].
    pub fn start_background<S: Spawn>(&self, spawner: &S) {
        self.cache.spawn_pruner(spawner, self.stop.subscribe());
        let pool = Arc::clone(&self.pool);
        self.monitor
            .spawn_sampler(spawner, move || pool.status().utilization, self.stop.subscribe());
        debug!("background pruner and sampler started");
    }

    /// Stop background tasks and shut the worker pool down using the
    /// configured timeout.
    ///
    /// Blocks the calling thread for up to `pool.shutdown_timeout_ms` while
    /// workers are joined. From async code use
    /// [`DocumentOptimizer::shutdown_async`].
    pub fn shutdown(&self) -> ShutdownReport {
        self.stop.send_replace(true);
        self.pool.shutdown(self.config.pool.shutdown_timeout())
    }

    /// Same as [`DocumentOptimizer::shutdown`], with the worker joins moved
    /// to tokio's blocking pool.
    pub async fn shutdown_async(&self) -> ShutdownReport {
        self.stop.send_replace(true);
        let pool = Arc::clone(&self.pool);
        let timeout = self.config.pool.shutdown_timeout();
        match tokio::task::spawn_blocking(move || pool.shutdown(timeout)).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "pool shutdown task failed");
                ShutdownReport::default()
            }
        }
    }
}

impl<D: DocumentProcessor> std::fmt::Debug for DocumentOptimizer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentOptimizer")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

/// Classify and batch documents without dispatching them.
#[must_use]
pub fn plan_batches(documents: Vec<Document>, config: &OptimizerConfig) -> Vec<Batch> {
    let items: Vec<ClassifiedItem> = documents.into_iter().map(classify).collect();
    build_batches(items, &config.batch_sizes)
}
