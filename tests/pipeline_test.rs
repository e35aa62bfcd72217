//! End-to-end tests for the document optimizer
//!
//! Scenarios covered:
//! - Mixed document sets batched by type and fully processed
//! - Cache reuse across runs
//! - Partial failure (failed, crashed and incomplete batches)
//! - Degradation under sustained memory pressure
//! - Background pruner and sampler lifecycle

use async_trait::async_trait;
use docpipe::builders::OptimizerBuilder;
use docpipe::config::{BatchSizes, OptimizerConfig};
use docpipe::core::{
    BatchOutput, ClassifiedItem, Document, DocumentOptimizer, DocumentProcessor, DocumentResult, FixedProbe,
    ProcessedDocument, ProcessingType,
};
use docpipe::runtime::TokioSpawner;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

// ============================================================================
// TEST PROCESSOR
// ============================================================================

/// Returns `{"id", "type"}` per item. Ids drive failure injection:
/// `bad-*` fails the batch, `boom-*` panics, `skip-*` is left out of the output.
#[derive(Clone, Default)]
struct Extractor {
    batches: Arc<AtomicUsize>,
    items: Arc<AtomicUsize>,
}

#[async_trait]
impl DocumentProcessor for Extractor {
    async fn process_batch(&self, processing_type: ProcessingType, items: &[ClassifiedItem]) -> BatchOutput {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.items.fetch_add(items.len(), Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;

        if items.iter().any(|i| i.id().starts_with("boom")) {
            panic!("extractor crashed");
        }
        if items.iter().any(|i| i.id().starts_with("bad")) {
            return Err("unsupported encoding".to_string());
        }
        Ok(items
            .iter()
            .filter(|i| !i.id().starts_with("skip"))
            .map(|i| ProcessedDocument::new(i.id().clone(), json!({ "id": i.id(), "type": processing_type })))
            .collect())
    }
}

fn config(workers: usize) -> OptimizerConfig {
    let mut config = OptimizerConfig::default();
    config.pool = config.pool.with_worker_count(workers);
    config.recovery_pause_ms = 1;
    config
}

fn optimizer_with(config: OptimizerConfig, memory_used: u64) -> (DocumentOptimizer<Extractor>, Extractor) {
    let extractor = Extractor::default();
    let optimizer = OptimizerBuilder::new(extractor.clone())
        .with_config(config)
        .with_probe(Arc::new(FixedProbe::new(memory_used, 10 * GB)))
        .build()
        .expect("optimizer should start");
    (optimizer, extractor)
}

fn electronic(prefix: &str, n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| Document::new(format!("{prefix}-pdf-{i}"), "contract.pdf", "application/pdf", 500 * KB))
        .collect()
}

fn text(prefix: &str, n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| Document::new(format!("{prefix}-txt-{i}"), "notes.txt", "text/plain", 50 * KB))
        .collect()
}

fn scanned(prefix: &str, n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| Document::new(format!("{prefix}-scan-{i}"), "scan.pdf", "application/pdf", 2 * MB).requiring_ocr())
        .collect()
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_set_of_23_documents() {
    let (optimizer, extractor) = optimizer_with(config(4), GB);
    let mut documents = electronic("ok", 10);
    documents.extend(text("ok", 8));
    documents.extend(scanned("ok", 5));

    let outcome = optimizer.process(documents).await;
    let summary = &outcome.summary;

    assert_eq!(summary.documents_submitted, 23);
    assert_eq!(summary.documents_processed, 23);
    assert_eq!(summary.documents_failed, 0);
    assert_eq!(summary.total_batches, 4);
    assert_eq!(summary.successful_batches, 4);
    assert_eq!(summary.failed_batches, 0);
    assert!((summary.worker_efficiency - 1.0).abs() < f64::EPSILON);
    assert!((summary.memory_efficiency - 0.9).abs() < 1e-9);
    assert!(summary.warnings.is_empty());
    assert_eq!(extractor.batches.load(Ordering::SeqCst), 4);

    let count = |t: ProcessingType| outcome.results.iter().filter(|r| r.processing_type == t).count();
    assert_eq!(count(ProcessingType::Electronic), 10);
    assert_eq!(count(ProcessingType::Text), 8);
    assert_eq!(count(ProcessingType::Scanned), 5);

    let ids: HashSet<_> = outcome.results.iter().map(|r| r.document_id.clone()).collect();
    assert_eq!(ids.len(), 23);
    optimizer.shutdown_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_planned_batch_sizes_match_defaults() {
    let mut documents = electronic("plan", 10);
    documents.extend(text("plan", 8));
    documents.extend(scanned("plan", 5));

    let batches = docpipe::core::plan_batches(documents, &OptimizerConfig::default());
    let mut shape: Vec<(ProcessingType, usize)> = batches.iter().map(|b| (b.processing_type, b.len())).collect();
    shape.sort_by_key(|(t, len)| (t.as_str(), *len));

    assert_eq!(
        shape,
        vec![
            (ProcessingType::Electronic, 10),
            (ProcessingType::Scanned, 2),
            (ProcessingType::Scanned, 3),
            (ProcessingType::Text, 8),
        ]
    );
}

// ============================================================================
// CACHE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_run_is_served_from_cache() {
    let (optimizer, extractor) = optimizer_with(config(2), GB);
    let documents = electronic("cache", 5);

    let first = optimizer.process(documents.clone()).await;
    assert_eq!(first.summary.cache_hits, 0);
    assert_eq!(first.summary.cache_misses, 5);

    let second = optimizer.process(documents).await;
    assert!((second.summary.cache_hit_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(second.summary.cache_hits, 5);
    assert_eq!(second.summary.total_batches, 0);
    assert_eq!(second.summary.documents_processed, 5);
    assert!(second
        .results
        .iter()
        .all(|r| matches!(r.result, DocumentResult::Cached { .. })));
    assert_eq!(extractor.batches.load(Ordering::SeqCst), 1);

    let status = optimizer.optimization_status();
    assert_eq!(status.cache.hits, 5);
    assert_eq!(status.cache.entries, 5);
    assert_eq!(status.performance_history.len(), 2);
    optimizer.shutdown_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_changed_document_misses_cache() {
    let (optimizer, _extractor) = optimizer_with(config(2), GB);
    let original = Document::new("memo", "memo.txt", "text/plain", 10 * KB).with_last_modified(1_000);
    optimizer.process(vec![original.clone()]).await;

    let edited = original.with_last_modified(2_000);
    let outcome = optimizer.process(vec![edited]).await;
    assert_eq!(outcome.summary.cache_hits, 0);
    assert!(matches!(outcome.results[0].result, DocumentResult::Processed { .. }));
    optimizer.shutdown_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversized_result_is_returned_but_not_cached() {
    let mut config = config(2);
    config.cache.max_entry_bytes = 16;
    let (optimizer, _extractor) = optimizer_with(config, GB);

    let outcome = optimizer.process(text("big", 2)).await;
    assert_eq!(outcome.summary.documents_processed, 2);
    assert_eq!(outcome.summary.cache_write_failures, 2);
    assert!(outcome.results.iter().all(|r| r.payload().is_some()));
    assert!(optimizer.cache().is_empty());
    optimizer.shutdown_async().await;
}

// ============================================================================
// PARTIAL FAILURE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_batch_does_not_block_others() {
    let (optimizer, _extractor) = optimizer_with(config(4), GB);
    let mut documents = electronic("good", 4);
    documents.extend(text("bad", 3));
    documents.extend(scanned("good", 3));

    let outcome = optimizer.process(documents).await;
    let summary = &outcome.summary;

    assert_eq!(summary.total_batches, 3);
    assert_eq!(summary.successful_batches, 2);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(summary.documents_processed, 7);
    assert_eq!(summary.documents_failed, 3);
    assert!((summary.worker_efficiency - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(outcome.results.len(), 10);

    for result in &outcome.results {
        if result.document_id.starts_with("bad") {
            let DocumentResult::Failed { error } = &result.result else {
                panic!("{} should have failed", result.document_id);
            };
            assert!(error.contains("unsupported encoding"));
        } else {
            assert!(result.is_success());
        }
    }
    // Failed documents are retried on the next run.
    assert_eq!(optimizer.cache().len(), 7);
    optimizer.shutdown_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_crash_fails_only_its_batch() {
    let (optimizer, _extractor) = optimizer_with(config(3), GB);
    let mut documents = electronic("fine", 2);
    documents.extend(text("boom", 2));

    let outcome = optimizer.process(documents).await;
    assert_eq!(outcome.summary.failed_batches, 1);
    assert_eq!(outcome.summary.successful_batches, 1);
    assert_eq!(outcome.summary.documents_processed, 2);

    let crashed: Vec<_> = outcome.results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(crashed.len(), 2);
    for result in crashed {
        let DocumentResult::Failed { error } = &result.result else {
            unreachable!();
        };
        assert!(error.contains("crashed"), "{error}");
    }

    // The pool recovered and keeps serving work.
    let again = optimizer.process(text("after", 2)).await;
    assert_eq!(again.summary.documents_processed, 2);
    assert_eq!(optimizer.optimization_status().pool.worker_crashes, 1);
    optimizer.shutdown_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_documents_missing_from_output_are_failures() {
    let (optimizer, _extractor) = optimizer_with(config(2), GB);
    let mut documents = text("keep", 2);
    documents.extend(text("skip", 1));

    let outcome = optimizer.process(documents).await;
    assert_eq!(outcome.summary.successful_batches, 1);
    assert_eq!(outcome.summary.documents_processed, 2);
    assert_eq!(outcome.summary.documents_failed, 1);
    let missing = outcome.results.iter().find(|r| r.document_id == "skip-txt-0").unwrap();
    assert!(!missing.is_success());
    optimizer.shutdown_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_ids_process_first_only() {
    let (optimizer, extractor) = optimizer_with(config(2), GB);
    let first = Document::new("dup", "a.txt", "text/plain", KB).with_last_modified(1);
    let second = Document::new("dup", "a.txt", "text/plain", KB).with_last_modified(2);

    let outcome = optimizer.process(vec![first.clone(), second.clone()]).await;
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.summary.documents_processed, 1);
    assert_eq!(outcome.summary.documents_failed, 1);
    assert_eq!(outcome.summary.cache_misses, 1);
    assert_eq!(extractor.items.load(Ordering::SeqCst), 1);
    assert!(matches!(outcome.results[0].result, DocumentResult::Processed { .. }));
    assert!(matches!(&outcome.results[1].result, DocumentResult::Failed { error } if error.contains("duplicate")));
    assert!(outcome.summary.warnings.iter().any(|w| w.contains("dup")));

    // Only the first version was cached; the second is still a miss.
    let again = optimizer.process(vec![first]).await;
    assert!(matches!(again.results[0].result, DocumentResult::Cached { .. }));
    let again = optimizer.process(vec![second]).await;
    assert!(matches!(again.results[0].result, DocumentResult::Processed { .. }));
    optimizer.shutdown_async().await;
}

// ============================================================================
// RESOURCE PRESSURE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sustained_memory_pressure_reduces_concurrency() {
    let mut config = config(4);
    config.batch_sizes = BatchSizes {
        text: 1,
        ..BatchSizes::default()
    };
    let (optimizer, _extractor) = optimizer_with(config, 95 * GB / 10);

    let outcome = optimizer.process(text("load", 12)).await;
    let summary = &outcome.summary;

    assert_eq!(summary.total_batches, 12);
    assert_eq!(summary.documents_processed, 12);
    assert_eq!(summary.final_concurrency, 1);
    assert!(summary
        .warnings
        .iter()
        .any(|w| w.contains("concurrent batches reduced from 4 to 2")));
    assert!(summary.memory_efficiency < 0.1);

    let status = optimizer.optimization_status();
    assert!(status.resource_history.iter().all(|m| m.worker_utilization <= 1.0));
    assert!(status.latest_metrics.is_some());
    optimizer.shutdown_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_low_memory_keeps_full_concurrency() {
    let probe = Arc::new(FixedProbe::new(GB, 10 * GB));
    let mut config = config(4);
    config.batch_sizes = BatchSizes {
        text: 1,
        ..BatchSizes::default()
    };
    let optimizer = OptimizerBuilder::new(Extractor::default())
        .with_config(config)
        .with_probe(probe.clone())
        .build()
        .unwrap();

    let outcome = optimizer.process(text("calm", 8)).await;
    assert_eq!(outcome.summary.final_concurrency, 4);
    assert!(outcome.summary.warnings.is_empty());

    probe.set_memory(9 * GB, 10 * GB);
    assert!(!optimizer.monitor().should_throttle());
    optimizer.monitor().sample(0.0);
    assert!(optimizer.monitor().should_throttle());
    optimizer.shutdown_async().await;
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_background_tasks_sample_until_shutdown() {
    let mut config = config(2);
    config.monitor.sample_interval_ms = 10;
    config.cache.prune_interval_ms = 10;
    let (optimizer, _extractor) = optimizer_with(config, GB);

    optimizer.start_background(&TokioSpawner::current());
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(optimizer.monitor().history().len() >= 2);

    let report = optimizer.shutdown_async().await;
    assert_eq!(report.joined, 2);

    tokio::time::sleep(Duration::from_millis(30)).await;
    let settled = optimizer.monitor().history().len();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(optimizer.monitor().history().len(), settled);
}

#[tokio::test]
async fn test_process_after_shutdown_reports_failures() {
    let (optimizer, _extractor) = optimizer_with(config(2), GB);
    optimizer.shutdown_async().await;

    let outcome = optimizer.process(electronic("late", 3)).await;
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.summary.failed_batches, 1);
    assert_eq!(outcome.summary.documents_failed, 3);
}
