//! Tests for builder modules

use async_trait::async_trait;
use docpipe::builders::OptimizerBuilder;
use docpipe::config::{BatchSizes, OptimizerConfig};
use docpipe::core::{
    BatchOutput, ClassifiedItem, Document, DocumentProcessor, FixedProbe, OptimizerError, ProcessedDocument,
    ProcessingType,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct NullProcessor;

#[async_trait]
impl DocumentProcessor for NullProcessor {
    async fn process_batch(&self, _processing_type: ProcessingType, items: &[ClassifiedItem]) -> BatchOutput {
        Ok(items
            .iter()
            .map(|item| ProcessedDocument::new(item.id().clone(), Value::Null))
            .collect())
    }
}

#[test]
fn test_builder_defaults() {
    let builder = OptimizerBuilder::new(NullProcessor);
    assert_eq!(builder.config(), &OptimizerConfig::default());
}

#[test]
fn test_builder_overrides() {
    let builder = OptimizerBuilder::new(NullProcessor)
        .with_worker_count(3)
        .with_cache_ttl(Duration::from_secs(90))
        .with_cache_capacity(50)
        .with_memory_threshold(0.7)
        .with_max_concurrent_batches(2)
        .with_batch_sizes(BatchSizes {
            text: 40,
            ..BatchSizes::default()
        });

    let cfg = builder.config();
    assert_eq!(cfg.pool.worker_count, 3);
    assert_eq!(cfg.cache.ttl_ms, 90_000);
    assert_eq!(cfg.cache.capacity, 50);
    assert!((cfg.monitor.memory_threshold - 0.7).abs() < f64::EPSILON);
    assert_eq!(cfg.max_concurrent_batches, 2);
    assert_eq!(cfg.batch_sizes.text, 40);
}

#[test]
fn test_builder_rejects_invalid_config() {
    let err = OptimizerBuilder::new(NullProcessor)
        .with_worker_count(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, OptimizerError::InvalidConfig(ref msg) if msg.starts_with("pool invalid:")));

    let err = OptimizerBuilder::new(NullProcessor)
        .with_memory_threshold(1.2)
        .build()
        .unwrap_err();
    assert!(matches!(err, OptimizerError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_built_optimizer_processes() {
    let optimizer = OptimizerBuilder::new(NullProcessor)
        .with_worker_count(2)
        .with_probe(Arc::new(FixedProbe::new(1, 4)))
        .build()
        .unwrap();

    let outcome = optimizer
        .process(vec![Document::new("a", "a.txt", "text/plain", 10)])
        .await;
    assert_eq!(outcome.summary.documents_processed, 1);
    assert_eq!(outcome.results[0].payload(), Some(&Value::Null));
    assert!((outcome.summary.memory_efficiency - 0.75).abs() < 1e-9);

    let report = optimizer.shutdown();
    assert_eq!(report.joined, 2);
}
