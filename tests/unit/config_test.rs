//! Tests for configuration validation and loading

use docpipe::config::{default_worker_count, BatchSizes, CacheConfig, MonitorConfig, OptimizerConfig, WorkerPoolConfig};
use docpipe::core::ProcessingType;
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let cfg = OptimizerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_concurrent_batches, 4);
    assert_eq!(cfg.cache.capacity, 1000);
    assert_eq!(cfg.cache.ttl(), Duration::from_secs(3600));
    assert!((cfg.monitor.memory_threshold - 0.8).abs() < f64::EPSILON);
    assert_eq!(cfg.monitor.history_len, 100);
}

#[test]
fn test_default_worker_count() {
    assert!(default_worker_count() >= 2);
    assert_eq!(WorkerPoolConfig::default().worker_count, default_worker_count());
}

#[test]
fn test_default_batch_sizes() {
    let sizes = BatchSizes::default();
    assert_eq!(sizes.for_type(ProcessingType::Electronic), 10);
    assert_eq!(sizes.for_type(ProcessingType::Scanned), 3);
    assert_eq!(sizes.for_type(ProcessingType::Text), 20);
    assert_eq!(sizes.for_type(ProcessingType::Complex), 5);
}

#[test]
fn test_zero_workers_rejected() {
    let mut cfg = OptimizerConfig::default();
    cfg.pool.worker_count = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("pool invalid:"), "{err}");
}

#[test]
fn test_zero_ttl_rejected() {
    let cfg = OptimizerConfig {
        cache: CacheConfig {
            ttl_ms: 0,
            ..CacheConfig::default()
        },
        ..OptimizerConfig::default()
    };
    assert!(cfg.validate().unwrap_err().starts_with("cache invalid:"));
}

#[test]
fn test_threshold_out_of_range_rejected() {
    for threshold in [0.0, -0.5, 1.5] {
        let monitor = MonitorConfig {
            memory_threshold: threshold,
            ..MonitorConfig::default()
        };
        assert!(monitor.validate().is_err(), "threshold {threshold} accepted");
    }
    let full = MonitorConfig {
        memory_threshold: 1.0,
        ..MonitorConfig::default()
    };
    assert!(full.validate().is_ok());
}

#[test]
fn test_zero_batch_size_rejected() {
    let cfg = OptimizerConfig {
        batch_sizes: BatchSizes {
            scanned: 0,
            ..BatchSizes::default()
        },
        ..OptimizerConfig::default()
    };
    assert!(cfg.validate().unwrap_err().starts_with("batch_sizes invalid:"));
}

#[test]
fn test_partial_json_keeps_defaults() {
    let cfg = OptimizerConfig::from_json_str(
        r#"{ "pool": { "worker_count": 3 }, "cache": { "ttl_ms": 1000 }, "max_concurrent_batches": 2 }"#,
    )
    .unwrap();
    assert_eq!(cfg.pool.worker_count, 3);
    assert_eq!(cfg.pool.max_queue_depth, 256);
    assert_eq!(cfg.cache.ttl_ms, 1000);
    assert_eq!(cfg.cache.capacity, 1000);
    assert_eq!(cfg.max_concurrent_batches, 2);
    assert_eq!(cfg.batch_sizes, BatchSizes::default());
}

#[test]
fn test_invalid_json_rejected() {
    let err = OptimizerConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error:"), "{err}");

    let err = OptimizerConfig::from_json_str(r#"{ "max_concurrent_batches": 0 }"#).unwrap_err();
    assert!(err.contains("max_concurrent_batches"), "{err}");
}

#[test]
fn test_json_file_round_trip() {
    let path = std::env::temp_dir().join(format!("docpipe-config-{}.json", uuid::Uuid::new_v4()));
    let mut cfg = OptimizerConfig::default();
    cfg.batch_sizes.text = 50;
    std::fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();

    let loaded = OptimizerConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded, cfg);
    let _ = std::fs::remove_file(&path);

    let missing = OptimizerConfig::from_json_file(&path).unwrap_err();
    assert!(format!("{missing:#}").contains("reading config file"));
}

#[test]
fn test_env_overrides() {
    std::env::set_var("DOCPIPE_WORKERS", "3");
    std::env::set_var("DOCPIPE_CACHE_TTL_MS", "5000");
    std::env::set_var("DOCPIPE_MEMORY_THRESHOLD", "0.9");
    let cfg = OptimizerConfig::from_env().unwrap();
    assert_eq!(cfg.pool.worker_count, 3);
    assert_eq!(cfg.cache.ttl_ms, 5000);
    assert!((cfg.monitor.memory_threshold - 0.9).abs() < f64::EPSILON);

    std::env::set_var("DOCPIPE_MAX_CONCURRENT_BATCHES", "many");
    let err = OptimizerConfig::from_env().unwrap_err();
    assert!(format!("{err:#}").contains("DOCPIPE_MAX_CONCURRENT_BATCHES"));

    for key in [
        "DOCPIPE_WORKERS",
        "DOCPIPE_CACHE_TTL_MS",
        "DOCPIPE_MEMORY_THRESHOLD",
        "DOCPIPE_MAX_CONCURRENT_BATCHES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_pool_config_builders() {
    let cfg = WorkerPoolConfig::new()
        .with_worker_count(6)
        .with_max_queue_depth(12)
        .with_shutdown_timeout_ms(250);
    assert_eq!(cfg.worker_count, 6);
    assert_eq!(cfg.max_queue_depth, 12);
    assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(250));
    assert!(cfg.validate().is_ok());
    assert!(cfg.with_thread_stack_size(1024).validate().is_err());
}
