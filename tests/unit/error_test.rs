//! Tests for error types

use docpipe::core::{OptimizerError, PoolError};
use uuid::Uuid;

#[test]
fn test_invalid_config_error() {
    let err = OptimizerError::InvalidConfig("pool invalid: worker_count must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: pool invalid: worker_count must be greater than 0"
    );
}

#[test]
fn test_pool_error_converts() {
    let err: OptimizerError = PoolError::PoolShutdown.into();
    assert_eq!(format!("{}", err), "worker pool error: pool has been shut down");
}

#[test]
fn test_worker_crashed_error() {
    let err = PoolError::WorkerCrashed {
        worker_index: 3,
        message: "index out of bounds".to_string(),
    };
    assert_eq!(format!("{}", err), "worker 3 crashed: index out of bounds");
}

#[test]
fn test_batch_failed_error() {
    let batch_id = Uuid::nil();
    let err = OptimizerError::BatchFailed {
        batch_id,
        reason: "unsupported encoding".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        format!("batch {batch_id} failed: unsupported encoding")
    );
}

#[test]
fn test_cache_write_error() {
    let err = OptimizerError::CacheWrite("payload of 20 bytes exceeds limit of 16 bytes".to_string());
    assert!(format!("{}", err).starts_with("cache write failed:"));
}

#[test]
fn test_errors_are_std_errors() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
    assert_error(&PoolError::Timeout);
    assert_error(&OptimizerError::CacheWrite(String::new()));
}
