//! Worker pool with dedicated worker threads.
//!
//! This module provides a `WorkerPool` that runs CPU-bound document work
//! separately from the caller's async runtime. Each worker is an OS thread
//! that pulls one task at a time from a FIFO queue.
//!
//! # Key Features
//!
//! - **Backpressure**: callers await admission instead of the queue growing unbounded
//! - **Self-healing**: a worker whose task panics is replaced at the same slot
//! - **Crash isolation**: only the task on the crashed worker fails
//! - **Graceful shutdown**: queued work is rejected, in-flight work gets a timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use docpipe::core::{ProcessingType, WorkerPool};
//! use docpipe::config::WorkerPoolConfig;
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new().with_worker_count(4), my_executor)?;
//! let result = pool.execute(ProcessingType::Text, payload).await?;
//! let status = pool.status();
//! ```

mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use uuid::Uuid;

use super::classifier::ProcessingType;

/// Correlation id of a task, unique while it is in the active-job table.
pub type JobId = Uuid;

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The task queue is full; no more tasks can be accepted.
    QueueFull,

    /// The worker running the task crashed.
    WorkerCrashed {
        /// Slot index of the crashed worker.
        worker_index: usize,
        /// Panic message, if one could be recovered.
        message: String,
    },

    /// The operation timed out.
    Timeout,

    /// The pool has been shut down.
    PoolShutdown,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (thread spawn failure, runtime build failure, etc.).
    Internal(String),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "task queue is full"),
            Self::WorkerCrashed { worker_index, message } => {
                write!(f, "worker {worker_index} crashed: {message}")
            }
            Self::Timeout => write!(f, "operation timed out"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Metadata handed to the executor with each task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Correlation id.
    pub id: JobId,
    /// Processing type of the task.
    pub task_type: ProcessingType,
    /// Submission time in milliseconds since epoch.
    pub submitted_at_ms: u128,
}

/// Lifecycle state of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Waiting for a task.
    Idle,
    /// Running a task.
    Busy,
    /// Task panicked; a replacement is being started.
    Crashed,
    /// Thread has exited after shutdown.
    Stopped,
}

/// A worker's identity and current assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Slot index, stable across replacements.
    pub index: usize,
    /// Identity of the thread currently occupying the slot.
    pub worker_id: Uuid,
    /// Current state.
    pub state: WorkerState,
    /// Task currently assigned, if any.
    pub current_job: Option<JobId>,
    /// Tasks finished by this worker identity.
    pub tasks_completed: u64,
}

impl WorkerRecord {
    pub(crate) const fn new(index: usize, worker_id: Uuid) -> Self {
        Self {
            index,
            worker_id,
            state: WorkerState::Idle,
            current_job: None,
            tasks_completed: 0,
        }
    }

    /// True when the worker can take a task.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state == WorkerState::Idle
    }
}

/// Entry in the pool's active-job table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveJob {
    /// Correlation id.
    pub id: JobId,
    /// Processing type.
    pub task_type: ProcessingType,
    /// Slot index of the assigned worker.
    pub worker_index: usize,
    /// Assignment time in milliseconds since epoch.
    pub started_at_ms: u128,
}

/// Snapshot of pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Configured worker count.
    pub total_workers: usize,
    /// Workers currently idle.
    pub available_workers: usize,
    /// Tasks currently assigned to a worker.
    pub active_jobs: usize,
    /// Tasks waiting for a worker.
    pub queued_tasks: u64,
    /// `1 - available / total`.
    pub utilization: f64,
    /// Total tasks submitted.
    pub submitted_tasks: u64,
    /// Total tasks completed.
    pub completed_tasks: u64,
    /// Total tasks failed (crash or shutdown).
    pub failed_tasks: u64,
    /// Total worker crashes.
    pub worker_crashes: u64,
}

/// What a shutdown did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Workers that exited within the timeout.
    pub joined: usize,
    /// Workers still running when the timeout elapsed.
    pub abandoned: usize,
    /// Queued tasks failed with [`PoolError::PoolShutdown`].
    pub rejected: usize,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub queued_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub worker_crashes: AtomicU64,
}

impl PoolCounters {
    /// Build a status snapshot from counters and worker-level figures.
    pub fn snapshot(&self, total_workers: usize, available_workers: usize, active_jobs: usize) -> PoolStatus {
        #[allow(clippy::cast_precision_loss)]
        let utilization = if total_workers == 0 {
            0.0
        } else {
            1.0 - available_workers as f64 / total_workers as f64
        };
        PoolStatus {
            total_workers,
            available_workers,
            active_jobs,
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            utilization,
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            worker_crashes: self.worker_crashes.load(Ordering::Relaxed),
        }
    }
}

/// A task submitted to the worker pool.
pub(crate) struct WorkerTask<P, R> {
    /// The task payload to execute.
    pub payload: P,
    /// Task metadata.
    pub meta: TaskMetadata,
    /// Where the outcome is delivered.
    pub reply: oneshot::Sender<Result<R, PoolError>>,
    /// Admission slot, released once the task has been answered or rejected.
    pub permit: OwnedSemaphorePermit,
}

pub use native::WorkerPool;
