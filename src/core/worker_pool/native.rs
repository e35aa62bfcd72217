//! Native implementation of `WorkerPool` using OS threads.
//!
//! Each worker is a dedicated OS thread with its own single-threaded tokio
//! runtime, so document work never blocks the caller's runtime.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on channel recv; callers await a oneshot
//! - **Admission by semaphore**: at most `worker_count + max_queue_depth` tasks are outstanding
//! - **Crash replacement**: a panicking task fails alone and its slot gets a fresh worker
//! - **Clean shutdown**: dropping the sender unblocks idle workers

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerPoolConfig;
use crate::core::classifier::ProcessingType;
use crate::core::executor::WorkerExecutor;
use crate::util::clock::now_ms;

use super::{
    ActiveJob, JobId, PoolCounters, PoolError, PoolStatus, ShutdownReport, TaskMetadata, WorkerRecord, WorkerState,
    WorkerTask,
};

/// State shared between the pool handle and its worker threads.
struct PoolShared<P, R, E> {
    task_rx: Receiver<WorkerTask<P, R>>,
    records: RwLock<Vec<WorkerRecord>>,
    active_jobs: RwLock<HashMap<JobId, ActiveJob>>,
    handles: Mutex<Vec<Option<JoinHandle<()>>>>,
    counters: PoolCounters,
    shutdown: AtomicBool,
    rejected: AtomicUsize,
    executor: E,
    stack_size: usize,
}

impl<P, R, E> PoolShared<P, R, E> {
    fn set_record(&self, index: usize, update: impl FnOnce(&mut WorkerRecord)) {
        if let Some(record) = self.records.write().get_mut(index) {
            update(record);
        }
    }

    fn reject(&self, reply: oneshot::Sender<Result<R, PoolError>>) {
        self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
        self.rejected.fetch_add(1, Ordering::Relaxed);
        let _ = reply.send(Err(PoolError::PoolShutdown));
    }
}

/// Worker pool with dedicated OS threads for document work.
///
/// Tasks are served in FIFO order. A caller that arrives while all
/// `worker_count + max_queue_depth` slots are taken waits for one to free up.
pub struct WorkerPool<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    /// Pool configuration.
    config: WorkerPoolConfig,

    /// Task sender (to workers). Option allows clean shutdown by dropping.
    task_tx: Mutex<Option<Sender<WorkerTask<P, R>>>>,

    /// Admission permits; closed on shutdown so waiters fail fast.
    admission: Arc<Semaphore>,

    shared: Arc<PoolShared<P, R, E>>,
}

impl<P, R, E> WorkerPool<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    /// Create a new worker pool with the given configuration and executor.
    ///
    /// This spawns `config.worker_count` OS threads, each with its own
    /// single-threaded tokio runtime for executing tasks.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if the configuration is invalid and
    /// `PoolError::Internal` if a worker thread cannot be spawned.
    pub fn new(config: WorkerPoolConfig, executor: E) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let capacity = config.worker_count + config.max_queue_depth;
        let (task_tx, task_rx) = bounded::<WorkerTask<P, R>>(capacity);
        let records = (0..config.worker_count)
            .map(|index| WorkerRecord::new(index, Uuid::nil()))
            .collect();

        let shared = Arc::new(PoolShared {
            task_rx,
            records: RwLock::new(records),
            active_jobs: RwLock::new(HashMap::new()),
            handles: Mutex::new((0..config.worker_count).map(|_| None).collect()),
            counters: PoolCounters::default(),
            shutdown: AtomicBool::new(false),
            rejected: AtomicUsize::new(0),
            executor,
            stack_size: config.thread_stack_size,
        });

        for index in 0..config.worker_count {
            if let Err(err) = spawn_worker(&shared, index) {
                shared.shutdown.store(true, Ordering::Release);
                return Err(err);
            }
        }

        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "WorkerPool initialized with dedicated OS threads"
        );

        Ok(Self {
            config,
            task_tx: Mutex::new(Some(task_tx)),
            admission: Arc::new(Semaphore::new(capacity)),
            shared,
        })
    }

    /// Submit a payload and await its result.
    ///
    /// Waits for admission when the pool is saturated.
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolShutdown` if the pool is or becomes shut down before the task runs
    /// - `PoolError::WorkerCrashed` if the executor panicked on this task
    /// - `PoolError::QueueFull` if the queue overflowed despite admission
    pub async fn execute(&self, task_type: ProcessingType, payload: P) -> Result<R, PoolError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        let permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::PoolShutdown)?;

        let meta = TaskMetadata {
            id: Uuid::new_v4(),
            task_type,
            submitted_at_ms: now_ms(),
        };
        let job_id = meta.id;
        let (reply, outcome) = oneshot::channel();
        let task = WorkerTask {
            payload,
            meta,
            reply,
            permit,
        };

        {
            let task_tx = self.task_tx.lock();
            let Some(sender) = task_tx.as_ref() else {
                return Err(PoolError::PoolShutdown);
            };
            // Counted before the send so a fast worker never decrements first.
            let counters = &self.shared.counters;
            counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
            counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
            match sender.try_send(task) {
                Ok(()) => {
                    debug!(job_id = %job_id, task_type = %task_type, "Task submitted to worker pool");
                }
                Err(err) => {
                    counters.submitted_tasks.fetch_sub(1, Ordering::Relaxed);
                    counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    return Err(match err {
                        TrySendError::Full(_) => {
                            warn!("Worker pool queue is full");
                            PoolError::QueueFull
                        }
                        TrySendError::Disconnected(_) => PoolError::PoolShutdown,
                    });
                }
            }
        }

        outcome.await.unwrap_or(Err(PoolError::PoolShutdown))
    }

    /// Current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let available = self
            .shared
            .records
            .read()
            .iter()
            .filter(|record| record.is_available())
            .count();
        let active = self.shared.active_jobs.read().len();
        self.shared
            .counters
            .snapshot(self.config.worker_count, available, active)
    }

    /// Snapshot of every worker slot.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerRecord> {
        self.shared.records.read().clone()
    }

    /// Snapshot of the active-job table.
    #[must_use]
    pub fn active_jobs(&self) -> Vec<ActiveJob> {
        self.shared.active_jobs.read().values().cloned().collect()
    }

    /// The pool's configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// True once shutdown has been signalled.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Shut down the pool.
    ///
    /// Queued tasks fail with `PoolError::PoolShutdown`. Workers get until
    /// `timeout` to finish their in-flight task; any still running after that
    /// are detached and counted as abandoned. Calling this twice returns an
    /// empty report.
    pub fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        if !self.signal_shutdown() {
            return ShutdownReport::default();
        }

        info!("Shutting down worker pool");

        while let Ok(task) = self.shared.task_rx.try_recv() {
            self.shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            self.shared.reject(task.reply);
        }

        let handles: Vec<(usize, JoinHandle<()>)> = self
            .shared
            .handles
            .lock()
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.take().map(|handle| (index, handle)))
            .collect();

        let deadline = Instant::now() + timeout;
        let mut report = ShutdownReport::default();
        for (index, worker) in handles {
            let (tx, rx) = bounded(1);
            let join_thread = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });

            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(clean) => {
                    if !clean {
                        warn!(worker_index = index, "Worker panicked during shutdown");
                    }
                    debug!(worker_index = index, "Worker joined");
                    report.joined += 1;
                    let _ = join_thread.join();
                }
                Err(_) => {
                    warn!(worker_index = index, "Worker did not exit within timeout - detaching");
                    report.abandoned += 1;
                }
            }
        }

        report.rejected = self.shared.rejected.load(Ordering::Relaxed);
        info!(
            joined = report.joined,
            abandoned = report.abandoned,
            rejected = report.rejected,
            "Worker pool shut down complete"
        );
        report
    }

    /// Set the shutdown flag, close admission and drop the sender.
    /// Returns false if shutdown was already signalled.
    fn signal_shutdown(&self) -> bool {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.admission.close();
        *self.task_tx.lock() = None;
        true
    }
}

impl<P, R, E> Drop for WorkerPool<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    fn drop(&mut self) {
        // Workers drain and reject what is left, then exit on their own.
        if self.signal_shutdown() {
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Start a fresh worker in slot `index` and record its handle.
fn spawn_worker<P, R, E>(shared: &Arc<PoolShared<P, R, E>>, index: usize) -> Result<(), PoolError>
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    let worker_id = Uuid::new_v4();
    shared.set_record(index, |record| *record = WorkerRecord::new(index, worker_id));

    let thread_shared = Arc::clone(shared);
    let handle = thread::Builder::new()
        .name(format!("docpipe-worker-{index}"))
        .stack_size(shared.stack_size)
        .spawn(move || worker_loop(&thread_shared, index, worker_id))
        .map_err(|e| PoolError::Internal(format!("failed to spawn worker {index}: {e}")))?;

    if let Some(slot) = shared.handles.lock().get_mut(index) {
        *slot = Some(handle);
    }
    Ok(())
}

fn worker_loop<P, R, E>(shared: &Arc<PoolShared<P, R, E>>, index: usize, worker_id: Uuid)
where
    P: Send + 'static,
    R: Send + 'static,
    E: WorkerExecutor<P, R>,
{
    debug!(worker_index = index, worker_id = %worker_id, "Worker thread started");

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(worker_index = index, error = %e, "Failed to create worker runtime");
            shared.set_record(index, |record| record.state = WorkerState::Stopped);
            return;
        }
    };

    // recv() keeps returning buffered tasks after the sender is dropped, then Err.
    while let Ok(task) = shared.task_rx.recv() {
        let WorkerTask {
            payload,
            meta,
            reply,
            permit,
        } = task;
        shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);

        if shared.shutdown.load(Ordering::Acquire) {
            shared.reject(reply);
            continue;
        }

        let job_id = meta.id;
        shared.active_jobs.write().insert(
            job_id,
            ActiveJob {
                id: job_id,
                task_type: meta.task_type,
                worker_index: index,
                started_at_ms: now_ms(),
            },
        );
        shared.set_record(index, |record| {
            record.state = WorkerState::Busy;
            record.current_job = Some(job_id);
        });

        debug!(worker_index = index, job_id = %job_id, "Worker executing task");

        let executor = shared.executor.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| rt.block_on(executor.execute(payload, meta))));

        shared.active_jobs.write().remove(&job_id);

        match outcome {
            Ok(result) => {
                shared.set_record(index, |record| {
                    record.state = WorkerState::Idle;
                    record.current_job = None;
                    record.tasks_completed += 1;
                });
                shared.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(worker_index = index, job_id = %job_id, "Worker completed task");
                let _ = reply.send(Ok(result));
                drop(permit);
            }
            Err(cause) => {
                let message = panic_message(cause.as_ref());
                error!(
                    worker_index = index,
                    worker_id = %worker_id,
                    job_id = %job_id,
                    message = %message,
                    "Worker crashed"
                );
                shared.set_record(index, |record| {
                    record.state = WorkerState::Crashed;
                    record.current_job = None;
                });
                shared.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                shared.counters.worker_crashes.fetch_add(1, Ordering::Relaxed);
                let _ = reply.send(Err(PoolError::WorkerCrashed {
                    worker_index: index,
                    message,
                }));
                drop(permit);

                if shared.shutdown.load(Ordering::Acquire) {
                    shared.set_record(index, |record| record.state = WorkerState::Stopped);
                } else if let Err(err) = spawn_worker(shared, index) {
                    error!(worker_index = index, error = %err, "Failed to replace crashed worker");
                } else {
                    info!(worker_index = index, "Replaced crashed worker");
                }
                return;
            }
        }
    }

    shared.set_record(index, |record| {
        if record.worker_id == worker_id {
            record.state = WorkerState::Stopped;
        }
    });
    debug!(worker_index = index, "Worker thread exiting");
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = cause.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = cause.downcast_ref::<String>() {
        msg.clone()
    } else {
        "worker panicked".to_string()
    }
}
