//! Resource monitor: samples memory, CPU load and worker utilization into a
//! bounded rolling history and decides when work should be throttled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::executor::Spawn;
use crate::config::MonitorConfig;
use crate::util::clock::now_ms;

/// Raw host figures returned by a [`SystemProbe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemReading {
    /// Memory in use, bytes.
    pub memory_used_bytes: u64,
    /// Total memory, bytes.
    pub memory_total_bytes: u64,
    /// CPU load normalised by core count.
    pub cpu_load: f64,
}

/// Source of host resource readings.
pub trait SystemProbe: Send + Sync + 'static {
    /// Take a reading.
    fn read(&self) -> SystemReading;
}

/// Probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<System>,
    cpus: usize,
}

impl SysinfoProbe {
    /// Create a probe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            cpus: num_cpus::get().max(1),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    #[allow(clippy::cast_precision_loss)]
    fn read(&self) -> SystemReading {
        let mut system = self.system.lock();
        system.refresh_memory();
        SystemReading {
            memory_used_bytes: system.used_memory(),
            memory_total_bytes: system.total_memory(),
            cpu_load: System::load_average().one / self.cpus as f64,
        }
    }
}

/// Probe returning a configurable reading. Useful in tests and for hosts
/// where memory accounting is done elsewhere.
#[derive(Debug, Default)]
pub struct FixedProbe {
    reading: RwLock<SystemReading>,
}

impl FixedProbe {
    /// Probe reporting `used` of `total` bytes and no CPU load.
    #[must_use]
    pub fn new(memory_used_bytes: u64, memory_total_bytes: u64) -> Self {
        Self {
            reading: RwLock::new(SystemReading {
                memory_used_bytes,
                memory_total_bytes,
                cpu_load: 0.0,
            }),
        }
    }

    /// Replace the reported memory figures.
    pub fn set_memory(&self, memory_used_bytes: u64, memory_total_bytes: u64) {
        let mut reading = self.reading.write();
        reading.memory_used_bytes = memory_used_bytes;
        reading.memory_total_bytes = memory_total_bytes;
    }
}

impl SystemProbe for FixedProbe {
    fn read(&self) -> SystemReading {
        *self.reading.read()
    }
}

/// One monitor sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Memory in use, bytes.
    pub memory_used_bytes: u64,
    /// Total memory, bytes.
    pub memory_total_bytes: u64,
    /// CPU load normalised by core count.
    pub cpu_load: f64,
    /// Worker pool utilization at sampling time.
    pub worker_utilization: f64,
    /// Sampling time in milliseconds since epoch.
    pub sampled_at_ms: u128,
}

impl ResourceMetrics {
    /// `used / total`, 0 when the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn memory_ratio(&self) -> f64 {
        if self.memory_total_bytes == 0 {
            0.0
        } else {
            self.memory_used_bytes as f64 / self.memory_total_bytes as f64
        }
    }
}

/// Samples host resources and keeps the last `history_len` samples.
pub struct ResourceMonitor {
    config: MonitorConfig,
    probe: Arc<dyn SystemProbe>,
    history: RwLock<VecDeque<ResourceMetrics>>,
}

impl ResourceMonitor {
    /// Monitor backed by [`SysinfoProbe`].
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_probe(config, Arc::new(SysinfoProbe::new()))
    }

    /// Monitor backed by a custom probe.
    #[must_use]
    pub fn with_probe(config: MonitorConfig, probe: Arc<dyn SystemProbe>) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(config.history_len)),
            config,
            probe,
        }
    }

    /// Take a sample, append it to the history and return it.
    pub fn sample(&self, worker_utilization: f64) -> ResourceMetrics {
        let reading = self.probe.read();
        let metrics = ResourceMetrics {
            memory_used_bytes: reading.memory_used_bytes,
            memory_total_bytes: reading.memory_total_bytes,
            cpu_load: reading.cpu_load,
            worker_utilization: worker_utilization.clamp(0.0, 1.0),
            sampled_at_ms: now_ms(),
        };

        let mut history = self.history.write();
        history.push_back(metrics);
        while history.len() > self.config.history_len {
            history.pop_front();
        }
        drop(history);

        if self.exceeds_threshold(&metrics) {
            warn!(
                memory_ratio = metrics.memory_ratio(),
                threshold = self.config.memory_threshold,
                "memory usage above threshold"
            );
        }
        metrics
    }

    /// Most recent sample.
    #[must_use]
    pub fn latest(&self) -> Option<ResourceMetrics> {
        self.history.read().back().copied()
    }

    /// True when the latest sample's memory ratio is above the threshold.
    #[must_use]
    pub fn should_throttle(&self) -> bool {
        self.latest().is_some_and(|m| self.exceeds_threshold(&m))
    }

    /// True when `metrics` is above the memory threshold.
    #[must_use]
    pub fn exceeds_threshold(&self, metrics: &ResourceMetrics) -> bool {
        metrics.memory_ratio() > self.config.memory_threshold
    }

    /// Samples oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ResourceMetrics> {
        self.history.read().iter().copied().collect()
    }

    /// Memory ratios, oldest first.
    #[must_use]
    pub fn memory_history(&self) -> Vec<f64> {
        self.history.read().iter().map(ResourceMetrics::memory_ratio).collect()
    }

    /// Worker utilization readings, oldest first.
    #[must_use]
    pub fn utilization_history(&self) -> Vec<f64> {
        self.history.read().iter().map(|m| m.worker_utilization).collect()
    }

    /// Sample every `sample_interval_ms` until `stop` flips to `true`.
    /// `utilization` supplies the pool utilization for each sample.
    pub fn spawn_sampler<S, F>(self: &Arc<Self>, spawner: &S, utilization: F, mut stop: watch::Receiver<bool>)
    where
        S: Spawn,
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let monitor = Arc::clone(self);
        let period = Duration::from_millis(self.config.sample_interval_ms);
        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let metrics = monitor.sample(utilization());
                        debug!(
                            memory_ratio = metrics.memory_ratio(),
                            worker_utilization = metrics.worker_utilization,
                            "resource sample"
                        );
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("resource sampler stopped");
        });
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("config", &self.config)
            .field("samples", &self.history.read().len())
            .finish_non_exhaustive()
    }
}
