//! Bounded TTL cache of per-document results keyed by fingerprint.
//!
//! - Reads take the map read lock; access counts are atomics on the entry.
//! - Expired entries read as misses but stay in the map until the next prune.
//! - When an insert would exceed capacity, `prune` runs first and evicts the
//!   oldest 20% by insertion time (not by access recency).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

use super::classifier::Fingerprint;
use super::error::OptimizerError;
use super::executor::Spawn;
use crate::config::CacheConfig;
use crate::util::clock::now_ms;

/// A capacity prune evicts one in this many live entries (20%).
const EVICTION_DIVISOR: usize = 5;

/// A cached result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Result payload.
    pub payload: Value,
    /// Insertion time in milliseconds since the epoch.
    pub inserted_at_ms: u128,
    /// Number of hits served, including this one.
    pub access_count: u64,
}

struct StoredEntry {
    payload: Value,
    inserted_at_ms: u128,
    access_count: AtomicU64,
}

/// What a prune removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Entries removed because their TTL had elapsed.
    pub expired: usize,
    /// Live entries evicted to free capacity.
    pub evicted: usize,
}

impl PruneReport {
    /// Total entries removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.expired + self.evicted
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries physically present, including expired ones not yet pruned.
    pub entries: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Cumulative hits.
    pub hits: u64,
    /// Cumulative misses.
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 when there were no lookups.
    pub hit_rate: f64,
    /// Cumulative capacity evictions.
    pub evictions: u64,
    /// Cumulative expired-entry removals.
    pub expirations: u64,
    /// Cumulative rejected writes.
    pub rejected_writes: u64,
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    rejected_writes: AtomicU64,
}

/// Concurrency-safe result cache.
pub struct ResultCache {
    config: CacheConfig,
    entries: RwLock<HashMap<Fingerprint, StoredEntry>>,
    counters: CacheCounters,
}

impl ResultCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(config.capacity.min(4096))),
            config,
            counters: CacheCounters::default(),
        }
    }

    /// Configured entry lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    fn is_expired(&self, inserted_at_ms: u128, now_ms: u128) -> bool {
        now_ms.saturating_sub(inserted_at_ms) > u128::from(self.config.ttl_ms)
    }

    /// Look up a fingerprint at the current time.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.get_at(fingerprint, now_ms())
    }

    /// Look up a fingerprint as of `now_ms`. Counts a hit or a miss.
    pub fn get_at(&self, fingerprint: &Fingerprint, now_ms: u128) -> Option<CacheEntry> {
        let entries = self.entries.read();
        let hit = entries
            .get(fingerprint)
            .filter(|entry| !self.is_expired(entry.inserted_at_ms, now_ms))
            .map(|entry| CacheEntry {
                payload: entry.payload.clone(),
                inserted_at_ms: entry.inserted_at_ms,
                access_count: entry.access_count.fetch_add(1, Ordering::Relaxed) + 1,
            });
        drop(entries);

        if hit.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Store a result at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::CacheWrite`] if the payload exceeds the
    /// configured entry size; the cache is left unchanged.
    pub fn put(&self, fingerprint: Fingerprint, payload: Value) -> Result<(), OptimizerError> {
        self.put_at(fingerprint, payload, now_ms())
    }

    /// Store a result as of `now_ms`, overwriting any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::CacheWrite`] if the payload exceeds the
    /// configured entry size.
    pub fn put_at(&self, fingerprint: Fingerprint, payload: Value, now_ms: u128) -> Result<(), OptimizerError> {
        let size = serde_json::to_vec(&payload)
            .map_err(|e| OptimizerError::CacheWrite(format!("payload not serializable: {e}")))?
            .len();
        if size > self.config.max_entry_bytes {
            self.counters.rejected_writes.fetch_add(1, Ordering::Relaxed);
            return Err(OptimizerError::CacheWrite(format!(
                "payload of {size} bytes exceeds limit of {} bytes",
                self.config.max_entry_bytes
            )));
        }

        let mut entries = self.entries.write();
        if !entries.contains_key(&fingerprint) && entries.len() >= self.config.capacity {
            let report = self.prune_locked(&mut entries, now_ms);
            debug!(expired = report.expired, evicted = report.evicted, "cache pruned before insert");
        }
        entries.insert(
            fingerprint,
            StoredEntry {
                payload,
                inserted_at_ms: now_ms,
                access_count: AtomicU64::new(0),
            },
        );
        Ok(())
    }

    /// Remove expired entries, then evict the oldest 20% of what remains.
    pub fn prune(&self) -> PruneReport {
        let mut entries = self.entries.write();
        let report = self.prune_locked(&mut entries, now_ms());
        drop(entries);
        if report.total() > 0 {
            info!(expired = report.expired, evicted = report.evicted, "cache pruned");
        }
        report
    }

    /// Remove only expired entries.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(now_ms())
    }

    /// Remove entries expired as of `now_ms`.
    pub fn prune_expired_at(&self, now_ms: u128) -> usize {
        let mut entries = self.entries.write();
        self.remove_expired(&mut entries, now_ms)
    }

    fn remove_expired(&self, entries: &mut HashMap<Fingerprint, StoredEntry>, now_ms: u128) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry.inserted_at_ms, now_ms));
        let removed = before - entries.len();
        self.counters.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    fn prune_locked(&self, entries: &mut HashMap<Fingerprint, StoredEntry>, now_ms: u128) -> PruneReport {
        let expired = self.remove_expired(entries, now_ms);
        if entries.is_empty() {
            return PruneReport { expired, evicted: 0 };
        }

        let to_evict = entries.len().div_ceil(EVICTION_DIVISOR).max(1);

        let mut by_age: Vec<(u128, Fingerprint)> = entries
            .iter()
            .map(|(fp, entry)| (entry.inserted_at_ms, fp.clone()))
            .collect();
        by_age.sort_unstable();
        for (_, fp) in by_age.into_iter().take(to_evict) {
            entries.remove(&fp);
        }
        self.counters.evictions.fetch_add(to_evict as u64, Ordering::Relaxed);
        PruneReport {
            expired,
            evicted: to_evict,
        }
    }

    /// Entries physically present, including expired ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when no entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Cumulative hit rate.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        ratio(hits, hits + misses)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        CacheStats {
            entries: self.len(),
            capacity: self.config.capacity,
            hits,
            misses,
            hit_rate: ratio(hits, hits + misses),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            rejected_writes: self.counters.rejected_writes.load(Ordering::Relaxed),
        }
    }

    /// Run a background sweep of expired entries every `prune_interval_ms`
    /// until `stop` flips to `true`.
    pub fn spawn_pruner<S: Spawn>(self: &Arc<Self>, spawner: &S, mut stop: watch::Receiver<bool>) {
        let cache = Arc::clone(self);
        let period = Duration::from_millis(self.config.prune_interval_ms);
        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.prune_expired();
                        if removed > 0 {
                            debug!(removed, "background sweep removed expired cache entries");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("cache pruner stopped");
        });
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}
