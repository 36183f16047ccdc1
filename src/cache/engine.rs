//! Tiered Cache Engine
//!
//! Orchestrates the in-process L1 and the persistent L2 behind a connection
//! state machine:
//!
//! ```text
//!   Disconnected ──connect()──▶ Connecting ──ping ok──▶ Connected
//!                                    │                     │
//!                         retries exhausted      connectivity error
//!                                    ▼              or timeout
//!                                 Degraded ◀──────────────┘
//!                                    │
//!                                    └──connect()──▶ Connecting ...
//! ```
//!
//! Outside `Connected`, reads miss and writes report `false`; nothing is ever
//! raised to the caller. Every backend call runs under a timeout.
//!
//! Pattern invalidation scans and deletes in batches and is not atomic across
//! the matched set: a `set` racing an invalidation may survive it.
//!
//! Removals bump a removal epoch after the L2 delete and before the L1 purge.
//! An L2 read promotes into L1 only when the epoch it started under is still
//! current, and drops its copy again if the epoch moved during the insert, so
//! a read racing a delete never leaves L1 holding a value L2 no longer has.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backend::{BackendStats, CacheBackend};
use super::callbacks::{CacheEvent, CallbackRegistry, EventContext};
use super::compression::{CompressionConfig, CompressionManager};
use super::entry::{CacheEntry, EntryMetadata, L1Entry, MAX_ENTRY_TTL_SECS};
use super::l1::{L1Cache, L1Config, L1Stats};
use crate::error::{Error, Result};
use crate::monitoring::health::HealthStatus;
use crate::monitoring::performance::{AlertLevel, MemorySample, PerformanceMonitor};

// =============================================================================
// Connection State
// =============================================================================

/// Engine connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Backend reachable
    Connected,
    /// Backend unreachable; operating as a pass-through miss
    Degraded,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Tier that served a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitSource {
    /// In-process tier
    L1,
    /// Persistent tier
    L2,
}

impl HitSource {
    /// Lowercase label used in events and logs
    pub fn label(&self) -> &'static str {
        match self {
            HitSource::L1 => "l1",
            HitSource::L2 => "l2",
        }
    }
}

impl std::fmt::Display for HitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL used when a write names none
    pub default_ttl: Duration,
    /// Whether the in-process tier is used at all
    pub l1_enabled: bool,
    /// L1 configuration
    pub l1: L1Config,
    /// Compression configuration
    pub compression: CompressionConfig,
    /// Upper bound for every backend call
    pub operation_timeout: Duration,
    /// Ping attempts after the first one before giving up in `connect`
    pub connect_retries: u32,
    /// Initial backoff between connection attempts (doubled each retry)
    pub retry_backoff: Duration,
    /// SCAN page size hint
    pub scan_count: usize,
    /// Keys per DEL command during invalidation
    pub delete_batch_size: usize,
    /// DEL commands in flight during invalidation
    pub delete_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            l1_enabled: true,
            l1: L1Config::default(),
            compression: CompressionConfig::default(),
            operation_timeout: Duration::from_secs(2),
            connect_retries: 3,
            retry_backoff: Duration::from_millis(100),
            scan_count: 100,
            delete_batch_size: 100,
            delete_concurrency: 4,
        }
    }
}

/// Per-write options
#[derive(Debug, Clone)]
pub struct SetOptions {
    /// Overrides the default TTL
    pub ttl: Option<Duration>,
    /// Labels stored with the entry
    pub attributes: Vec<(String, String)>,
    /// Write through to L1
    pub write_l1: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            attributes: Vec::new(),
            write_l1: true,
        }
    }
}

impl SetOptions {
    /// Options with an explicit TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }
}

/// A successful lookup
#[derive(Debug, Clone)]
pub struct CacheHit<T> {
    /// Deserialized value
    pub value: T,
    /// Tier that served it
    pub source: HitSource,
    /// Stored metadata
    pub metadata: EntryMetadata,
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Default)]
struct EngineCounters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    set_failures: AtomicU64,
    deletes: AtomicU64,
    backend_errors: AtomicU64,
    corrupted_entries: AtomicU64,
}

/// Engine counters snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub set_failures: u64,
    pub deletes: u64,
    pub backend_errors: u64,
    /// Corrupted entries found and removed
    pub corrupted_entries: u64,
}

impl EngineStats {
    /// Hit rate over all lookups
    pub fn hit_rate(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Engine status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub state: ConnectionState,
    pub health: HealthStatus,
    pub backend: String,
    pub l1_enabled: bool,
    pub l1: Option<L1Stats>,
    pub backend_stats: BackendStats,
    pub stats: EngineStats,
}

// =============================================================================
// Engine
// =============================================================================

/// Two-tier cache engine
pub struct TieredCache {
    backend: Arc<dyn CacheBackend>,
    l1: Option<L1Cache>,
    compression: CompressionManager,
    monitor: Arc<PerformanceMonitor>,
    callbacks: CallbackRegistry,
    state: RwLock<ConnectionState>,
    counters: EngineCounters,
    removal_epoch: AtomicU64,
    config: EngineConfig,
}

impl TieredCache {
    /// Create an engine over `backend`; call [`connect`](Self::connect) before use
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        config: EngineConfig,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        let l1 = (config.l1_enabled && config.l1.max_entries > 0)
            .then(|| L1Cache::with_config(config.l1.clone()));
        Self {
            backend,
            l1,
            compression: CompressionManager::with_config(config.compression.clone()),
            monitor,
            callbacks: CallbackRegistry::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            counters: EngineCounters::default(),
            removal_epoch: AtomicU64::new(0),
            config,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the engine is serving
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared monitor
    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Event callbacks
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// In-process tier, when enabled
    pub fn l1(&self) -> Option<&L1Cache> {
        self.l1.as_ref()
    }

    /// Backing store
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    fn transition(&self, next: ConnectionState) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, next)
        };
        if previous == next {
            return;
        }
        match next {
            ConnectionState::Degraded => {
                warn!(backend = self.backend.name(), from = %previous, "Cache degraded, serving misses")
            }
            _ => info!(backend = self.backend.name(), from = %previous, to = %next, "Cache state changed"),
        }
        self.callbacks.emit(&EventContext::state_change(next));
    }

    /// Connect (or reconnect) with bounded retries
    ///
    /// Returns whether the engine ended up `Connected`.
    pub async fn connect(&self) -> bool {
        self.transition(ConnectionState::Connecting);
        let mut backoff = self.config.retry_backoff;

        for attempt in 0..=self.config.connect_retries {
            match tokio::time::timeout(self.config.operation_timeout, self.backend.ping()).await {
                Ok(Ok(())) => {
                    self.transition(ConnectionState::Connected);
                    return true;
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Cache backend ping failed");
                }
                Err(_) => {
                    warn!(attempt, timeout = ?self.config.operation_timeout, "Cache backend ping timed out");
                }
            }
            if attempt < self.config.connect_retries {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        self.transition(ConnectionState::Degraded);
        false
    }

    /// Run a backend call under the operation timeout, degrading on connectivity failures
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation,
                after: self.config.operation_timeout,
            }),
        };
        if let Err(e) = &result {
            self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
            if e.is_connectivity() {
                warn!(operation, error = %e, "Cache backend unreachable");
                self.transition(ConnectionState::Degraded);
            } else {
                warn!(operation, error = %e, "Cache backend command failed");
            }
        }
        result
    }

    fn record_miss(&self, key: &str, started: Instant) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.monitor
            .record_operation("get", started.elapsed(), Some(false));
        debug!(key = %key, "Cache miss");
        self.callbacks
            .emit(&EventContext::for_key(CacheEvent::GetMiss, key));
    }

    fn record_hit(&self, key: &str, source: HitSource, started: Instant) {
        let counter = match source {
            HitSource::L1 => &self.counters.l1_hits,
            HitSource::L2 => &self.counters.l2_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.monitor
            .record_operation("get", started.elapsed(), Some(true));
        debug!(key = %key, tier = %source, "Cache hit");
        self.callbacks
            .emit(&EventContext::for_key(CacheEvent::GetHit, key).with_tier(source.label()));
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up a value, promoting L2 hits into L1
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with(key, |_| true).await.map(|hit| hit.value)
    }

    /// Look up a value; `promote` decides whether an L2 hit is copied into L1
    pub async fn get_with<T, F>(&self, key: &str, promote: F) -> Option<CacheHit<T>>
    where
        T: DeserializeOwned,
        F: FnOnce(&EntryMetadata) -> bool,
    {
        let started = Instant::now();
        if !self.is_connected() {
            self.record_miss(key, started);
            return None;
        }

        if let Some(l1) = &self.l1 {
            if let Some(entry) = l1.get(key) {
                match serde_json::from_slice::<T>(entry.data()) {
                    Ok(value) => {
                        self.record_hit(key, HitSource::L1, started);
                        return Some(CacheHit {
                            value,
                            source: HitSource::L1,
                            metadata: entry.metadata().clone(),
                        });
                    }
                    Err(e) => {
                        debug!(key = %key, error = %e, "L1 copy does not match requested type");
                        l1.remove(key);
                    }
                }
            }
        }

        let epoch = self.removal_epoch.load(Ordering::SeqCst);
        let raw = match self.call("get", self.backend.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) | Err(_) => {
                self.record_miss(key, started);
                return None;
            }
        };

        let (data, metadata) = match self.unpack(key, raw) {
            Ok(unpacked) => unpacked,
            Err(e) => {
                self.discard_corrupted(key, &e).await;
                self.record_miss(key, started);
                return None;
            }
        };

        let value = match serde_json::from_slice::<T>(&data) {
            Ok(value) => value,
            Err(e) if serde_json::from_slice::<IgnoredAny>(&data).is_ok() => {
                debug!(key = %key, error = %e, "Stored value does not match requested type");
                self.record_miss(key, started);
                return None;
            }
            Err(e) => {
                let e = Error::DataIntegrity {
                    key: key.to_string(),
                    reason: format!("payload is not JSON: {}", e),
                };
                self.discard_corrupted(key, &e).await;
                self.record_miss(key, started);
                return None;
            }
        };

        if let Some(l1) = &self.l1 {
            if let Some(remaining) = metadata.remaining_ttl() {
                if promote(&metadata) && self.removal_epoch.load(Ordering::SeqCst) == epoch {
                    l1.put(key, L1Entry::new(data, metadata.clone(), remaining));
                    if self.removal_epoch.load(Ordering::SeqCst) != epoch {
                        l1.remove(key);
                    }
                }
            }
        }
        self.record_hit(key, HitSource::L2, started);
        Some(CacheHit {
            value,
            source: HitSource::L2,
            metadata,
        })
    }

    /// Open the envelope and decompress; failures here mean the stored bytes are bad
    fn unpack(&self, key: &str, raw: Bytes) -> Result<(Bytes, EntryMetadata)> {
        let entry = CacheEntry::decode(key, raw)?;
        let data = self
            .compression
            .decompress(&entry.payload, entry.codec)
            .map_err(|e| Error::DataIntegrity {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok((data, entry.metadata))
    }

    async fn discard_corrupted(&self, key: &str, error: &Error) {
        self.counters
            .corrupted_entries
            .fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, error = %error, "Corrupted cache entry, removing");
        let _ = self.call("delete", self.backend.delete(&[key.to_string()])).await;
        self.removed_from_l2(|l1| l1.remove(key));
    }

    /// Bump the removal epoch, then purge L1; call after the L2 delete
    fn removed_from_l2<R: Default>(&self, purge: impl FnOnce(&L1Cache) -> R) -> R {
        self.removal_epoch.fetch_add(1, Ordering::SeqCst);
        self.l1.as_ref().map(purge).unwrap_or_default()
    }

    /// Whether a key exists in either tier
    pub async fn exists(&self, key: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        if self.l1.as_ref().is_some_and(|l1| l1.contains(key)) {
            return true;
        }
        self.call("exists", self.backend.exists(key))
            .await
            .unwrap_or(false)
    }

    /// Remaining TTL of a key
    pub async fn get_ttl(&self, key: &str) -> Option<Duration> {
        if !self.is_connected() {
            return None;
        }
        if let Some(entry) = self.l1.as_ref().and_then(|l1| l1.get(key)) {
            if let Some(remaining) = entry.remaining_ttl() {
                return Some(remaining);
            }
        }
        self.call("ttl", self.backend.ttl(key)).await.ok().flatten()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a value with the default (or given) TTL
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        self.set_with(
            key,
            value,
            SetOptions {
                ttl,
                ..Default::default()
            },
        )
        .await
    }

    /// Store a value
    pub async fn set_with<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: SetOptions) -> bool {
        let started = Instant::now();
        if !self.is_connected() {
            return self.set_failed(key, "cache not connected");
        }

        let serialized = match serde_json::to_vec(value) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => return self.set_failed(key, &format!("serialization failed: {}", e)),
        };

        let ttl = options
            .ttl
            .unwrap_or(self.config.default_ttl)
            .clamp(Duration::from_secs(1), Duration::from_secs(MAX_ENTRY_TTL_SECS));
        let metadata = options
            .attributes
            .into_iter()
            .fold(EntryMetadata::new(ttl), |m, (k, v)| m.with_attribute(k, v));

        let compressed = self.compression.compress(&serialized);
        if compressed.is_compressed() {
            self.monitor.record_compression(
                compressed.original_size,
                compressed.data.len() as u64,
                compressed.elapsed,
                compressed.algorithm.name(),
            );
        }

        let entry = CacheEntry {
            key: key.to_string(),
            payload: compressed.data,
            codec: compressed.algorithm,
            original_size: compressed.original_size,
            metadata,
        };
        let encoded = match entry.encode() {
            Ok(encoded) => encoded,
            Err(e) => return self.set_failed(key, &e.to_string()),
        };

        if self.call("set", self.backend.set(key, encoded, ttl)).await.is_err() {
            return self.set_failed(key, "backend write failed");
        }

        if let Some(l1) = &self.l1 {
            if options.write_l1 {
                l1.put(key, L1Entry::new(serialized, entry.metadata, ttl));
            } else {
                // A re-set must not leave a stale copy behind
                l1.remove(key);
            }
        }

        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.monitor
            .record_operation("set", started.elapsed(), None);
        self.callbacks
            .emit(&EventContext::for_key(CacheEvent::SetSuccess, key));
        true
    }

    fn set_failed(&self, key: &str, reason: &str) -> bool {
        self.counters.set_failures.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, reason, "Cache write skipped");
        self.callbacks
            .emit(&EventContext::for_key(CacheEvent::SetFailure, key));
        false
    }

    /// Remove a key from both tiers
    pub async fn delete(&self, key: &str) -> bool {
        if !self.is_connected() {
            return false;
        }
        let started = Instant::now();
        let result = self
            .call("delete", self.backend.delete(&[key.to_string()]))
            .await;
        let in_l1 = self.removed_from_l2(|l1| l1.remove(key));
        let removed = match result {
            Ok(n) => n > 0 || in_l1,
            Err(_) => return false,
        };
        self.monitor
            .record_operation("delete", started.elapsed(), None);
        if removed {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
            self.callbacks
                .emit(&EventContext::for_key(CacheEvent::DeleteSuccess, key));
        }
        removed
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Remove every key matching a glob pattern; returns the number removed
    pub async fn invalidate_pattern(&self, pattern: &str, reason: Option<&str>) -> u64 {
        if !self.is_connected() {
            return 0;
        }
        let started = Instant::now();

        let mut matched: HashSet<String> = HashSet::new();
        let mut cursor = 0u64;
        loop {
            let page = match self
                .call("scan", self.backend.scan(cursor, pattern, self.config.scan_count))
                .await
            {
                Ok(page) => page,
                Err(_) => break,
            };
            matched.extend(page.keys);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }

        let keys: Vec<String> = matched.into_iter().collect();
        let batch_size = self.config.delete_batch_size.max(1);
        let deleted: u64 = stream::iter(keys.chunks(batch_size))
            .map(|batch| self.call("delete", self.backend.delete(batch)))
            .buffer_unordered(self.config.delete_concurrency.max(1))
            .filter_map(|result| async move { result.ok() })
            .fold(0u64, |acc, n| async move { acc + n })
            .await;

        let from_l1 = self.removed_from_l2(|l1| l1.remove_matching(pattern) as u64);
        let removed = deleted.max(from_l1);

        self.monitor
            .record_invalidation(pattern, removed, started.elapsed(), reason);
        info!(pattern, removed, reason = reason.unwrap_or("unspecified"), "Cache invalidated");
        self.callbacks.emit(&EventContext {
            event: CacheEvent::Invalidate,
            key: Some(pattern.to_string()),
            tier: None,
            affected: Some(removed),
            state: None,
        });
        removed
    }

    /// Remove every key in the store
    pub async fn invalidate_all(&self, reason: Option<&str>) -> u64 {
        let removed = self.invalidate_pattern("*", reason).await;
        self.clear_l1();
        removed
    }

    /// Drop every L1 entry
    pub fn clear_l1(&self) {
        if let Some(l1) = &self.l1 {
            l1.clear();
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Counter snapshot
    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            l1_hits: c.l1_hits.load(Ordering::Relaxed),
            l2_hits: c.l2_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            sets: c.sets.load(Ordering::Relaxed),
            set_failures: c.set_failures.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            backend_errors: c.backend_errors.load(Ordering::Relaxed),
            corrupted_entries: c.corrupted_entries.load(Ordering::Relaxed),
        }
    }

    /// Record an L1 memory snapshot in the monitor
    pub fn sample_memory(&self) -> AlertLevel {
        let backend_entries = self.backend.stats().entries.unwrap_or(0);
        let sample = match &self.l1 {
            Some(l1) => MemorySample {
                l1_entries: l1.len() as u64,
                l1_bytes: l1.size_bytes(),
                l1_max_entries: l1.max_entries() as u64,
                backend_entries,
            },
            None => MemorySample {
                backend_entries,
                ..Default::default()
            },
        };
        self.monitor.record_memory_usage(sample)
    }

    /// Status report
    pub fn status(&self) -> CacheStatus {
        let state = self.state();
        CacheStatus {
            state,
            health: HealthStatus::from(state),
            backend: self.backend.name().to_string(),
            l1_enabled: self.l1.is_some(),
            l1: self.l1.as_ref().map(L1Cache::stats),
            backend_stats: self.backend.stats(),
            stats: self.stats(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{InMemoryBackend, ScanPage};
    use crate::cache::compression::CompressionAlgorithm;
    use crate::monitoring::performance::MonitorConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    /// Holds the next `get` after reading until released
    #[derive(Default)]
    struct GatedBackend {
        inner: InMemoryBackend,
        armed: AtomicBool,
        reached: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CacheBackend for GatedBackend {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }

        async fn get(&self, key: &str) -> Result<Option<Bytes>> {
            let value = self.inner.get(key).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            Ok(value)
        }

        async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, keys: &[String]) -> Result<u64> {
            self.inner.delete(keys).await
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
            self.inner.ttl(key).await
        }

        async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
            self.inner.scan(cursor, pattern, count).await
        }

        fn stats(&self) -> BackendStats {
            self.inner.stats()
        }
    }

    fn envelope(payload: &'static [u8], ttl_secs: u64) -> Bytes {
        let mut metadata = EntryMetadata::new(Duration::from_secs(60));
        metadata.ttl_secs = ttl_secs;
        CacheEntry {
            key: "k".into(),
            payload: Bytes::from_static(payload),
            codec: CompressionAlgorithm::None,
            original_size: payload.len() as u64,
            metadata,
        }
        .encode()
        .unwrap()
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            operation_timeout: Duration::from_millis(200),
            connect_retries: 1,
            retry_backoff: Duration::from_millis(5),
            compression: CompressionConfig {
                threshold_bytes: 64,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn connected(config: EngineConfig) -> (TieredCache, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = TieredCache::new(
            backend.clone(),
            config,
            Arc::new(PerformanceMonitor::new(MonitorConfig::default())),
        );
        assert!(cache.connect().await);
        (cache, backend)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (cache, _) = connected(fast_config()).await;
        assert!(cache.set("k", &vec!["a", "b"], None).await);

        let value: Option<Vec<String>> = cache.get("k").await;
        assert_eq!(value, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(cache.stats().l1_hits, 1);
    }

    #[tokio::test]
    async fn test_l2_hit_promotes_into_l1() {
        let (cache, _) = connected(fast_config()).await;
        assert!(
            cache
                .set_with(
                    "k",
                    "value",
                    SetOptions {
                        write_l1: false,
                        ..SetOptions::with_ttl(Duration::from_secs(60))
                    }
                )
                .await
        );
        assert!(!cache.l1().unwrap().contains("k"));

        let hit = cache.get_with::<String, _>("k", |_| true).await.unwrap();
        assert_eq!(hit.source, HitSource::L2);
        assert!(cache.l1().unwrap().contains("k"));

        let hit = cache.get_with::<String, _>("k", |_| true).await.unwrap();
        assert_eq!(hit.source, HitSource::L1);
    }

    #[tokio::test]
    async fn test_promotion_predicate_can_refuse() {
        let (cache, _) = connected(fast_config()).await;
        cache
            .set_with("k", "v", SetOptions { write_l1: false, ..Default::default() })
            .await;
        let hit = cache.get_with::<String, _>("k", |_| false).await.unwrap();
        assert_eq!(hit.source, HitSource::L2);
        assert!(!cache.l1().unwrap().contains("k"));
    }

    #[tokio::test]
    async fn test_large_values_are_compressed_and_recorded() {
        let (cache, backend) = connected(fast_config()).await;
        let text = "repetitive payload ".repeat(200);
        assert!(cache.set("big", &text, None).await);

        let raw = backend.get("big").await.unwrap().unwrap();
        let entry = CacheEntry::decode("big", raw).unwrap();
        assert!(entry.compressed());
        assert!(entry.size_bytes() < entry.original_size);
        assert_eq!(cache.monitor().compression_stats().count, 1);

        cache.clear_l1();
        let value: Option<String> = cache.get("big").await;
        assert_eq!(value, Some(text));
    }

    #[tokio::test]
    async fn test_disconnected_engine_misses_and_refuses_writes() {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = TieredCache::new(
            backend,
            fast_config(),
            Arc::new(PerformanceMonitor::default()),
        );
        assert_eq!(cache.state(), ConnectionState::Disconnected);
        assert!(!cache.set("k", "v", None).await);
        assert!(cache.get::<String>("k").await.is_none());
        assert!(!cache.delete("k").await);
        assert_eq!(cache.invalidate_pattern("*", None).await, 0);
    }

    #[tokio::test]
    async fn test_runtime_failure_degrades_until_reconnect() {
        let (cache, backend) = connected(fast_config()).await;
        cache
            .set_with("k", "v", SetOptions { write_l1: false, ..Default::default() })
            .await;

        backend.set_available(false);
        assert!(cache.get::<String>("k").await.is_none());
        assert_eq!(cache.state(), ConnectionState::Degraded);
        assert!(!cache.set("k2", "v", None).await);
        assert!(!cache.connect().await);
        assert_eq!(cache.state(), ConnectionState::Degraded);

        backend.set_available(true);
        assert!(cache.connect().await);
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_into_degraded() {
        let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(100)));
        let cache = TieredCache::new(
            backend,
            EngineConfig {
                operation_timeout: Duration::from_millis(20),
                connect_retries: 0,
                ..Default::default()
            },
            Arc::new(PerformanceMonitor::default()),
        );
        assert!(!cache.connect().await);
        assert_eq!(cache.state(), ConnectionState::Degraded);
        assert_eq!(cache.status().health, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_removed() {
        let (cache, backend) = connected(fast_config()).await;
        backend.insert_raw("bad", Bytes::from_static(b"garbage"), Duration::from_secs(60));

        assert!(cache.get::<String>("bad").await.is_none());
        assert!(!backend.exists("bad").await.unwrap());
        assert_eq!(cache.stats().corrupted_entries, 1);
        assert!(cache.is_connected());
    }

    #[tokio::test]
    async fn test_entry_with_unrepresentable_ttl_is_removed() {
        let (cache, backend) = connected(fast_config()).await;
        for (i, ttl_secs) in [i64::MAX as u64, u64::MAX].into_iter().enumerate() {
            let key = format!("ttl{}", i);
            backend.insert_raw(key.as_str(), envelope(b"42", ttl_secs), Duration::from_secs(60));

            assert_eq!(cache.get::<u32>(&key).await, None);
            assert!(!backend.exists(&key).await.unwrap());
            assert!(!cache.l1().unwrap().contains(&key));
        }
        assert_eq!(cache.stats().corrupted_entries, 2);
        assert!(cache.is_connected());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss_not_corruption() {
        let (cache, backend) = connected(fast_config()).await;
        cache
            .set_with("k", "text", SetOptions { write_l1: false, ..Default::default() })
            .await;

        assert_eq!(cache.get::<u32>("k").await, None);
        assert!(backend.exists("k").await.unwrap());
        assert_eq!(cache.stats().corrupted_entries, 0);
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("text"));

        backend.insert_raw("junk", envelope(b"{not json", 60), Duration::from_secs(60));
        assert_eq!(cache.get::<u32>("junk").await, None);
        assert!(!backend.exists("junk").await.unwrap());
        assert_eq!(cache.stats().corrupted_entries, 1);
    }

    #[tokio::test]
    async fn test_read_racing_delete_does_not_repopulate_l1() {
        let backend = Arc::new(GatedBackend::default());
        let cache = Arc::new(TieredCache::new(
            backend.clone(),
            fast_config(),
            Arc::new(PerformanceMonitor::default()),
        ));
        assert!(cache.connect().await);
        cache
            .set_with("k", "v", SetOptions { write_l1: false, ..Default::default() })
            .await;

        backend.armed.store(true, Ordering::SeqCst);
        let reader = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_with::<String, _>("k", |_| true).await }
        });
        backend.reached.notified().await;
        assert!(cache.delete("k").await);
        backend.release.notify_one();

        let hit = reader.await.unwrap().unwrap();
        assert_eq!(hit.source, HitSource::L2);
        assert!(!cache.l1().unwrap().contains("k"));
        assert_eq!(cache.get::<String>("k").await, None);
    }

    #[tokio::test]
    async fn test_exists_ttl_delete() {
        let (cache, _) = connected(fast_config()).await;
        cache.set("k", "v", Some(Duration::from_secs(30))).await;

        assert!(cache.exists("k").await);
        let ttl = cache.get_ttl("k").await.unwrap();
        assert!(ttl <= Duration::from_secs(30) && ttl > Duration::from_secs(25));

        assert!(cache.delete("k").await);
        assert!(!cache.exists("k").await);
        assert!(cache.get_ttl("k").await.is_none());
        assert!(!cache.delete("k").await);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_across_tiers() {
        let (cache, backend) = connected(EngineConfig {
            scan_count: 7,
            delete_batch_size: 3,
            ..fast_config()
        })
        .await;
        for i in 0..20 {
            cache.set(&format!("user:{}", i), &i, None).await;
            cache.set(&format!("post:{}", i), &i, None).await;
        }

        let removed = cache.invalidate_pattern("user:*", Some("test")).await;
        assert_eq!(removed, 20);
        assert_eq!(backend.len(), 20);
        assert!(cache.get::<u32>("user:3").await.is_none());
        assert_eq!(cache.get::<u32>("post:3").await, Some(3));

        let stats = cache.monitor().invalidation_stats();
        assert_eq!(stats.total_invalidations, 1);
        assert_eq!(stats.by_reason.get("test"), Some(&1));
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let (cache, backend) = connected(fast_config()).await;
        for i in 0..5 {
            cache.set(&format!("k{}", i), &i, None).await;
        }
        assert_eq!(cache.invalidate_all(None).await, 5);
        assert!(backend.is_empty());
        assert!(cache.l1().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_callbacks_fire_for_hits_misses_and_state() {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = TieredCache::new(backend, fast_config(), Arc::new(PerformanceMonitor::default()));
        let hits = Arc::new(AtomicUsize::new(0));
        let misses = Arc::new(AtomicUsize::new(0));
        let states = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        cache.callbacks().register(CacheEvent::GetHit, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let m = misses.clone();
        cache.callbacks().register(CacheEvent::GetMiss, move |_| {
            m.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let s = states.clone();
        cache.callbacks().register(CacheEvent::StateChange, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        cache.callbacks().register(CacheEvent::SetSuccess, |_| panic!("boom"));

        assert!(cache.connect().await);
        assert!(cache.set("k", "v", None).await);
        cache.get::<String>("k").await;
        cache.get::<String>("missing").await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
        // Disconnected -> Connecting -> Connected
        assert_eq!(states.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_l1_disabled() {
        let (cache, _) = connected(EngineConfig {
            l1_enabled: false,
            ..fast_config()
        })
        .await;
        assert!(cache.l1().is_none());
        cache.set("k", "v", None).await;
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));
        assert_eq!(cache.stats().l2_hits, 1);
        assert!(!cache.status().l1_enabled);
    }

    #[tokio::test]
    async fn test_status_and_memory_sample() {
        let (cache, _) = connected(fast_config()).await;
        cache.set("k", "v", None).await;
        assert_eq!(cache.sample_memory(), AlertLevel::Normal);

        let status = cache.status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.health, HealthStatus::Healthy);
        assert_eq!(status.backend, "memory");
        assert_eq!(status.l1.unwrap().entries, 1);
        assert_eq!(cache.monitor().memory_stats().samples, 1);
    }
}
