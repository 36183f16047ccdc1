//! Performance Monitor
//!
//! Bounded, time-windowed measurements shared by the key generator, the tiered
//! engine and the AI layer. Every stream is independent and pruned by age and
//! count; all derived statistics fall back to zeroed defaults on empty streams.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use super::stream::{BoundedStream, Timestamped};

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Maximum age of a retained measurement
    pub retention: Duration,
    /// Hard cap per stream
    pub max_measurements: usize,
    /// Key generation slower than this is logged
    pub slow_key_generation: Duration,
    /// Invalidations per window that raise a warning
    pub invalidation_rate_warning: u64,
    /// Invalidations per window that raise a critical alert
    pub invalidation_rate_critical: u64,
    /// Window used for the invalidation rate (one hour)
    pub invalidation_window: Duration,
    /// L1 memory that raises a warning
    pub memory_warning_bytes: u64,
    /// L1 memory that raises a critical alert
    pub memory_critical_bytes: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(3600),
            max_measurements: 1000,
            slow_key_generation: Duration::from_millis(100),
            invalidation_rate_warning: 20,
            invalidation_rate_critical: 50,
            invalidation_window: Duration::from_secs(3600),
            memory_warning_bytes: 50 * 1024 * 1024,
            memory_critical_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Alert level derived from a threshold pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    fn from_thresholds(value: u64, warning: u64, critical: u64) -> Self {
        if value >= critical {
            AlertLevel::Critical
        } else if value >= warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// Timing of a single operation
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetric {
    pub operation: String,
    pub duration_ms: f64,
    /// Cache outcome for lookups, `None` for writes
    pub hit: Option<bool>,
    pub text_length: Option<usize>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    recorded_at: Instant,
}

/// Outcome of compressing one payload
#[derive(Debug, Clone, Serialize)]
pub struct CompressionMetric {
    pub original_size: u64,
    pub compressed_size: u64,
    /// compressed / original (lower is better)
    pub ratio: f64,
    pub duration_ms: f64,
    pub algorithm: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    recorded_at: Instant,
}

/// Point-in-time memory usage of the in-process tier
#[derive(Debug, Clone, Serialize)]
pub struct MemoryUsageMetric {
    pub l1_entries: u64,
    pub l1_bytes: u64,
    pub l1_max_entries: u64,
    pub backend_entries: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    recorded_at: Instant,
}

/// One pattern invalidation
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationEvent {
    pub pattern: String,
    pub keys_invalidated: u64,
    pub duration_ms: f64,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    recorded_at: Instant,
}

impl Timestamped for PerformanceMetric {
    fn recorded_at(&self) -> Instant {
        self.recorded_at
    }
}

impl Timestamped for CompressionMetric {
    fn recorded_at(&self) -> Instant {
        self.recorded_at
    }
}

impl Timestamped for MemoryUsageMetric {
    fn recorded_at(&self) -> Instant {
        self.recorded_at
    }
}

impl Timestamped for InvalidationEvent {
    fn recorded_at(&self) -> Instant {
        self.recorded_at
    }
}

/// Input for [`PerformanceMonitor::record_memory_usage`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySample {
    pub l1_entries: u64,
    pub l1_bytes: u64,
    pub l1_max_entries: u64,
    pub backend_entries: u64,
}

// =============================================================================
// Derived statistics
// =============================================================================

/// Key generation timing summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyGenerationStats {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub slow_count: usize,
    pub avg_text_length: f64,
}

/// Latency summary for one named operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub hits: u64,
    pub misses: u64,
}

impl OperationStats {
    /// Hit rate over the lookups of this operation
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }
}

/// Compression ratio histogram (ratio = compressed / original)
#[derive(Debug, Clone, Default, Serialize)]
pub struct RatioDistribution {
    /// ratio < 0.25
    pub excellent: usize,
    /// 0.25 <= ratio < 0.5
    pub good: usize,
    /// 0.5 <= ratio < 0.75
    pub fair: usize,
    /// ratio >= 0.75
    pub poor: usize,
}

/// Compression summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionStats {
    pub count: usize,
    pub avg_ratio: f64,
    pub best_ratio: f64,
    pub worst_ratio: f64,
    pub total_original_bytes: u64,
    pub total_compressed_bytes: u64,
    pub bytes_saved: u64,
    pub avg_duration_ms: f64,
    pub distribution: RatioDistribution,
}

/// Memory summary
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub latest: Option<MemoryUsageMetric>,
    pub peak_l1_bytes: u64,
    pub samples: usize,
    pub alert: AlertLevel,
}

/// Invalidation summary
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationStats {
    /// Lifetime invalidation count
    pub total_invalidations: u64,
    /// Lifetime keys removed
    pub total_keys_invalidated: u64,
    /// Invalidations inside the rate window
    pub invalidations_last_hour: u64,
    pub alert: AlertLevel,
    pub warning_threshold: u64,
    pub critical_threshold: u64,
    pub by_pattern: BTreeMap<String, u64>,
    pub by_reason: BTreeMap<String, u64>,
    pub recent: Vec<InvalidationEvent>,
}

/// Full monitor summary
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub hit_rate: f64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub key_generation: KeyGenerationStats,
    pub operations: BTreeMap<String, OperationStats>,
    pub compression: CompressionStats,
    pub memory: MemoryStats,
    pub invalidation: InvalidationStats,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// Monitor
// =============================================================================

/// Number of recent invalidations carried in summaries
const RECENT_INVALIDATIONS: usize = 10;

/// Shared performance monitor
pub struct PerformanceMonitor {
    config: MonitorConfig,
    key_generation: BoundedStream<PerformanceMetric>,
    operations: BoundedStream<PerformanceMetric>,
    compression: BoundedStream<CompressionMetric>,
    memory: BoundedStream<MemoryUsageMetric>,
    invalidations: BoundedStream<InvalidationEvent>,
    hits: AtomicU64,
    misses: AtomicU64,
    total_invalidations: AtomicU64,
    total_keys_invalidated: AtomicU64,
}

impl PerformanceMonitor {
    /// Create a monitor with the given configuration
    pub fn new(config: MonitorConfig) -> Self {
        let (cap, retention) = (config.max_measurements, config.retention);
        // The rate window and the critical threshold must fit in the stream
        let critical = usize::try_from(config.invalidation_rate_critical).unwrap_or(usize::MAX);
        let invalidation_cap = cap.max(critical);
        let invalidation_retention = retention.max(config.invalidation_window);
        Self {
            key_generation: BoundedStream::new(cap, retention),
            operations: BoundedStream::new(cap, retention),
            compression: BoundedStream::new(cap, retention),
            memory: BoundedStream::new(cap, retention),
            invalidations: BoundedStream::new(invalidation_cap, invalidation_retention),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            total_invalidations: AtomicU64::new(0),
            total_keys_invalidated: AtomicU64::new(0),
            config,
        }
    }

    /// Monitor configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record how long one key took to build
    pub fn record_key_generation(&self, duration: Duration, text_length: usize, operation: &str) {
        self.key_generation.push(PerformanceMetric {
            operation: operation.to_string(),
            duration_ms: millis(duration),
            hit: None,
            text_length: Some(text_length),
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        });
    }

    /// Record an operation latency; `hit` is set for lookups
    pub fn record_operation(&self, operation: &str, duration: Duration, hit: Option<bool>) {
        match hit {
            Some(true) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            Some(false) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
        self.operations.push(PerformanceMetric {
            operation: operation.to_string(),
            duration_ms: millis(duration),
            hit,
            text_length: None,
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        });
    }

    /// Record a latency sample that does not count towards the global hit rate
    pub fn record_timing(&self, operation: &str, duration: Duration, text_length: Option<usize>) {
        self.operations.push(PerformanceMetric {
            operation: operation.to_string(),
            duration_ms: millis(duration),
            hit: None,
            text_length,
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        });
    }

    /// Record one compression
    pub fn record_compression(
        &self,
        original_size: u64,
        compressed_size: u64,
        duration: Duration,
        algorithm: &str,
    ) {
        let ratio = if original_size == 0 {
            1.0
        } else {
            compressed_size as f64 / original_size as f64
        };
        self.compression.push(CompressionMetric {
            original_size,
            compressed_size,
            ratio,
            duration_ms: millis(duration),
            algorithm: algorithm.to_string(),
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        });
    }

    /// Record a memory snapshot and return its alert level
    pub fn record_memory_usage(&self, sample: MemorySample) -> AlertLevel {
        self.memory.push(MemoryUsageMetric {
            l1_entries: sample.l1_entries,
            l1_bytes: sample.l1_bytes,
            l1_max_entries: sample.l1_max_entries,
            backend_entries: sample.backend_entries,
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        });

        let level = AlertLevel::from_thresholds(
            sample.l1_bytes,
            self.config.memory_warning_bytes,
            self.config.memory_critical_bytes,
        );
        match level {
            AlertLevel::Critical => error!(
                l1_bytes = sample.l1_bytes,
                threshold = self.config.memory_critical_bytes,
                "CRITICAL: L1 cache memory usage above critical threshold"
            ),
            AlertLevel::Warning => warn!(
                l1_bytes = sample.l1_bytes,
                threshold = self.config.memory_warning_bytes,
                "L1 cache memory usage above warning threshold"
            ),
            AlertLevel::Normal => {}
        }
        level
    }

    /// Record a pattern invalidation and return the resulting frequency alert
    pub fn record_invalidation(
        &self,
        pattern: &str,
        keys_invalidated: u64,
        duration: Duration,
        reason: Option<&str>,
    ) -> AlertLevel {
        self.total_invalidations.fetch_add(1, Ordering::Relaxed);
        self.total_keys_invalidated
            .fetch_add(keys_invalidated, Ordering::Relaxed);
        self.invalidations.push(InvalidationEvent {
            pattern: pattern.to_string(),
            keys_invalidated,
            duration_ms: millis(duration),
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
            recorded_at: Instant::now(),
        });

        let rate = self.invalidation_rate();
        let level = self.invalidation_alert(rate);
        match level {
            AlertLevel::Critical => error!(
                pattern,
                rate,
                threshold = self.config.invalidation_rate_critical,
                "CRITICAL: cache invalidation frequency above critical threshold"
            ),
            AlertLevel::Warning => warn!(
                pattern,
                rate,
                threshold = self.config.invalidation_rate_warning,
                "Cache invalidation frequency above warning threshold"
            ),
            AlertLevel::Normal => {}
        }
        level
    }

    /// Invalidations inside the rate window
    pub fn invalidation_rate(&self) -> u64 {
        self.invalidations
            .count_since(self.config.invalidation_window) as u64
    }

    fn invalidation_alert(&self, rate: u64) -> AlertLevel {
        AlertLevel::from_thresholds(
            rate,
            self.config.invalidation_rate_warning,
            self.config.invalidation_rate_critical,
        )
    }

    /// hits / (hits + misses), 0.0 before any lookup
    pub fn hit_rate(&self) -> f64 {
        ratio(self.total_hits(), self.total_hits() + self.total_misses())
    }

    /// Lifetime hits
    pub fn total_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lifetime misses
    pub fn total_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Key generation statistics
    pub fn key_generation_stats(&self) -> KeyGenerationStats {
        let samples = self.key_generation.snapshot();
        if samples.is_empty() {
            return KeyGenerationStats::default();
        }

        let mut durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        durations.sort_by(f64::total_cmp);
        let slow_ms = millis(self.config.slow_key_generation);
        let total_text: usize = samples.iter().filter_map(|s| s.text_length).sum();

        KeyGenerationStats {
            count: samples.len(),
            avg_ms: mean(&durations),
            p50_ms: percentile(&durations, 50.0),
            p95_ms: percentile(&durations, 95.0),
            max_ms: durations.last().copied().unwrap_or_default(),
            slow_count: durations.iter().filter(|d| **d > slow_ms).count(),
            avg_text_length: total_text as f64 / samples.len() as f64,
        }
    }

    /// Latency statistics per operation name
    pub fn operation_stats(&self) -> BTreeMap<String, OperationStats> {
        let mut grouped: BTreeMap<String, (Vec<f64>, u64, u64)> = BTreeMap::new();
        for sample in self.operations.snapshot() {
            let slot = grouped.entry(sample.operation).or_default();
            slot.0.push(sample.duration_ms);
            match sample.hit {
                Some(true) => slot.1 += 1,
                Some(false) => slot.2 += 1,
                None => {}
            }
        }

        grouped
            .into_iter()
            .map(|(name, (mut durations, hits, misses))| {
                durations.sort_by(f64::total_cmp);
                let stats = OperationStats {
                    count: durations.len(),
                    avg_ms: mean(&durations),
                    p50_ms: percentile(&durations, 50.0),
                    p95_ms: percentile(&durations, 95.0),
                    p99_ms: percentile(&durations, 99.0),
                    max_ms: durations.last().copied().unwrap_or_default(),
                    hits,
                    misses,
                };
                (name, stats)
            })
            .collect()
    }

    /// Compression ratio statistics
    pub fn compression_stats(&self) -> CompressionStats {
        let samples = self.compression.snapshot();
        if samples.is_empty() {
            return CompressionStats::default();
        }

        let mut distribution = RatioDistribution::default();
        for sample in &samples {
            match sample.ratio {
                r if r < 0.25 => distribution.excellent += 1,
                r if r < 0.5 => distribution.good += 1,
                r if r < 0.75 => distribution.fair += 1,
                _ => distribution.poor += 1,
            }
        }

        let ratios: Vec<f64> = samples.iter().map(|s| s.ratio).collect();
        let durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        let total_original: u64 = samples.iter().map(|s| s.original_size).sum();
        let total_compressed: u64 = samples.iter().map(|s| s.compressed_size).sum();

        CompressionStats {
            count: samples.len(),
            avg_ratio: mean(&ratios),
            best_ratio: ratios.iter().copied().fold(f64::INFINITY, f64::min),
            worst_ratio: ratios.iter().copied().fold(0.0, f64::max),
            total_original_bytes: total_original,
            total_compressed_bytes: total_compressed,
            bytes_saved: total_original.saturating_sub(total_compressed),
            avg_duration_ms: mean(&durations),
            distribution,
        }
    }

    /// Memory statistics
    pub fn memory_stats(&self) -> MemoryStats {
        let samples = self.memory.snapshot();
        let latest = samples.last().cloned();
        let alert = latest
            .as_ref()
            .map(|m| {
                AlertLevel::from_thresholds(
                    m.l1_bytes,
                    self.config.memory_warning_bytes,
                    self.config.memory_critical_bytes,
                )
            })
            .unwrap_or(AlertLevel::Normal);

        MemoryStats {
            peak_l1_bytes: samples.iter().map(|m| m.l1_bytes).max().unwrap_or(0),
            samples: samples.len(),
            latest,
            alert,
        }
    }

    /// Invalidation statistics
    pub fn invalidation_stats(&self) -> InvalidationStats {
        let events = self.invalidations.snapshot();
        let mut by_pattern = BTreeMap::new();
        let mut by_reason = BTreeMap::new();
        for event in &events {
            *by_pattern.entry(event.pattern.clone()).or_insert(0) += 1;
            let reason = event.reason.clone().unwrap_or_else(|| "unspecified".into());
            *by_reason.entry(reason).or_insert(0) += 1;
        }

        let rate = self.invalidation_rate();
        let skip = events.len().saturating_sub(RECENT_INVALIDATIONS);

        InvalidationStats {
            total_invalidations: self.total_invalidations.load(Ordering::Relaxed),
            total_keys_invalidated: self.total_keys_invalidated.load(Ordering::Relaxed),
            invalidations_last_hour: rate,
            alert: self.invalidation_alert(rate),
            warning_threshold: self.config.invalidation_rate_warning,
            critical_threshold: self.config.invalidation_rate_critical,
            by_pattern,
            by_reason,
            recent: events.into_iter().skip(skip).collect(),
        }
    }

    /// Everything at once
    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            hit_rate: self.hit_rate(),
            total_hits: self.total_hits(),
            total_misses: self.total_misses(),
            key_generation: self.key_generation_stats(),
            operations: self.operation_stats(),
            compression: self.compression_stats(),
            memory: self.memory_stats(),
            invalidation: self.invalidation_stats(),
            generated_at: Utc::now(),
        }
    }

    /// Drop all measurements and counters
    pub fn reset(&self) {
        self.key_generation.clear();
        self.operations.clear();
        self.compression.clear();
        self.memory.clear();
        self.invalidations.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.total_invalidations.store(0, Ordering::Relaxed);
        self.total_keys_invalidated.store(0, Ordering::Relaxed);
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Nearest-rank percentile over an ascending slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

// =============================================================================
// Tests
// =============================================================================
