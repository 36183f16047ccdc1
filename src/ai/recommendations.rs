//! Tuning Recommendations
//!
//! Inspects accumulated statistics and emits ranked, human-readable advice.
//! Advisory only: nothing here changes configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metrics::AiMetricsSnapshot;
use super::operation::Operation;
use super::policy::PromotionPolicy;
use super::tiers::TextTier;
use crate::cache::ConnectionState;
use crate::monitoring::performance::{AlertLevel, OperationStats, PerformanceSummary};

/// Minimum lookups before hit-rate advice is given
const MIN_LOOKUPS: u64 = 10;
const LOW_HIT_RATE: f64 = 0.3;
const HIGH_HIT_RATE: f64 = 0.8;
const SLOW_P95_MS: f64 = 100.0;
const POOR_COMPRESSION_RATIO: f64 = 0.9;
/// TTL at which raising it further is not suggested
const MAX_SUGGESTED_TTL: u64 = 86400;

/// Recommendation priority, most urgent first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// One piece of advice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    /// Area concerned (connectivity, ttl, promotion, latency, ...)
    pub category: String,
    pub message: String,
}

impl Recommendation {
    fn new(priority: Priority, category: &str, message: String) -> Self {
        Self {
            priority,
            category: category.to_string(),
            message,
        }
    }
}

/// Everything the generator looks at
pub struct RecommendationInputs<'a> {
    pub state: ConnectionState,
    pub metrics: &'a AiMetricsSnapshot,
    pub performance: &'a PerformanceSummary,
    pub operation_ttls: &'a BTreeMap<Operation, u64>,
    pub default_ttl: u64,
    pub policy: &'a PromotionPolicy,
}

/// Produce recommendations, most urgent first
pub fn generate(inputs: &RecommendationInputs<'_>) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let metrics = inputs.metrics;
    let perf = inputs.performance;

    if inputs.state != ConnectionState::Connected {
        out.push(Recommendation::new(
            Priority::Critical,
            "connectivity",
            format!(
                "Cache is {}; every lookup misses until the backend is reachable and connect() succeeds",
                inputs.state
            ),
        ));
    }

    match perf.invalidation.alert {
        AlertLevel::Critical => out.push(Recommendation::new(
            Priority::Critical,
            "invalidation",
            format!(
                "{} invalidations in the last hour (critical threshold {}); invalidate by operation instead of broad patterns",
                perf.invalidation.invalidations_last_hour, perf.invalidation.critical_threshold
            ),
        )),
        AlertLevel::Warning => out.push(Recommendation::new(
            Priority::High,
            "invalidation",
            format!(
                "{} invalidations in the last hour (warning threshold {}); check for invalidation loops",
                perf.invalidation.invalidations_last_hour, perf.invalidation.warning_threshold
            ),
        )),
        AlertLevel::Normal => {}
    }

    match perf.memory.alert {
        AlertLevel::Critical => out.push(Recommendation::new(
            Priority::Critical,
            "memory",
            format!(
                "L1 holds {} bytes, above the critical threshold; lower l1 max size",
                perf.memory.peak_l1_bytes
            ),
        )),
        AlertLevel::Warning => out.push(Recommendation::new(
            Priority::High,
            "memory",
            format!(
                "L1 holds {} bytes, above the warning threshold",
                perf.memory.peak_l1_bytes
            ),
        )),
        AlertLevel::Normal => {}
    }

    let lookups = metrics.total_hits + metrics.total_misses;
    if lookups >= MIN_LOOKUPS && metrics.hit_rate < LOW_HIT_RATE {
        out.push(Recommendation::new(
            Priority::High,
            "hit_rate",
            format!(
                "Overall hit rate is {:.0}% over {} lookups; raise the default TTL or reduce option variability",
                metrics.hit_rate * 100.0,
                lookups
            ),
        ));
    }

    for (operation, counters) in &metrics.operations {
        if counters.lookups() < MIN_LOOKUPS {
            continue;
        }
        let ttl = inputs
            .operation_ttls
            .get(operation)
            .copied()
            .unwrap_or(inputs.default_ttl);
        if counters.hit_rate() >= HIGH_HIT_RATE && ttl < MAX_SUGGESTED_TTL {
            out.push(Recommendation::new(
                Priority::Medium,
                "ttl",
                format!(
                    "'{}' hits {:.0}% of the time with a TTL of {}s; a longer TTL is likely safe",
                    operation,
                    counters.hit_rate() * 100.0,
                    ttl
                ),
            ));
        }
        if counters.hit_rate() >= HIGH_HIT_RATE && !inputs.policy.is_stable(*operation) {
            let medium = metrics.tiers.get(&TextTier::Medium).copied().unwrap_or_default();
            if medium.hits > 0 {
                out.push(Recommendation::new(
                    Priority::Low,
                    "promotion",
                    format!(
                        "'{}' is reused heavily; classify it as stable so medium-tier results are promoted to L1",
                        operation
                    ),
                ));
            }
        }
    }

    for (name, stats) in slow_operations(&perf.operations) {
        out.push(Recommendation::new(
            Priority::Medium,
            "latency",
            format!(
                "'{}' p95 latency is {:.1}ms over {} samples",
                name, stats.p95_ms, stats.count
            ),
        ));
    }

    if perf.compression.count >= MIN_LOOKUPS as usize
        && perf.compression.avg_ratio > POOR_COMPRESSION_RATIO
    {
        out.push(Recommendation::new(
            Priority::Low,
            "compression",
            format!(
                "Average compression ratio is {:.2}; raise the compression threshold to skip payloads that barely shrink",
                perf.compression.avg_ratio
            ),
        ));
    }

    let stores: u64 = metrics.tiers.values().map(|c| c.stores).sum();
    let xlarge = metrics.tiers.get(&TextTier::Xlarge).map_or(0, |c| c.stores);
    if stores >= MIN_LOOKUPS && xlarge * 2 > stores {
        out.push(Recommendation::new(
            Priority::Low,
            "tiering",
            format!(
                "{} of {} stored responses are xlarge and bypass L1; review text_size_tiers",
                xlarge, stores
            ),
        ));
    }

    out.sort_by_key(|r| r.priority);
    out
}

fn slow_operations(
    operations: &BTreeMap<String, OperationStats>,
) -> impl Iterator<Item = (&String, &OperationStats)> {
    operations
        .iter()
        .filter(|(_, s)| s.count >= MIN_LOOKUPS as usize && s.p95_ms > SLOW_P95_MS)
}

// =============================================================================
// Tests
// =============================================================================
