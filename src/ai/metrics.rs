//! AI Cache Metrics
//!
//! Lock-free counters per size tier and per operation. Latency percentiles
//! live in the shared performance monitor; these counters answer "where do
//! hits and misses land".

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::operation::Operation;
use super::tiers::TextTier;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    promotions: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stores.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
    }
}

/// Counter values for one tier or operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub promotions: u64,
}

impl CounterSnapshot {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// AI-layer metrics collector
#[derive(Debug, Default)]
pub struct AiMetrics {
    tiers: [Counters; 4],
    operations: [Counters; 5],
}

fn tier_index(tier: TextTier) -> usize {
    match tier {
        TextTier::Small => 0,
        TextTier::Medium => 1,
        TextTier::Large => 2,
        TextTier::Xlarge => 3,
    }
}

fn operation_index(operation: Operation) -> usize {
    match operation {
        Operation::Summarize => 0,
        Operation::Sentiment => 1,
        Operation::KeyPoints => 2,
        Operation::Questions => 3,
        Operation::Qa => 4,
    }
}

impl AiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn both(&self, tier: TextTier, operation: Operation) -> [&Counters; 2] {
        [
            &self.tiers[tier_index(tier)],
            &self.operations[operation_index(operation)],
        ]
    }

    pub fn record_hit(&self, tier: TextTier, operation: Operation) {
        for c in self.both(tier, operation) {
            c.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_miss(&self, tier: TextTier, operation: Operation) {
        for c in self.both(tier, operation) {
            c.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_store(&self, tier: TextTier, operation: Operation) {
        for c in self.both(tier, operation) {
            c.stores.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_promotion(&self, tier: TextTier, operation: Operation) {
        for c in self.both(tier, operation) {
            c.promotions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counters for one tier
    pub fn tier(&self, tier: TextTier) -> CounterSnapshot {
        self.tiers[tier_index(tier)].snapshot()
    }

    /// Counters for one operation
    pub fn operation(&self, operation: Operation) -> CounterSnapshot {
        self.operations[operation_index(operation)].snapshot()
    }

    /// All counters
    pub fn snapshot(&self) -> AiMetricsSnapshot {
        let tiers: BTreeMap<TextTier, CounterSnapshot> =
            TextTier::ALL.iter().map(|t| (*t, self.tier(*t))).collect();
        let operations: BTreeMap<Operation, CounterSnapshot> = Operation::ALL
            .iter()
            .map(|o| (*o, self.operation(*o)))
            .collect();
        let hits: u64 = tiers.values().map(|c| c.hits).sum();
        let misses: u64 = tiers.values().map(|c| c.misses).sum();
        AiMetricsSnapshot {
            total_hits: hits,
            total_misses: misses,
            hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
            tiers,
            operations,
        }
    }

    pub fn reset(&self) {
        self.tiers.iter().chain(self.operations.iter()).for_each(Counters::reset);
    }
}

/// Serializable AI metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiMetricsSnapshot {
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub tiers: BTreeMap<TextTier, CounterSnapshot>,
    pub operations: BTreeMap<Operation, CounterSnapshot>,
}
