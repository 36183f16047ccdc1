//! AI Response Cache
//!
//! Decorates a [`TieredCache`] with text-size tiering, per-operation TTLs,
//! the L1 promotion policy and AI-specific metrics. Every call delegates to
//! the engine; nothing here talks to a backend directly.
//!
//! ```text
//!  cache_response ─▶ KeyGenerator ─▶ tier + TTL ─▶ TieredCache::set_with
//!  get_cached_response ─▶ KeyGenerator ─▶ TieredCache::get_with(promotion policy)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::metrics::{AiMetrics, AiMetricsSnapshot};
use super::operation::Operation;
use super::policy::PromotionPolicy;
use super::recommendations::{self, Recommendation, RecommendationInputs};
use super::tiers::{TextSizeTiers, TextTier};
use crate::cache::{CacheStatus, HitSource, SetOptions, TieredCache, ATTR_OPERATION, ATTR_TIER};
use crate::keys::{normalized_length, HashAlgorithm, KeyGenerator, KeyGeneratorConfig, KEY_PREFIX};
use crate::monitoring::health::{HealthCheckResult, HealthStatus};
use crate::monitoring::performance::{AlertLevel, PerformanceMonitor, PerformanceSummary};

/// Version of the stored [`CachedResponse`] layout
pub const SCHEMA_VERSION: u32 = 1;

/// AI layer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AiCacheConfig {
    /// TTL for operations without an entry in `operation_ttls`
    pub default_ttl: Duration,
    /// Per-operation TTL in seconds
    pub operation_ttls: BTreeMap<Operation, u64>,
    pub text_size_tiers: TextSizeTiers,
    pub text_hash_threshold: usize,
    pub hash_algorithm: HashAlgorithm,
    pub promotion: PromotionPolicy,
    /// Keys whose access counts are tracked at once
    pub max_tracked_keys: usize,
}

impl Default for AiCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            operation_ttls: Operation::ALL
                .iter()
                .map(|op| (*op, op.default_ttl_secs()))
                .collect(),
            text_size_tiers: TextSizeTiers::default(),
            text_hash_threshold: 1000,
            hash_algorithm: HashAlgorithm::Sha256,
            promotion: PromotionPolicy::default(),
            max_tracked_keys: 10_000,
        }
    }
}

impl AiCacheConfig {
    /// TTL applied to `operation`
    pub fn ttl_for(&self, operation: Operation) -> Duration {
        self.operation_ttls
            .get(&operation)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(self.default_ttl)
    }
}

/// Stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response: Value,
    pub operation: Operation,
    pub tier: TextTier,
    pub schema_version: u32,
    pub cached_at: DateTime<Utc>,
    pub text_length: usize,
}

/// Combined statistics
#[derive(Debug, Clone, Serialize)]
pub struct AiCacheStats {
    pub status: CacheStatus,
    pub ai: AiMetricsSnapshot,
    pub memory_alert: AlertLevel,
    pub tracked_keys: usize,
    pub operation_ttls: BTreeMap<Operation, u64>,
    pub text_size_tiers: TextSizeTiers,
}

/// Read-only snapshot for an external status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub status: CacheStatus,
    pub ai: AiMetricsSnapshot,
    pub performance: PerformanceSummary,
    pub recommendations: Vec<Recommendation>,
}

/// AI-aware cache over a shared engine
pub struct AiResponseCache {
    engine: Arc<TieredCache>,
    keys: KeyGenerator,
    config: AiCacheConfig,
    metrics: AiMetrics,
    access_counts: DashMap<String, u32>,
}

impl AiResponseCache {
    /// Wrap `engine`
    pub fn new(engine: Arc<TieredCache>, config: AiCacheConfig) -> Self {
        let keys = KeyGenerator::new(KeyGeneratorConfig {
            text_hash_threshold: config.text_hash_threshold,
            hash_algorithm: config.hash_algorithm,
            slow_threshold: engine.monitor().config().slow_key_generation,
            tiers: config.text_size_tiers,
            ..Default::default()
        })
        .with_monitor(engine.monitor().clone());

        Self {
            engine,
            keys,
            config,
            metrics: AiMetrics::new(),
            access_counts: DashMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<TieredCache> {
        &self.engine
    }

    pub fn config(&self) -> &AiCacheConfig {
        &self.config
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        &self.keys
    }

    pub fn metrics(&self) -> &AiMetrics {
        &self.metrics
    }

    fn monitor(&self) -> &Arc<PerformanceMonitor> {
        self.engine.monitor()
    }

    /// Bump and return the access count of `key`
    fn record_access(&self, key: &str) -> u32 {
        if self.access_counts.len() >= self.config.max_tracked_keys
            && !self.access_counts.contains_key(key)
        {
            let threshold = self.config.promotion.frequency_threshold;
            self.access_counts.retain(|_, count| *count >= threshold);
            if self.access_counts.len() >= self.config.max_tracked_keys {
                debug!(tracked = self.access_counts.len(), "Resetting access-frequency tracking");
                self.access_counts.clear();
            }
        }
        let mut count = self.access_counts.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    fn access_count(&self, key: &str) -> u32 {
        self.access_counts.get(key).map_or(0, |c| *c)
    }

    /// Store a response; returns whether it was written
    pub async fn cache_response(
        &self,
        text: &str,
        operation: Operation,
        options: Option<&Value>,
        response: &Value,
        question: Option<&str>,
    ) -> bool {
        let started = Instant::now();
        let key = self.keys.generate_cache_key(text, operation, options, question);
        let text_length = normalized_length(text);
        let tier = self.config.text_size_tiers.classify(text_length);
        let ttl = self.config.ttl_for(operation);

        let record = CachedResponse {
            response: response.clone(),
            operation,
            tier,
            schema_version: SCHEMA_VERSION,
            cached_at: Utc::now(),
            text_length,
        };
        let write_l1 = self
            .config
            .promotion
            .should_promote(tier, operation, self.access_count(&key));

        let stored = self
            .engine
            .set_with(
                &key,
                &record,
                SetOptions {
                    ttl: Some(ttl),
                    attributes: vec![
                        (ATTR_TIER.to_string(), tier.to_string()),
                        (ATTR_OPERATION.to_string(), operation.to_string()),
                    ],
                    write_l1,
                },
            )
            .await;

        if stored {
            self.metrics.record_store(tier, operation);
        }
        self.monitor().record_timing(
            &format!("cache_response:{}", operation),
            started.elapsed(),
            Some(text_length),
        );
        debug!(operation = %operation, tier = %tier, ttl_secs = ttl.as_secs(), stored, "AI response cached");
        stored
    }

    /// Look up a response
    pub async fn get_cached_response(
        &self,
        text: &str,
        operation: Operation,
        options: Option<&Value>,
        question: Option<&str>,
    ) -> Option<CachedResponse> {
        let started = Instant::now();
        let key = self.keys.generate_cache_key(text, operation, options, question);
        let text_length = normalized_length(text);
        let tier = self.config.text_size_tiers.classify(text_length);
        let count = self.record_access(&key);

        let policy = &self.config.promotion;
        let mut promoted = false;
        let hit = self
            .engine
            .get_with::<CachedResponse, _>(&key, |_| {
                promoted = policy.should_promote(tier, operation, count);
                promoted
            })
            .await;

        let result = match hit {
            Some(hit) if hit.value.schema_version != SCHEMA_VERSION => {
                debug!(key = %key, version = hit.value.schema_version, "Dropping record from another schema version");
                self.engine.delete(&key).await;
                None
            }
            Some(hit) => {
                if hit.source == HitSource::L2 && promoted {
                    self.metrics.record_promotion(tier, operation);
                }
                Some(hit.value)
            }
            None => None,
        };

        match &result {
            Some(_) => self.metrics.record_hit(tier, operation),
            None => self.metrics.record_miss(tier, operation),
        }
        self.monitor().record_timing(
            &format!("get_cached_response:{}", operation),
            started.elapsed(),
            Some(text_length),
        );
        result
    }

    /// Remove every entry of one operation
    pub async fn invalidate_by_operation(&self, operation: Operation, reason: Option<&str>) -> u64 {
        let prefix = format!("{}:op:{}|", KEY_PREFIX, operation);
        self.access_counts.retain(|k, _| !k.starts_with(&prefix));
        self.engine
            .invalidate_pattern(&format!("{}*", prefix), reason)
            .await
    }

    /// Remove every AI entry whose key contains `pattern`
    pub async fn invalidate_pattern(&self, pattern: &str, reason: Option<&str>) -> u64 {
        let glob = format!("{}:*{}*", KEY_PREFIX, pattern);
        self.access_counts
            .retain(|k, _| !crate::cache::glob_match(&glob, k));
        self.engine.invalidate_pattern(&glob, reason).await
    }

    /// Remove every AI entry
    pub async fn invalidate_all(&self, reason: Option<&str>) -> u64 {
        self.access_counts.clear();
        self.engine
            .invalidate_pattern(&format!("{}:*", KEY_PREFIX), reason)
            .await
    }

    /// Engine status plus AI counters; also samples L1 memory
    pub fn get_cache_stats(&self) -> AiCacheStats {
        let memory_alert = self.engine.sample_memory();
        AiCacheStats {
            status: self.engine.status(),
            ai: self.metrics.snapshot(),
            memory_alert,
            tracked_keys: self.access_counts.len(),
            operation_ttls: self.config.operation_ttls.clone(),
            text_size_tiers: self.config.text_size_tiers,
        }
    }

    pub fn get_performance_summary(&self) -> PerformanceSummary {
        self.monitor().summary()
    }

    /// Connection state and core counters
    pub fn status(&self) -> CacheStatus {
        self.engine.status()
    }

    /// Ranked tuning advice
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.recommendations_from(&self.metrics.snapshot(), &self.monitor().summary())
    }

    fn recommendations_from(
        &self,
        metrics: &AiMetricsSnapshot,
        performance: &PerformanceSummary,
    ) -> Vec<Recommendation> {
        recommendations::generate(&RecommendationInputs {
            state: self.engine.state(),
            metrics,
            performance,
            operation_ttls: &self.config.operation_ttls,
            default_ttl: self.config.default_ttl.as_secs(),
            policy: &self.config.promotion,
        })
    }

    /// Everything an external status endpoint serializes
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.engine.sample_memory();
        let ai = self.metrics.snapshot();
        let performance = self.monitor().summary();
        let recommendations = self.recommendations_from(&ai, &performance);
        MetricsSnapshot {
            generated_at: Utc::now(),
            status: self.engine.status(),
            ai,
            performance,
            recommendations,
        }
    }

    /// Probe the backend and report health
    pub async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let state = self.engine.state();
        let result = match HealthStatus::from(state) {
            HealthStatus::Healthy => {
                let timeout = self.engine.config().operation_timeout;
                match tokio::time::timeout(timeout, self.engine.backend().ping()).await {
                    Ok(Ok(())) => HealthCheckResult::healthy("ai_cache"),
                    Ok(Err(e)) => HealthCheckResult::degraded("ai_cache", e.to_string()),
                    Err(_) => HealthCheckResult::degraded("ai_cache", "backend ping timed out"),
                }
            }
            HealthStatus::Degraded => {
                HealthCheckResult::degraded("ai_cache", format!("cache is {}", state))
            }
            HealthStatus::Unhealthy => {
                HealthCheckResult::unhealthy("ai_cache", format!("cache is {}", state))
            }
        };
        result.with_duration(started.elapsed())
    }
}

// =============================================================================
// Tests
// =============================================================================
