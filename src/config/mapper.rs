//! Parameter Mapper
//!
//! Splits a unified [`CacheConfig`] into the generic half (engine, backend,
//! security, monitor) and the AI half, validating both. All problems are
//! collected before anything is returned; nothing here touches the network.
//!
//! ```text
//!  CacheConfig ─▶ validate ─▶ GenericParams ─▶ TieredCache
//!                          └▶ AiCacheConfig ─▶ AiResponseCache
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::ai::{AiCacheConfig, Operation};
use crate::cache::{
    CompressionConfig, EngineConfig, L1Config, MAX_COMPRESSION_LEVEL, MIN_COMPRESSION_LEVEL,
};
use crate::error::ConfigurationError;
use crate::keys::HashAlgorithm;
use crate::monitoring::performance::MonitorConfig;

use super::model::{CacheConfig, SecurityConfig};
use super::validation::ValidationResult;

/// Connection string schemes accepted for the L2 store
pub const ALLOWED_SCHEMES: [&str; 3] = ["redis://", "rediss://", "unix://"];

const MAX_TTL_SECS: u64 = 365 * 24 * 3600;
const MAX_L1_ENTRIES: usize = 1_000_000;
const LARGE_L1_ENTRIES: usize = 10_000;
const MAX_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: u32 = 20;
const MAX_TEXT_HASH_THRESHOLD: usize = 1_000_000;
const SHORT_TTL_SECS: u64 = 60;
const INVALIDATION_WINDOW_SECS: u64 = 3600;

/// Engine-facing parameters
#[derive(Debug, Clone)]
pub struct GenericParams {
    pub enabled: bool,
    pub redis_url: Option<String>,
    pub engine: EngineConfig,
    pub security: SecurityConfig,
    pub monitor: MonitorConfig,
}

/// Result of mapping a valid configuration
#[derive(Debug, Clone)]
pub struct MappedConfig {
    pub generic: GenericParams,
    /// Present when the AI layer is enabled
    pub ai: Option<AiCacheConfig>,
    /// Warnings and recommendations (never errors)
    pub validation: ValidationResult,
}

/// Validates and splits configurations
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterMapper;

impl ParameterMapper {
    pub fn new() -> Self {
        Self
    }

    /// Check every rule and collect all findings
    pub fn validate(&self, config: &CacheConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        self.validate_generic(config, &mut result);
        self.validate_ai(config, &mut result);
        result
    }

    fn validate_generic(&self, config: &CacheConfig, result: &mut ValidationResult) {
        if let Some(url) = &config.redis_url {
            match ALLOWED_SCHEMES.iter().find(|s| url.starts_with(*s)) {
                None => result.error(
                    "redis_url",
                    format!(
                        "'{}' must start with one of {}",
                        url,
                        ALLOWED_SCHEMES.join(", ")
                    ),
                ),
                Some(scheme) if url.len() == scheme.len() => {
                    result.error("redis_url", format!("'{}' names no host or socket", url))
                }
                Some(scheme) => {
                    let tls_url = *scheme == "rediss://";
                    if tls_url != config.security.tls_enabled && *scheme != "unix://" {
                        result.warning(
                            "security.tls_enabled",
                            format!(
                                "tls_enabled is {} but the connection string uses {}",
                                config.security.tls_enabled, scheme
                            ),
                        );
                    }
                    if !tls_url && *scheme != "unix://" && !is_local(url) {
                        result.recommend(
                            "redis_url",
                            "use rediss:// for a remote store to encrypt cached responses in transit",
                        );
                    }
                }
            }
        } else if config.enabled {
            result.warning(
                "redis_url",
                "no connection string; entries live in process memory only",
            );
        }

        check_range(result, "default_ttl", config.default_ttl, 1, MAX_TTL_SECS);
        if config.default_ttl > 0 && config.default_ttl < SHORT_TTL_SECS {
            result.warning(
                "default_ttl",
                format!("{}s is short enough to defeat most reuse", config.default_ttl),
            );
        }

        check_range(
            result,
            "compression_level",
            config.compression_level as u64,
            MIN_COMPRESSION_LEVEL as u64,
            MAX_COMPRESSION_LEVEL as u64,
        );
        if config.compression_threshold > 100 * 1024 * 1024 {
            result.error(
                "compression_threshold",
                "must be at most 104857600 bytes",
            );
        }

        if config.enable_l1_cache {
            if config.l1_cache_size == 0 {
                result.error(
                    "l1_cache_size",
                    "must be positive when enable_l1_cache is true",
                );
            } else if config.l1_cache_size > MAX_L1_ENTRIES {
                result.error(
                    "l1_cache_size",
                    format!("must be at most {}", MAX_L1_ENTRIES),
                );
            } else if config.l1_cache_size > LARGE_L1_ENTRIES {
                result.warning(
                    "l1_cache_size",
                    format!(
                        "{} entries per process can hold a lot of memory; watch the memory alerts",
                        config.l1_cache_size
                    ),
                );
            }
        }

        check_range(
            result,
            "operation_timeout_ms",
            config.operation_timeout_ms,
            1,
            MAX_TIMEOUT_MS,
        );
        if config.connect_retries > MAX_RETRIES {
            result.error(
                "connect_retries",
                format!("must be at most {}", MAX_RETRIES),
            );
        }

        let m = &config.monitoring;
        check_range(result, "monitoring.retention_secs", m.retention_secs, 1, MAX_TTL_SECS);
        if m.max_measurements == 0 {
            result.error("monitoring.max_measurements", "must be positive");
        }
        if m.invalidation_warning_per_hour == 0
            || m.invalidation_warning_per_hour >= m.invalidation_critical_per_hour
        {
            result.error(
                "monitoring.invalidation_warning_per_hour",
                "must be positive and below invalidation_critical_per_hour",
            );
        }
        if m.retention_secs < INVALIDATION_WINDOW_SECS {
            result.error(
                "monitoring.retention_secs",
                format!(
                    "must cover the {}s invalidation-rate window",
                    INVALIDATION_WINDOW_SECS
                ),
            );
        }
        if (m.max_measurements as u64) < m.invalidation_critical_per_hour {
            result.error(
                "monitoring.max_measurements",
                format!(
                    "must hold at least invalidation_critical_per_hour ({}) events",
                    m.invalidation_critical_per_hour
                ),
            );
        }
        if m.memory_warning_bytes == 0 || m.memory_warning_bytes >= m.memory_critical_bytes {
            result.error(
                "monitoring.memory_warning_bytes",
                "must be positive and below memory_critical_bytes",
            );
        }
    }

    fn validate_ai(&self, config: &CacheConfig, result: &mut ValidationResult) {
        if let Err(e) = HashAlgorithm::from_str(&config.hash_algorithm) {
            result.error("hash_algorithm", e);
        }
        check_range(
            result,
            "text_hash_threshold",
            config.text_hash_threshold as u64,
            1,
            MAX_TEXT_HASH_THRESHOLD as u64,
        );

        let tiers = &config.text_size_tiers;
        if !tiers.is_strictly_increasing() {
            result.error(
                "text_size_tiers",
                format!(
                    "thresholds must be positive and strictly increasing (got small={}, medium={}, large={})",
                    tiers.small, tiers.medium, tiers.large
                ),
            );
        }

        for (name, ttl) in &config.operation_ttls {
            let field = format!("operation_ttls.{}", name);
            if Operation::from_str(name).is_err() {
                result.error(
                    &field,
                    format!(
                        "unknown operation (known: {})",
                        Operation::ALL.map(|o| o.as_str()).join(", ")
                    ),
                );
            }
            check_range(result, &field, *ttl, 1, MAX_TTL_SECS);
        }

        if config.promotion.frequency_threshold == 0 {
            result.error("promotion.frequency_threshold", "must be positive");
        }
        if config.max_tracked_keys == 0 {
            result.error("max_tracked_keys", "must be positive");
        }
        if config.enable_ai_cache && !config.enable_l1_cache {
            result.recommend(
                "enable_l1_cache",
                "AI lookups repeat heavily; an L1 tier avoids a round trip per hit",
            );
        }
    }

    /// Validate, then split into typed parameters
    pub fn map(&self, config: &CacheConfig) -> Result<MappedConfig, ConfigurationError> {
        let validation = self.validate(config);
        if !validation.is_valid() {
            return Err(ConfigurationError::Invalid(validation));
        }

        let generic = GenericParams {
            enabled: config.enabled,
            redis_url: config.redis_url.clone(),
            engine: EngineConfig {
                default_ttl: Duration::from_secs(config.default_ttl),
                l1_enabled: config.enabled && config.enable_l1_cache,
                l1: L1Config {
                    max_entries: config.l1_cache_size,
                    ..Default::default()
                },
                compression: CompressionConfig {
                    threshold_bytes: config.compression_threshold,
                    level: config.compression_level,
                    ..Default::default()
                },
                operation_timeout: Duration::from_millis(config.operation_timeout_ms),
                connect_retries: config.connect_retries,
                ..Default::default()
            },
            security: config.security.clone(),
            monitor: monitor_config(config),
        };

        let ai = config.enable_ai_cache.then(|| AiCacheConfig {
            default_ttl: Duration::from_secs(config.default_ttl),
            operation_ttls: typed_operation_ttls(&config.operation_ttls),
            text_size_tiers: config.text_size_tiers,
            text_hash_threshold: config.text_hash_threshold,
            hash_algorithm: HashAlgorithm::from_str(&config.hash_algorithm).unwrap_or_default(),
            promotion: config.promotion.clone(),
            max_tracked_keys: config.max_tracked_keys,
        });

        Ok(MappedConfig {
            generic,
            ai,
            validation,
        })
    }
}

fn monitor_config(config: &CacheConfig) -> MonitorConfig {
    let m = &config.monitoring;
    MonitorConfig {
        retention: Duration::from_secs(m.retention_secs),
        max_measurements: m.max_measurements,
        slow_key_generation: Duration::from_millis(m.slow_key_generation_ms),
        invalidation_rate_warning: m.invalidation_warning_per_hour,
        invalidation_rate_critical: m.invalidation_critical_per_hour,
        invalidation_window: Duration::from_secs(INVALIDATION_WINDOW_SECS),
        memory_warning_bytes: m.memory_warning_bytes,
        memory_critical_bytes: m.memory_critical_bytes,
        ..Default::default()
    }
}

fn typed_operation_ttls(ttls: &BTreeMap<String, u64>) -> BTreeMap<Operation, u64> {
    ttls.iter()
        .filter_map(|(name, ttl)| Operation::from_str(name).ok().map(|op| (op, *ttl)))
        .collect()
}

fn check_range(result: &mut ValidationResult, field: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        result.error(
            field,
            format!("{} is outside the allowed range {}..={}", value, min, max),
        );
    }
}

fn is_local(url: &str) -> bool {
    ["localhost", "127.0.0.1", "[::1]"]
        .iter()
        .any(|host| url.contains(host))
}

// =============================================================================
// Tests
// =============================================================================
