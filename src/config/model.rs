//! Configuration model
//!
//! [`CacheConfig`] is the unified, serializable configuration. It keeps
//! user-facing values as written (strings for the hash algorithm, operation
//! names as map keys) so that validation can report every problem at once;
//! [`ParameterMapper`](super::ParameterMapper) turns it into typed runtime
//! parameters.
//!
//! [`ConfigPatch`] is one override layer. Every field is optional and unknown
//! fields are rejected, so a typo in a custom JSON blob fails loudly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ai::{Operation, PromotionPolicy, TextSizeTiers};

/// Connection security settings handed to a [`SecureConnector`](crate::builder::SecureConnector)
///
/// Credentials are never part of the configuration; the connector owns them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    pub tls_enabled: bool,
    pub verify_certificates: bool,
    pub username: Option<String>,
    pub ca_cert_path: Option<String>,
}

/// Performance monitor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    pub retention_secs: u64,
    pub max_measurements: usize,
    pub slow_key_generation_ms: u64,
    pub invalidation_warning_per_hour: u64,
    pub invalidation_critical_per_hour: u64,
    pub memory_warning_bytes: u64,
    pub memory_critical_bytes: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            max_measurements: 1000,
            slow_key_generation_ms: 100,
            invalidation_warning_per_hour: 20,
            invalidation_critical_per_hour: 50,
            memory_warning_bytes: 50 * 1024 * 1024,
            memory_critical_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Unified cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    // Generic parameters
    /// Cache fully on or off
    pub enabled: bool,
    /// L2 connection string; absent means an in-process store
    pub redis_url: Option<String>,
    /// Default TTL in seconds
    pub default_ttl: u64,
    /// Payloads larger than this many bytes are compressed
    pub compression_threshold: u64,
    pub compression_level: u32,
    pub enable_l1_cache: bool,
    /// L1 capacity in entries
    pub l1_cache_size: usize,
    pub operation_timeout_ms: u64,
    pub connect_retries: u32,
    pub security: SecurityConfig,
    pub monitoring: MonitoringConfig,

    // AI parameters
    pub enable_ai_cache: bool,
    pub text_hash_threshold: usize,
    pub hash_algorithm: String,
    pub text_size_tiers: TextSizeTiers,
    /// Operation name to TTL in seconds
    pub operation_ttls: BTreeMap<String, u64>,
    pub promotion: PromotionPolicy,
    pub max_tracked_keys: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            default_ttl: 3600,
            compression_threshold: 1000,
            compression_level: 6,
            enable_l1_cache: true,
            l1_cache_size: 100,
            operation_timeout_ms: 2000,
            connect_retries: 3,
            security: SecurityConfig::default(),
            monitoring: MonitoringConfig::default(),
            enable_ai_cache: false,
            text_hash_threshold: 1000,
            hash_algorithm: "sha256".to_string(),
            text_size_tiers: TextSizeTiers::default(),
            operation_ttls: default_operation_ttls(),
            promotion: PromotionPolicy::default(),
            max_tracked_keys: 10_000,
        }
    }
}

/// Built-in per-operation TTLs keyed by operation name
pub fn default_operation_ttls() -> BTreeMap<String, u64> {
    Operation::ALL
        .iter()
        .map(|op| (op.to_string(), op.default_ttl_secs()))
        .collect()
}

/// One override layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_l1_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l1_cache_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ai_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_hash_threshold: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_size_tiers: Option<TextSizeTiers>,
    /// Merged entry by entry into the current map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_ttls: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tracked_keys: Option<usize>,
}

impl ConfigPatch {
    /// Parse a JSON override blob
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }
}

/// A patch with the name of the source it came from
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideLayer {
    pub source: String,
    pub patch: ConfigPatch,
}

impl OverrideLayer {
    pub fn new(source: impl Into<String>, patch: ConfigPatch) -> Self {
        Self {
            source: source.into(),
            patch,
        }
    }
}

/// Apply `patch` on top of `config`
///
/// The only merge function: every layer, whatever its source, goes through
/// here.
pub fn merge(config: &mut CacheConfig, patch: &ConfigPatch) {
    fn set<T: Clone>(target: &mut T, value: &Option<T>) {
        if let Some(v) = value {
            *target = v.clone();
        }
    }

    set(&mut config.enabled, &patch.enabled);
    if let Some(url) = &patch.redis_url {
        config.redis_url = (!url.is_empty()).then(|| url.clone());
    }
    set(&mut config.default_ttl, &patch.default_ttl);
    set(&mut config.compression_threshold, &patch.compression_threshold);
    set(&mut config.compression_level, &patch.compression_level);
    set(&mut config.enable_l1_cache, &patch.enable_l1_cache);
    set(&mut config.l1_cache_size, &patch.l1_cache_size);
    set(&mut config.operation_timeout_ms, &patch.operation_timeout_ms);
    set(&mut config.connect_retries, &patch.connect_retries);
    set(&mut config.security, &patch.security);
    set(&mut config.monitoring, &patch.monitoring);
    set(&mut config.enable_ai_cache, &patch.enable_ai_cache);
    set(&mut config.text_hash_threshold, &patch.text_hash_threshold);
    set(&mut config.hash_algorithm, &patch.hash_algorithm);
    set(&mut config.text_size_tiers, &patch.text_size_tiers);
    if let Some(ttls) = &patch.operation_ttls {
        config
            .operation_ttls
            .extend(ttls.iter().map(|(k, v)| (k.clone(), *v)));
    }
    set(&mut config.promotion, &patch.promotion);
    set(&mut config.max_tracked_keys, &patch.max_tracked_keys);
}
