//! Preset Manager
//!
//! A closed set of named configurations plus layered overrides.
//!
//! # Resolution
//!
//! ```text
//!  built-in fallback (simple)
//!        ▼
//!  preset defaults          ◀── CACHE_PRESET
//!        ▼
//!  discrete overrides       ◀── CACHE_REDIS_URL, ENABLE_AI_CACHE, CACHE_DEFAULT_TTL
//!        ▼
//!  custom JSON              ◀── CACHE_CUSTOM_CONFIG
//!        ▼
//!  ParameterMapper::validate (all errors at once)
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::mapper::ParameterMapper;
use super::model::{merge, CacheConfig, MonitoringConfig, OverrideLayer};
use super::settings::CacheSettings;
use super::validation::ValidationResult;
use crate::ai::{Operation, PromotionPolicy};
use crate::error::ConfigurationError;

/// Version written into exported documents
pub const EXPORT_FORMAT_VERSION: u32 = 1;

// =============================================================================
// Preset names
// =============================================================================

/// Closed set of presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetName {
    Disabled,
    Minimal,
    Simple,
    Development,
    Production,
    AiDevelopment,
    AiProduction,
}

impl PresetName {
    pub const ALL: [PresetName; 7] = [
        PresetName::Disabled,
        PresetName::Minimal,
        PresetName::Simple,
        PresetName::Development,
        PresetName::Production,
        PresetName::AiDevelopment,
        PresetName::AiProduction,
    ];

    /// Used when no preset is named
    pub const FALLBACK: PresetName = PresetName::Simple;

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Disabled => "disabled",
            PresetName::Minimal => "minimal",
            PresetName::Simple => "simple",
            PresetName::Development => "development",
            PresetName::Production => "production",
            PresetName::AiDevelopment => "ai-development",
            PresetName::AiProduction => "ai-production",
        }
    }

    /// AI counterpart, if any
    fn with_ai(self) -> PresetName {
        match self {
            PresetName::Simple | PresetName::Development => PresetName::AiDevelopment,
            PresetName::Production => PresetName::AiProduction,
            other => other,
        }
    }
}

impl std::fmt::Display for PresetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = ConfigurationError;

    /// Exact, case-sensitive match
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownPreset {
                name: s.to_string(),
                valid: PresetName::ALL.iter().map(|p| p.to_string()).collect(),
            })
    }
}

// =============================================================================
// Presets
// =============================================================================

/// A named, complete configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preset {
    pub name: PresetName,
    pub description: &'static str,
    /// Environments the preset suits
    pub environments: &'static [&'static str],
    /// How confidently the preset is recommended for those environments
    pub confidence: f64,
    pub config: CacheConfig,
}

impl Preset {
    /// Built-in definition of `name`
    pub fn builtin(name: PresetName) -> Self {
        match name {
            PresetName::Disabled => Preset {
                name,
                description: "Cache fully off; every lookup misses and nothing is stored",
                environments: &["testing", "troubleshooting"],
                confidence: 0.95,
                config: CacheConfig {
                    enabled: false,
                    enable_l1_cache: false,
                    l1_cache_size: 0,
                    connect_retries: 0,
                    ..Default::default()
                },
            },
            PresetName::Minimal => Preset {
                name,
                description: "In-process store with a small L1; no external services",
                environments: &["ci", "testing", "embedded"],
                confidence: 0.8,
                config: CacheConfig {
                    default_ttl: 900,
                    compression_threshold: 5000,
                    compression_level: 1,
                    l1_cache_size: 50,
                    operation_timeout_ms: 1000,
                    connect_retries: 0,
                    ..Default::default()
                },
            },
            PresetName::Simple => Preset {
                name,
                description: "Local Redis with balanced defaults",
                environments: &["development", "small deployments"],
                confidence: 0.7,
                config: CacheConfig {
                    redis_url: Some("redis://localhost:6379".into()),
                    ..Default::default()
                },
            },
            PresetName::Development => Preset {
                name,
                description: "Short TTLs and fast compression for quick iteration",
                environments: &["development", "local"],
                confidence: 0.85,
                config: CacheConfig {
                    redis_url: Some("redis://localhost:6379".into()),
                    default_ttl: 600,
                    compression_threshold: 2000,
                    compression_level: 1,
                    connect_retries: 1,
                    monitoring: MonitoringConfig {
                        slow_key_generation_ms: 50,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            },
            PresetName::Production => Preset {
                name,
                description: "Long TTLs, larger L1 and patient reconnects",
                environments: &["production", "staging"],
                confidence: 0.85,
                config: production_config(),
            },
            PresetName::AiDevelopment => Preset {
                name,
                description: "Development settings with the AI layer and short operation TTLs",
                environments: &["development", "local"],
                confidence: 0.85,
                config: CacheConfig {
                    redis_url: Some("redis://localhost:6379".into()),
                    default_ttl: 600,
                    compression_threshold: 2000,
                    compression_level: 1,
                    connect_retries: 1,
                    enable_ai_cache: true,
                    operation_ttls: scaled_operation_ttls(4),
                    ..Default::default()
                },
            },
            PresetName::AiProduction => Preset {
                name,
                description: "Production settings with the AI layer and a larger L1",
                environments: &["production", "staging"],
                confidence: 0.9,
                config: CacheConfig {
                    l1_cache_size: 1000,
                    compression_threshold: 500,
                    enable_ai_cache: true,
                    promotion: PromotionPolicy::balanced(),
                    max_tracked_keys: 50_000,
                    ..production_config()
                },
            },
        }
    }
}

fn production_config() -> CacheConfig {
    CacheConfig {
        redis_url: Some("redis://redis:6379".into()),
        default_ttl: 7200,
        l1_cache_size: 500,
        operation_timeout_ms: 1500,
        connect_retries: 5,
        monitoring: MonitoringConfig {
            max_measurements: 5000,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn scaled_operation_ttls(divisor: u64) -> BTreeMap<String, u64> {
    Operation::ALL
        .iter()
        .map(|op| (op.to_string(), (op.default_ttl_secs() / divisor).max(1)))
        .collect()
}

// =============================================================================
// Recommendation signals
// =============================================================================

/// Hints about the environment the process runs in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSignals {
    /// Explicit environment name (`ENVIRONMENT` or `APP_ENV`)
    pub environment: Option<String>,
    pub hostname: Option<String>,
    pub ai_enabled: bool,
    pub ci: bool,
    pub container: bool,
}

impl EnvironmentSignals {
    /// Collect signals from the process environment
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let flag = |name: &str| {
            var(name).is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        };
        Self {
            environment: var("ENVIRONMENT").or_else(|| var("APP_ENV")),
            hostname: var("HOSTNAME"),
            ai_enabled: flag("ENABLE_AI_CACHE"),
            ci: flag("CI"),
            container: var("KUBERNETES_SERVICE_HOST").is_some(),
        }
    }
}

/// Suggested preset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetRecommendation {
    pub preset: PresetName,
    pub confidence: f64,
    pub rationale: Vec<String>,
}

/// Output of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub preset: PresetName,
    pub config: CacheConfig,
    /// Sources of the applied override layers, in order
    pub applied: Vec<String>,
    /// Warnings and recommendations
    pub validation: ValidationResult,
}

/// Serialization format for export/import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
}

impl FromStr for ExportFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(ConfigurationError::Serialization {
                format: other.to_string(),
                reason: "supported formats are json and yaml".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// Exported configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub format_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<PresetName>,
    pub exported_at: DateTime<Utc>,
    pub config: CacheConfig,
}

// =============================================================================
// Manager
// =============================================================================

/// Resolves, recommends, exports and imports configurations
#[derive(Debug, Clone, Default)]
pub struct PresetManager {
    mapper: ParameterMapper,
}

impl PresetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a preset by exact name
    pub fn get(&self, name: &str) -> Result<Preset, ConfigurationError> {
        Ok(Preset::builtin(name.parse()?))
    }

    /// Every preset
    pub fn list(&self) -> Vec<Preset> {
        PresetName::ALL.into_iter().map(Preset::builtin).collect()
    }

    /// Resolve `name` (or the fallback) and apply `layers` in order
    pub fn resolve(
        &self,
        name: Option<&str>,
        layers: &[OverrideLayer],
    ) -> Result<ResolvedConfig, ConfigurationError> {
        let preset = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.parse::<PresetName>()?,
            None => PresetName::FALLBACK,
        };

        let mut config = Preset::builtin(preset).config;
        let mut applied = Vec::with_capacity(layers.len());
        for layer in layers {
            debug!(source = %layer.source, "Applying configuration override");
            merge(&mut config, &layer.patch);
            applied.push(layer.source.clone());
        }

        let validation = self.mapper.validate(&config);
        if !validation.is_valid() {
            return Err(ConfigurationError::Invalid(validation));
        }
        for issue in validation.warnings() {
            warn!(field = %issue.field, "{}", issue.message);
        }
        info!(preset = %preset, overrides = applied.len(), "Cache configuration resolved");

        Ok(ResolvedConfig {
            preset,
            config,
            applied,
            validation,
        })
    }

    /// Resolve from environment-facing settings
    pub fn resolve_settings(
        &self,
        settings: &CacheSettings,
    ) -> Result<ResolvedConfig, ConfigurationError> {
        let layers = settings.override_layers()?;
        self.resolve(settings.preset.as_deref(), &layers)
    }

    /// Suggest a preset; advisory only
    pub fn recommend(&self, signals: &EnvironmentSignals) -> PresetRecommendation {
        let mut rationale = Vec::new();

        let (base, confidence) = if let Some(env) = &signals.environment {
            match env.to_lowercase().as_str() {
                "prod" | "production" | "live" => {
                    rationale.push(format!("environment is '{}'", env));
                    (PresetName::Production, 0.95)
                }
                "staging" | "stage" | "preprod" => {
                    rationale.push(format!("environment '{}' mirrors production", env));
                    (PresetName::Production, 0.8)
                }
                "dev" | "development" | "local" => {
                    rationale.push(format!("environment is '{}'", env));
                    (PresetName::Development, 0.9)
                }
                "test" | "testing" | "ci" => {
                    rationale.push(format!("environment '{}' needs no external store", env));
                    (PresetName::Minimal, 0.9)
                }
                _ => {
                    rationale.push(format!("environment '{}' is not recognised", env));
                    (PresetName::FALLBACK, 0.4)
                }
            }
        } else if signals.ci {
            rationale.push("running under CI".to_string());
            (PresetName::Minimal, 0.85)
        } else if let Some(hint) = signals.hostname.as_deref().and_then(hostname_hint) {
            rationale.push(format!(
                "hostname '{}' suggests {}",
                signals.hostname.as_deref().unwrap_or_default(),
                hint
            ));
            (hint, 0.6)
        } else if signals.container {
            rationale.push("running inside Kubernetes".to_string());
            (PresetName::Production, 0.5)
        } else {
            rationale.push("no environment signals; using the fallback preset".to_string());
            (PresetName::FALLBACK, 0.3)
        };

        let preset = if signals.ai_enabled {
            let ai = base.with_ai();
            if ai != base {
                rationale.push("AI caching is enabled".to_string());
            }
            ai
        } else {
            base
        };

        PresetRecommendation {
            preset,
            confidence,
            rationale,
        }
    }

    /// Serialize `config`
    pub fn export(
        &self,
        config: &CacheConfig,
        preset: Option<PresetName>,
        format: ExportFormat,
    ) -> Result<String, ConfigurationError> {
        let document = ConfigDocument {
            format_version: EXPORT_FORMAT_VERSION,
            preset,
            exported_at: Utc::now(),
            config: config.clone(),
        };
        let serialized = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&document).map_err(|e| e.to_string()),
            ExportFormat::Yaml => serde_yaml::to_string(&document).map_err(|e| e.to_string()),
        };
        serialized.map_err(|reason| ConfigurationError::Serialization {
            format: format.to_string(),
            reason,
        })
    }

    /// Parse and re-validate an exported document
    pub fn import(&self, data: &str, format: ExportFormat) -> Result<CacheConfig, ConfigurationError> {
        let document: ConfigDocument = match format {
            ExportFormat::Json => serde_json::from_str(data).map_err(|e| e.to_string()),
            ExportFormat::Yaml => serde_yaml::from_str(data).map_err(|e| e.to_string()),
        }
        .map_err(|reason| ConfigurationError::Serialization {
            format: format.to_string(),
            reason,
        })?;

        if document.format_version != EXPORT_FORMAT_VERSION {
            return Err(ConfigurationError::Serialization {
                format: format.to_string(),
                reason: format!(
                    "unsupported format_version {} (expected {})",
                    document.format_version, EXPORT_FORMAT_VERSION
                ),
            });
        }

        let validation = self.mapper.validate(&document.config);
        if !validation.is_valid() {
            return Err(ConfigurationError::Invalid(validation));
        }
        Ok(document.config)
    }
}

fn hostname_hint(hostname: &str) -> Option<PresetName> {
    let host = hostname.to_lowercase();
    if host.contains("prod") || host.contains("staging") {
        Some(PresetName::Production)
    } else if host.contains("dev") || host.contains("local") || host.contains("laptop") {
        Some(PresetName::Development)
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ConfigPatch;
    use assert_matches::assert_matches;

    #[test]
    fn test_every_builtin_preset_is_valid() {
        let mapper = ParameterMapper::new();
        for preset in PresetManager::new().list() {
            let result = mapper.validate(&preset.config);
            assert!(result.is_valid(), "{}: {}", preset.name, result.error_summary());
            assert!(!preset.environments.is_empty());
        }
    }

    #[test]
    fn test_names_round_trip_exactly() {
        for name in PresetName::ALL {
            assert_eq!(name.as_str().parse::<PresetName>().unwrap(), name);
        }
        assert!("Production".parse::<PresetName>().is_err());
        assert!("ai_production".parse::<PresetName>().is_err());
    }

    #[test]
    fn test_unknown_preset_lists_all_options() {
        let err = PresetManager::new().resolve(Some("turbo"), &[]).unwrap_err();
        let message = err.to_string();
        for name in PresetName::ALL {
            assert!(message.contains(name.as_str()), "{}", message);
        }
    }

    #[test]
    fn test_fallback_preset() {
        let resolved = PresetManager::new().resolve(None, &[]).unwrap();
        assert_eq!(resolved.preset, PresetName::Simple);
        let resolved = PresetManager::new().resolve(Some("  "), &[]).unwrap();
        assert_eq!(resolved.preset, PresetName::Simple);
    }

    #[test]
    fn test_override_precedence() {
        let settings = CacheSettings {
            preset: Some("production".into()),
            default_ttl: Some(120),
            custom_config: Some(r#"{"default_ttl": 30, "l1_cache_size": 42}"#.into()),
            ..Default::default()
        };
        let resolved = PresetManager::new().resolve_settings(&settings).unwrap();
        assert_eq!(resolved.config.default_ttl, 30);
        assert_eq!(resolved.config.l1_cache_size, 42);
        assert_eq!(resolved.config.connect_retries, 5);
        assert_eq!(resolved.applied, ["settings", "CACHE_CUSTOM_CONFIG"]);

        let settings = CacheSettings {
            preset: Some("production".into()),
            default_ttl: Some(120),
            ..Default::default()
        };
        let resolved = PresetManager::new().resolve_settings(&settings).unwrap();
        assert_eq!(resolved.config.default_ttl, 120);
    }

    #[test]
    fn test_invalid_override_fails_with_all_errors() {
        let layers = [OverrideLayer::new(
            "test",
            ConfigPatch {
                l1_cache_size: Some(0),
                hash_algorithm: Some("md5".into()),
                ..Default::default()
            },
        )];
        let err = PresetManager::new()
            .resolve(Some("ai-production"), &layers)
            .unwrap_err();
        assert_matches!(err, ConfigurationError::Invalid(ref r) if r.errors().len() == 2);
    }

    #[test]
    fn test_recommendations() {
        let manager = PresetManager::new();

        let rec = manager.recommend(&EnvironmentSignals {
            environment: Some("Production".into()),
            ai_enabled: true,
            ..Default::default()
        });
        assert_eq!(rec.preset, PresetName::AiProduction);
        assert!(rec.confidence > 0.9);
        assert_eq!(rec.rationale.len(), 2);

        let rec = manager.recommend(&EnvironmentSignals {
            ci: true,
            hostname: Some("prod-web-1".into()),
            ..Default::default()
        });
        assert_eq!(rec.preset, PresetName::Minimal);

        let rec = manager.recommend(&EnvironmentSignals {
            hostname: Some("alice-laptop".into()),
            ..Default::default()
        });
        assert_eq!(rec.preset, PresetName::Development);

        let rec = manager.recommend(&EnvironmentSignals::default());
        assert_eq!(rec.preset, PresetName::Simple);
    }

    #[test]
    fn test_export_import_round_trip() {
        let manager = PresetManager::new();
        let config = Preset::builtin(PresetName::AiProduction).config;
        for format in [ExportFormat::Json, ExportFormat::Yaml] {
            let text = manager
                .export(&config, Some(PresetName::AiProduction), format)
                .unwrap();
            assert_eq!(manager.import(&text, format).unwrap(), config);
        }
    }

    #[test]
    fn test_import_revalidates() {
        let manager = PresetManager::new();
        let mut config = CacheConfig::default();
        config.hash_algorithm = "md5".into();
        let text = manager.export(&config, None, ExportFormat::Json).unwrap();
        assert_matches!(
            manager.import(&text, ExportFormat::Json),
            Err(ConfigurationError::Invalid(_))
        );
        assert_matches!(
            manager.import("not: [valid", ExportFormat::Yaml),
            Err(ConfigurationError::Serialization { .. })
        );
    }
}
