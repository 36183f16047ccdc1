//! Environment-facing settings
//!
//! [`CacheSettings`] is the small set of knobs an application exposes. It
//! parses from environment variables and can be flattened into a host
//! binary's own `clap` CLI with `#[command(flatten)]`.

use clap::Parser;

use super::model::{ConfigPatch, OverrideLayer};
use crate::error::ConfigurationError;

pub const ENV_PRESET: &str = "CACHE_PRESET";
pub const ENV_REDIS_URL: &str = "CACHE_REDIS_URL";
pub const ENV_ENABLE_AI: &str = "ENABLE_AI_CACHE";
pub const ENV_DEFAULT_TTL: &str = "CACHE_DEFAULT_TTL";
pub const ENV_CUSTOM_CONFIG: &str = "CACHE_CUSTOM_CONFIG";

/// Cache settings
#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(about = "Tiered response cache settings", long_about = None)]
pub struct CacheSettings {
    /// Preset name (disabled, minimal, simple, development, production, ai-development, ai-production)
    #[arg(long = "cache-preset", env = "CACHE_PRESET")]
    pub preset: Option<String>,

    /// L2 connection string (redis://, rediss:// or unix://)
    #[arg(long = "cache-redis-url", env = "CACHE_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Enable the AI response layer
    #[arg(long = "enable-ai-cache", env = "ENABLE_AI_CACHE")]
    pub enable_ai_cache: Option<bool>,

    /// Default TTL in seconds
    #[arg(long = "cache-default-ttl", env = "CACHE_DEFAULT_TTL")]
    pub default_ttl: Option<u64>,

    /// JSON object applied last, on top of everything else
    #[arg(long = "cache-custom-config", env = "CACHE_CUSTOM_CONFIG")]
    pub custom_config: Option<String>,
}

impl CacheSettings {
    /// Read from the process environment only
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::try_parse_from(["cache"]).map_err(|e| ConfigurationError::InvalidOverride {
            source_name: "environment".to_string(),
            reason: e.to_string(),
        })
    }

    /// Override layers in ascending precedence: discrete values, then the
    /// custom JSON blob
    pub fn override_layers(&self) -> Result<Vec<OverrideLayer>, ConfigurationError> {
        let mut layers = Vec::new();

        let discrete = ConfigPatch {
            redis_url: self.redis_url.clone(),
            enable_ai_cache: self.enable_ai_cache,
            default_ttl: self.default_ttl,
            ..Default::default()
        };
        if !discrete.is_empty() {
            layers.push(OverrideLayer::new("settings", discrete));
        }

        if let Some(json) = self.custom_config.as_deref().filter(|j| !j.trim().is_empty()) {
            let patch =
                ConfigPatch::from_json(json).map_err(|e| ConfigurationError::InvalidOverride {
                    source_name: ENV_CUSTOM_CONFIG.to_string(),
                    reason: e.to_string(),
                })?;
            layers.push(OverrideLayer::new(ENV_CUSTOM_CONFIG, patch));
        }

        Ok(layers)
    }
}
