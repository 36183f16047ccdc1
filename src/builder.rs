//! Composition Root
//!
//! [`CacheBuilder`] turns a resolved configuration into a connected
//! [`TieredCache`] and, when enabled, the [`AiResponseCache`] over it. The
//! result is handed around by `Arc`; there is no global instance.
//!
//! ```text
//!  CacheSettings ─▶ PresetManager ─▶ CacheConfig ─▶ ParameterMapper
//!                                                       │
//!        backend selection ◀────────────────────────────┘
//!   explicit > disabled (noop) > no URL (in-memory) > SecureConnector > redis
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::ai::AiResponseCache;
use crate::cache::{CacheBackend, InMemoryBackend, NoopBackend, TieredCache};
use crate::config::{
    CacheConfig, CacheSettings, GenericParams, ParameterMapper, PresetManager, PresetName,
    SecurityConfig, ValidationResult,
};
use crate::error::ConfigurationError;
use crate::monitoring::performance::PerformanceMonitor;

/// Narrow interface to an external TLS/ACL connection manager
#[async_trait]
pub trait SecureConnector: Send + Sync {
    /// Produce a backend for `url` with `security` applied
    async fn connect(
        &self,
        url: &str,
        security: &SecurityConfig,
    ) -> crate::error::Result<Arc<dyn CacheBackend>>;
}

/// Everything the builder produced
pub struct BuiltCache {
    engine: Arc<TieredCache>,
    ai: Option<Arc<AiResponseCache>>,
    preset: Option<PresetName>,
    validation: ValidationResult,
}

impl BuiltCache {
    pub fn engine(&self) -> &Arc<TieredCache> {
        &self.engine
    }

    /// The AI layer, when enabled
    pub fn ai(&self) -> Option<&Arc<AiResponseCache>> {
        self.ai.as_ref()
    }

    /// Preset the configuration was resolved from, if any
    pub fn preset(&self) -> Option<PresetName> {
        self.preset
    }

    /// Warnings and recommendations from validation
    pub fn validation(&self) -> &ValidationResult {
        &self.validation
    }
}

/// Builds a cache from configuration
pub struct CacheBuilder {
    config: CacheConfig,
    preset: Option<PresetName>,
    backend: Option<Arc<dyn CacheBackend>>,
    connector: Option<Arc<dyn SecureConnector>>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl CacheBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            preset: None,
            backend: None,
            connector: None,
            monitor: None,
        }
    }

    /// Start from a named preset without overrides
    pub fn from_preset(name: &str) -> Result<Self, ConfigurationError> {
        let resolved = PresetManager::new().resolve(Some(name), &[])?;
        let mut builder = Self::new(resolved.config);
        builder.preset = Some(resolved.preset);
        Ok(builder)
    }

    /// Resolve `settings` (preset plus overrides)
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, ConfigurationError> {
        let resolved = PresetManager::new().resolve_settings(settings)?;
        let mut builder = Self::new(resolved.config);
        builder.preset = Some(resolved.preset);
        Ok(builder)
    }

    /// Use this backend instead of one derived from the configuration
    pub fn with_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Route connections through an external security manager
    pub fn with_connector(mut self, connector: Arc<dyn SecureConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share an existing monitor
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validate, select a backend, connect and wrap
    ///
    /// An unreachable backend is not an error: the engine starts degraded.
    pub async fn build(self) -> Result<BuiltCache, ConfigurationError> {
        let mapped = ParameterMapper::new().map(&self.config)?;
        let monitor = self
            .monitor
            .clone()
            .unwrap_or_else(|| Arc::new(PerformanceMonitor::new(mapped.generic.monitor.clone())));

        let backend = self.select_backend(&mapped.generic).await?;
        let engine = Arc::new(TieredCache::new(
            backend,
            mapped.generic.engine.clone(),
            monitor,
        ));
        if !engine.connect().await {
            warn!(backend = engine.backend().name(), "Cache starting degraded");
        }

        let ai = mapped
            .ai
            .map(|config| Arc::new(AiResponseCache::new(engine.clone(), config)));
        info!(
            preset = self.preset.map_or("custom", |p| p.as_str()),
            backend = engine.backend().name(),
            state = %engine.state(),
            ai = ai.is_some(),
            "Cache built"
        );

        Ok(BuiltCache {
            engine,
            ai,
            preset: self.preset,
            validation: mapped.validation,
        })
    }

    async fn select_backend(
        &self,
        generic: &GenericParams,
    ) -> Result<Arc<dyn CacheBackend>, ConfigurationError> {
        if let Some(backend) = &self.backend {
            return Ok(backend.clone());
        }
        if !generic.enabled {
            return Ok(Arc::new(NoopBackend));
        }
        let Some(url) = generic.redis_url.as_deref() else {
            return Ok(Arc::new(InMemoryBackend::new()));
        };

        let unsupported = |reason: String| ConfigurationError::UnsupportedBackend {
            url: url.to_string(),
            reason,
        };

        if let Some(connector) = &self.connector {
            return connector
                .connect(url, &generic.security)
                .await
                .map_err(|e| unsupported(e.to_string()));
        }
        if generic.security.tls_enabled {
            warn!("TLS requested without a secure connector; using the plain Redis client");
        }
        Self::redis_backend(url).map_err(unsupported)
    }

    #[cfg(feature = "redis")]
    fn redis_backend(url: &str) -> Result<Arc<dyn CacheBackend>, String> {
        crate::cache::RedisBackend::new(url)
            .map(|b| Arc::new(b) as Arc<dyn CacheBackend>)
            .map_err(|e| e.to_string())
    }

    #[cfg(not(feature = "redis"))]
    fn redis_backend(_url: &str) -> Result<Arc<dyn CacheBackend>, String> {
        Err("built without the redis feature".to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Operation;
    use crate::cache::ConnectionState;
    use crate::config::ConfigPatch;
    use assert_matches::assert_matches;
    use serde_json::json;

    struct FixedConnector(Arc<InMemoryBackend>);

    #[async_trait]
    impl SecureConnector for FixedConnector {
        async fn connect(
            &self,
            _url: &str,
            security: &SecurityConfig,
        ) -> crate::error::Result<Arc<dyn CacheBackend>> {
            if !security.tls_enabled {
                return Err(crate::error::Error::Backend("TLS required".into()));
            }
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_default_config_uses_in_memory() {
        let built = CacheBuilder::new(CacheConfig::default()).build().await.unwrap();
        assert_eq!(built.engine().backend().name(), "memory");
        assert_eq!(built.engine().state(), ConnectionState::Connected);
        assert!(built.ai().is_none());
        assert!(built.preset().is_none());
    }

    #[tokio::test]
    async fn test_disabled_preset_never_hits() {
        let built = CacheBuilder::from_preset("disabled").unwrap().build().await.unwrap();
        let engine = built.engine();
        assert_eq!(engine.backend().name(), "noop");
        engine.set("k", &1u32, None).await;
        assert_eq!(engine.get::<u32>("k").await, None);
    }

    #[tokio::test]
    async fn test_ai_preset_builds_layer() {
        let built = CacheBuilder::from_preset("ai-development")
            .unwrap()
            .with_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();
        let ai = built.ai().unwrap();
        assert_eq!(ai.config().operation_ttls[&Operation::Qa], 450);
        assert!(
            ai.cache_response("t", Operation::Qa, None, &json!("a"), Some("q"))
                .await
        );
        assert_eq!(built.preset(), Some(PresetName::AiDevelopment));
    }

    #[tokio::test]
    async fn test_secure_connector_used_for_urls() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut config = CacheConfig {
            redis_url: Some("rediss://cache.example:6380".into()),
            ..Default::default()
        };
        config.security.tls_enabled = true;
        let built = CacheBuilder::new(config.clone())
            .with_connector(Arc::new(FixedConnector(backend.clone())))
            .build()
            .await
            .unwrap();
        assert!(built.engine().set("k", &"v", None).await);
        assert_eq!(backend.len(), 1);

        config.security.tls_enabled = false;
        let err = CacheBuilder::new(config)
            .with_connector(Arc::new(FixedConnector(backend)))
            .build()
            .await
            .err()
            .unwrap();
        assert_matches!(err, ConfigurationError::UnsupportedBackend { .. });
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_connecting() {
        let mut config = CacheConfig::default();
        crate::config::merge(
            &mut config,
            &ConfigPatch {
                l1_cache_size: Some(0),
                ..Default::default()
            },
        );
        let result = CacheBuilder::new(config).build().await;
        assert_matches!(result.err(), Some(ConfigurationError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_from_settings() {
        let settings = CacheSettings {
            preset: Some("minimal".into()),
            enable_ai_cache: Some(true),
            ..Default::default()
        };
        let built = CacheBuilder::from_settings(&settings)
            .unwrap()
            .build()
            .await
            .unwrap();
        assert!(built.ai().is_some());
        assert_eq!(built.engine().config().default_ttl.as_secs(), 900);
    }
}
