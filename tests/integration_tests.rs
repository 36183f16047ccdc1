//! Strata Integration Tests
//!
//! End-to-end behaviour through the public API:
//! - Key generation
//! - Tiered engine and degradation
//! - AI response layer
//! - Configuration resolution
//! - Monitoring

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use strata::cache::{EngineConfig, InMemoryBackend, TieredCache};
use strata::monitoring::PerformanceMonitor;

fn engine_over(backend: Arc<InMemoryBackend>) -> Arc<TieredCache> {
    Arc::new(TieredCache::new(
        backend,
        EngineConfig {
            operation_timeout: Duration::from_millis(200),
            connect_retries: 0,
            ..Default::default()
        },
        Arc::new(PerformanceMonitor::default()),
    ))
}

// =============================================================================
// Key generation
// =============================================================================

mod key_tests {
    use strata::keys::{KeyGenerator, TextMode};
    use strata::Operation;

    use super::*;

    #[test]
    fn test_identical_inputs_identical_keys() {
        let generator = KeyGenerator::default();
        let opts = json!({"max_length": 100, "style": "brief"});
        let a = generator.generate_cache_key("Some text", Operation::Summarize, Some(&opts), None);
        let b = generator.generate_cache_key("Some text", Operation::Summarize, Some(&opts), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_option_order_does_not_matter() {
        let generator = KeyGenerator::default();
        let a: serde_json::Value =
            serde_json::from_str(r#"{"a": 1, "b": {"y": 2, "x": 3}}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"b": {"x": 3, "y": 2}, "a": 1}"#).unwrap();
        assert_eq!(
            generator.generate_cache_key("t", Operation::Qa, Some(&a), Some("why?")),
            generator.generate_cache_key("t", Operation::Qa, Some(&b), Some("why?"))
        );
    }

    #[test]
    fn test_every_input_changes_the_key() {
        let generator = KeyGenerator::default();
        let base = generator.generate_cache_key("t", Operation::Qa, None, Some("q1"));
        assert_ne!(base, generator.generate_cache_key("u", Operation::Qa, None, Some("q1")));
        assert_ne!(base, generator.generate_cache_key("t", Operation::Summarize, None, Some("q1")));
        assert_ne!(base, generator.generate_cache_key("t", Operation::Qa, Some(&json!({"k": 1})), Some("q1")));
        assert_ne!(base, generator.generate_cache_key("t", Operation::Qa, None, Some("q2")));
    }

    #[test]
    fn test_large_text_is_hashed() {
        let generator = KeyGenerator::default();
        let text = "word ".repeat(100_000);
        let key = generator.generate_cache_key(&text, Operation::Summarize, None, None);
        assert!(key.len() < 400);
        let parsed = KeyGenerator::parse_key(&key).unwrap();
        assert_eq!(parsed.text_mode, TextMode::Hash);
        assert_eq!(parsed.operation, Operation::Summarize);
    }
}

// =============================================================================
// Tiered engine
// =============================================================================

mod engine_tests {
    use super::*;
    use strata::cache::{CacheEvent, ConnectionState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_large_payload_round_trips_compressed() {
        let backend = Arc::new(InMemoryBackend::new());
        let engine = engine_over(backend);
        engine.connect().await;

        let payload = "abcdefghij".repeat(1_100_000);
        assert!(engine.set("big", &payload, None).await);
        engine.clear_l1();
        assert_eq!(engine.get::<String>("big").await.as_deref(), Some(payload.as_str()));

        let summary = engine.monitor().summary();
        assert_eq!(summary.compression.count, 1);
        assert!(summary.compression.avg_ratio < 0.1);
    }

    #[tokio::test]
    async fn test_empty_payload_round_trips() {
        let engine = engine_over(Arc::new(InMemoryBackend::new()));
        engine.connect().await;
        assert!(engine.set("empty", "", None).await);
        engine.clear_l1();
        assert_eq!(engine.get::<String>("empty").await.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_degraded_engine_misses_and_recovers() {
        let backend = Arc::new(InMemoryBackend::new());
        let engine = engine_over(backend.clone());
        engine.connect().await;

        backend.set_available(false);
        assert!(!engine.set("k", &1u32, None).await);
        assert_eq!(engine.state(), ConnectionState::Degraded);
        assert_eq!(engine.get::<u32>("k").await, None);

        backend.set_available(true);
        assert!(engine.connect().await);
        assert!(engine.set("k", &1u32, None).await);
        assert_eq!(engine.get::<u32>("k").await, Some(1));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out_into_degraded() {
        let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(500)));
        let engine = engine_over(backend);
        assert!(!engine.connect().await);
        assert_eq!(engine.state(), ConnectionState::Degraded);
        assert_eq!(engine.get::<u32>("k").await, None);
    }

    #[tokio::test]
    async fn test_callbacks_observe_invalidation() {
        let engine = engine_over(Arc::new(InMemoryBackend::new()));
        engine.connect().await;
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        engine.callbacks().register(CacheEvent::Invalidate, move |ctx| {
            counter.fetch_add(ctx.affected.unwrap_or(0) as usize, Ordering::SeqCst);
            Ok(())
        });

        for i in 0..3 {
            engine.set(&format!("user:{}", i), &i, None).await;
        }
        engine.set("other", &0, None).await;
        assert_eq!(engine.invalidate_pattern("user:*", Some("test")).await, 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(engine.exists("other").await);
    }
}

// =============================================================================
// AI response layer
// =============================================================================

mod ai_tests {
    use super::*;
    use strata::ai::{AiCacheConfig, AiResponseCache, TextTier};
    use strata::Operation;

    async fn ai_cache() -> (AiResponseCache, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let engine = engine_over(backend.clone());
        engine.connect().await;
        (AiResponseCache::new(engine, AiCacheConfig::default()), backend)
    }

    #[tokio::test]
    async fn test_cache_then_get_with_option_sensitivity() {
        let (cache, _) = ai_cache().await;
        let text = "Climate report ".repeat(50);
        let opts = json!({"max_length": 120});
        let response = json!({"summary": "Warming continues.", "model": "m-1"});

        assert!(
            cache
                .cache_response(&text, Operation::Summarize, Some(&opts), &response, None)
                .await
        );
        let hit = cache
            .get_cached_response(&text, Operation::Summarize, Some(&opts), None)
            .await
            .unwrap();
        assert_eq!(hit.response, response);
        assert_eq!(hit.tier, TextTier::Medium);

        assert!(cache
            .get_cached_response(&text, Operation::Summarize, Some(&json!({"max_length": 60})), None)
            .await
            .is_none());
        assert!(cache
            .get_cached_response(&text, Operation::KeyPoints, Some(&opts), None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_question_scopes_qa_entries() {
        let (cache, _) = ai_cache().await;
        cache
            .cache_response("doc", Operation::Qa, None, &json!("42"), Some("What is the answer?"))
            .await;
        assert!(cache
            .get_cached_response("doc", Operation::Qa, None, Some("What is the answer?"))
            .await
            .is_some());
        assert!(cache
            .get_cached_response("doc", Operation::Qa, None, Some("Who asked?"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_operation_scoped_invalidation() {
        let (cache, _) = ai_cache().await;
        for doc in ["a", "b", "c"] {
            cache
                .cache_response(doc, Operation::Summarize, None, &json!("s"), None)
                .await;
            cache
                .cache_response(doc, Operation::Sentiment, None, &json!("p"), None)
                .await;
        }
        assert_eq!(
            cache
                .invalidate_by_operation(Operation::Summarize, Some("prompt changed"))
                .await,
            3
        );
        for doc in ["a", "b", "c"] {
            assert!(cache
                .get_cached_response(doc, Operation::Summarize, None, None)
                .await
                .is_none());
            assert!(cache
                .get_cached_response(doc, Operation::Sentiment, None, None)
                .await
                .is_some());
        }
        let summary = cache.get_performance_summary();
        assert_eq!(summary.invalidation.by_reason["prompt changed"], 1);
    }

    #[tokio::test]
    async fn test_l2_hit_served_after_l1_loss() {
        let (cache, _) = ai_cache().await;
        cache
            .cache_response("short", Operation::Questions, None, &json!(["q?"]), None)
            .await;
        cache.engine().clear_l1();
        assert!(cache
            .get_cached_response("short", Operation::Questions, None, None)
            .await
            .is_some());
        // Promoted again
        assert_eq!(cache.engine().l1().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outage_returns_misses_not_errors() {
        let (cache, backend) = ai_cache().await;
        cache
            .cache_response("x", Operation::Summarize, None, &json!(1), None)
            .await;
        backend.set_available(false);
        cache.engine().clear_l1();
        assert!(cache
            .get_cached_response("x", Operation::Summarize, None, None)
            .await
            .is_none());
        assert_eq!(cache.status().health, strata::HealthStatus::Degraded);
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config_tests {
    use assert_matches::assert_matches;
    use strata::config::{
        CacheSettings, ExportFormat, PresetManager, PresetName,
    };
    use strata::{CacheBuilder, ConfigurationError};

    use super::*;

    #[test]
    fn test_precedence_preset_then_discrete_then_custom() {
        let manager = PresetManager::new();

        let preset_only = manager
            .resolve_settings(&CacheSettings {
                preset: Some("development".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(preset_only.config.default_ttl, 600);

        let discrete = manager
            .resolve_settings(&CacheSettings {
                preset: Some("development".into()),
                default_ttl: Some(1200),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(discrete.config.default_ttl, 1200);

        let custom = manager
            .resolve_settings(&CacheSettings {
                preset: Some("development".into()),
                default_ttl: Some(1200),
                custom_config: Some(r#"{"default_ttl": 2400}"#.into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(custom.config.default_ttl, 2400);
    }

    #[test]
    fn test_unknown_preset_error_lists_options() {
        let err = PresetManager::new()
            .resolve(Some("fast"), &[])
            .unwrap_err();
        assert_matches!(err, ConfigurationError::UnknownPreset { ref valid, .. } if valid.len() == 7);
        assert!(err.to_string().contains("ai-production"));
    }

    #[test]
    fn test_yaml_export_is_importable() {
        let manager = PresetManager::new();
        let config = manager.get("production").unwrap().config;
        let yaml = manager
            .export(&config, Some(PresetName::Production), ExportFormat::Yaml)
            .unwrap();
        assert!(yaml.contains("redis_url"));
        assert_eq!(manager.import(&yaml, ExportFormat::Yaml).unwrap(), config);
    }

    #[tokio::test]
    async fn test_builder_end_to_end() {
        let settings = CacheSettings {
            preset: Some("ai-production".into()),
            ..Default::default()
        };
        let built = CacheBuilder::from_settings(&settings)
            .unwrap()
            .with_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();
        let ai = built.ai().unwrap();
        assert!(
            ai.cache_response("t", strata::Operation::Sentiment, None, &json!("ok"), None)
                .await
        );
        assert!(ai
            .get_cached_response("t", strata::Operation::Sentiment, None, None)
            .await
            .is_some());
        assert!(built.validation().is_valid());
    }
}

// =============================================================================
// Monitoring
// =============================================================================

mod monitoring_tests {
    use super::*;
    use strata::monitoring::{render_prometheus, AlertLevel};

    #[test]
    fn test_invalidation_alert_thresholds() {
        let monitor = PerformanceMonitor::default();
        for i in 0..20 {
            let level = monitor.record_invalidation("p*", 1, Duration::from_millis(1), None);
            if i < 19 {
                assert_eq!(level, AlertLevel::Normal);
            } else {
                assert_eq!(level, AlertLevel::Warning);
            }
        }
        for _ in 20..49 {
            monitor.record_invalidation("p*", 1, Duration::from_millis(1), None);
        }
        assert_eq!(
            monitor.record_invalidation("p*", 1, Duration::from_millis(1), None),
            AlertLevel::Critical
        );
        assert_eq!(monitor.invalidation_rate(), 50);
    }

    #[test]
    fn test_empty_monitor_has_defaults() {
        let summary = PerformanceMonitor::default().summary();
        assert_eq!(summary.hit_rate, 0.0);
        assert_eq!(summary.key_generation.count, 0);
        assert!(summary.operations.is_empty());
        assert_eq!(summary.invalidation.alert, AlertLevel::Normal);
    }

    #[tokio::test]
    async fn test_snapshot_renders() {
        let engine = engine_over(Arc::new(InMemoryBackend::new()));
        engine.connect().await;
        let cache = strata::AiResponseCache::new(engine, strata::AiCacheConfig::default());
        cache
            .cache_response("t", strata::Operation::Qa, None, &json!("a"), Some("q"))
            .await;
        let snapshot = cache.metrics_snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["recommendations"].is_array());
        let text = render_prometheus(&snapshot).unwrap();
        assert!(text.contains("strata_cache_sets_total 1"));
    }
}
