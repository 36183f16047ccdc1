//! Property tests for key determinism, tier classification and round trips

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use strata::ai::TextSizeTiers;
use strata::cache::{CompressionConfig, CompressionManager, EngineConfig, InMemoryBackend, TieredCache};
use strata::keys::{canonical_json, KeyGenerator};
use strata::monitoring::PerformanceMonitor;
use strata::{Operation, TextTier};

fn operation() -> impl Strategy<Value = Operation> {
    prop::sample::select(Operation::ALL.to_vec())
}

fn options() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..6)
}

fn object(pairs: &[(String, i64)]) -> Value {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.clone(), json!(v));
    }
    Value::Object(map)
}

proptest! {
    #[test]
    fn key_is_pure(text in ".{0,2000}", op in operation(), pairs in options(), q in proptest::option::of(".{0,40}")) {
        let generator = KeyGenerator::default();
        let opts = object(&pairs);
        let a = generator.generate_cache_key(&text, op, Some(&opts), q.as_deref());
        let b = generator.generate_cache_key(&text, op, Some(&opts), q.as_deref());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn key_ignores_option_order(text in ".{0,200}", op in operation(), pairs in options()) {
        let generator = KeyGenerator::default();
        let forward = object(&pairs);
        let mut reversed_pairs = pairs.clone();
        reversed_pairs.reverse();
        // Later duplicates win in both orders only when keys are unique
        let unique: std::collections::BTreeMap<_, _> = pairs.iter().cloned().collect();
        prop_assume!(unique.len() == pairs.len());
        let backward = object(&reversed_pairs);
        prop_assert_eq!(canonical_json(&forward), canonical_json(&backward));
        prop_assert_eq!(
            generator.generate_cache_key(&text, op, Some(&forward), None),
            generator.generate_cache_key(&text, op, Some(&backward), None)
        );
    }

    #[test]
    fn parsed_key_matches_inputs(text in ".{0,3000}", op in operation(), q in proptest::option::of("[a-z ]{1,40}")) {
        let generator = KeyGenerator::default();
        let key = generator.generate_cache_key(&text, op, None, q.as_deref());
        let parsed = KeyGenerator::parse_key(&key).unwrap();
        prop_assert_eq!(parsed.operation, op);
        prop_assert_eq!(parsed.tier, TextSizeTiers::default().classify_text(&text));
        prop_assert_eq!(parsed.has_question, q.is_some());
    }

    #[test]
    fn tiers_are_monotonic(a in 0usize..100_000, b in 0usize..100_000) {
        let tiers = TextSizeTiers::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(tiers.classify(lo) <= tiers.classify(hi));
    }

    #[test]
    fn compression_round_trips(data in prop::collection::vec(any::<u8>(), 0..20_000), threshold in 0u64..5000) {
        let manager = CompressionManager::with_config(CompressionConfig {
            threshold_bytes: threshold,
            ..Default::default()
        });
        let compressed = manager.compress(&data);
        if (data.len() as u64) <= threshold {
            prop_assert!(!compressed.is_compressed());
        }
        let restored = manager.decompress(&compressed.data, compressed.algorithm).unwrap();
        prop_assert_eq!(restored.as_ref(), data.as_slice());
    }

    #[test]
    fn engine_returns_what_was_stored(value in prop::collection::vec(".{0,50}", 0..50)) {
        tokio_test::block_on(async {
            let engine = TieredCache::new(
                Arc::new(InMemoryBackend::new()),
                EngineConfig::default(),
                Arc::new(PerformanceMonitor::default()),
            );
            engine.connect().await;
            assert!(engine.set("k", &value, None).await);
            engine.clear_l1();
            assert_eq!(engine.get::<Vec<String>>("k").await, Some(value.clone()));
        });
    }
}

#[test]
fn small_tier_bound_is_exclusive() {
    let tiers = TextSizeTiers::default();
    assert_eq!(tiers.classify(499), TextTier::Small);
    assert_eq!(tiers.classify(500), TextTier::Medium);
}
