//! Prometheus Exposition
//!
//! Renders a [`MetricsSnapshot`] in the Prometheus text format for an
//! external `/metrics` endpoint. A fresh registry is built per render so the
//! output always reflects exactly one snapshot and nothing is registered
//! globally.

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::ai::MetricsSnapshot;
use crate::cache::ConnectionState;
use crate::error::{Error, Result};

const NAMESPACE: &str = "strata";

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("Prometheus encoding failed: {}", e))
}

struct Builder {
    registry: Registry,
}

impl Builder {
    fn opts(name: &str, help: &str) -> Opts {
        Opts::new(name, help).namespace(NAMESPACE)
    }

    fn register<M: prometheus::core::Collector + Clone + 'static>(&self, metric: M) -> Result<M> {
        self.registry
            .register(Box::new(metric.clone()))
            .map_err(prom_err)?;
        Ok(metric)
    }

    fn counter(&self, name: &str, help: &str, value: u64) -> Result<()> {
        let c = self.register(IntCounter::with_opts(Self::opts(name, help)).map_err(prom_err)?)?;
        c.inc_by(value);
        Ok(())
    }

    fn counter_vec(&self, name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
        self.register(IntCounterVec::new(Self::opts(name, help), labels).map_err(prom_err)?)
    }

    fn gauge(&self, name: &str, help: &str, value: f64) -> Result<()> {
        let g = self.register(Gauge::with_opts(Self::opts(name, help)).map_err(prom_err)?)?;
        g.set(value);
        Ok(())
    }

    fn int_gauge(&self, name: &str, help: &str, value: i64) -> Result<()> {
        let g = self.register(IntGauge::with_opts(Self::opts(name, help)).map_err(prom_err)?)?;
        g.set(value);
        Ok(())
    }
}

/// Render `snapshot` in the Prometheus text format
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> Result<String> {
    let b = Builder {
        registry: Registry::new(),
    };
    let status = &snapshot.status;
    let stats = &status.stats;

    // Engine
    b.int_gauge(
        "cache_up",
        "1 when the backend is connected, 0 when degraded or not started",
        i64::from(status.state == ConnectionState::Connected),
    )?;
    let hits = b.counter_vec("cache_hits_total", "Lookups served, by tier", &["tier"])?;
    hits.with_label_values(&["l1"]).inc_by(stats.l1_hits);
    hits.with_label_values(&["l2"]).inc_by(stats.l2_hits);
    b.counter("cache_misses_total", "Lookups that found nothing", stats.misses)?;
    b.counter("cache_sets_total", "Successful writes", stats.sets)?;
    b.counter("cache_set_failures_total", "Writes that did not reach the backend", stats.set_failures)?;
    b.counter("cache_backend_errors_total", "Failed backend calls", stats.backend_errors)?;
    b.counter(
        "cache_corrupted_entries_total",
        "Undecodable entries found and removed",
        stats.corrupted_entries,
    )?;
    if let Some(l1) = &status.l1 {
        b.int_gauge("l1_entries", "Entries held in L1", l1.entries as i64)?;
        b.int_gauge("l1_bytes", "Bytes held in L1", l1.size_bytes as i64)?;
        b.counter("l1_evictions_total", "Entries evicted from L1", l1.evictions)?;
    }

    // AI layer
    let ai = &snapshot.ai;
    b.gauge("ai_hit_rate", "AI lookup hit rate (0-1)", ai.hit_rate)?;
    let lookups = b.counter_vec(
        "ai_lookups_total",
        "AI lookups by text tier and result",
        &["tier", "result"],
    )?;
    let promotions = b.counter_vec("ai_promotions_total", "L2 hits promoted into L1", &["tier"])?;
    for (tier, c) in &ai.tiers {
        let tier = tier.as_str();
        lookups.with_label_values(&[tier, "hit"]).inc_by(c.hits);
        lookups.with_label_values(&[tier, "miss"]).inc_by(c.misses);
        promotions.with_label_values(&[tier]).inc_by(c.promotions);
    }
    let stores = b.counter_vec("ai_stores_total", "Responses stored, by operation", &["operation"])?;
    for (operation, c) in &ai.operations {
        stores.with_label_values(&[operation.as_str()]).inc_by(c.stores);
    }

    // Latency
    let latency = b.register(
        GaugeVec::new(
            Builder::opts("operation_latency_ms", "Operation latency percentiles in milliseconds"),
            &["operation", "quantile"],
        )
        .map_err(prom_err)?,
    )?;
    for (name, s) in &snapshot.performance.operations {
        for (quantile, value) in [("0.5", s.p50_ms), ("0.95", s.p95_ms), ("0.99", s.p99_ms)] {
            latency.with_label_values(&[name.as_str(), quantile]).set(value);
        }
    }

    // Compression, invalidation, advice
    let perf = &snapshot.performance;
    b.gauge(
        "compression_ratio_avg",
        "Average compressed/original size ratio",
        perf.compression.avg_ratio,
    )?;
    b.counter(
        "compression_bytes_saved_total",
        "Bytes saved by compression",
        perf.compression.bytes_saved,
    )?;
    b.int_gauge(
        "invalidations_last_hour",
        "Invalidation operations within the rate window",
        perf.invalidation.invalidations_last_hour as i64,
    )?;
    let advice = b.register(
        IntGaugeVec::new(
            Builder::opts("recommendations", "Open tuning recommendations by priority"),
            &["priority"],
        )
        .map_err(prom_err)?,
    )?;
    for rec in &snapshot.recommendations {
        let priority = rec.priority.to_string();
        advice.with_label_values(&[priority.as_str()]).inc();
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&b.registry.gather(), &mut buffer)
        .map_err(prom_err)?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
}
