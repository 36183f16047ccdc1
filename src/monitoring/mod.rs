//! Monitoring
//!
//! - [`stream`] - age- and count-bounded measurement buffers
//! - [`performance`] - [`PerformanceMonitor`] and its derived statistics
//! - [`health`] - health states for an external status endpoint
//! - [`exporter`] - Prometheus text rendering of a metrics snapshot

pub mod exporter;
pub mod health;
pub mod performance;
pub mod stream;

pub use exporter::render_prometheus;
pub use health::{HealthCheckResult, HealthStatus};
pub use performance::{
    AlertLevel, CompressionStats, InvalidationStats, KeyGenerationStats, MemorySample,
    MemoryStats, MonitorConfig, OperationStats, PerformanceMonitor, PerformanceSummary,
};
pub use stream::{BoundedStream, Timestamped};
