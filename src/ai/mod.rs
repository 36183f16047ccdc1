//! AI Response Layer
//!
//! Specializes the tiered engine for model responses:
//!
//! - [`operation`] - the closed set of AI operations and their default TTLs
//! - [`tiers`] - text-size classification
//! - [`policy`] - which entries deserve an L1 slot
//! - [`metrics`] - per-tier and per-operation counters
//! - [`recommendations`] - ranked tuning advice
//! - [`layer`] - [`AiResponseCache`], the decorator over [`TieredCache`](crate::cache::TieredCache)

pub mod layer;
pub mod metrics;
pub mod operation;
pub mod policy;
pub mod recommendations;
pub mod tiers;

pub use layer::{
    AiCacheConfig, AiCacheStats, AiResponseCache, CachedResponse, MetricsSnapshot, SCHEMA_VERSION,
};
pub use metrics::{AiMetrics, AiMetricsSnapshot, CounterSnapshot};
pub use operation::{Operation, UnknownOperation};
pub use policy::PromotionPolicy;
pub use recommendations::{Priority, Recommendation};
pub use tiers::{TextSizeTiers, TextTier};
