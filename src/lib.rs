//! Strata - Tiered Response Cache
//!
//! A two-tier cache (in-process L1 in front of a persistent L2) with an
//! AI-response layer on top that adds text-size tiering, per-operation TTLs,
//! L1 promotion heuristics and a closed set of configuration presets.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  CacheSettings ─▶ PresetManager ─▶ ParameterMapper ─▶ Builder   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ KeyGenerator │───▶│ AiResponse-  │───▶│ TieredCache  │       │
//! │  │              │    │ Cache        │    │  L1 │ L2     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │            └──────────────┬──────────────────┘                  │
//! │                  PerformanceMonitor                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache is best-effort acceleration: runtime operations never return
//! errors. A failing backend degrades the engine to misses; only
//! configuration problems surface as [`ConfigurationError`] at startup.
//!
//! # Modules
//!
//! - [`ai`] - AI response layer
//! - [`builder`] - composition root
//! - [`cache`] - two-tier engine and backends
//! - [`config`] - presets, overrides and validation
//! - [`error`] - error types
//! - [`keys`] - cache key generation
//! - [`logging`] - subscriber setup for host binaries
//! - [`monitoring`] - performance monitor, health and Prometheus rendering

pub mod ai;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod monitoring;

pub use ai::{AiCacheConfig, AiResponseCache, CachedResponse, Operation, TextTier};
pub use builder::{BuiltCache, CacheBuilder, SecureConnector};
pub use cache::{CacheBackend, ConnectionState, EngineConfig, InMemoryBackend, TieredCache};
pub use config::{CacheConfig, CacheSettings, PresetManager, PresetName};
pub use error::{ConfigurationError, Error, Result};
pub use keys::KeyGenerator;
pub use logging::{init_logging, LoggingConfig};
pub use monitoring::{HealthStatus, PerformanceMonitor};
