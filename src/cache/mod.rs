//! Two-Tier Cache Engine
//!
//! Generic key-value caching with an in-process L1 in front of a persistent L2.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          TieredCache                                  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  L1 (in-process)              │  L2 (persistent)                      │
//! │  ┌────────────────────────┐   │  ┌─────────────────────────────┐      │
//! │  │ ShardedMap<RwLock>     │   │  │ Arc<dyn CacheBackend>       │      │
//! │  │ entry-bounded, per-key │   │  │ Redis / InMemory / Noop     │      │
//! │  │ expiry, LRU-K eviction │   │  │ STR1 envelopes, LZ4         │      │
//! │  └────────────────────────┘   │  └─────────────────────────────┘      │
//! │             │                 │                │                      │
//! │             └──── promotion (remaining L2 TTL) ┘                      │
//! │                                                                       │
//! │  Connection state machine · callbacks · timeouts · self-heal          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! L1 never holds a value L2 does not: entries are promoted from or written
//! through to L2 and expire no later than their L2 copy.

pub mod backend;
pub mod callbacks;
pub mod compression;
mod engine;
mod entry;
mod l1;
#[cfg(feature = "redis")]
mod redis;
mod shard;

pub use backend::{glob_match, BackendStats, CacheBackend, InMemoryBackend, NoopBackend, ScanPage};
pub use callbacks::{CacheEvent, CallbackId, CallbackRegistry, EventContext};
pub use compression::{
    CompressionAlgorithm, CompressionConfig, CompressionManager, Compressor, MAX_COMPRESSION_LEVEL,
    MIN_COMPRESSION_LEVEL,
};
pub use engine::{
    CacheHit, CacheStatus, ConnectionState, EngineConfig, EngineStats, HitSource, SetOptions,
    TieredCache,
};
pub use entry::{
    CacheEntry, EntryMetadata, L1Entry, ATTR_OPERATION, ATTR_TIER, ENVELOPE_MAGIC, MAX_ENTRY_TTL_SECS,
};
pub use l1::{L1Cache, L1Config, L1Stats};
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
pub use shard::{ShardedMap, ShardedMapStats};
