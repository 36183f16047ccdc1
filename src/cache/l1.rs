//! L1 Cache - In-Process Hot Tier
//!
//! Entry-bounded, sharded, never awaits. Every entry carries its own expiry,
//! set from the remaining L2 TTL at promotion time, so L1 never outlives the
//! persistent copy it mirrors.
//!
//! # Eviction
//!
//! When an insert would exceed `max_entries`, expired entries go first, then
//! entries with the highest `idle / (hits + 1)` score, in batches so a full
//! cache does not rescan on every insert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::backend::glob_match;
use super::entry::L1Entry;
use super::shard::{ShardedMap, DEFAULT_SHARD_COUNT};

/// L1 configuration
#[derive(Debug, Clone)]
pub struct L1Config {
    /// Maximum number of entries
    pub max_entries: usize,
    /// Shard count (rounded to a power of two)
    pub shard_count: usize,
    /// Fraction of `max_entries` freed per eviction pass
    pub eviction_fraction: f64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_entries: 100,
            shard_count: DEFAULT_SHARD_COUNT,
            eviction_fraction: 0.10,
        }
    }
}

/// In-process hot cache
pub struct L1Cache {
    storage: ShardedMap<String, Arc<L1Entry>>,
    config: L1Config,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl L1Cache {
    /// Create a new L1 cache with default configuration
    pub fn new() -> Self {
        Self::with_config(L1Config::default())
    }

    /// Create a new L1 cache with custom configuration
    pub fn with_config(config: L1Config) -> Self {
        Self {
            storage: ShardedMap::new(config.shard_count, |e: &Arc<L1Entry>| e.size()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a live entry; expired entries are dropped on the spot
    pub fn get(&self, key: &str) -> Option<Arc<L1Entry>> {
        match self.storage.get(key) {
            Some(entry) if entry.is_expired() => {
                self.storage.remove_if(key, |e| Arc::ptr_eq(e, &entry));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                entry.record_access();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entry; returns false when L1 holds nothing (`max_entries == 0`)
    pub fn put(&self, key: impl Into<String>, entry: L1Entry) -> bool {
        if self.config.max_entries == 0 {
            return false;
        }
        let key = key.into();
        if !self.storage.contains_key(key.as_str()) && self.storage.len() >= self.config.max_entries
        {
            self.evict();
        }
        self.storage.insert(key, Arc::new(entry));
        true
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> bool {
        self.storage.remove(key).is_some()
    }

    /// Check presence of a live entry without touching access statistics
    pub fn contains(&self, key: &str) -> bool {
        self.storage
            .get(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    /// Remove every key matching a glob pattern; returns the number removed
    pub fn remove_matching(&self, pattern: &str) -> usize {
        self.storage.retain(|k, _| !glob_match(pattern, k))
    }

    /// Drop expired entries
    pub fn purge_expired(&self) -> usize {
        self.storage.retain(|_, e| !e.is_expired())
    }

    fn evict(&self) {
        let expired = self.purge_expired();
        if expired > 0 {
            self.evictions.fetch_add(expired as u64, Ordering::Relaxed);
        }
        if self.storage.len() < self.config.max_entries {
            return;
        }

        let batch = ((self.config.max_entries as f64 * self.config.eviction_fraction) as usize).max(1);
        let mut candidates: Vec<(String, f64)> = self
            .storage
            .entries()
            .into_iter()
            .map(|(k, e)| (k, e.eviction_score()))
            .collect();
        // Highest score = most evictable
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut evicted = 0;
        for (key, _) in candidates.into_iter().take(batch) {
            if self.storage.remove(key.as_str()).is_some() {
                evicted += 1;
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        tracing::debug!(evicted, "L1 eviction pass");
    }

    /// Number of entries (may include not-yet-purged expired ones)
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Bytes held by cached values
    pub fn size_bytes(&self) -> u64 {
        self.storage.size_bytes()
    }

    /// Configured entry bound
    pub fn max_entries(&self) -> usize {
        self.config.max_entries
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> L1Stats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        L1Stats {
            entries: self.len(),
            max_entries: self.config.max_entries,
            size_bytes: self.size_bytes(),
            hits,
            misses,
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}

/// L1 cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L1Stats {
    /// Number of entries
    pub entries: usize,
    /// Configured bound
    pub max_entries: usize,
    /// Bytes held
    pub size_bytes: u64,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Eviction count
    pub evictions: u64,
}

// =============================================================================
// Tests
// =============================================================================
