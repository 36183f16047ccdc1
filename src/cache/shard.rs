//! Sharded Map
//!
//! Concurrent hashmap split into power-of-two shards, each behind its own
//! `parking_lot::RwLock`. Reads on different shards never contend; a shard is
//! picked by masking the key hash.
//!
//! Size accounting is done by the map itself through a caller-supplied sizing
//! function, so replacing or removing a value never needs the caller to
//! remember how big the old value was.

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Default number of shards
pub const DEFAULT_SHARD_COUNT: usize = 64;

/// Single shard: one map plus counters
pub struct Shard<K, V> {
    map: RwLock<HashMap<K, V>>,
    size_bytes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl<K, V> Shard<K, V> {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            size_bytes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accounted size of values
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }
}

/// Sharded map with size accounting
pub struct ShardedMap<K, V> {
    shards: Box<[Shard<K, V>]>,
    mask: usize,
    hasher: std::collections::hash_map::RandomState,
    sizer: fn(&V) -> u64,
}

impl<K: Eq + Hash + Clone, V: Clone> ShardedMap<K, V> {
    /// Create a map with `shard_count` shards (rounded up to a power of two)
    pub fn new(shard_count: usize, sizer: fn(&V) -> u64) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards: Vec<Shard<K, V>> = (0..count).map(|_| Shard::new()).collect();
        Self {
            shards: shards.into_boxed_slice(),
            mask: count - 1,
            hasher: Default::default(),
            sizer,
        }
    }

    #[inline]
    fn shard_for<Q>(&self, key: &Q) -> &Shard<K, V>
    where
        Q: Hash + ?Sized,
    {
        let idx = (self.hasher.hash_one(key) as usize) & self.mask;
        &self.shards[idx]
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Get a clone of the value
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let shard = self.shard_for(key);
        shard.reads.fetch_add(1, Ordering::Relaxed);
        shard.map.read().get(key).cloned()
    }

    /// Check if a key exists
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let shard = self.shard_for(key);
        shard.reads.fetch_add(1, Ordering::Relaxed);
        shard.map.read().contains_key(key)
    }

    /// Insert a value, returning the replaced one
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let shard = self.shard_for(&key);
        shard.writes.fetch_add(1, Ordering::Relaxed);
        let added = (self.sizer)(&value);

        let mut guard = shard.map.write();
        let old = guard.insert(key, value);
        shard.size_bytes.fetch_add(added, Ordering::Relaxed);
        if let Some(old) = &old {
            shard.size_bytes.fetch_sub((self.sizer)(old), Ordering::Relaxed);
        }
        old
    }

    /// Remove a value
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let shard = self.shard_for(key);
        shard.writes.fetch_add(1, Ordering::Relaxed);

        let removed = shard.map.write().remove(key);
        if let Some(old) = &removed {
            shard.size_bytes.fetch_sub((self.sizer)(old), Ordering::Relaxed);
        }
        removed
    }

    /// Remove a value only if `predicate` holds for it under the write lock
    pub fn remove_if<Q, F>(&self, key: &Q, predicate: F) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> bool,
    {
        let shard = self.shard_for(key);
        let mut guard = shard.map.write();
        if !guard.get(key).map(predicate).unwrap_or(false) {
            return None;
        }
        shard.writes.fetch_add(1, Ordering::Relaxed);
        let removed = guard.remove(key);
        if let Some(old) = &removed {
            shard.size_bytes.fetch_sub((self.sizer)(old), Ordering::Relaxed);
        }
        removed
    }

    /// Drop every entry for which `keep` returns false; returns the number removed
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut guard = shard.map.write();
            let mut freed = 0u64;
            guard.retain(|k, v| {
                if keep(k, v) {
                    true
                } else {
                    freed += (self.sizer)(v);
                    removed += 1;
                    false
                }
            });
            if freed > 0 {
                shard.writes.fetch_add(1, Ordering::Relaxed);
                shard.size_bytes.fetch_sub(freed, Ordering::Relaxed);
            }
        }
        removed
    }

    /// Snapshot of every entry
    pub fn entries(&self) -> Vec<(K, V)> {
        self.shards
            .iter()
            .flat_map(|s| {
                let guard = s.map.read();
                guard
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Total entries
    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(Shard::is_empty)
    }

    /// Total accounted size
    pub fn size_bytes(&self) -> u64 {
        self.shards.iter().map(Shard::size_bytes).sum()
    }

    /// Clear all shards
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.map.write().clear();
            shard.size_bytes.store(0, Ordering::Relaxed);
        }
    }

    /// Detailed statistics
    pub fn stats(&self) -> ShardedMapStats {
        let shard_entry_counts: Vec<usize> = self.shards.iter().map(Shard::len).collect();
        ShardedMapStats {
            total_entries: shard_entry_counts.iter().sum(),
            total_size_bytes: self.size_bytes(),
            total_reads: self
                .shards
                .iter()
                .map(|s| s.reads.load(Ordering::Relaxed))
                .sum(),
            total_writes: self
                .shards
                .iter()
                .map(|s| s.writes.load(Ordering::Relaxed))
                .sum(),
            shard_entry_counts,
        }
    }
}

/// Statistics for a sharded map
#[derive(Debug, Clone)]
pub struct ShardedMapStats {
    /// Total entries
    pub total_entries: usize,
    /// Total size in bytes
    pub total_size_bytes: u64,
    /// Total reads
    pub total_reads: u64,
    /// Total writes
    pub total_writes: u64,
    /// Per-shard entry counts
    pub shard_entry_counts: Vec<usize>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn string_map(shards: usize) -> ShardedMap<String, String> {
        ShardedMap::new(shards, |v: &String| v.len() as u64)
    }

    #[test]
    fn test_shard_count_rounded() {
        assert_eq!(string_map(10).shard_count(), 16);
        assert_eq!(string_map(0).shard_count(), 1);
    }

    #[test]
    fn test_insert_get_remove() {
        let map = string_map(16);
        assert!(map.insert("a".into(), "hello".into()).is_none());
        assert_eq!(map.get("a").as_deref(), Some("hello"));
        assert!(map.contains_key("a"));
        assert_eq!(map.size_bytes(), 5);

        assert_eq!(map.remove("a").as_deref(), Some("hello"));
        assert!(map.is_empty());
        assert_eq!(map.size_bytes(), 0);
    }

    #[test]
    fn test_replace_adjusts_size() {
        let map = string_map(4);
        map.insert("k".into(), "1234".into());
        map.insert("k".into(), "12".into());
        assert_eq!(map.len(), 1);
        assert_eq!(map.size_bytes(), 2);
    }

    #[test]
    fn test_remove_if() {
        let map = string_map(4);
        map.insert("k".into(), "keep".into());
        assert!(map.remove_if("k", |v| v == "other").is_none());
        assert!(map.remove_if("k", |v| v == "keep").is_some());
        assert!(map.remove_if("missing", |_| true).is_none());
    }

    #[test]
    fn test_retain_by_prefix() {
        let map = string_map(16);
        for i in 0..50 {
            map.insert(format!("a:{}", i), "x".into());
            map.insert(format!("b:{}", i), "yy".into());
        }
        let removed = map.retain(|k, _| !k.starts_with("a:"));
        assert_eq!(removed, 50);
        assert_eq!(map.len(), 50);
        assert_eq!(map.size_bytes(), 100);
    }

    #[test]
    fn test_statistics_and_distribution() {
        let map = string_map(16);
        for i in 0..1000 {
            map.insert(format!("key{}", i), "v".into());
        }
        for i in 0..50 {
            map.get(format!("key{}", i).as_str());
        }

        let stats = map.stats();
        assert_eq!(stats.total_entries, 1000);
        assert_eq!(stats.total_writes, 1000);
        assert_eq!(stats.total_reads, 50);
        let max = stats.shard_entry_counts.iter().max().copied().unwrap_or(0);
        assert!(max < 200, "uneven distribution: {}", max);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let map = Arc::new(string_map(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for i in 0..1000 {
                        let key = format!("key-{}-{}", t, i);
                        map.insert(key.clone(), "v".into());
                        map.get(key.as_str());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 8000);
        assert_eq!(map.size_bytes(), 8000);
    }
}
