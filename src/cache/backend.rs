//! Persistent Store (L2) Port
//!
//! The engine talks to its backing store only through [`CacheBackend`], the
//! narrow command set a Redis-compatible store offers:
//!
//! ```text
//!   PING  GET  SET EX  DEL  EXISTS  TTL  SCAN
//! ```
//!
//! Implementations:
//! - [`InMemoryBackend`]: DashMap store with per-key expiry, plus fault and
//!   latency injection for exercising degraded mode.
//! - [`NoopBackend`]: stores nothing; backs the `disabled` preset.
//! - `RedisBackend` (feature `redis`): networked store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One page of an incremental key scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor for the next call; `0` means the scan is complete
    pub cursor: u64,
    /// Keys matched in this page
    pub keys: Vec<String>,
}

/// Backing store trait
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs and status
    fn name(&self) -> &'static str;

    /// Round-trip liveness check
    async fn ping(&self) -> Result<()>;

    /// Read raw bytes
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write raw bytes with an expiry
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remaining time to live; `None` when the key is missing or has no expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Incremental, non-blocking key scan (never a full `KEYS`)
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage>;

    /// Get backend statistics
    fn stats(&self) -> BackendStats;
}

/// Backend statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    /// Stored keys, when the backend can count them cheaply
    pub entries: Option<u64>,
    /// Stored bytes, when known
    pub total_bytes: Option<u64>,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

// =============================================================================
// Glob Matching
// =============================================================================

/// Redis-style glob match: `*`, `?`, `[abc]`, `[a-z]`, `[^a]` and `\` escapes
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_at(&p, &t)
}

fn glob_match_at(p: &[char], t: &[char]) -> bool {
    let (mut pi, mut ti) = (0usize, 0usize);
    // Backtrack point for the most recent `*`
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(p, pi, t[ti]) {
                        if matched {
                            pi = next;
                            ti += 1;
                            continue;
                        }
                    } else if t[ti] == '[' {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

/// Match `c` against the class starting at `p[start] == '['`.
/// Returns `(matched, index after ']')`, or `None` for an unterminated class.
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(p.get(i), Some('^'));
    if negate {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    while i < p.len() {
        if p[i] == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;
        let lo = if p[i] == '\\' && i + 1 < p.len() {
            i += 1;
            p[i]
        } else {
            p[i]
        };
        if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            let hi = p[i + 2];
            if (lo..=hi).contains(&c) {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

// =============================================================================
// In-Memory Backend
// =============================================================================

struct StoredValue {
    data: Bytes,
    expires_at: Instant,
}

/// In-memory backend for development and tests
///
/// Expired keys are dropped lazily on access and during scans.
pub struct InMemoryBackend {
    storage: DashMap<String, StoredValue>,
    available: AtomicBool,
    latency: Option<Duration>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            available: AtomicBool::new(true),
            latency: None,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl InMemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every command by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate an outage: while unavailable every command fails with a connectivity error
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether commands currently succeed
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Overwrite a key with arbitrary bytes (corruption tests)
    pub fn insert_raw(&self, key: impl Into<String>, data: Bytes, ttl: Duration) {
        self.storage.insert(
            key.into(),
            StoredValue {
                data,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.storage.iter().filter(|e| e.expires_at > now).count()
    }

    /// Check if no live keys remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn command(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::Connectivity("in-memory backend marked unavailable".into()))
        }
    }

    fn live(&self, key: &str) -> Option<dashmap::mapref::one::Ref<'_, String, StoredValue>> {
        let entry = self.storage.get(key)?;
        if entry.expires_at > Instant::now() {
            return Some(entry);
        }
        drop(entry);
        self.storage
            .remove_if(key, |_, v| v.expires_at <= Instant::now());
        None
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        self.command().await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.command().await?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.live(key).map(|v| v.data.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.command().await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.insert_raw(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.command().await?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|k| self.storage.remove(k))
            .filter(|(_, v)| v.expires_at > now)
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.command().await?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.command().await?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .live(key)
            .and_then(|v| v.expires_at.checked_duration_since(Instant::now())))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        self.command().await?;
        let now = Instant::now();
        self.storage.retain(|_, v| v.expires_at > now);

        // Sorted snapshot makes the offset cursor stable between pages
        let mut keys: Vec<String> = self.storage.iter().map(|e| e.key().clone()).collect();
        keys.sort_unstable();

        let start = cursor as usize;
        let end = start.saturating_add(count.max(1)).min(keys.len());
        let page: Vec<String> = keys
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        let next = if end >= keys.len() { 0 } else { end as u64 };
        Ok(ScanPage {
            cursor: next,
            keys: page,
        })
    }

    fn stats(&self) -> BackendStats {
        let now = Instant::now();
        let (entries, bytes) = self
            .storage
            .iter()
            .filter(|e| e.expires_at > now)
            .fold((0u64, 0u64), |(n, b), e| (n + 1, b + e.data.len() as u64));
        BackendStats {
            entries: Some(entries),
            total_bytes: Some(bytes),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// No-op Backend
// =============================================================================

/// Backend that stores nothing; every read misses
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

#[async_trait]
impl CacheBackend for NoopBackend {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64> {
        Ok(0)
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>> {
        Ok(None)
    }

    async fn scan(&self, _cursor: u64, _pattern: &str, _count: usize) -> Result<ScanPage> {
        Ok(ScanPage::default())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            entries: Some(0),
            total_bytes: Some(0),
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_literals_and_wildcards() {
        assert!(glob_match("abc", "abc"));
        assert!(!glob_match("abc", "abcd"));
        assert!(glob_match("a*", "abcd"));
        assert!(glob_match("*", ""));
        assert!(glob_match("*b*d", "abcd"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("ai_cache:op:summarize|*", "ai_cache:op:summarize|tier:small|txt:empty"));
        assert!(!glob_match("ai_cache:op:summarize|*", "ai_cache:op:sentiment|tier:small"));
    }

    #[test]
    fn test_glob_classes_and_escapes() {
        assert!(glob_match("h[ae]llo", "hello"));
        assert!(glob_match("h[ae]llo", "hallo"));
        assert!(!glob_match("h[ae]llo", "hillo"));
        assert!(glob_match("h[a-c]llo", "hbllo"));
        assert!(glob_match("h[^e]llo", "hallo"));
        assert!(!glob_match("h[^e]llo", "hello"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
    }

    #[tokio::test]
    async fn test_in_memory_set_get_delete() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert!(backend.exists("k").await.unwrap());
        let ttl = backend.ttl("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(58));

        let removed = backend
            .delete(&["k".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.ttl("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_expiry() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", Bytes::from_static(b"v"), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_scan_pages_through_all_matches() {
        let backend = InMemoryBackend::new();
        for i in 0..25 {
            backend
                .set(&format!("a:{:02}", i), Bytes::new(), Duration::from_secs(60))
                .await
                .unwrap();
            backend
                .set(&format!("b:{:02}", i), Bytes::new(), Duration::from_secs(60))
                .await
                .unwrap();
        }

        let mut cursor = 0;
        let mut found = Vec::new();
        let mut pages = 0;
        loop {
            let page = backend.scan(cursor, "a:*", 10).await.unwrap();
            found.extend(page.keys);
            pages += 1;
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(found.len(), 25);
        assert_eq!(pages, 5);
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_with_connectivity() {
        let backend = InMemoryBackend::new();
        backend.set_available(false);
        let err = backend.get("k").await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(backend.ping().await.is_err());

        backend.set_available(true);
        assert!(backend.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_stats_count_live_entries() {
        let backend = InMemoryBackend::new();
        backend
            .set("a", Bytes::from_static(b"12345"), Duration::from_secs(60))
            .await
            .unwrap();
        backend.get("a").await.unwrap();
        let stats = backend.stats();
        assert_eq!(stats.entries, Some(1));
        assert_eq!(stats.total_bytes, Some(5));
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_noop_backend_never_stores() {
        let backend = NoopBackend;
        backend
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.scan(0, "*", 10).await.unwrap(), ScanPage::default());
    }
}
