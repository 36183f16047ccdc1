//! Redis Backend
//!
//! Networked L2 over a multiplexed `ConnectionManager`. The manager is
//! established on first use and reconnects on its own afterwards, so an
//! unreachable server at startup only degrades the engine. Command errors
//! surface as [`Error::Connectivity`] or [`Error::Backend`] and the engine
//! decides whether to degrade.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use super::backend::{BackendStats, CacheBackend, ScanPage};
use crate::error::{Error, Result};

/// Redis-backed persistent store
pub struct RedisBackend {
    client: Option<redis::Client>,
    manager: OnceCell<ConnectionManager>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl RedisBackend {
    /// Parse `url` (`redis://`, `rediss://` or `unix://`) without connecting
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self {
            client: Some(client),
            manager: OnceCell::new(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Parse `url` and establish the connection immediately
    pub async fn connect(url: &str) -> Result<Self> {
        let backend = Self::new(url)?;
        backend.connection().await?;
        Ok(backend)
    }

    /// Wrap an already established connection, e.g. one handed out by a
    /// secured connector
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            client: None,
            manager: OnceCell::new_with(Some(manager)),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let client = self
                    .client
                    .clone()
                    .ok_or_else(|| Error::Connectivity("no Redis client configured".into()))?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("Connected to Redis backend");
                Ok::<_, Error>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value.as_ref(), ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut conn = self.connection().await?;
        // -2: missing, -1: no expiry
        let secs: i64 = conn.ttl(key).await?;
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage> {
        let mut conn = self.connection().await?;
        let (cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(ScanPage { cursor, keys })
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            entries: None,
            total_bytes: None,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}
