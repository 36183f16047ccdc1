//! Cache Entry Types
//!
//! [`CacheEntry`] is the immutable unit written to the persistent store. On the
//! wire it is framed as a self-describing envelope:
//!
//! ```text
//! ┌────────┬──────────────┬──────────────────────────────┬───────────────┐
//! │ "STR1" │ header len   │ JSON header                  │ payload bytes │
//! │ 4 B    │ u32 BE       │ {compressed, codec, sizes,   │ (maybe lz4)   │
//! │        │              │  metadata}                   │               │
//! └────────┴──────────────┴──────────────────────────────┴───────────────┘
//! ```
//!
//! New codecs or metadata fields are additive: the header names its codec, so
//! readers never guess the format.
//!
//! [`L1Entry`] is the in-process copy: already decompressed, with access
//! tracking for eviction.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::compression::CompressionAlgorithm;
use crate::error::{Error, Result};

/// Envelope magic and format version
pub const ENVELOPE_MAGIC: &[u8; 4] = b"STR1";

const PREFIX_LEN: usize = 8;

/// Longest TTL an entry may carry; decoded headers above it are corrupt
pub const MAX_ENTRY_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Attribute names reserved for tier-aware layers
pub const ATTR_TIER: &str = "tier";
pub const ATTR_OPERATION: &str = "operation";

/// Metadata persisted with every payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Write time
    pub created_at: DateTime<Utc>,
    /// Time to live in seconds (always > 0)
    pub ttl_secs: u64,
    /// Free-form labels set by the caller (tier, operation, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl EntryMetadata {
    /// Metadata for an entry written now
    pub fn new(ttl: Duration) -> Self {
        Self {
            created_at: Utc::now(),
            ttl_secs: ttl.as_secs().clamp(1, MAX_ENTRY_TTL_SECS),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach a label
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Read a label
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Size class label, when the writer set one
    pub fn tier(&self) -> Option<&str> {
        self.attribute(ATTR_TIER)
    }

    /// Operation label, when the writer set one
    pub fn operation(&self) -> Option<&str> {
        self.attribute(ATTR_OPERATION)
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Time left before expiry, `None` once expired or out of range
    pub fn remaining_ttl(&self) -> Option<Duration> {
        let ttl = i64::try_from(self.ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)?;
        let expires_at = self.created_at.checked_add_signed(ttl)?;
        (expires_at - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }
}

#[derive(Serialize, Deserialize)]
struct EnvelopeHeader {
    compressed: bool,
    codec: CompressionAlgorithm,
    size_bytes: u64,
    original_size: u64,
    metadata: EntryMetadata,
}

/// Immutable persisted entry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Cache key
    pub key: String,
    /// Stored bytes (compressed when `codec` is not `None`)
    pub payload: Bytes,
    /// Codec applied to `payload`
    pub codec: CompressionAlgorithm,
    /// Serialized size before compression
    pub original_size: u64,
    /// Metadata
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Whether the payload is compressed
    pub fn compressed(&self) -> bool {
        self.codec != CompressionAlgorithm::None
    }

    /// Stored payload size
    pub fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Frame this entry for the backing store
    pub fn encode(&self) -> Result<Bytes> {
        let header = serde_json::to_vec(&EnvelopeHeader {
            compressed: self.compressed(),
            codec: self.codec,
            size_bytes: self.size_bytes(),
            original_size: self.original_size,
            metadata: self.metadata.clone(),
        })?;

        let header_len = u32::try_from(header.len())
            .map_err(|_| Error::Internal("envelope header exceeds 4GiB".into()))?;
        let mut buf = BytesMut::with_capacity(PREFIX_LEN + header.len() + self.payload.len());
        buf.put_slice(ENVELOPE_MAGIC);
        buf.put_u32(header_len);
        buf.put_slice(&header);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parse a stored envelope; any inconsistency is a data-integrity error
    pub fn decode(key: &str, raw: Bytes) -> Result<Self> {
        let corrupt = |reason: String| Error::DataIntegrity {
            key: key.to_string(),
            reason,
        };

        if raw.len() < PREFIX_LEN {
            return Err(corrupt(format!("envelope truncated at {} bytes", raw.len())));
        }
        if &raw[..4] != ENVELOPE_MAGIC {
            return Err(corrupt("unknown envelope magic".into()));
        }

        let header_len = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
        let header_end = PREFIX_LEN
            .checked_add(header_len)
            .filter(|end| *end <= raw.len())
            .ok_or_else(|| corrupt(format!("header length {} out of bounds", header_len)))?;

        let header: EnvelopeHeader = serde_json::from_slice(&raw[PREFIX_LEN..header_end])
            .map_err(|e| corrupt(format!("unreadable header: {}", e)))?;

        let payload = raw.slice(header_end..);
        if payload.len() as u64 != header.size_bytes {
            return Err(corrupt(format!(
                "payload is {} bytes, header declares {}",
                payload.len(),
                header.size_bytes
            )));
        }
        if header.compressed != (header.codec != CompressionAlgorithm::None) {
            return Err(corrupt(format!(
                "compressed flag disagrees with codec {}",
                header.codec
            )));
        }

        let ttl_secs = header.metadata.ttl_secs;
        if ttl_secs == 0 || ttl_secs > MAX_ENTRY_TTL_SECS {
            return Err(corrupt(format!("ttl of {}s out of range", ttl_secs)));
        }

        Ok(Self {
            key: key.to_string(),
            payload,
            codec: header.codec,
            original_size: header.original_size,
            metadata: header.metadata,
        })
    }
}

/// In-process copy of an entry
#[derive(Debug)]
pub struct L1Entry {
    /// Uncompressed serialized value
    data: Bytes,
    /// Metadata shared with the persisted entry
    metadata: EntryMetadata,
    inserted_at: Instant,
    expires_at: Instant,
    /// Microseconds since `inserted_at`
    last_access_us: AtomicU64,
    access_count: AtomicU32,
}

impl L1Entry {
    /// Create an entry living for at most `ttl`
    pub fn new(data: Bytes, metadata: EntryMetadata, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            metadata,
            inserted_at: now,
            expires_at: now + ttl,
            last_access_us: AtomicU64::new(0),
            access_count: AtomicU32::new(0),
        }
    }

    /// Serialized value
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Metadata
    pub fn metadata(&self) -> &EntryMetadata {
        &self.metadata
    }

    /// Size accounted against L1 memory
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Check if entry has expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before expiry
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }

    /// Record an access and return the new count
    #[inline]
    pub fn record_access(&self) -> u32 {
        let since = self.inserted_at.elapsed().as_micros() as u64;
        self.last_access_us.store(since, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get access count
    #[inline]
    pub fn access_count(&self) -> u32 {
        self.access_count.load(Ordering::Relaxed)
    }

    /// Higher is more evictable: idle time over access frequency (LRU-K flavoured)
    pub fn eviction_score(&self) -> f64 {
        let last_access = self.inserted_at + Duration::from_micros(self.last_access_us.load(Ordering::Relaxed));
        let idle = last_access.elapsed().as_secs_f64();
        idle / (self.access_count() as f64 + 1.0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(payload: &'static [u8], codec: CompressionAlgorithm) -> CacheEntry {
        CacheEntry {
            key: "k".into(),
            payload: Bytes::from_static(payload),
            codec,
            original_size: payload.len() as u64,
            metadata: EntryMetadata::new(Duration::from_secs(60))
                .with_attribute(ATTR_TIER, "small")
                .with_attribute(ATTR_OPERATION, "summarize"),
        }
    }

    #[test]
    fn test_envelope_roundtrip() {
        let original = entry(b"{\"summary\":\"ok\"}", CompressionAlgorithm::None);
        let encoded = original.encode().unwrap();
        assert_eq!(&encoded[..4], ENVELOPE_MAGIC);

        let decoded = CacheEntry::decode("k", encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.metadata.tier(), Some("small"));
        assert_eq!(decoded.metadata.operation(), Some("summarize"));
        assert!(!decoded.compressed());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = CacheEntry::decode("k", Bytes::from_static(b"not an envelope")).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));

        let err = CacheEntry::decode("k", Bytes::from_static(b"STR")).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));
    }

    #[test]
    fn test_decode_rejects_out_of_range_ttl() {
        for ttl_secs in [0, MAX_ENTRY_TTL_SECS + 1, i64::MAX as u64, u64::MAX] {
            let mut bad = entry(b"42", CompressionAlgorithm::None);
            bad.metadata.ttl_secs = ttl_secs;
            let err = CacheEntry::decode("k", bad.encode().unwrap()).unwrap_err();
            assert!(matches!(err, Error::DataIntegrity { .. }), "ttl {}", ttl_secs);
        }
    }

    #[test]
    fn test_remaining_ttl_never_overflows() {
        let mut metadata = EntryMetadata::new(Duration::from_secs(60));
        metadata.ttl_secs = i64::MAX as u64;
        assert!(metadata.remaining_ttl().is_none());
        metadata.ttl_secs = u64::MAX;
        assert!(metadata.remaining_ttl().is_none());
        metadata.ttl_secs = 60;
        assert!(metadata.remaining_ttl().unwrap() <= Duration::from_secs(60));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let encoded = entry(b"0123456789", CompressionAlgorithm::None)
            .encode()
            .unwrap();
        let truncated = encoded.slice(..encoded.len() - 3);
        let err = CacheEntry::decode("k", truncated).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));
    }

    #[test]
    fn test_decode_rejects_oversized_header_length() {
        let mut raw = BytesMut::new();
        raw.put_slice(ENVELOPE_MAGIC);
        raw.put_u32(u32::MAX);
        raw.put_slice(b"{}");
        let err = CacheEntry::decode("k", raw.freeze()).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }));
    }

    #[test]
    fn test_metadata_ttl_never_zero() {
        let meta = EntryMetadata::new(Duration::ZERO);
        assert_eq!(meta.ttl_secs, 1);
        assert!(meta.remaining_ttl().is_some());
    }

    #[test]
    fn test_l1_entry_expiry_and_access() {
        let entry = L1Entry::new(
            Bytes::from_static(b"v"),
            EntryMetadata::new(Duration::from_secs(60)),
            Duration::from_millis(20),
        );
        assert!(!entry.is_expired());
        assert_eq!(entry.record_access(), 1);
        assert_eq!(entry.record_access(), 2);

        std::thread::sleep(Duration::from_millis(30));
        assert!(entry.is_expired());
        assert!(entry.remaining_ttl().is_none());
    }

    #[test]
    fn test_eviction_score_favours_frequent_entries() {
        let meta = EntryMetadata::new(Duration::from_secs(60));
        let cold = L1Entry::new(Bytes::new(), meta.clone(), Duration::from_secs(60));
        let hot = L1Entry::new(Bytes::new(), meta, Duration::from_secs(60));
        for _ in 0..10 {
            hot.record_access();
        }
        std::thread::sleep(Duration::from_millis(5));
        cold.record_access();
        std::thread::sleep(Duration::from_millis(20));

        assert!(cold.eviction_score() > hot.eviction_score());
    }
}
