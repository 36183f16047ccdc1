//! Payload Compression
//!
//! LZ4 block compression with a size threshold. Payloads at or below the
//! threshold, and payloads that do not shrink, are stored as-is and tagged
//! with [`CompressionAlgorithm::None`], so decoding never has to guess.
//!
//! # Example
//!
//! ```
//! use strata::cache::compression::{CompressionConfig, CompressionManager};
//!
//! let manager = CompressionManager::with_config(CompressionConfig {
//!     threshold_bytes: 16,
//!     ..Default::default()
//! });
//!
//! let data = b"Hello, this is test data that should compress well! Hello, this is test data.";
//! let compressed = manager.compress(data);
//!
//! let decompressed = manager.decompress(&compressed.data, compressed.algorithm).unwrap();
//! assert_eq!(decompressed.as_ref(), data);
//! ```

use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Codec tag written into every stored envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// No compression
    #[default]
    None,
    /// LZ4 block format with a prepended size
    Lz4,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compression Configuration
// =============================================================================

/// Valid LZ4 high-compression levels
pub const MIN_COMPRESSION_LEVEL: u32 = 1;
pub const MAX_COMPRESSION_LEVEL: u32 = 12;

/// Configuration for compression
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Payloads strictly larger than this are compressed
    pub threshold_bytes: u64,
    /// LZ4 high-compression level (1-12)
    pub level: u32,
    /// Algorithm used above the threshold
    pub algorithm: CompressionAlgorithm,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: 1000,
            level: 6,
            algorithm: CompressionAlgorithm::Lz4,
        }
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through compressor
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 compressor
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    /// Create with a high-compression level, clamped to 1-12
    pub fn with_level(level: u32) -> Self {
        let level = level.clamp(MIN_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL);
        Self {
            level: level as i32,
        }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::with_level(CompressionConfig::default().level)
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Result of [`CompressionManager::compress`]
#[derive(Debug, Clone)]
pub struct Compressed {
    /// Bytes to store
    pub data: Bytes,
    /// Codec actually applied
    pub algorithm: CompressionAlgorithm,
    /// Size before compression
    pub original_size: u64,
    /// Time spent compressing (zero when skipped)
    pub elapsed: Duration,
}

impl Compressed {
    /// Whether a codec was applied
    pub fn is_compressed(&self) -> bool {
        self.algorithm != CompressionAlgorithm::None
    }

    /// stored / original
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.data.len() as f64 / self.original_size as f64
        }
    }
}

/// Threshold-aware compression front end
pub struct CompressionManager {
    config: CompressionConfig,
    noop: NoopCompressor,
    lz4: Lz4Compressor,
}

impl CompressionManager {
    /// Create a new compression manager with default config
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            lz4: Lz4Compressor::with_level(config.level),
            noop: NoopCompressor,
            config,
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::None => &self.noop,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Whether a payload of `len` bytes crosses the threshold
    pub fn should_compress(&self, len: usize) -> bool {
        self.config.algorithm != CompressionAlgorithm::None
            && len as u64 > self.config.threshold_bytes
    }

    /// Compress data when it exceeds the threshold and actually shrinks
    pub fn compress(&self, data: &[u8]) -> Compressed {
        let original_size = data.len() as u64;
        if !self.should_compress(data.len()) {
            return Compressed {
                data: Bytes::copy_from_slice(data),
                algorithm: CompressionAlgorithm::None,
                original_size,
                elapsed: Duration::ZERO,
            };
        }

        let started = Instant::now();
        let algorithm = self.config.algorithm;
        match self.compressor(algorithm).compress(data) {
            Ok(compressed) if compressed.len() < data.len() => Compressed {
                data: Bytes::from(compressed),
                algorithm,
                original_size,
                elapsed: started.elapsed(),
            },
            Ok(_) => Compressed {
                data: Bytes::copy_from_slice(data),
                algorithm: CompressionAlgorithm::None,
                original_size,
                elapsed: started.elapsed(),
            },
            Err(e) => {
                tracing::warn!("Compression failed, storing uncompressed: {}", e);
                Compressed {
                    data: Bytes::copy_from_slice(data),
                    algorithm: CompressionAlgorithm::None,
                    original_size,
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    /// Decompress data produced by [`compress`](Self::compress)
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Bytes> {
        let decompressed = self.compressor(algorithm).decompress(data)?;
        Ok(Bytes::from(decompressed))
    }

    /// Get configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new()
    }
}
