//! Error types for the Strata cache
//!
//! Two channels are kept apart:
//!
//! - [`Error`] is the runtime channel. It never leaves the cache engine: every
//!   public cache operation converts it into an absent/false outcome.
//! - [`ConfigurationError`] is raised only while resolving and validating a
//!   configuration at startup.

use std::time::Duration;

use thiserror::Error;

use crate::config::ValidationResult;

/// Result type alias using the runtime Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors produced by backends, codecs and the engine internals
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Backend unreachable or connection dropped
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Backend call exceeded its deadline
    #[error("Backend operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Backend rejected a command for a non-connectivity reason
    #[error("Backend error: {0}")]
    Backend(String),

    /// Stored payload could not be decoded
    #[error("Corrupted entry '{key}': {reason}")]
    DataIntegrity { key: String, reason: String },

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error should push the engine into degraded mode
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity(_) | Error::Timeout { .. })
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            Error::Connectivity(err.to_string())
        } else {
            Error::Backend(err.to_string())
        }
    }
}

/// Startup-time configuration failures
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Preset name outside the closed set
    #[error("Unknown cache preset '{name}'. Valid presets: {}", valid.join(", "))]
    UnknownPreset { name: String, valid: Vec<String> },

    /// One or more parameters failed validation
    #[error("Invalid cache configuration:\n{}", .0.error_summary())]
    Invalid(ValidationResult),

    /// An override layer could not be parsed or applied
    #[error("Invalid override from {source_name}: {reason}")]
    InvalidOverride { source_name: String, reason: String },

    /// Export or import failed
    #[error("Configuration {format} serialization failed: {reason}")]
    Serialization { format: String, reason: String },

    /// The backend required by the configuration cannot be built
    #[error("Unsupported backend for '{url}': {reason}")]
    UnsupportedBackend { url: String, reason: String },
}

impl ConfigurationError {
    /// Validation result carried by an `Invalid` error
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            ConfigurationError::Invalid(result) => Some(result),
            _ => None,
        }
    }
}
