//! Cache Key Generation
//!
//! Keys are pure functions of `(text, operation, options, question)`:
//!
//! ```text
//! ai_cache:op:<operation>|tier:<tier>|txt:<raw:..|hash:..|empty>|opts:<digest>[|q:<digest>]
//! ```
//!
//! - Text up to `text_hash_threshold` characters is NFC-normalized and
//!   percent-encoded, so it can never contain a delimiter or glob character.
//! - Longer text is normalized and hashed in fixed-size chunks; no second
//!   full copy of the input is ever built.
//! - Options are serialized canonically (object keys sorted at every depth)
//!   and digested. Missing options digest as `{}`.
//! - A missing or empty question adds no segment.
//! - Tier and the raw/hash cut-off use the length of the normalized text, so
//!   canonically equal inputs always land on the same key.

use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use unicode_normalization::UnicodeNormalization;

use crate::ai::{Operation, TextSizeTiers, TextTier};
use crate::monitoring::performance::PerformanceMonitor;

/// Namespace shared by every AI cache key
pub const KEY_PREFIX: &str = "ai_cache";

/// Length in characters after NFC normalization, computed without allocating
pub fn normalized_length(text: &str) -> usize {
    text.nfc().count()
}

/// Digest used for long text, options and questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Allow-listed names
    pub const ALLOWED: [&'static str; 2] = ["sha256", "sha512"];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(format!(
                "unsupported hash algorithm '{}' (allowed: {})",
                other,
                Self::ALLOWED.join(", ")
            )),
        }
    }
}

/// Incremental digest over either algorithm
enum Digester {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Digester {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Digester::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Digester::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Digester::Sha256(h) => h.update(data),
            Digester::Sha512(h) => h.update(data),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Digester::Sha256(h) => format!("{:x}", h.finalize()),
            Digester::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Key generator configuration
#[derive(Debug, Clone)]
pub struct KeyGeneratorConfig {
    /// Texts longer than this many characters are hashed
    pub text_hash_threshold: usize,
    pub hash_algorithm: HashAlgorithm,
    /// Bytes fed to the hasher per update
    pub chunk_size: usize,
    /// Generation slower than this is logged
    pub slow_threshold: Duration,
    pub tiers: TextSizeTiers,
}

impl Default for KeyGeneratorConfig {
    fn default() -> Self {
        Self {
            text_hash_threshold: 1000,
            hash_algorithm: HashAlgorithm::Sha256,
            chunk_size: 8192,
            slow_threshold: Duration::from_millis(100),
            tiers: TextSizeTiers::default(),
        }
    }
}

/// How the text is represented inside a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMode {
    Empty,
    Raw,
    Hash,
}

/// Metadata recovered from a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedKey {
    pub operation: Operation,
    pub tier: TextTier,
    pub text_mode: TextMode,
    pub has_question: bool,
}

/// Deterministic key builder
pub struct KeyGenerator {
    config: KeyGeneratorConfig,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl KeyGenerator {
    pub fn new(config: KeyGeneratorConfig) -> Self {
        Self {
            config,
            monitor: None,
        }
    }

    /// Record every generation into `monitor`
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &KeyGeneratorConfig {
        &self.config
    }

    /// Build the key for one request
    pub fn generate_cache_key(
        &self,
        text: &str,
        operation: Operation,
        options: Option<&Value>,
        question: Option<&str>,
    ) -> String {
        let started = Instant::now();
        let length = normalized_length(text);
        let tier = self.config.tiers.classify(length);

        let mut key = String::with_capacity(128);
        let _ = write!(
            key,
            "{}:op:{}|tier:{}|txt:{}|opts:{}",
            KEY_PREFIX,
            operation,
            tier,
            self.text_segment(text, length),
            self.options_digest(options)
        );
        if let Some(q) = question.filter(|q| !q.is_empty()) {
            let _ = write!(key, "|q:{}", self.digest_normalized(q));
        }

        let elapsed = started.elapsed();
        if let Some(monitor) = &self.monitor {
            monitor.record_key_generation(elapsed, length, operation.as_str());
        }
        if elapsed > self.config.slow_threshold {
            tracing::warn!(
                operation = %operation,
                text_length = length,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow cache key generation"
            );
        }
        key
    }

    fn text_segment(&self, text: &str, length: usize) -> String {
        if text.is_empty() {
            "empty".to_string()
        } else if length <= self.config.text_hash_threshold {
            let normalized: String = text.nfc().collect();
            format!("raw:{}", urlencoding::encode(&normalized))
        } else {
            format!("hash:{}", self.digest_normalized(text))
        }
    }

    /// NFC-normalize and digest in bounded chunks
    fn digest_normalized(&self, text: &str) -> String {
        let chunk = self.config.chunk_size.max(64);
        let mut digester = Digester::new(self.config.hash_algorithm);
        let mut buf = String::with_capacity(chunk + 4);
        for ch in text.nfc() {
            buf.push(ch);
            if buf.len() >= chunk {
                digester.update(buf.as_bytes());
                buf.clear();
            }
        }
        digester.update(buf.as_bytes());
        digester.finish_hex()
    }

    fn options_digest(&self, options: Option<&Value>) -> String {
        let canonical = match options {
            None | Some(Value::Null) => "{}".to_string(),
            Some(value) => canonical_json(value),
        };
        let mut digester = Digester::new(self.config.hash_algorithm);
        digester.update(canonical.as_bytes());
        digester.finish_hex()
    }

    /// Recover operation, tier and text mode from a generated key
    pub fn parse_key(key: &str) -> Option<ParsedKey> {
        let rest = key.strip_prefix(KEY_PREFIX)?.strip_prefix(":op:")?;
        let mut segments = rest.split('|');

        let operation = segments.next()?.parse::<Operation>().ok()?;
        let tier = segments.next()?.strip_prefix("tier:")?.parse::<TextTier>().ok()?;
        let txt = segments.next()?.strip_prefix("txt:")?;
        let text_mode = if txt == "empty" {
            TextMode::Empty
        } else if txt.starts_with("raw:") {
            TextMode::Raw
        } else if txt.starts_with("hash:") {
            TextMode::Hash
        } else {
            return None;
        };
        segments.next()?.strip_prefix("opts:")?;
        let has_question = match segments.next() {
            Some(q) => {
                q.strip_prefix("q:")?;
                true
            }
            None => false,
        };

        Some(ParsedKey {
            operation,
            tier,
            text_mode,
            has_question,
        })
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(KeyGeneratorConfig::default())
    }
}

/// Serialize with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================
