//! Text-processing operations whose responses are cached.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Cached AI operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Summarization
    Summarize,
    /// Sentiment analysis
    Sentiment,
    /// Key point extraction
    KeyPoints,
    /// Question generation
    Questions,
    /// Question answering over the text
    Qa,
}

impl Operation {
    /// Every operation, in declaration order
    pub const ALL: [Operation; 5] = [
        Operation::Summarize,
        Operation::Sentiment,
        Operation::KeyPoints,
        Operation::Questions,
        Operation::Qa,
    ];

    /// Wire name used in keys and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Summarize => "summarize",
            Operation::Sentiment => "sentiment",
            Operation::KeyPoints => "key_points",
            Operation::Questions => "questions",
            Operation::Qa => "qa",
        }
    }

    /// Built-in TTL for this operation
    pub fn default_ttl_secs(&self) -> u64 {
        match self {
            Operation::Summarize => 7200,
            Operation::Sentiment => 86400,
            Operation::KeyPoints => 7200,
            Operation::Questions => 3600,
            Operation::Qa => 1800,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized operation name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation '{0}'")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
