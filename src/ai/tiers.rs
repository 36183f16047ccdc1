//! Text Size Tiers
//!
//! ```text
//!   0 ──── small ──── 500 ──── medium ──── 5000 ──── large ──── 50000 ──── xlarge ──▶
//! ```
//!
//! A length equal to a threshold belongs to the next tier up.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Content size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTier {
    Small,
    Medium,
    Large,
    Xlarge,
}

impl TextTier {
    /// Every tier, smallest first
    pub const ALL: [TextTier; 4] = [
        TextTier::Small,
        TextTier::Medium,
        TextTier::Large,
        TextTier::Xlarge,
    ];

    /// Name used in keys and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            TextTier::Small => "small",
            TextTier::Medium => "medium",
            TextTier::Large => "large",
            TextTier::Xlarge => "xlarge",
        }
    }
}

impl std::fmt::Display for TextTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TextTier::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tier '{}'", s))
    }
}

/// Thresholds in characters; must be strictly increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSizeTiers {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
}

impl Default for TextSizeTiers {
    fn default() -> Self {
        Self {
            small: 500,
            medium: 5000,
            large: 50000,
        }
    }
}

impl TextSizeTiers {
    /// Whether the thresholds are strictly increasing and positive
    pub fn is_strictly_increasing(&self) -> bool {
        0 < self.small && self.small < self.medium && self.medium < self.large
    }

    /// Classify a length in characters
    pub fn classify(&self, length: usize) -> TextTier {
        if length < self.small {
            TextTier::Small
        } else if length < self.medium {
            TextTier::Medium
        } else if length < self.large {
            TextTier::Large
        } else {
            TextTier::Xlarge
        }
    }

    /// Classify a text by its character count after NFC normalization
    pub fn classify_text(&self, text: &str) -> TextTier {
        self.classify(crate::keys::normalized_length(text))
    }
}
