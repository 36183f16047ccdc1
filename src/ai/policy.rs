//! L1 Promotion Policy
//!
//! L1 is small, so it favours small, frequently reused responses:
//!
//! | tier           | eligible when                                              |
//! |----------------|------------------------------------------------------------|
//! | small          | always                                                     |
//! | medium         | operation is *stable*                                      |
//! | large / xlarge | operation is *highly stable* and accesses >= threshold     |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::operation::Operation;
use super::tiers::TextTier;

/// Promotion policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionPolicy {
    /// Operations whose results are reused broadly
    pub stable_operations: BTreeSet<Operation>,
    /// Stable operations that may promote large entries
    pub highly_stable_operations: BTreeSet<Operation>,
    /// Accesses required before a large entry is promoted
    pub frequency_threshold: u32,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self::balanced()
    }
}

impl PromotionPolicy {
    /// Balanced policy (default)
    pub fn balanced() -> Self {
        Self {
            stable_operations: [Operation::Sentiment, Operation::KeyPoints].into(),
            highly_stable_operations: [Operation::Sentiment].into(),
            frequency_threshold: 3,
        }
    }

    /// Conservative policy
    ///
    /// Medium entries only for sentiment, large entries after many hits.
    pub fn conservative() -> Self {
        Self {
            stable_operations: [Operation::Sentiment].into(),
            highly_stable_operations: [Operation::Sentiment].into(),
            frequency_threshold: 10,
        }
    }

    /// Whether `operation` is stable
    pub fn is_stable(&self, operation: Operation) -> bool {
        self.stable_operations.contains(&operation)
            || self.highly_stable_operations.contains(&operation)
    }

    /// Whether `operation` is highly stable
    pub fn is_highly_stable(&self, operation: Operation) -> bool {
        self.highly_stable_operations.contains(&operation)
    }

    /// Decide whether an entry belongs in L1
    pub fn should_promote(&self, tier: TextTier, operation: Operation, access_count: u32) -> bool {
        match tier {
            TextTier::Small => true,
            TextTier::Medium => self.is_stable(operation),
            TextTier::Large | TextTier::Xlarge => {
                self.is_highly_stable(operation) && access_count >= self.frequency_threshold
            }
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
    fn test_small_always_promoted() {
        let policy = PromotionPolicy::default();
        for op in Operation::ALL {
            assert!(policy.should_promote(TextTier::Small, op, 0));
        }
    }

    #[test]
    fn test_medium_only_for_stable_operations() {
        let policy = PromotionPolicy::default();
        assert!(policy.should_promote(TextTier::Medium, Operation::Sentiment, 0));
        assert!(policy.should_promote(TextTier::Medium, Operation::KeyPoints, 0));
        assert!(!policy.should_promote(TextTier::Medium, Operation::Summarize, 100));
        assert!(!policy.should_promote(TextTier::Medium, Operation::Qa, 100));
    }

    #[test]
    fn test_large_needs_highly_stable_and_frequency() {
        let policy = PromotionPolicy::default();
        assert!(!policy.should_promote(TextTier::Large, Operation::Sentiment, 2));
        assert!(policy.should_promote(TextTier::Large, Operation::Sentiment, 3));
        assert!(policy.should_promote(TextTier::Xlarge, Operation::Sentiment, 3));
        // Stable but not highly stable
        assert!(!policy.should_promote(TextTier::Large, Operation::KeyPoints, 1000));
    }

    #[test]
    fn test_xlarge_never_promoted_for_other_operations() {
        let policy = PromotionPolicy::default();
        for op in [Operation::Summarize, Operation::KeyPoints, Operation::Questions, Operation::Qa] {
            for count in [0, 3, 1000, u32::MAX] {
                assert!(!policy.should_promote(TextTier::Xlarge, op, count));
            }
        }
    }

    #[test]
    fn test_conservative_threshold() {
        let policy = PromotionPolicy::conservative();
        assert!(!policy.should_promote(TextTier::Large, Operation::Sentiment, 9));
        assert!(policy.should_promote(TextTier::Large, Operation::Sentiment, 10));
        assert!(!policy.should_promote(TextTier::Medium, Operation::KeyPoints, 0));
    }
}
