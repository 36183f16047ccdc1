//! Validation results
//!
//! Validation never stops at the first problem: every check appends to a
//! [`ValidationResult`], and only errors make a configuration unusable.

use serde::{Deserialize, Serialize};

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Recommendation,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Recommendation => write!(f, "recommendation"),
        }
    }
}

/// One finding about one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.field, self.message)
    }
}

/// Ordered list of findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.push(Severity::Error, field, message);
    }

    pub fn warning(&mut self, field: &str, message: impl Into<String>) {
        self.push(Severity::Warning, field, message);
    }

    pub fn recommend(&mut self, field: &str, message: impl Into<String>) {
        self.push(Severity::Recommendation, field, message);
    }

    /// Append another result's findings
    pub fn extend(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }

    /// True when there are no errors
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.with_severity(Severity::Error).collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.with_severity(Severity::Warning).collect()
    }

    pub fn recommendations(&self) -> Vec<&ValidationIssue> {
        self.with_severity(Severity::Recommendation).collect()
    }

    /// Whether any error concerns `field`
    pub fn has_error_for(&self, field: &str) -> bool {
        self.with_severity(Severity::Error).any(|i| i.field == field)
    }

    /// One line per error
    pub fn error_summary(&self) -> String {
        self.with_severity(Severity::Error)
            .map(|i| format!("  - {}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_errors_invalidate() {
        let mut result = ValidationResult::new();
        result.warning("default_ttl", "very short");
        result.recommend("security", "enable TLS");
        assert!(result.is_valid());

        result.error("l1_cache_size", "must be positive");
        result.error("hash_algorithm", "unsupported");
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 2);
        assert!(result.has_error_for("hash_algorithm"));
        assert_eq!(
            result.error_summary(),
            "  - l1_cache_size: must be positive\n  - hash_algorithm: unsupported"
        );
    }

    #[test]
    fn test_order_is_kept() {
        let mut a = ValidationResult::new();
        a.error("a", "first");
        let mut b = ValidationResult::new();
        b.warning("b", "second");
        a.extend(b);
        let fields: Vec<_> = a.issues().iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, ["a", "b"]);
        assert_eq!(a.issues()[1].to_string(), "[warning] b: second");
    }
}
