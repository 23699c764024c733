//! Gaps between extracted rules and a track's existing catalog

use crate::rule::ExtractedRule;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of coverage gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    /// No existing rule covers the extracted rule
    Missing,
    /// An existing rule covers it in part
    Partial,
    /// An existing rule contradicts it
    Conflicting,
}

impl fmt::Display for GapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GapType::Missing => "missing",
            GapType::Partial => "partial",
            GapType::Conflicting => "conflicting",
        };
        f.write_str(s)
    }
}

/// Gap severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic
    Low,
    /// Should be addressed
    Medium,
    /// Must be addressed
    High,
    /// Blocking
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A rule the track catalog does not (fully) cover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    /// Unique identifier
    pub id: String,

    /// Track the rule was mapped to
    pub track_id: String,

    /// The uncovered rule
    pub rule: ExtractedRule,

    /// Missing, partial or conflicting
    pub gap_type: GapType,

    /// How urgent the gap is
    pub severity: Severity,

    /// Up to 3 existing rule ids, most similar first
    #[serde(alias = "similar_existing_rules")]
    pub similar_rule_ids: Vec<String>,

    /// Highest similarity found against the track's rules
    pub max_similarity: f64,

    /// What to do about it
    pub recommendation: String,
}

impl Gap {
    /// Create a gap with a fresh UUIDv7-based id
    pub fn new(
        track_id: impl Into<String>,
        rule: ExtractedRule,
        gap_type: GapType,
        severity: Severity,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("gap_{}", uuid::Uuid::now_v7().simple()),
            track_id: track_id.into(),
            rule,
            gap_type,
            severity,
            similar_rule_ids: Vec::new(),
            max_similarity: 0.0,
            recommendation: recommendation.into(),
        }
    }

    /// Record the most similar existing rules
    pub fn with_similar(mut self, similar_rule_ids: Vec<String>, max_similarity: f64) -> Self {
        self.similar_rule_ids = similar_rule_ids;
        self.max_similarity = max_similarity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_display_matches_serde() {
        assert_eq!(GapType::Partial.to_string(), "partial");
        assert_eq!(serde_json::to_value(GapType::Partial).unwrap(), "partial");
        assert_eq!(Severity::High.to_string(), "high");
        assert_eq!(serde_json::to_value(Severity::High).unwrap(), "high");
    }
}
